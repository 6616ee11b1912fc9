/*
Copyright (c) 2021 VMware, Inc.
SPDX-License-Identifier: MIT
Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the "Software"), to deal
in the Software without restriction, including without limitation the rights
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:
The above copyright notice and this permission notice shall be included in all
copies or substantial portions of the Software.
THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
SOFTWARE.
*/

//! Name-to-id resolution over a device's P4Info.
//!
//! A [`Schema`] is an immutable snapshot of the tables and actions that a device reported when
//! its forwarding pipeline was fetched.  Table programs refer to tables, actions, match fields
//! and action parameters by their fully qualified P4 names; the wire protocol wants numeric ids.
//! The `resolve_*` methods translate between the two.  Every lookup is a linear scan: a pipeline
//! has tens of tables and resolution happens once per table entry, not per packet.
//!
//! A name that the device does not know is an error, never a placeholder id, so that a caller
//! cannot build a write that addresses the wrong object.

use itertools::Itertools;

use proto::p4info;

use std::fmt::{self, Display};

use thiserror::Error;

/// Failure to find a name in a [`Schema`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no table named {0}")]
    Table(String),

    #[error("no action named {0}")]
    Action(String),

    #[error("table {table} has no match field named {field}")]
    Field { table: String, field: String },

    #[error("action {action} has no parameter named {param}")]
    Param { action: String, param: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MatchKind {
    Unspecified,
    Exact,
    Lpm,
    Ternary,
    Range,
    Optional,
    Other(String),
}

impl Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use MatchKind::*;
        let s = match self {
            Unspecified => "unspecified",
            Exact => "exact",
            Lpm => "LPM",
            Ternary => "ternary",
            Range => "range",
            Optional => "optional",
            Other(s) => s,
        };
        write!(f, "{}", s)
    }
}

#[derive(Clone, Debug)]
pub struct MatchField {
    pub id: u32,
    pub name: String,
    pub bit_width: i32,
    pub kind: MatchKind,
}

impl From<&p4info::MatchField> for MatchField {
    fn from(mf: &p4info::MatchField) -> Self {
        use p4info::MatchField_MatchType::*;
        let kind = if mf.has_other_match_type() {
            MatchKind::Other(mf.get_other_match_type().into())
        } else {
            match mf.get_match_type() {
                EXACT => MatchKind::Exact,
                LPM => MatchKind::Lpm,
                TERNARY => MatchKind::Ternary,
                RANGE => MatchKind::Range,
                OPTIONAL => MatchKind::Optional,
                UNSPECIFIED => MatchKind::Unspecified,
            }
        };
        MatchField {
            id: mf.id,
            name: mf.name.clone(),
            bit_width: mf.bitwidth,
            kind,
        }
    }
}

impl Display for MatchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field {}: bit<{}> {}-match", self.name, self.bit_width, self.kind)
    }
}

#[derive(Clone, Debug)]
pub struct Param {
    pub id: u32,
    pub name: String,
    pub bit_width: i32,
}

impl From<&p4info::Action_Param> for Param {
    fn from(ap: &p4info::Action_Param) -> Self {
        Param {
            id: ap.id,
            name: ap.name.clone(),
            bit_width: ap.bitwidth,
        }
    }
}

impl Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: bit<{}>", self.name, self.bit_width)
    }
}

#[derive(Clone, Debug)]
pub struct Action {
    pub id: u32,
    pub name: String,
    pub params: Vec<Param>,
}

impl From<&p4info::Action> for Action {
    fn from(a: &p4info::Action) -> Self {
        Action {
            id: a.get_preamble().id,
            name: a.get_preamble().name.clone(),
            params: a.get_params().iter().map(|x| x.into()).collect(),
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "action {}(", self.name)?;
        for (p_index, p) in self.params.iter().enumerate() {
            if p_index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p)?;
        }
        write!(f, ")")
    }
}

#[derive(Clone, Debug)]
pub struct Table {
    pub id: u32,
    pub name: String,
    pub match_fields: Vec<MatchField>,
    /// Ids of the actions that may be bound to entries of this table.
    pub action_ids: Vec<u32>,
    pub max_entries: Option<u64>,
    pub is_const_table: bool,
}

impl From<&p4info::Table> for Table {
    fn from(t: &p4info::Table) -> Self {
        Table {
            id: t.get_preamble().id,
            name: t.get_preamble().name.clone(),
            match_fields: t.get_match_fields().iter().map(|x| x.into()).collect(),
            action_ids: t.get_action_refs().iter().map(|ar| ar.id).collect(),
            max_entries: if t.size > 0 {
                Some(t.size as u64)
            } else {
                None
            },
            is_const_table: t.is_const_table,
        }
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table {} (id {}):", self.name, self.id)?;
        for mf in &self.match_fields {
            write!(f, "\t{}", mf)?;
        }
        if let Some(max_entries) = self.max_entries {
            write!(f, "\tsize: {}", max_entries)?;
        }
        if self.is_const_table {
            write!(f, "\tconst table")?;
        }
        Ok(())
    }
}

/// The tables and actions of one device's forwarding pipeline.
#[derive(Clone, Debug, Default)]
pub struct Schema {
    tables: Vec<Table>,
    actions: Vec<Action>,
}

impl From<&p4info::P4Info> for Schema {
    fn from(p4i: &p4info::P4Info) -> Self {
        Schema {
            tables: p4i.get_tables().iter().map(|x| x.into()).collect(),
            actions: p4i.get_actions().iter().map(|x| x.into()).collect(),
        }
    }
}

impl Schema {
    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name == name)
    }

    pub fn resolve_table(&self, name: &str) -> Result<u32, ResolveError> {
        self.table(name)
            .map(|t| t.id)
            .ok_or_else(|| ResolveError::Table(name.into()))
    }

    pub fn resolve_action(&self, name: &str) -> Result<u32, ResolveError> {
        self.action(name)
            .map(|a| a.id)
            .ok_or_else(|| ResolveError::Action(name.into()))
    }

    /// Returns the id of match field `field` in table `table`.  An unknown table is reported as
    /// a missing field, since the pair as a whole is what the caller asked about.
    pub fn resolve_field(&self, table: &str, field: &str) -> Result<u32, ResolveError> {
        self.table(table)
            .and_then(|t| t.match_fields.iter().find(|mf| mf.name == field))
            .map(|mf| mf.id)
            .ok_or_else(|| ResolveError::Field {
                table: table.into(),
                field: field.into(),
            })
    }

    pub fn resolve_param(&self, action: &str, param: &str) -> Result<u32, ResolveError> {
        self.action(action)
            .and_then(|a| a.params.iter().find(|p| p.name == param))
            .map(|p| p.id)
            .ok_or_else(|| ResolveError::Param {
                action: action.into(),
                param: param.into(),
            })
    }
}

impl Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Sort by name to ensure predictable output.
        for table in self.tables.iter().sorted_by(|a, b| a.name.cmp(&b.name)) {
            writeln!(f, "{}", table)?;
            for id in &table.action_ids {
                if let Some(action) = self.actions.iter().find(|a| a.id == *id) {
                    writeln!(f, "\t{}", action)?;
                }
            }
        }
        Ok(())
    }
}
