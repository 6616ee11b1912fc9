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

//! Construction of P4Runtime table entries by name.

use p4ext::{ResolveError, Schema};

use proto::p4runtime::{Action, Action_Param, FieldMatch, FieldMatch_Exact, FieldMatch_Ternary, TableEntry};

use protobuf::RepeatedField;

use std::fmt::Display;

/// A table entry ready to write, with the names needed to report a failure.
#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    pub table: String,
    /// Human-readable match key, e.g. a MAC or IP address.
    pub key: String,
    pub table_entry: TableEntry,
}

/// Builds one [`Entry`].  Match fields are appended in call order, which is the order the switch
/// sees them.  For a delete (`insert == false`) [`action`](EntryBuilder::action) is a no-op, so
/// the same call chain yields the same match key without an action.
pub struct EntryBuilder<'a> {
    schema: &'a Schema,
    table: String,
    insert: bool,
    key: String,
    entry: TableEntry,
}

impl<'a> EntryBuilder<'a> {
    pub fn new(schema: &'a Schema, table: String, insert: bool) -> Result<Self, ResolveError> {
        let mut entry = TableEntry::new();
        entry.set_table_id(schema.resolve_table(&table)?);
        Ok(EntryBuilder {
            schema,
            table,
            insert,
            key: String::new(),
            entry,
        })
    }

    pub fn exact(mut self, field: &str, value: Vec<u8>) -> Result<Self, ResolveError> {
        let mut exact = FieldMatch_Exact::new();
        exact.set_value(value);
        let mut fm = FieldMatch::new();
        fm.set_field_id(self.schema.resolve_field(&self.table, field)?);
        fm.set_exact(exact);
        self.entry.mut_field_match().push(fm);
        Ok(self)
    }

    pub fn ternary(mut self, field: &str, value: Vec<u8>, mask: Vec<u8>) -> Result<Self, ResolveError> {
        let mut ternary = FieldMatch_Ternary::new();
        ternary.set_value(value);
        ternary.set_mask(mask);
        let mut fm = FieldMatch::new();
        fm.set_field_id(self.schema.resolve_field(&self.table, field)?);
        fm.set_ternary(ternary);
        self.entry.mut_field_match().push(fm);
        Ok(self)
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.entry.set_priority(priority);
        self
    }

    /// Sets the description used in logs.
    pub fn key<D: Display>(mut self, key: D) -> Self {
        self.key = key.to_string();
        self
    }

    /// Binds `action` with `params`, given in order as (name, value) pairs.
    pub fn action(mut self, action: &str, params: Vec<(&str, Vec<u8>)>) -> Result<Self, ResolveError> {
        if !self.insert {
            return Ok(self);
        }

        let mut a = Action::new();
        a.set_action_id(self.schema.resolve_action(action)?);
        let mut ap = Vec::with_capacity(params.len());
        for (name, value) in params {
            let mut p = Action_Param::new();
            p.set_param_id(self.schema.resolve_param(action, name)?);
            p.set_value(value);
            ap.push(p);
        }
        a.set_params(RepeatedField::from_vec(ap));
        self.entry.mut_action().set_action(a);
        Ok(self)
    }

    pub fn build(self) -> Entry {
        Entry {
            table: self.table,
            key: self.key,
            table_entry: self.entry,
        }
    }
}
