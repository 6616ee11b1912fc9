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

//! Table programs for each supported forwarding target.
//!
//! A table program turns one event into the table entries that realize it on a particular
//! pipeline.  Both pipelines come from the same `linux_networking` P4 program but were compiled
//! for different hardware, so their tables, keys, and parameter widths differ.

use p4ext::Schema;

use serde::{Deserialize, Serialize};

use std::fmt::{self, Display};
use std::str::FromStr;

use thiserror::Error;

use crate::entry::Entry;
use crate::error::Error;
use crate::events::{IpMacMapInfo, MacLearningInfo, SrcPortInfo, TunnelInfo};

mod dpdk;
mod es2k;

pub use dpdk::Dpdk;
pub use es2k::{Es2k, ES2K_VPORT_ID_OFFSET};

/// Prefix shared by every table and action name in the pipeline.
pub(crate) const PREFIX: &str = "linux_networking_control.";

/// Returns the fully qualified name of a pipeline object.
pub(crate) fn p4name(name: &str) -> String {
    format!("{}{}", PREFIX, name)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Dpdk,
    Es2k,
}

impl Default for Target {
    fn default() -> Self {
        Target::Es2k
    }
}

impl Target {
    pub fn programs(self) -> Box<dyn TablePrograms + Send + Sync> {
        match self {
            Target::Dpdk => Box::new(Dpdk),
            Target::Es2k => Box::new(Es2k),
        }
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Dpdk => write!(f, "dpdk"),
            Target::Es2k => write!(f, "es2k"),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown target {0:?} (expected \"dpdk\" or \"es2k\")")]
pub struct ParseTargetError(String);

impl FromStr for Target {
    type Err = ParseTargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dpdk" => Ok(Target::Dpdk),
            "es2k" => Ok(Target::Es2k),
            _ => Err(ParseTargetError(s.into())),
        }
    }
}

/// The kinds of table program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Program {
    Fdb,
    Tunnel,
    SrcPort,
    Vlan,
    IpMacMap,
}

impl Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Program::Fdb => "FDB",
            Program::Tunnel => "tunnel",
            Program::SrcPort => "source port",
            Program::Vlan => "VLAN",
            Program::IpMacMap => "IP-MAC map",
        };
        write!(f, "{}", s)
    }
}

/// Builds the entries for each program on one target.
///
/// Every method returns the entries in the order they must be written.  With `insert` false the
/// entries carry the same match keys and no action.  Programs a target lacks keep the default
/// implementation, which fails with [`Error::Unsupported`]; callers check [`supports`] first.
///
/// [`supports`]: TablePrograms::supports
pub trait TablePrograms {
    fn target(&self) -> Target;

    fn supports(&self, program: Program) -> bool;

    fn fdb_entries(&self, schema: &Schema, info: &MacLearningInfo, insert: bool) -> Result<Vec<Entry>, Error>;

    /// Entries whose presence on the switch shows that `info.mac_addr` was learned behind a
    /// tunnel.  They are built for deletion, so they carry a match but no action.
    fn fdb_tunnel_lookups(&self, _schema: &Schema, _info: &MacLearningInfo) -> Result<Vec<Entry>, Error> {
        Ok(Vec::new())
    }

    /// Encap entry first and tunnel termination last, with any decap entry between them.
    fn tunnel_entries(&self, schema: &Schema, info: &TunnelInfo, insert: bool) -> Result<Vec<Entry>, Error>;

    fn src_port_entries(&self, _schema: &Schema, _info: &SrcPortInfo, _insert: bool) -> Result<Vec<Entry>, Error> {
        Err(self.unsupported(Program::SrcPort))
    }

    fn vlan_entries(&self, _schema: &Schema, _vlan_id: u16, _insert: bool) -> Result<Vec<Entry>, Error> {
        Err(self.unsupported(Program::Vlan))
    }

    fn ip_mac_map_entries(&self, _schema: &Schema, _info: &IpMacMapInfo, _insert: bool) -> Result<Vec<Entry>, Error> {
        Err(self.unsupported(Program::IpMacMap))
    }

    fn unsupported(&self, program: Program) -> Error {
        Error::Unsupported {
            target: self.target(),
            program,
        }
    }
}
