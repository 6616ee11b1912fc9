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

//! Programs a P4 switch's forwarding tables on behalf of Open vSwitch.
//!
//! Open vSwitch reports what it learns and configures as [`events`].  A [`Dispatcher`] turns each
//! event into table entries for the configured [`Target`] and writes them to the switch over
//! P4Runtime, one short-lived master session per call.

pub mod config;
pub mod dispatcher;
pub mod entry;
mod error;
pub mod events;
pub mod journal;
pub mod target;

pub use config::Config;
pub use dispatcher::{Connector, Dispatcher, GrpcConnector};
pub use entry::{Entry, EntryBuilder};
pub use error::Error;
pub use events::{
    str_to_tunnel_type,
    Event,
    IpAddress,
    IpMacMapInfo,
    MacAddr,
    MacLearningInfo,
    PortVlanInfo,
    PortVlanMode,
    SrcPortInfo,
    TunnelInfo,
    TunnelType,
};
pub use journal::Journal;
pub use target::{Program, TablePrograms, Target};
