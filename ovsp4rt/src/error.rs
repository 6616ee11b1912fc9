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

use p4ext::{ConnectError, CredentialsError, ResolveError, SessionError};

use std::net::IpAddr;

use thiserror::Error;

use crate::events::TunnelType;
use crate::target::{Program, Target};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Credentials(#[from] CredentialsError),

    #[error("could not read role config")]
    RoleConfig(#[source] std::io::Error),

    #[error("{program} tables are not supported on {target}")]
    Unsupported { target: Target, program: Program },

    #[error("IPv6 {program} entries are not supported on {target}")]
    Ipv6Unsupported { target: Target, program: Program },

    #[error("{tunnel_type} tunnels are not supported on {target}")]
    TunnelTypeUnsupported { target: Target, tunnel_type: TunnelType },

    #[error("tunnel endpoints {local} and {remote} have different address families")]
    MixedAddressFamilies { local: IpAddr, remote: IpAddr },

    #[error("{op} in {table} for {key} failed")]
    Write {
        table: String,
        op: &'static str,
        key: String,
        #[source]
        source: SessionError,
    },
}

impl From<ConnectError> for Error {
    fn from(e: ConnectError) -> Self {
        Error::Session(e.into())
    }
}
