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

use p4ext::credentials::DEFAULT_CERTS_DIR;
use p4ext::session::DEFAULT_ROLE_CONFIG_FILE;

use std::path::PathBuf;

use crate::target::Target;

pub const DEFAULT_GRPC_ADDR: &str = "127.0.0.1:9339";
pub const DEFAULT_DEVICE_ID: u64 = 1;
pub const DEFAULT_ROLE_NAME: &str = "ovs-p4rt";

/// Where and how to reach the switch.  Each [`Dispatcher`](crate::Dispatcher) owns one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// P4Runtime server, as "host:port".
    pub grpc_addr: String,
    pub device_id: u64,
    pub role_name: String,
    pub target: Target,
    /// Directory holding `ca.crt`, `client.crt`, and `client.key`.
    pub certs_dir: PathBuf,
    /// Role config attached to arbitration, if the file exists.  `None` disables it.
    pub role_config_file: Option<PathBuf>,
    /// File to append journal records to.
    pub journal: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            grpc_addr: DEFAULT_GRPC_ADDR.into(),
            device_id: DEFAULT_DEVICE_ID,
            role_name: DEFAULT_ROLE_NAME.into(),
            target: Target::default(),
            certs_dir: DEFAULT_CERTS_DIR.into(),
            role_config_file: Some(DEFAULT_ROLE_CONFIG_FILE.into()),
            journal: None,
        }
    }
}
