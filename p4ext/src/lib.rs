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

//! Client-side building blocks for talking P4Runtime to a single switch.
//!
//! - [`schema`] turns a device's P4Info into name-to-id lookups.
//! - [`codec`] produces the byte strings that match values and action parameters carry.
//! - [`session`] establishes mastership over the stream channel and then reads, writes, and
//!   fetches the pipeline over a [`transport::Transport`].
//! - [`credentials`] loads the TLS material used to reach the switch.

pub mod codec;
pub mod credentials;
mod election;
pub mod schema;
pub mod session;
pub mod transport;

pub use credentials::{Credentials, CredentialsError, CredentialsWatcher};
pub use election::{ElectionId, ElectionIdSource};
pub use schema::{ResolveError, Schema};
pub use session::{ConnectError, Session, SessionError, SessionState};
pub use transport::{GrpcTransport, Transport};
