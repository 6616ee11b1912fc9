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

//! TLS material for the connection to the switch.
//!
//! The switch's certificates live in one directory as `ca.crt`, `client.crt`, and `client.key`.
//! When any of them is missing, or is not a regular file, the client falls back to an insecure
//! channel and says so in the log.

use grpcio::{ChannelCredentials, ChannelCredentialsBuilder};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use thiserror::Error;

use tracing::{debug, info, warn};

pub const DEFAULT_CERTS_DIR: &str = "/usr/share/stratum/certs";

const CA_CERT: &str = "ca.crt";
const CLIENT_CERT: &str = "client.crt";
const CLIENT_KEY: &str = "client.key";

/// How often a [`CredentialsWatcher`] looks at the files.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
#[error("{path}: could not read credentials")]
pub struct CredentialsError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credentials {
    Insecure,
    Tls {
        ca_cert: Vec<u8>,
        client_cert: Vec<u8>,
        client_key: Vec<u8>,
    },
}

fn file_paths(dir: &Path) -> [PathBuf; 3] {
    [dir.join(CA_CERT), dir.join(CLIENT_CERT), dir.join(CLIENT_KEY)]
}

/// Modification times of the three files, or `None` if any of them is unusable.
fn modification_times(dir: &Path) -> Option<[SystemTime; 3]> {
    let mut times = [SystemTime::UNIX_EPOCH; 3];
    for (time, path) in times.iter_mut().zip(file_paths(dir).iter()) {
        // symlink_metadata() so that a symlink is seen as a symlink rather than its target.
        let metadata = match fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            Err(_) => {
                debug!("{}: not found", path.display());
                return None;
            }
        };
        if !metadata.file_type().is_file() {
            warn!("{}: not a regular file", path.display());
            return None;
        }
        *time = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    }
    Some(times)
}

fn read_file(path: &Path) -> Result<Vec<u8>, CredentialsError> {
    fs::read(path).map_err(|source| CredentialsError {
        path: path.into(),
        source,
    })
}

impl Credentials {
    /// Loads the credentials in `dir`.  Files that are absent or not regular yield
    /// [`Credentials::Insecure`]; files that exist but cannot be read are an error.
    pub fn load(dir: &Path) -> Result<Credentials, CredentialsError> {
        if modification_times(dir).is_none() {
            warn!(
                "{}: TLS credentials unavailable, using an insecure channel",
                dir.display()
            );
            return Ok(Credentials::Insecure);
        }
        let [ca, cert, key] = file_paths(dir);
        Ok(Credentials::Tls {
            ca_cert: read_file(&ca)?,
            client_cert: read_file(&cert)?,
            client_key: read_file(&key)?,
        })
    }

    pub fn is_secure(&self) -> bool {
        matches!(self, Credentials::Tls { .. })
    }

    /// The grpcio credentials for a secure channel, or `None` for an insecure one.
    pub fn channel_credentials(&self) -> Option<ChannelCredentials> {
        match self {
            Credentials::Insecure => None,
            Credentials::Tls {
                ca_cert,
                client_cert,
                client_key,
            } => Some(
                ChannelCredentialsBuilder::new()
                    .root_cert(ca_cert.clone())
                    .cert(client_cert.clone(), client_key.clone())
                    .build(),
            ),
        }
    }
}

/// Keeps [`Credentials`] current as the files on disk are replaced.
///
/// The files are examined at most once per refresh interval.  They are reloaded only when a
/// modification time changes, or when they appear or disappear.
#[derive(Debug)]
pub struct CredentialsWatcher {
    dir: PathBuf,
    interval: Duration,
    last_check: Instant,
    mtimes: Option<[SystemTime; 3]>,
    current: Credentials,
}

impl CredentialsWatcher {
    pub fn new(dir: &Path) -> Result<Self, CredentialsError> {
        Self::with_interval(dir, REFRESH_INTERVAL)
    }

    pub fn with_interval(dir: &Path, interval: Duration) -> Result<Self, CredentialsError> {
        Ok(CredentialsWatcher {
            dir: dir.into(),
            interval,
            last_check: Instant::now(),
            mtimes: modification_times(dir),
            current: Credentials::load(dir)?,
        })
    }

    /// Returns the current credentials, reloading them first if the refresh interval has passed
    /// and the files changed.
    pub fn current(&mut self) -> Result<&Credentials, CredentialsError> {
        if self.last_check.elapsed() >= self.interval {
            self.last_check = Instant::now();
            let mtimes = modification_times(&self.dir);
            if mtimes != self.mtimes {
                info!("{}: TLS credentials changed, reloading", self.dir.display());
                self.current = Credentials::load(&self.dir)?;
                self.mtimes = mtimes;
            }
        }
        Ok(&self.current)
    }
}
