/*
Copyright (c) 2022 VMware, Inc.
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


// Derived from lib/daemon-unix.c in Open vSwitch, with the following license:
/*
 * Copyright (c) 2008, 2009, 2010, 2011, 2012, 2013, 2015 Nicira, Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at:
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Process lifecycle for `ovsp4rt serve`: detaching from the foreground session, a locked
//! pidfile, and cleanup on exit.
//!
//! Detaching forks once.  The parent does not exit as soon as the fork succeeds.  Instead it
//! blocks on a pipe until the child calls [`Daemonizing::complete`], then exits successfully.  If
//! the child exits first, the parent exits with the child's status.  Whoever started the daemon
//! therefore knows, once the parent is gone, whether startup worked.

use anyhow::{anyhow, Result};
use clap::Parser;
use libc::c_int;
use std::env::set_current_dir;
use std::fs::{read_dir, File};
use std::io::{prelude::*, Error};
use std::os::unix::prelude::*;
use std::path::PathBuf;
use std::process::exit;
use tracing::{event, Level};

mod cleanup;
mod pidfile;
mod sys;

pub use cleanup::Cleanup;

/// Options for running as a daemon.  Flatten into a larger `clap` structure to accept them on a
/// command line:
///
/// ```
/// use clap::Parser;
/// use daemon::Daemonize;
///
/// #[derive(Parser, Debug)]
/// struct Args {
///     #[clap(flatten)]
///     daemonize: Daemonize,
/// }
/// ```
///
/// # Safety
///
/// [`Daemonize::start()`] forks.  Call it before any other thread exists, which in practice means
/// before anything that creates a gRPC environment.
#[derive(Clone, Debug, Default, Parser, PartialEq, Eq)]
pub struct Daemonize {
    /// Detach from foreground session
    #[clap(long)]
    pub detach: bool,

    /// Do not change directory to root
    #[clap(long)]
    pub no_chdir: bool,

    /// Create pidfile
    #[clap(long)]
    pub pidfile: Option<PathBuf>,
}

impl Daemonize {
    /// Detaches if requested and creates the pidfile if one was named.  Returns only in the
    /// process that is to become the daemon.  The returned [`Cleanup`] removes the pidfile when
    /// dropped, so keep it until exit.
    ///
    /// # Safety
    ///
    /// Forks: any thread but the caller is gone in the child.  This asserts that the process is
    /// single-threaded.
    pub unsafe fn start(self) -> Result<(Daemonizing, Cleanup)> {
        let mut notify_pipe = None;
        if self.detach {
            assert_single_threaded();
            notify_pipe = Some(fork_and_wait_for_startup()?);
            libc::setsid();
        }

        let mut cleanup = Cleanup::new()?;
        if let Some(ref path) = self.pidfile {
            pidfile::create(path, &mut cleanup)?;
        }
        Ok((Daemonizing { options: self, notify_pipe }, cleanup))
    }
}

/// A process that has started daemonizing but is not yet ready.
///
/// Until [`Daemonizing::complete`] is called, the original parent process keeps waiting.
pub struct Daemonizing {
    options: Daemonize,
    notify_pipe: Option<File>,
}

impl Daemonizing {
    pub fn is_detached(&self) -> bool {
        self.options.detach
    }

    /// Finishes daemonizing.  A detached daemon moves to the root directory unless told not to,
    /// and replaces its standard fds by `/dev/null` except those in `exempt`.  Then the parent
    /// process is released.
    pub fn complete(mut self, exempt: &[RawFd]) -> Result<()> {
        if self.options.detach {
            if !self.options.no_chdir {
                drop(set_current_dir("/"));
            }
            close_standard_fds(exempt)?;
        }
        if let Some(ref mut pipe) = self.notify_pipe {
            pipe.write_all(&[0; 1])
                .map_err(|error| anyhow!("pipe write failed ({error})"))?;
        }
        Ok(())
    }
}

/// Points fds 0, 1, and 2 at `/dev/null`, except for those listed in `exempt`.
pub fn close_standard_fds(exempt: &[RawFd]) -> Result<()> {
    let dev_null = File::options().read(true).write(true).open("/dev/null")
        .map_err(|error| anyhow!("could not open /dev/null ({error})"))?;
    for fd in (0..=2).filter(|fd| !exempt.contains(fd)) {
        sys::dup2(dev_null.as_raw_fd(), fd)?;
    }
    Ok(())
}

#[cfg(target_os = "linux")]
fn count_threads(pid: u32) -> Result<usize, Error> {
    Ok(read_dir(format!("/proc/{pid}/task"))?.count())
}

#[cfg(target_os = "linux")]
fn assert_single_threaded() {
    assert_eq!(count_threads(std::process::id()).ok(), Some(1));
}

#[cfg(not(target_os = "linux"))]
fn assert_single_threaded() {
    // Don't know how to count our threads.
}

/// Forks.  In the parent, waits for the child to signal startup on a pipe and then exits,
/// never returning.  In the child, returns the write end of that pipe.
fn fork_and_wait_for_startup() -> Result<File> {
    let (rfd, wfd) = sys::pipe()?;
    match unsafe { sys::fork()? } {
        Some(child_pid) => {
            drop(wfd);
            let mut buf = [0u8; 1];
            if File::from(rfd).read_exact(&mut buf).is_ok() {
                exit(0);
            }
            // The child closed the pipe without writing, so it failed to start.
            exit(child_exit_code(child_pid))
        }
        None => {
            drop(rfd);
            Ok(wfd.into())
        }
    }
}

fn child_exit_code(child_pid: c_int) -> i32 {
    match sys::waitpid(child_pid) {
        Ok(status) => {
            event!(Level::ERROR, "daemon process died before signaling startup ({status})");
            match status.code() {
                Some(code) if code > 0 => code,
                _ => 1,
            }
        }
        Err(error) => {
            event!(Level::ERROR, "waitpid failed ({error})");
            1
        }
    }
}
