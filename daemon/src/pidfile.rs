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

//! Pidfiles locked with `fcntl`, so that a second instance can tell that the first is still
//! running even if the first never got to delete its pidfile.

use anyhow::{anyhow, Context, Result};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{prelude::*, BufReader, ErrorKind};
use std::os::unix::prelude::*;
use std::path::{Path, PathBuf};

use crate::cleanup::Cleanup;
use crate::sys;

/// Writes our pid to `pidfile` and registers it for removal with `cleanup`.  Fails if another
/// live process already owns `pidfile`.
pub fn create(pidfile: &Path, cleanup: &mut Cleanup) -> Result<()> {
    let mut tmpfile = OsString::from(pidfile);
    tmpfile.push(".tmp");
    let tmpfile = PathBuf::from(tmpfile);

    let mut file = File::options().append(true).create(true).open(&tmpfile)
        .with_context(|| format!("{}: create failed", tmpfile.display()))?;
    sys::lock(&file)
        .with_context(|| format!("{}: fcntl(F_SETLK) failed", tmpfile.display()))?;

    // Holding the lock on the temporary file, we may replace `pidfile`.
    if let Some(pid) = owner(pidfile)? {
        return Err(anyhow!("{}: already running as pid {pid}, aborting", pidfile.display()));
    }
    cleanup.register_remove_file(pidfile)?;

    file.set_len(0)
        .with_context(|| format!("{}: truncate failed", tmpfile.display()))?;
    writeln!(file, "{}", std::process::id())
        .with_context(|| format!("{}: write failed", tmpfile.display()))?;
    fs::rename(&tmpfile, pidfile)
        .with_context(|| format!("failed to rename {} to {}", tmpfile.display(), pidfile.display()))?;

    // The lock lives as long as the descriptor does.
    std::mem::forget(file);
    Ok(())
}

/// Returns the pid of the live process that owns `pidfile`.  A stale pidfile is deleted and
/// reported as `None`.
pub fn owner(pidfile: &Path) -> Result<Option<i32>> {
    let file = match File::options().read(true).write(true).open(pidfile) {
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(error).with_context(|| format!("{}: open failed", pidfile.display())),
        Ok(file) => file,
    };

    match sys::lock_holder(&file)? {
        None => {
            // Only the process that manages to lock a stale pidfile may unlink it.
            sys::lock(&file)
                .with_context(|| format!("{}: lost race to lock pidfile", pidfile.display()))?;
            match (fs::metadata(pidfile), file.metadata()) {
                (Ok(m1), Ok(m2)) if m1.dev() == m2.dev() && m1.ino() == m2.ino() => (),
                _ => return Err(anyhow!("{}: lost race to delete pidfile", pidfile.display())),
            }
            fs::remove_file(pidfile)
                .with_context(|| format!("{}: failed to delete stale pidfile", pidfile.display()))?;
            Ok(None)
        }
        Some(lock_pid) => {
            let mut line = String::new();
            if BufReader::new(file).read_line(&mut line)
                .with_context(|| format!("{}: read failed", pidfile.display()))? == 0
            {
                return Err(anyhow!("{}: read: unexpected end of file", pidfile.display()));
            }
            let read_pid: i32 = line.trim().parse()
                .with_context(|| format!("{}: malformed pidfile", pidfile.display()))?;
            if read_pid != lock_pid {
                return Err(anyhow!("{}: stale pidfile for pid {read_pid} being deleted by pid {lock_pid}",
                                   pidfile.display()));
            }
            Ok(Some(lock_pid))
        }
    }
}
