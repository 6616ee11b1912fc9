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

//! System call wrappers.

use libc::c_int;
use std::fs::File;
use std::io::{Error, ErrorKind};
use std::os::unix::prelude::*;
use std::process::ExitStatus;

pub fn pipe() -> Result<(OwnedFd, OwnedFd), Error> {
    let mut fds: [RawFd; 2] = [0; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
        return Err(Error::last_os_error());
    }
    Ok(unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) })
}

/// Returns `Some(child_pid)` in the parent and `None` in the child.
///
/// # Safety
///
/// Only the calling thread survives in the child.
pub unsafe fn fork() -> Result<Option<c_int>, Error> {
    match libc::fork() {
        pid if pid < 0 => Err(Error::last_os_error()),
        0 => Ok(None),
        pid => Ok(Some(pid)),
    }
}

pub fn waitpid(pid: c_int) -> Result<ExitStatus, Error> {
    loop {
        let mut status = 0;
        if unsafe { libc::waitpid(pid, &mut status as *mut c_int, 0) } != -1 {
            return Ok(ExitStatus::from_raw(status));
        }
        let err = Error::last_os_error();
        if err.kind() != ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

fn fcntl_lock_op(file: &File, command: c_int) -> Result<libc::flock, Error> {
    let mut lck = libc::flock {
        l_type: libc::F_WRLCK as i16,
        l_whence: libc::SEEK_SET as i16,
        l_start: 0,
        l_len: 0,
        l_pid: 0,
    };
    loop {
        if unsafe { libc::fcntl(file.as_raw_fd(), command, &mut lck as *mut libc::flock) } != -1 {
            return Ok(lck);
        }
        let err = Error::last_os_error();
        if err.kind() != ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

/// Takes a write lock on all of `file`, failing if another process holds one.
pub fn lock(file: &File) -> Result<(), Error> {
    fcntl_lock_op(file, libc::F_SETLK).map(|_| ())
}

/// Returns the pid of the process holding a lock on `file`, if any.
pub fn lock_holder(file: &File) -> Result<Option<c_int>, Error> {
    let lck = fcntl_lock_op(file, libc::F_GETLK)?;
    Ok(if lck.l_type == libc::F_UNLCK as i16 {
        None
    } else {
        Some(lck.l_pid)
    })
}

pub fn dup2(from: RawFd, to: RawFd) -> Result<(), Error> {
    if unsafe { libc::dup2(from, to) } < 0 {
        return Err(Error::last_os_error());
    }
    Ok(())
}
