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

// Derived from lib/fatal-signal.c in Open vSwitch, with the following license:
/*
 * Copyright (c) 2008, 2009, 2010, 2011, 2012, 2013 Nicira, Inc.
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

use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use signal_hook::{self, consts::signal::*, iterator::Signals};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
#[cfg(feature = "test-support")]
use std::process::{Child, Command};
#[cfg(feature = "test-support")]
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use tracing::{event, Level};

/// What one [`Cleanup`] undoes.
#[derive(Default)]
struct Registry {
    remove_files: HashSet<PathBuf>,
    #[cfg(feature = "test-support")]
    kill_pids: HashSet<u32>,
    #[cfg(feature = "test-support")]
    kill_pidfiles: HashSet<PathBuf>,
    #[cfg(feature = "test-support")]
    remove_dirs: HashSet<PathBuf>,
}

impl Registry {
    fn run(&mut self) {
        #[cfg(feature = "test-support")]
        self.kill_processes();
        for file in self.remove_files.drain() {
            if let Err(err) = fs::remove_file(&file) {
                event!(Level::WARN, "{}: removing file failed ({err})", file.display());
            }
        }
        #[cfg(feature = "test-support")]
        self.remove_dirs();
    }

    #[cfg(feature = "test-support")]
    fn kill_processes(&mut self) {
        for pidfile in self.kill_pidfiles.drain() {
            match fs::read_to_string(&pidfile).map(|s| s.trim().parse::<u32>()) {
                Ok(Ok(pid)) => drop(self.kill_pids.insert(pid)),
                _ => event!(Level::WARN, "{}: reading pidfile failed", pidfile.display()),
            }
        }
        for pid in self.kill_pids.drain() {
            unsafe { libc::kill(pid as libc::pid_t, SIGTERM); }
        }
    }

    #[cfg(feature = "test-support")]
    fn remove_dirs(&mut self) {
        for dir in self.remove_dirs.drain() {
            // Processes killed first may still be deleting files of their own.
            loop {
                match fs::remove_dir_all(&dir) {
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound && dir.exists() => (),
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => break,
                    Err(err) => {
                        event!(Level::WARN, "{}: removing directory failed ({err})", dir.display());
                        break;
                    }
                    Ok(()) => break,
                }
            }
        }
    }
}

type Registries = Arc<Mutex<HashMap<u64, Arc<Mutex<Registry>>>>>;

/// Process-wide owner of the fatal-signal thread.
struct SignalHandler {
    registries: Registries,
    next_id: u64,
}

impl SignalHandler {
    fn new() -> Result<SignalHandler> {
        let mut signals = Signals::new(&[SIGTERM, SIGINT, SIGHUP, SIGALRM])?;
        let registries: Registries = Arc::new(Mutex::new(HashMap::new()));
        let registries2 = registries.clone();
        thread::spawn(move || {
            if let Some(signal) = signals.forever().next() {
                if let Ok(mut registries) = registries2.lock() {
                    for (_, registry) in registries.drain() {
                        if let Ok(mut registry) = registry.lock() {
                            registry.run();
                        }
                    }
                }
                drop(signal_hook::low_level::emulate_default_handler(signal));
            }
        });
        Ok(SignalHandler { registries, next_id: 0 })
    }

    fn instance() -> MutexGuard<'static, Result<SignalHandler>> {
        lazy_static! {
            static ref INSTANCE: Mutex<Result<SignalHandler>> = Mutex::new(SignalHandler::new());
        }
        INSTANCE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn add() -> Result<(u64, Arc<Mutex<Registry>>)> {
        match *Self::instance() {
            Err(ref e) => Err(anyhow!("{e}")),
            Ok(ref mut handler) => {
                let id = handler.next_id;
                handler.next_id += 1;
                let registry = Arc::new(Mutex::new(Registry::default()));
                lock(&handler.registries).insert(id, registry.clone());
                Ok((id, registry))
            }
        }
    }

    fn remove(id: u64, run: bool) {
        if let Ok(ref handler) = *Self::instance() {
            if let Some(registry) = lock(&handler.registries).remove(&id) {
                if run {
                    lock(&registry).run();
                }
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Undoes registered side effects when dropped or when a fatal signal arrives.
///
/// The signal handler runs on a thread, which a fork does not carry into the child.  A process
/// that forks should create its `Cleanup` afterward, in the child.
pub struct Cleanup {
    registry: Arc<Mutex<Registry>>,
    id: u64,
}

impl Cleanup {
    pub fn new() -> Result<Cleanup> {
        let (id, registry) = SignalHandler::add()?;
        Ok(Cleanup { registry, id })
    }

    /// Drops `self` without undoing anything.
    pub fn cancel(self) {
        SignalHandler::remove(self.id, false);
    }

    /// Spawns `command` and registers the child to be killed on exit.  Test support only.
    #[cfg(feature = "test-support")]
    pub fn spawn(&mut self, command: &mut Command) -> Result<Child> {
        let mut registry = lock(&self.registry);
        let child = command.spawn()?;
        registry.kill_pids.insert(child.id());
        Ok(child)
    }

    /// Creates a directory under `parent_dir` that is removed, with its contents, on exit.  Test
    /// support only.
    #[cfg(feature = "test-support")]
    pub fn create_temp_dir<P: AsRef<Path>>(&mut self, parent_dir: P) -> Result<PathBuf> {
        static SERIAL: AtomicUsize = AtomicUsize::new(0);
        let parent_dir = parent_dir.as_ref().canonicalize()?;
        for _ in 0..10 {
            let serial = SERIAL.fetch_add(1, Ordering::Relaxed);
            let tmp_dir = parent_dir.join(format!("tmp{}.{}", std::process::id(), serial));
            match fs::create_dir(&tmp_dir) {
                Ok(()) => {
                    lock(&self.registry).remove_dirs.insert(tmp_dir.clone());
                    return Ok(tmp_dir);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => (),
                Err(e) => return Err(e.into()),
            }
        }
        Err(anyhow!("{}: could not create a temporary directory", parent_dir.display()))
    }

    /// Registers `pidfile` as naming a process to kill on exit.  Test support only.
    #[cfg(feature = "test-support")]
    pub fn register_pidfile<P: AsRef<Path>>(&mut self, pidfile: P) -> Result<()> {
        lock(&self.registry).kill_pidfiles.insert(absolute_path(pidfile.as_ref())?);
        Ok(())
    }

    /// Registers `file` to be deleted on exit.
    pub fn register_remove_file<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        lock(&self.registry).remove_files.insert(absolute_path(file.as_ref())?);
        Ok(())
    }
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        SignalHandler::remove(self.id, true);
    }
}

fn absolute_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(PathBuf::from(path))
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
