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

//! Turns events into table writes on a switch.
//!
//! Every call is self-contained: it opens a new session, arbitrates, fetches the pipeline,
//! builds the target's entries, and writes them one request at a time.  The first failed write
//! ends the call.  Entries already written stay written.
//!
//! Removing a learned MAC first reads the switch to see whether it was learned behind a tunnel,
//! because the caller may not know.  If so, the tunnel entries are deleted instead.

use p4ext::session::load_role_config;
use p4ext::{CredentialsWatcher, ElectionIdSource, GrpcTransport, Schema, Session, Transport};

use protobuf::well_known_types::Any;

use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::{debug, event, Level};

use crate::config::Config;
use crate::entry::Entry;
use crate::error::Error;
use crate::events::{Event, IpMacMapInfo, MacLearningInfo, SrcPortInfo, TunnelInfo};
use crate::journal::Journal;
use crate::target::{Program, TablePrograms};

/// Opens transports to the switch named in a [`Config`].
pub trait Connector {
    type Transport: Transport;

    fn connect(&self, config: &Config) -> Result<Self::Transport, Error>;
}

/// Connects over gRPC, with TLS when certificates are installed.
pub struct GrpcConnector {
    credentials: Mutex<CredentialsWatcher>,
}

impl GrpcConnector {
    pub fn new(certs_dir: &Path) -> Result<Self, Error> {
        Ok(GrpcConnector {
            credentials: Mutex::new(CredentialsWatcher::new(certs_dir)?),
        })
    }
}

impl Connector for GrpcConnector {
    type Transport = GrpcTransport;

    fn connect(&self, config: &Config) -> Result<GrpcTransport, Error> {
        let mut watcher = match self.credentials.lock() {
            Ok(watcher) => watcher,
            Err(poisoned) => poisoned.into_inner(),
        };
        let credentials = watcher.current()?;
        Ok(GrpcTransport::connect(&config.grpc_addr, credentials))
    }
}

pub struct Dispatcher<C: Connector> {
    config: Config,
    connector: C,
    election_ids: Arc<ElectionIdSource>,
    journal: Option<Journal>,
    programs: Box<dyn TablePrograms + Send + Sync>,
    role_config: Option<Any>,
}

impl Dispatcher<GrpcConnector> {
    pub fn from_config(config: Config) -> Result<Self, Error> {
        let connector = GrpcConnector::new(&config.certs_dir)?;
        Dispatcher::new(config, connector)
    }
}

impl<C: Connector> Dispatcher<C> {
    /// Loads the role config and opens the journal named in `config`.  A journal that cannot be
    /// opened is reported and left out.
    pub fn new(config: Config, connector: C) -> Result<Self, Error> {
        let role_config = match &config.role_config_file {
            Some(path) => load_role_config(path).map_err(Error::RoleConfig)?,
            None => None,
        };
        let journal = config.journal.as_ref().and_then(|path| match Journal::open(path) {
            Ok(journal) => Some(journal),
            Err(e) => {
                event!(Level::WARN, "{}: could not open journal: {}", path.display(), e);
                None
            }
        });
        Ok(Dispatcher {
            programs: config.target.programs(),
            config,
            connector,
            election_ids: Arc::new(ElectionIdSource::new()),
            journal,
            role_config,
        })
    }

    /// Shares an election id source with other dispatchers.
    pub fn with_election_ids(mut self, election_ids: Arc<ElectionIdSource>) -> Self {
        self.election_ids = election_ids;
        self
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Connects and arbitrates.
    pub fn session(&self) -> Result<Session<C::Transport>, Error> {
        let transport = self.connector.connect(&self.config)?;
        Ok(Session::connect(
            transport,
            self.config.device_id,
            &self.config.role_name,
            self.election_ids.next(),
            self.role_config.clone(),
        )?)
    }

    /// Fetches the device's schema over a fresh session.
    pub fn schema(&self) -> Result<Arc<Schema>, Error> {
        Ok(self.session()?.get_schema()?)
    }

    /// Adds or removes a learned MAC.  A tunnel entry wins if both `is_tunnel` and `is_vlan` are
    /// set; with neither set nothing is written.  A removal without `is_tunnel` still deletes the
    /// tunnel entries for the MAC if the switch holds any.
    pub fn config_fdb_entry(&self, info: &MacLearningInfo, insert: bool) -> Result<(), Error> {
        self.dispatch(&Event::Fdb(info.clone()), insert)
    }

    /// Adds or removes a tunnel's encap, decap, and termination entries, in that order.
    pub fn config_tunnel_entry(&self, info: &TunnelInfo, insert: bool) -> Result<(), Error> {
        self.dispatch(&Event::Tunnel(info.clone()), insert)
    }

    pub fn config_src_port_entry(&self, info: &SrcPortInfo, insert: bool) -> Result<(), Error> {
        self.dispatch(&Event::SrcPort(info.clone()), insert)
    }

    pub fn config_vlan_entry(&self, vlan_id: u16, insert: bool) -> Result<(), Error> {
        self.dispatch(&Event::Vlan(vlan_id), insert)
    }

    pub fn config_ip_mac_map_entry(&self, info: &IpMacMapInfo, insert: bool) -> Result<(), Error> {
        self.dispatch(&Event::IpMacMap(info.clone()), insert)
    }

    pub fn dispatch(&self, event: &Event, insert: bool) -> Result<(), Error> {
        if let Some(journal) = &self.journal {
            journal.record(event, insert);
        }

        match event {
            Event::Fdb(info) => self.apply(Program::Fdb, insert, |p, session, s| {
                if !insert && !info.is_tunnel {
                    let present = present_entries(session, p.fdb_tunnel_lookups(s, info)?)?;
                    if !present.is_empty() {
                        return Ok(present);
                    }
                }
                p.fdb_entries(s, info, insert)
            }),
            Event::Tunnel(info) => self.apply(Program::Tunnel, insert, |p, _, s| p.tunnel_entries(s, info, insert)),
            Event::SrcPort(info) => {
                self.apply(Program::SrcPort, insert, |p, _, s| p.src_port_entries(s, info, insert))
            }
            Event::Vlan(vlan_id) => self.apply(Program::Vlan, insert, |p, _, s| p.vlan_entries(s, *vlan_id, insert)),
            Event::IpMacMap(info) => {
                self.apply(Program::IpMacMap, insert, |p, _, s| p.ip_mac_map_entries(s, info, insert))
            }
        }
    }

    fn apply<F>(&self, program: Program, insert: bool, build: F) -> Result<(), Error>
    where
        F: FnOnce(&dyn TablePrograms, &Session<C::Transport>, &Schema) -> Result<Vec<Entry>, Error>,
    {
        if !self.programs.supports(program) {
            event!(
                Level::INFO,
                "{} tables are not supported on {}, nothing to do",
                program,
                self.config.target
            );
            return Ok(());
        }

        let mut session = self.session()?;
        let schema = session.get_schema()?;
        let entries = build(self.programs.as_ref(), &session, &schema)?;

        let op = if insert { "insert" } else { "delete" };
        for Entry { table, key, table_entry } in entries {
            let request = if insert {
                session.insert_request(table_entry)
            } else {
                session.delete_request(table_entry)
            };
            if let Err(source) = session.write(&request) {
                event!(Level::ERROR, "{}: {} of {} failed: {}", table, op, key, source);
                return Err(Error::Write { table, op, key, source });
            }
            debug!("{}: {} of {}", table, op, key);
        }
        Ok(())
    }
}

/// Keeps the entries of `lookups` that the switch holds.  A switch may report an absent entry
/// either with an empty reply or with NOT_FOUND.
fn present_entries<T: Transport>(session: &Session<T>, lookups: Vec<Entry>) -> Result<Vec<Entry>, Error> {
    let mut present = Vec::new();
    for entry in lookups {
        let request = session.read_request(entry.table_entry.clone());
        match session.read(&request) {
            Ok(response) if !response.get_entities().is_empty() => {
                debug!("{}: found {}", entry.table, entry.key);
                present.push(entry);
            }
            Ok(_) => (),
            Err(e) if e.is_not_found() => (),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(present)
}
