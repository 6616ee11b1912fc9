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

//! A master P4Runtime session with one device.
//!
//! Connecting opens the stream channel and sends a single arbitration update carrying the
//! session's election id.  The switch answers with an arbitration update of its own; only a
//! reply for the same device yields a [`Session`].  A session that lost the election is still
//! returned, but [`Session::is_master`] is false and the switch will refuse its writes.

use grpcio::RpcStatusCode;
use protobuf::well_known_types::Any;
use protobuf::RepeatedField;

use proto::p4runtime::{
    Entity,
    GetForwardingPipelineConfigRequest,
    GetForwardingPipelineConfigRequest_ResponseType,
    MasterArbitrationUpdate,
    ReadRequest,
    ReadResponse,
    Role,
    StreamMessageRequest,
    StreamMessageResponse_oneof_update,
    TableEntry,
    Update,
    Update_Type,
    WriteRequest,
};

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use tracing::{debug, info, warn};

use crate::election::ElectionId;
use crate::schema::Schema;
use crate::transport::Transport;

pub const DEFAULT_ROLE_CONFIG_FILE: &str = "/usr/share/stratum/ovs_p4rt_role_config.pb.txt";

const ROLE_CONFIG_TYPE_URL: &str = "type.googleapis.com/stratum.P4RoleConfig";

/// Why a session could not be established.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("failed to open stream channel")]
    StreamOpen(#[source] grpcio::Error),

    #[error("failed to send arbitration update")]
    StreamWrite(#[source] grpcio::Error),

    #[error("no arbitration response from switch")]
    NoResponse(#[source] Option<grpcio::Error>),

    #[error("switch answered arbitration with a non-arbitration message")]
    NotArbitration,

    #[error("arbitration response is for device {actual}, expected device {expected}")]
    DeviceIdMismatch { expected: u64, actual: u64 },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("failed to retrieve forwarding pipeline")]
    Pipeline(#[source] grpcio::Error),

    #[error("device did not return P4Info")]
    MissingP4Info,

    #[error("failed to write request")]
    Write(#[source] grpcio::Error),

    #[error("failed to read request")]
    Read(#[source] grpcio::Error),

    #[error("session is closed")]
    NotConnected,
}

impl SessionError {
    /// True when a read was answered with NOT_FOUND, which a switch uses for an absent entry.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SessionError::Read(grpcio::Error::RpcFailure(status))
                if status.code() == RpcStatusCode::NOT_FOUND
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Unconnected,
    /// The stream is open but this client does not hold mastership.
    Arbitrating,
    MastershipHeld,
    Closed,
}

/// Reads a role configuration file and packs it for an arbitration update.  A missing file is
/// not an error: the session then arbitrates without a role config.
pub fn load_role_config(path: &Path) -> io::Result<Option<Any>> {
    match fs::read(path) {
        Ok(value) => {
            let mut any = Any::new();
            any.set_type_url(ROLE_CONFIG_TYPE_URL.into());
            any.set_value(value);
            Ok(Some(any))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

pub struct Session<T: Transport> {
    transport: T,
    device_id: u64,
    role: String,
    election_id: ElectionId,
    state: SessionState,
    schema: Option<Arc<Schema>>,
}

impl<T: Transport> Session<T> {
    /// Arbitrates for mastership of `device_id` over `transport`.  Blocks until the switch sends
    /// one reply.  On failure the stream is finished before returning.
    pub fn connect(
        mut transport: T,
        device_id: u64,
        role: &str,
        election_id: ElectionId,
        role_config: Option<Any>,
    ) -> Result<Self, ConnectError> {
        if let Err(e) = transport.open_stream() {
            return Err(ConnectError::StreamOpen(e));
        }

        match Self::arbitrate(&mut transport, device_id, role, election_id, role_config) {
            Ok(is_master) => Ok(Session {
                transport,
                device_id,
                role: role.into(),
                election_id,
                state: if is_master {
                    SessionState::MastershipHeld
                } else {
                    SessionState::Arbitrating
                },
                schema: None,
            }),
            Err(e) => {
                transport.finish_stream();
                Err(e)
            }
        }
    }

    fn arbitrate(
        transport: &mut T,
        device_id: u64,
        role: &str,
        election_id: ElectionId,
        role_config: Option<Any>,
    ) -> Result<bool, ConnectError> {
        let mut update = MasterArbitrationUpdate::new();
        update.set_device_id(device_id);
        update.set_election_id(election_id.to_proto());
        let mut p4role = Role::new();
        p4role.set_name(role.into());
        if let Some(config) = role_config {
            p4role.set_config(config);
        }
        update.set_role(p4role);

        let mut request = StreamMessageRequest::new();
        request.set_arbitration(update);
        debug!("device {}: sending arbitration update, election id {}", device_id, election_id);
        transport
            .send_arbitration(request)
            .map_err(ConnectError::StreamWrite)?;

        let response = match transport.recv_stream() {
            Some(Ok(response)) => response,
            Some(Err(e)) => return Err(ConnectError::NoResponse(Some(e))),
            None => return Err(ConnectError::NoResponse(None)),
        };
        let arbitration = match response.update {
            Some(StreamMessageResponse_oneof_update::arbitration(arbitration)) => arbitration,
            _ => return Err(ConnectError::NotArbitration),
        };
        if arbitration.device_id != device_id {
            return Err(ConnectError::DeviceIdMismatch {
                expected: device_id,
                actual: arbitration.device_id,
            });
        }

        let status = arbitration.get_status();
        if status.code != 0 {
            warn!(
                "device {}: not master for role {} (status {}: {})",
                device_id, role, status.code, status.message
            );
            return Ok(false);
        }
        info!("device {}: mastership acquired for role {}", device_id, role);
        Ok(true)
    }

    pub fn device_id(&self) -> u64 {
        self.device_id
    }

    pub fn election_id(&self) -> ElectionId {
        self.election_id
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_master(&self) -> bool {
        self.state == SessionState::MastershipHeld
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn check_open(&self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Closed | SessionState::Unconnected => Err(SessionError::NotConnected),
            _ => Ok(()),
        }
    }

    /// Fetches the device's P4Info and caches the resulting schema for the session's lifetime.
    pub fn get_schema(&mut self) -> Result<Arc<Schema>, SessionError> {
        self.check_open()?;
        if let Some(schema) = &self.schema {
            return Ok(schema.clone());
        }

        let mut request = GetForwardingPipelineConfigRequest::new();
        request.set_device_id(self.device_id);
        request.set_response_type(
            GetForwardingPipelineConfigRequest_ResponseType::P4INFO_AND_COOKIE,
        );
        let response = self
            .transport
            .get_pipeline_config(&request)
            .map_err(SessionError::Pipeline)?;
        let pipeline = response.get_config();
        if !pipeline.has_p4info() {
            return Err(SessionError::MissingP4Info);
        }

        let schema = Arc::new(Schema::from(pipeline.get_p4info()));
        self.schema = Some(schema.clone());
        Ok(schema)
    }

    /// Sends `request` as a single unary write.  The switch accepts or rejects it as a whole.
    pub fn write(&self, request: &WriteRequest) -> Result<(), SessionError> {
        self.check_open()?;
        self.transport
            .write(request)
            .map(|_| ())
            .map_err(SessionError::Write)
    }

    /// Reads entities, merging every partial response into one.
    pub fn read(&self, request: &ReadRequest) -> Result<ReadResponse, SessionError> {
        self.check_open()?;
        let responses = self.transport.read(request).map_err(SessionError::Read)?;
        let entities = responses
            .into_iter()
            .flat_map(|mut r| r.take_entities().into_vec())
            .collect::<Vec<_>>();
        let mut merged = ReadResponse::new();
        merged.set_entities(RepeatedField::from_vec(entities));
        Ok(merged)
    }

    fn update_request(&self, update_type: Update_Type, entry: TableEntry) -> WriteRequest {
        let mut entity = Entity::new();
        entity.set_table_entry(entry);

        let mut update = Update::new();
        update.set_field_type(update_type);
        update.set_entity(entity);

        let mut request = WriteRequest::new();
        request.set_device_id(self.device_id);
        request.set_election_id(self.election_id.to_proto());
        request.set_role(self.role.clone());
        request.set_updates(RepeatedField::from_vec(vec![update]));
        request
    }

    pub fn insert_request(&self, entry: TableEntry) -> WriteRequest {
        self.update_request(Update_Type::INSERT, entry)
    }

    pub fn modify_request(&self, entry: TableEntry) -> WriteRequest {
        self.update_request(Update_Type::MODIFY, entry)
    }

    pub fn delete_request(&self, entry: TableEntry) -> WriteRequest {
        self.update_request(Update_Type::DELETE, entry)
    }

    pub fn read_request(&self, entry: TableEntry) -> ReadRequest {
        let mut entity = Entity::new();
        entity.set_table_entry(entry);

        let mut request = ReadRequest::new();
        request.set_device_id(self.device_id);
        request.set_role(self.role.clone());
        request.set_entities(RepeatedField::from_vec(vec![entity]));
        request
    }

    /// Finishes the stream channel.  Later operations fail with [`SessionError::NotConnected`].
    pub fn close(&mut self) {
        if self.state != SessionState::Closed {
            self.transport.finish_stream();
            self.state = SessionState::Closed;
            debug!("device {}: session closed", self.device_id);
        }
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        self.close();
    }
}
