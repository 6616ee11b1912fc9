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

//! The seam between a [`Session`](crate::Session) and the wire.
//!
//! [`GrpcTransport`] talks to a real switch.  Tests substitute in-memory implementations that
//! script the switch's replies.

use futures::executor::block_on;
use futures::{SinkExt, StreamExt, TryStreamExt};

use grpcio::{
    ChannelBuilder,
    ClientDuplexReceiver,
    ClientDuplexSender,
    EnvBuilder,
    WriteFlags,
};

use proto::p4runtime::{
    GetForwardingPipelineConfigRequest,
    GetForwardingPipelineConfigResponse,
    ReadRequest,
    ReadResponse,
    StreamMessageRequest,
    StreamMessageResponse,
    WriteRequest,
    WriteResponse,
};
use proto::p4runtime_grpc::P4RuntimeClient;

use std::sync::Arc;

use tracing::debug;

use crate::credentials::Credentials;

/// The P4Runtime operations a session needs.  Every call blocks until the switch answers.
pub trait Transport {
    /// Opens the bidirectional stream channel.
    fn open_stream(&mut self) -> grpcio::Result<()>;

    /// Sends one message on the open stream.
    fn send_arbitration(&mut self, request: StreamMessageRequest) -> grpcio::Result<()>;

    /// Waits for the next message on the stream.  `None` means that the stream ended, or was
    /// never opened.
    fn recv_stream(&mut self) -> Option<grpcio::Result<StreamMessageResponse>>;

    /// Half-closes the stream.  Does nothing if no stream is open.
    fn finish_stream(&mut self);

    fn get_pipeline_config(
        &self,
        request: &GetForwardingPipelineConfigRequest,
    ) -> grpcio::Result<GetForwardingPipelineConfigResponse>;

    fn write(&self, request: &WriteRequest) -> grpcio::Result<WriteResponse>;

    /// Collects every partial response of a server-streaming read.
    fn read(&self, request: &ReadRequest) -> grpcio::Result<Vec<ReadResponse>>;
}

type StreamChannel = (
    ClientDuplexSender<StreamMessageRequest>,
    ClientDuplexReceiver<StreamMessageResponse>,
);

pub struct GrpcTransport {
    client: P4RuntimeClient,
    stream: Option<StreamChannel>,
}

impl GrpcTransport {
    /// Creates a channel to `addr` ("host:port").  The channel connects lazily, so failures
    /// surface on the first RPC.
    pub fn connect(addr: &str, credentials: &Credentials) -> Self {
        let env = Arc::new(EnvBuilder::new().build());
        let builder = ChannelBuilder::new(env);
        let channel = match credentials.channel_credentials() {
            Some(creds) => builder.secure_connect(addr, creds),
            None => builder.connect(addr),
        };
        GrpcTransport {
            client: P4RuntimeClient::new(channel),
            stream: None,
        }
    }
}

impl Transport for GrpcTransport {
    fn open_stream(&mut self) -> grpcio::Result<()> {
        self.stream = Some(self.client.stream_channel()?);
        Ok(())
    }

    fn send_arbitration(&mut self, request: StreamMessageRequest) -> grpcio::Result<()> {
        match &mut self.stream {
            Some((sink, _)) => block_on(sink.send((request, WriteFlags::default()))),
            None => Err(grpcio::Error::RpcFinished(None)),
        }
    }

    fn recv_stream(&mut self) -> Option<grpcio::Result<StreamMessageResponse>> {
        let (_, receiver) = self.stream.as_mut()?;
        block_on(receiver.next())
    }

    fn finish_stream(&mut self) {
        if let Some((mut sink, _)) = self.stream.take() {
            if let Err(e) = block_on(sink.close()) {
                debug!("closing stream channel failed ({})", e);
            }
        }
    }

    fn get_pipeline_config(
        &self,
        request: &GetForwardingPipelineConfigRequest,
    ) -> grpcio::Result<GetForwardingPipelineConfigResponse> {
        self.client.get_forwarding_pipeline_config(request)
    }

    fn write(&self, request: &WriteRequest) -> grpcio::Result<WriteResponse> {
        self.client.write(request)
    }

    fn read(&self, request: &ReadRequest) -> grpcio::Result<Vec<ReadResponse>> {
        let receiver = self.client.read(request)?;
        block_on(receiver.try_collect())
    }
}

impl Drop for GrpcTransport {
    fn drop(&mut self) {
        self.finish_stream();
    }
}
