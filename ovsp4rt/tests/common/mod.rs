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

//! An in-memory switch and P4Info fixtures for the two pipelines.

#![allow(dead_code)]

use ovsp4rt::{Config, Connector, Dispatcher, Error, Target};

use p4ext::{ElectionId, Schema, Transport};

use proto::p4info::{Action, Action_Param, MatchField, MatchField_MatchType, P4Info, Preamble, Table};
use proto::p4runtime::{
    Entity,
    GetForwardingPipelineConfigRequest,
    GetForwardingPipelineConfigResponse,
    ReadRequest,
    ReadResponse,
    StreamMessageRequest,
    StreamMessageResponse,
    TableEntry,
    Update_Type,
    WriteRequest,
    WriteResponse,
};

use grpcio::{RpcStatus, RpcStatusCode};

use protobuf::RepeatedField;

use std::sync::{Arc, Mutex};

use MatchField_MatchType::{EXACT, TERNARY};

pub const PREFIX: &str = "linux_networking_control.";

/// Builds a P4Info with sequential ids: tables from 1000, actions from 2000.
#[derive(Default)]
pub struct P4InfoBuilder {
    p4info: P4Info,
}

fn preamble(id: u32, name: &str) -> Preamble {
    let mut preamble = Preamble::new();
    preamble.set_id(id);
    preamble.set_name(format!("{}{}", PREFIX, name));
    preamble.set_alias(name.into());
    preamble
}

impl P4InfoBuilder {
    pub fn table(mut self, name: &str, fields: &[(&str, i32, MatchField_MatchType)]) -> Self {
        let mut table = Table::new();
        table.set_preamble(preamble(1000 + self.p4info.get_tables().len() as u32, name));
        for (i, (field, bitwidth, kind)) in fields.iter().enumerate() {
            let mut mf = MatchField::new();
            mf.set_id(i as u32 + 1);
            mf.set_name((*field).into());
            mf.set_bitwidth(*bitwidth);
            mf.set_match_type(*kind);
            table.mut_match_fields().push(mf);
        }
        table.set_size(1024);
        self.p4info.mut_tables().push(table);
        self
    }

    pub fn action(mut self, name: &str, params: &[(&str, i32)]) -> Self {
        let mut action = Action::new();
        action.set_preamble(preamble(2000 + self.p4info.get_actions().len() as u32, name));
        for (i, (param, bitwidth)) in params.iter().enumerate() {
            let mut p = Action_Param::new();
            p.set_id(i as u32 + 1);
            p.set_name((*param).into());
            p.set_bitwidth(*bitwidth);
            action.mut_params().push(p);
        }
        self.p4info.mut_actions().push(action);
        self
    }

    pub fn build(self) -> P4Info {
        self.p4info
    }
}

const TUN_FLAG: &str = "user_meta.pmeta.tun_flag1_d0";
const MOD_BLOB_PTR: &str = "vmeta.common.mod_blob_ptr";

pub fn dpdk_p4info() -> P4Info {
    P4InfoBuilder::default()
        .table("l2_fwd_tx_table", &[("dst_mac", 48, EXACT)])
        .table("l2_fwd_rx_with_tunnel_table", &[("dst_mac", 48, EXACT)])
        .table("vxlan_encap_mod_table", &[("vendormeta_mod_data_ptr", 24, EXACT)])
        .table(
            "ipv4_tunnel_term_table",
            &[("tunnel_type", 8, EXACT), ("ipv4_src", 32, EXACT), ("ipv4_dst", 32, EXACT)],
        )
        .action("l2_fwd", &[("port", 32)])
        .action("set_tunnel", &[("tunnel_id", 24), ("dst_addr", 32)])
        .action(
            "vxlan_encap",
            &[("src_addr", 32), ("dst_addr", 32), ("dst_port", 16), ("vni", 24)],
        )
        .action("decap_outer_ipv4", &[("tunnel_id", 24)])
        .build()
}

const ENCAP_V4_PARAMS: &[(&str, i32)] =
    &[("src_addr", 32), ("dst_addr", 32), ("src_port", 16), ("dst_port", 16), ("vni", 24)];

const ENCAP_V6_PARAMS: &[(&str, i32)] = &[
    ("src_addr", 128),
    ("dst_addr", 128),
    ("ds", 6),
    ("ecn", 2),
    ("flow_label", 20),
    ("hop_limit", 8),
    ("src_port", 16),
    ("dst_port", 16),
    ("vni", 24),
];

pub fn es2k_p4info() -> P4Info {
    P4InfoBuilder::default()
        .table("l2_fwd_tx_table", &[("dst_mac", 48, EXACT), (TUN_FLAG, 1, EXACT)])
        .table("l2_fwd_tx_ipv6_table", &[("dst_mac", 48, EXACT), (TUN_FLAG, 1, EXACT)])
        .table("l2_fwd_rx_with_tunnel_table", &[("dst_mac", 48, EXACT)])
        .table("l2_fwd_rx_ipv6_with_tunnel_table", &[("dst_mac", 48, EXACT)])
        .table("sem_bypass", &[("dst_mac", 48, EXACT)])
        .table("vxlan_encap_mod_table", &[(MOD_BLOB_PTR, 24, EXACT)])
        .table("vxlan_encap_v6_mod_table", &[(MOD_BLOB_PTR, 24, EXACT)])
        .table(
            "ipv4_tunnel_term_table",
            &[(TUN_FLAG, 1, EXACT), ("ipv4_src", 32, EXACT), ("ipv4_dst", 32, EXACT)],
        )
        .table(
            "ipv6_tunnel_term_table",
            &[(TUN_FLAG, 1, EXACT), ("ipv6_src", 128, EXACT), ("ipv6_dst", 128, EXACT)],
        )
        .table(
            "source_port_to_bridge_map",
            &[
                ("user_meta.cmeta.source_port", 16, TERNARY),
                ("hdrs.vlan_ext[vmeta.common.depth].hdr.vid", 12, TERNARY),
            ],
        )
        .table("vlan_push_mod_table", &[(MOD_BLOB_PTR, 24, EXACT)])
        .table("vlan_pop_mod_table", &[(MOD_BLOB_PTR, 24, EXACT)])
        .table("vm_src_ip4_mac_map_table", &[("ipv4_src", 32, EXACT)])
        .table("vm_dst_ip4_mac_map_table", &[("ipv4_dst", 32, EXACT)])
        .table("vxlan_encap_vlan_pop_mod_table", &[(MOD_BLOB_PTR, 24, EXACT)])
        .table("vxlan_encap_v6_vlan_pop_mod_table", &[(MOD_BLOB_PTR, 24, EXACT)])
        .table("geneve_encap_mod_table", &[(MOD_BLOB_PTR, 24, EXACT)])
        .table("geneve_encap_vlan_pop_mod_table", &[(MOD_BLOB_PTR, 24, EXACT)])
        .table("geneve_encap_v6_mod_table", &[(MOD_BLOB_PTR, 24, EXACT)])
        .table("geneve_encap_v6_vlan_pop_mod_table", &[(MOD_BLOB_PTR, 24, EXACT)])
        .table("vxlan_decap_mod_table", &[(MOD_BLOB_PTR, 24, EXACT)])
        .table("vxlan_decap_and_push_vlan_mod_table", &[(MOD_BLOB_PTR, 24, EXACT)])
        .table("geneve_decap_mod_table", &[(MOD_BLOB_PTR, 24, EXACT)])
        .table("geneve_decap_and_push_vlan_mod_table", &[(MOD_BLOB_PTR, 24, EXACT)])
        .action("l2_fwd", &[("port", 32)])
        .action("remove_vlan_and_fwd", &[("vlan_ptr", 24), ("port_id", 32)])
        .action("set_dest", &[("port_id", 32)])
        .action(
            "set_tunnel_underlay_v4_overlay_v4",
            &[("tunnel_id", 24), ("dst_addr", 32)],
        )
        .action(
            "set_tunnel_underlay_v6_overlay_v6",
            &[("tunnel_id", 24), ("ipv6_1", 32), ("ipv6_2", 32), ("ipv6_3", 32), ("ipv6_4", 32)],
        )
        .action("vxlan_encap", ENCAP_V4_PARAMS)
        .action("vxlan_encap_v6", ENCAP_V6_PARAMS)
        .action("vxlan_encap_vlan_pop", ENCAP_V4_PARAMS)
        .action("vxlan_encap_v6_vlan_pop", ENCAP_V6_PARAMS)
        .action("geneve_encap", ENCAP_V4_PARAMS)
        .action("geneve_encap_vlan_pop", ENCAP_V4_PARAMS)
        .action("geneve_encap_v6", ENCAP_V6_PARAMS)
        .action("geneve_encap_v6_vlan_pop", ENCAP_V6_PARAMS)
        .action("vxlan_decap_outer_hdr", &[])
        .action("geneve_decap_outer_hdr", &[])
        .action("vxlan_decap_and_push_vlan", &[("pcp", 3), ("dei", 1), ("vlan_id", 12)])
        .action("geneve_decap_and_push_vlan", &[("pcp", 3), ("dei", 1), ("vlan_id", 12)])
        .action("set_vxlan_decap_outer_hdr", &[("tunnel_id", 20)])
        .action("set_geneve_decap_outer_hdr", &[("tunnel_id", 20)])
        .action("set_vxlan_decap_outer_and_push_vlan", &[("tunnel_id", 20)])
        .action("set_geneve_decap_outer_and_push_vlan", &[("tunnel_id", 20)])
        .action("set_bridge_id", &[("bridge_id", 8)])
        .action("vlan_push", &[("pcp", 3), ("dei", 1), ("vlan_id", 12)])
        .action("vlan_pop", &[])
        .action("vm_src_ip4_mac_map_action", &[("smac_high", 16), ("smac_mid", 16), ("smac_low", 16)])
        .action("vm_dst_ip4_mac_map_action", &[("dmac_high", 16), ("dmac_mid", 16), ("dmac_low", 16)])
        .build()
}

/// What the fake switch serves and what it saw.
pub struct FakeSwitch {
    /// Device id that the switch reports in arbitration replies.
    pub device_id: u64,
    pub p4info: Option<P4Info>,
    /// Zero-based index of a write to reject.
    pub fail_write: Option<usize>,
    pub writes: Vec<WriteRequest>,
    /// Table entries currently installed, as left by accepted inserts and deletes.
    pub entries: Vec<TableEntry>,
    pub reads: Vec<ReadRequest>,
    /// Makes every read fail with UNAVAILABLE.
    pub fail_read: bool,
    pub election_ids: Vec<ElectionId>,
    pub finished_streams: usize,
}

impl FakeSwitch {
    fn installed(&self, entry: &TableEntry) -> Vec<TableEntry> {
        self.entries
            .iter()
            .filter(|e| e.table_id == entry.table_id && e.get_field_match() == entry.get_field_match())
            .cloned()
            .collect()
    }

    fn apply(&mut self, request: &WriteRequest) {
        for update in request.get_updates() {
            let entry = update.get_entity().get_table_entry();
            match update.get_field_type() {
                Update_Type::INSERT => self.entries.push(entry.clone()),
                Update_Type::DELETE => self
                    .entries
                    .retain(|e| e.table_id != entry.table_id || e.get_field_match() != entry.get_field_match()),
                _ => (),
            }
        }
    }

    pub fn new(p4info: P4Info) -> Self {
        FakeSwitch {
            device_id: 1,
            p4info: Some(p4info),
            fail_write: None,
            writes: Vec::new(),
            entries: Vec::new(),
            reads: Vec::new(),
            fail_read: false,
            election_ids: Vec::new(),
            finished_streams: 0,
        }
    }
}

#[derive(Clone)]
pub struct FakeConnector(pub Arc<Mutex<FakeSwitch>>);

impl Connector for FakeConnector {
    type Transport = FakeTransport;

    fn connect(&self, _config: &Config) -> Result<FakeTransport, Error> {
        Ok(FakeTransport {
            switch: self.0.clone(),
            reply: None,
        })
    }
}

pub struct FakeTransport {
    switch: Arc<Mutex<FakeSwitch>>,
    reply: Option<StreamMessageResponse>,
}

impl Transport for FakeTransport {
    fn open_stream(&mut self) -> grpcio::Result<()> {
        Ok(())
    }

    fn send_arbitration(&mut self, request: StreamMessageRequest) -> grpcio::Result<()> {
        let mut switch = self.switch.lock().unwrap();
        let mut update = request.get_arbitration().clone();
        switch.election_ids.push(ElectionId::from(update.get_election_id()));
        update.set_device_id(switch.device_id);
        let mut response = StreamMessageResponse::new();
        response.set_arbitration(update);
        self.reply = Some(response);
        Ok(())
    }

    fn recv_stream(&mut self) -> Option<grpcio::Result<StreamMessageResponse>> {
        self.reply.take().map(Ok)
    }

    fn finish_stream(&mut self) {
        self.switch.lock().unwrap().finished_streams += 1;
    }

    fn get_pipeline_config(
        &self,
        _request: &GetForwardingPipelineConfigRequest,
    ) -> grpcio::Result<GetForwardingPipelineConfigResponse> {
        let switch = self.switch.lock().unwrap();
        let mut response = GetForwardingPipelineConfigResponse::new();
        if let Some(p4info) = &switch.p4info {
            response.mut_config().set_p4info(p4info.clone());
        }
        Ok(response)
    }

    fn write(&self, request: &WriteRequest) -> grpcio::Result<WriteResponse> {
        let mut switch = self.switch.lock().unwrap();
        if switch.fail_write == Some(switch.writes.len()) {
            return Err(grpcio::Error::RpcFailure(RpcStatus::new(RpcStatusCode::INVALID_ARGUMENT)));
        }
        switch.apply(request);
        switch.writes.push(request.clone());
        Ok(WriteResponse::new())
    }

    /// Answers NOT_FOUND when none of the requested entries is installed.
    fn read(&self, request: &ReadRequest) -> grpcio::Result<Vec<ReadResponse>> {
        let mut switch = self.switch.lock().unwrap();
        switch.reads.push(request.clone());
        if switch.fail_read {
            return Err(grpcio::Error::RpcFailure(RpcStatus::new(RpcStatusCode::UNAVAILABLE)));
        }
        let entities = request
            .get_entities()
            .iter()
            .flat_map(|entity| switch.installed(entity.get_table_entry()))
            .map(|entry| {
                let mut entity = Entity::new();
                entity.set_table_entry(entry);
                entity
            })
            .collect::<Vec<_>>();
        if entities.is_empty() {
            return Err(grpcio::Error::RpcFailure(RpcStatus::new(RpcStatusCode::NOT_FOUND)));
        }
        let mut response = ReadResponse::new();
        response.set_entities(RepeatedField::from_vec(entities));
        Ok(vec![response])
    }
}

pub fn p4info_for(target: Target) -> P4Info {
    match target {
        Target::Dpdk => dpdk_p4info(),
        Target::Es2k => es2k_p4info(),
    }
}

pub fn config(target: Target) -> Config {
    Config {
        target,
        role_config_file: None,
        ..Default::default()
    }
}

/// A dispatcher for `target` talking to a fake switch that serves `target`'s pipeline.
pub fn fake_dispatcher(target: Target) -> (Dispatcher<FakeConnector>, Arc<Mutex<FakeSwitch>>) {
    let switch = Arc::new(Mutex::new(FakeSwitch::new(p4info_for(target))));
    let dispatcher = Dispatcher::new(config(target), FakeConnector(switch.clone())).unwrap();
    (dispatcher, switch)
}

/// One write as the switch saw it, with ids translated back to names.
#[derive(Debug)]
pub struct Written {
    pub update_type: Update_Type,
    pub table: String,
    pub entry: TableEntry,
    schema: Arc<Schema>,
}

impl Written {
    fn bound_action(&self) -> Option<&p4ext::schema::Action> {
        let id = self.entry.get_action().get_action().action_id;
        self.schema.actions().iter().find(|a| a.id == id)
    }

    pub fn action(&self) -> Option<String> {
        if !self.entry.has_action() {
            return None;
        }
        self.bound_action().map(|a| strip(&a.name))
    }

    /// Parameter values in order.
    pub fn params(&self) -> Vec<Vec<u8>> {
        self.entry
            .get_action()
            .get_action()
            .get_params()
            .iter()
            .map(|p| p.value.clone())
            .collect()
    }

    pub fn param(&self, name: &str) -> Vec<u8> {
        let action = self.bound_action().unwrap();
        let id = action.params.iter().find(|p| p.name == name).unwrap().id;
        self.entry
            .get_action()
            .get_action()
            .get_params()
            .iter()
            .find(|p| p.param_id == id)
            .unwrap()
            .value
            .clone()
    }

    /// Exact match values in order.
    pub fn exact_values(&self) -> Vec<Vec<u8>> {
        self.entry
            .get_field_match()
            .iter()
            .map(|fm| fm.get_exact().value.clone())
            .collect()
    }
}

fn strip(name: &str) -> String {
    name.strip_prefix(PREFIX).unwrap_or(name).into()
}

/// Decodes the writes that `switch` accepted, resolving ids against its pipeline.
pub fn decode_writes(switch: &Arc<Mutex<FakeSwitch>>) -> Vec<Written> {
    let switch = switch.lock().unwrap();
    let schema = Arc::new(Schema::from(switch.p4info.as_ref().unwrap()));
    switch
        .writes
        .iter()
        .map(|request| {
            assert_eq!(request.get_updates().len(), 1);
            let update = &request.get_updates()[0];
            let entry = update.get_entity().get_table_entry().clone();
            let table = schema.tables().iter().find(|t| t.id == entry.table_id).unwrap();
            Written {
                update_type: update.get_field_type(),
                table: strip(&table.name),
                entry,
                schema: schema.clone(),
            }
        })
        .collect()
}
