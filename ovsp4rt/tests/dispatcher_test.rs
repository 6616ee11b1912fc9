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

mod common;

use common::*;

use ovsp4rt::{
    Dispatcher,
    Error,
    Event,
    IpAddress,
    IpMacMapInfo,
    Journal,
    MacAddr,
    MacLearningInfo,
    PortVlanInfo,
    PortVlanMode,
    SrcPortInfo,
    Target,
    TunnelInfo,
    TunnelType,
};

use p4ext::{ConnectError, ElectionIdSource, ResolveError, SessionError};

use proto::p4runtime::Update_Type;

use std::collections::HashSet;
use std::io::{self, Write};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::{Arc, Mutex};
use std::thread;

const MAC: [u8; 6] = [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff];

fn vlan_learn(vlan_id: u16, src_port: u32) -> MacLearningInfo {
    MacLearningInfo {
        is_vlan: true,
        mac_addr: MacAddr(MAC),
        bridge_id: 3,
        src_port,
        vlan_id,
        ..Default::default()
    }
}

fn v4_tunnel() -> TunnelInfo {
    TunnelInfo {
        local_ip: Ipv4Addr::new(10, 0, 0, 1).into(),
        remote_ip: Ipv4Addr::new(10, 0, 0, 2).into(),
        dst_port: 4789,
        vni: 0x12_3456,
        ..Default::default()
    }
}

fn v6_tunnel() -> TunnelInfo {
    TunnelInfo {
        local_ip: "fd00::1".parse::<Ipv6Addr>().unwrap().into(),
        remote_ip: "fd00::2".parse::<Ipv6Addr>().unwrap().into(),
        dst_port: 4789,
        vni: 7,
        ..Default::default()
    }
}

fn native_untagged(port_vlan: u16) -> PortVlanInfo {
    PortVlanInfo {
        port_vlan_mode: PortVlanMode::NativeUntagged,
        port_vlan,
    }
}

fn tables(written: &[Written]) -> Vec<&str> {
    written.iter().map(|w| w.table.as_str()).collect()
}

#[test]
fn dpdk_fdb_vlan_insert() {
    let (dispatcher, switch) = fake_dispatcher(Target::Dpdk);
    dispatcher.config_fdb_entry(&vlan_learn(5, 9), true).unwrap();

    let written = decode_writes(&switch);
    assert_eq!(tables(&written), ["l2_fwd_tx_table", "l2_fwd_rx_with_tunnel_table"]);
    for w in &written {
        assert_eq!(w.update_type, Update_Type::INSERT);
        assert_eq!(w.exact_values(), vec![MAC.to_vec()]);
        assert_eq!(w.action().as_deref(), Some("l2_fwd"));
        assert_eq!(w.params(), vec![vec![4u8]]);
    }

    let switch = switch.lock().unwrap();
    let request = &switch.writes[0];
    assert_eq!(request.device_id, 1);
    assert_eq!(request.role, "ovs-p4rt");
    assert_eq!(p4ext::ElectionId::from(request.get_election_id()), switch.election_ids[0]);
}

#[test]
fn dpdk_vlan_port_wraps_to_one_byte() {
    let (dispatcher, switch) = fake_dispatcher(Target::Dpdk);
    dispatcher.config_fdb_entry(&vlan_learn(0, 0), true).unwrap();
    assert_eq!(decode_writes(&switch)[0].params(), vec![vec![0xffu8]]);
}

#[test]
fn delete_keeps_match_and_drops_action() {
    for &target in &[Target::Dpdk, Target::Es2k] {
        let (dispatcher, switch) = fake_dispatcher(target);
        dispatcher.config_fdb_entry(&vlan_learn(5, 9), true).unwrap();
        dispatcher.config_fdb_entry(&vlan_learn(5, 9), false).unwrap();

        let written = decode_writes(&switch);
        let n = written.len() / 2;
        assert_eq!(n, if target == Target::Dpdk { 2 } else { 5 });
        let (inserts, deletes) = written.split_at(n);
        for (insert, delete) in inserts.iter().zip(deletes) {
            assert_eq!(delete.update_type, Update_Type::DELETE);
            assert_eq!(delete.table, insert.table);
            assert_eq!(delete.entry.get_field_match(), insert.entry.get_field_match());
            assert!(insert.entry.has_action());
            assert!(!delete.entry.has_action());
        }
    }
}

#[test]
fn es2k_fdb_vlan_writes_five_tables() {
    let (dispatcher, switch) = fake_dispatcher(Target::Es2k);
    let info = MacLearningInfo {
        rx_src_port: 12,
        ..vlan_learn(5, 9)
    };
    dispatcher.config_fdb_entry(&info, true).unwrap();

    let written = decode_writes(&switch);
    assert_eq!(
        tables(&written),
        [
            "l2_fwd_tx_table",
            "l2_fwd_tx_ipv6_table",
            "l2_fwd_rx_with_tunnel_table",
            "l2_fwd_rx_ipv6_with_tunnel_table",
            "sem_bypass",
        ]
    );
    for w in &written[..4] {
        assert_eq!(w.action().as_deref(), Some("l2_fwd"));
    }
    assert_eq!(written[0].param("port"), vec![9u8]);
    assert_eq!(written[1].param("port"), vec![9u8]);
    assert_eq!(written[2].param("port"), vec![12u8]);
    assert_eq!(written[3].param("port"), vec![12u8]);
    assert_eq!(written[4].action().as_deref(), Some("set_dest"));
    assert_eq!(written[4].param("port_id"), vec![9u8 + 16]);
}

#[test]
fn es2k_fdb_native_untagged_strips_vlan_on_transmit() {
    let (dispatcher, switch) = fake_dispatcher(Target::Es2k);
    let info = MacLearningInfo {
        rx_src_port: 12,
        vlan_info: native_untagged(30),
        ..vlan_learn(5, 9)
    };
    dispatcher.config_fdb_entry(&info, true).unwrap();

    let written = decode_writes(&switch);
    for w in &written[..2] {
        assert_eq!(w.action().as_deref(), Some("remove_vlan_and_fwd"));
        assert_eq!(w.param("port_id"), vec![9u8]);
        assert_eq!(w.param("vlan_ptr"), vec![30u8]);
    }
    for w in &written[2..4] {
        assert_eq!(w.action().as_deref(), Some("l2_fwd"));
        assert_eq!(w.param("port"), vec![12u8]);
    }
    assert_eq!(written[4].action().as_deref(), Some("set_dest"));
}

#[test]
fn es2k_delete_finds_tunnel_entry_for_untagged_mac() {
    let (dispatcher, switch) = fake_dispatcher(Target::Es2k);
    let tunnel = MacLearningInfo {
        is_tunnel: true,
        tunnel_info: v4_tunnel(),
        ..vlan_learn(5, 9)
    };
    dispatcher.config_fdb_entry(&tunnel, true).unwrap();
    dispatcher.config_fdb_entry(&vlan_learn(5, 9), false).unwrap();

    let written = decode_writes(&switch);
    assert_eq!(tables(&written), ["l2_fwd_tx_table", "l2_fwd_tx_table"]);
    assert_eq!(written[1].update_type, Update_Type::DELETE);
    assert_eq!(written[1].exact_values(), vec![MAC.to_vec(), vec![1u8]]);

    let switch = switch.lock().unwrap();
    assert!(switch.entries.is_empty());
    assert_eq!(switch.reads.len(), 2);
}

#[test]
fn es2k_delete_without_tunnel_entry_removes_vlan_entries() {
    let (dispatcher, switch) = fake_dispatcher(Target::Es2k);
    dispatcher.config_fdb_entry(&vlan_learn(5, 9), true).unwrap();
    dispatcher.config_fdb_entry(&vlan_learn(5, 9), false).unwrap();

    let switch_state = switch.lock().unwrap();
    assert_eq!(switch_state.reads.len(), 2);
    assert!(switch_state.entries.is_empty());
    drop(switch_state);
    assert_eq!(decode_writes(&switch).len(), 10);
}

#[test]
fn fdb_delete_read_failure_writes_nothing() {
    let (dispatcher, switch) = fake_dispatcher(Target::Es2k);
    switch.lock().unwrap().fail_read = true;
    let err = dispatcher.config_fdb_entry(&vlan_learn(5, 9), false).unwrap_err();
    assert!(matches!(err, Error::Session(SessionError::Read(_))));
    assert!(switch.lock().unwrap().writes.is_empty());
}

#[test]
fn fdb_tunnel_delete_skips_lookup() {
    let (dispatcher, switch) = fake_dispatcher(Target::Es2k);
    let info = MacLearningInfo {
        is_tunnel: true,
        tunnel_info: v4_tunnel(),
        ..vlan_learn(5, 9)
    };
    dispatcher.config_fdb_entry(&info, false).unwrap();
    dispatcher.config_fdb_entry(&vlan_learn(5, 9), true).unwrap();

    let switch = switch.lock().unwrap();
    assert!(switch.reads.is_empty());
    assert_eq!(switch.writes.len(), 6);
}

#[test]
fn fdb_without_tunnel_or_vlan_writes_nothing() {
    let (dispatcher, switch) = fake_dispatcher(Target::Es2k);
    let info = MacLearningInfo {
        mac_addr: MacAddr(MAC),
        ..Default::default()
    };
    dispatcher.config_fdb_entry(&info, true).unwrap();
    assert!(switch.lock().unwrap().writes.is_empty());
}

#[test]
fn fdb_tunnel_wins_over_vlan() {
    let info = MacLearningInfo {
        is_tunnel: true,
        tunnel_info: v4_tunnel(),
        ..vlan_learn(5, 9)
    };

    let (dispatcher, switch) = fake_dispatcher(Target::Dpdk);
    dispatcher.config_fdb_entry(&info, true).unwrap();
    let written = decode_writes(&switch);
    assert_eq!(tables(&written), ["l2_fwd_tx_table"]);
    assert_eq!(written[0].action().as_deref(), Some("set_tunnel"));
    assert_eq!(written[0].params(), vec![vec![0x56u8], vec![10, 0, 0, 2]]);

    let (dispatcher, switch) = fake_dispatcher(Target::Es2k);
    dispatcher.config_fdb_entry(&info, true).unwrap();
    let written = decode_writes(&switch);
    assert_eq!(tables(&written), ["l2_fwd_tx_table"]);
    assert_eq!(written[0].exact_values(), vec![MAC.to_vec(), vec![1u8]]);
    assert_eq!(written[0].action().as_deref(), Some("set_tunnel_underlay_v4_overlay_v4"));
    assert_eq!(written[0].param("tunnel_id"), vec![0x02u8, 0x34, 0x56]);
    assert_eq!(written[0].param("dst_addr"), vec![10u8, 0, 0, 2]);
}

#[test]
fn es2k_fdb_tunnel_ipv6() {
    let info = MacLearningInfo {
        is_tunnel: true,
        mac_addr: MacAddr(MAC),
        tunnel_info: v6_tunnel(),
        ..Default::default()
    };
    let (dispatcher, switch) = fake_dispatcher(Target::Es2k);
    dispatcher.config_fdb_entry(&info, true).unwrap();

    let written = decode_writes(&switch);
    assert_eq!(tables(&written), ["l2_fwd_tx_ipv6_table"]);
    assert_eq!(written[0].action().as_deref(), Some("set_tunnel_underlay_v6_overlay_v6"));
    let remote = "fd00::2".parse::<Ipv6Addr>().unwrap().octets();
    assert_eq!(written[0].param("ipv6_1"), remote[0..4].to_vec());
    assert_eq!(written[0].param("ipv6_4"), remote[12..16].to_vec());
}

#[test]
fn dpdk_tunnel_encap_then_term() {
    let (dispatcher, switch) = fake_dispatcher(Target::Dpdk);
    dispatcher.config_tunnel_entry(&v4_tunnel(), true).unwrap();

    let written = decode_writes(&switch);
    assert_eq!(tables(&written), ["vxlan_encap_mod_table", "ipv4_tunnel_term_table"]);

    let encap = &written[0];
    assert_eq!(encap.exact_values(), vec![vec![0x56u8]]);
    assert_eq!(
        encap.params(),
        vec![vec![10u8, 0, 0, 1], vec![10, 0, 0, 2], vec![0x12, 0xb5], vec![0x56]]
    );

    let term = &written[1];
    assert_eq!(term.exact_values(), vec![vec![2u8], vec![10, 0, 0, 2], vec![10, 0, 0, 1]]);
    assert_eq!(term.action().as_deref(), Some("decap_outer_ipv4"));
}

#[test]
fn dpdk_rejects_ipv6_tunnel() {
    let (dispatcher, switch) = fake_dispatcher(Target::Dpdk);
    let err = dispatcher.config_tunnel_entry(&v6_tunnel(), true).unwrap_err();
    assert!(matches!(err, Error::Ipv6Unsupported { target: Target::Dpdk, .. }));
    assert!(switch.lock().unwrap().writes.is_empty());
}

#[test]
fn es2k_tunnel_ipv4() {
    let (dispatcher, switch) = fake_dispatcher(Target::Es2k);
    dispatcher.config_tunnel_entry(&v4_tunnel(), true).unwrap();

    let written = decode_writes(&switch);
    assert_eq!(
        tables(&written),
        ["vxlan_encap_mod_table", "vxlan_decap_mod_table", "ipv4_tunnel_term_table"]
    );
    let encap = &written[0];
    assert_eq!(encap.action().as_deref(), Some("vxlan_encap"));
    assert_eq!(encap.exact_values(), vec![vec![0x12u8, 0x34, 0x56]]);
    assert_eq!(encap.param("src_port"), (4789u16 * 2).to_be_bytes().to_vec());
    assert_eq!(encap.param("dst_port"), 4789u16.to_be_bytes().to_vec());
    assert_eq!(encap.param("vni"), vec![0x12u8, 0x34, 0x56]);

    let decap = &written[1];
    assert_eq!(decap.exact_values(), vec![vec![0x12u8, 0x34, 0x56]]);
    assert_eq!(decap.action().as_deref(), Some("vxlan_decap_outer_hdr"));
    assert!(decap.params().is_empty());

    let term = &written[2];
    assert_eq!(term.exact_values(), vec![vec![2u8], vec![10, 0, 0, 2], vec![10, 0, 0, 1]]);
    assert_eq!(term.action().as_deref(), Some("set_vxlan_decap_outer_hdr"));
    assert_eq!(term.param("tunnel_id"), vec![0x02u8, 0x34, 0x56]);
}

#[test]
fn es2k_tunnel_ipv6() {
    let (dispatcher, switch) = fake_dispatcher(Target::Es2k);
    dispatcher.config_tunnel_entry(&v6_tunnel(), true).unwrap();

    let written = decode_writes(&switch);
    assert_eq!(
        tables(&written),
        ["vxlan_encap_v6_mod_table", "vxlan_decap_mod_table", "ipv6_tunnel_term_table"]
    );
    let encap = &written[0];
    assert_eq!(encap.action().as_deref(), Some("vxlan_encap_v6"));
    assert_eq!(encap.param("src_addr").len(), 16);
    assert_eq!(encap.param("hop_limit"), vec![64u8]);
    assert_eq!(encap.param("flow_label"), vec![0u8; 3]);

    let term = &written[2];
    let local = "fd00::1".parse::<Ipv6Addr>().unwrap().octets().to_vec();
    assert_eq!(term.exact_values()[2], local);
}

#[test]
fn es2k_geneve_tunnels() {
    let (dispatcher, switch) = fake_dispatcher(Target::Es2k);
    let v4 = TunnelInfo {
        tunnel_type: TunnelType::Geneve,
        ..v4_tunnel()
    };
    let v6 = TunnelInfo {
        tunnel_type: TunnelType::Geneve,
        ..v6_tunnel()
    };
    dispatcher.config_tunnel_entry(&v4, true).unwrap();
    dispatcher.config_tunnel_entry(&v6, true).unwrap();

    let written = decode_writes(&switch);
    assert_eq!(
        tables(&written),
        [
            "geneve_encap_mod_table",
            "geneve_decap_mod_table",
            "ipv4_tunnel_term_table",
            "geneve_encap_v6_mod_table",
            "geneve_decap_mod_table",
            "ipv6_tunnel_term_table",
        ]
    );
    assert_eq!(written[0].action().as_deref(), Some("geneve_encap"));
    assert_eq!(written[0].param("dst_port"), 4789u16.to_be_bytes().to_vec());
    assert_eq!(written[1].action().as_deref(), Some("geneve_decap_outer_hdr"));
    assert_eq!(written[2].action().as_deref(), Some("set_geneve_decap_outer_hdr"));
    assert_eq!(written[3].action().as_deref(), Some("geneve_encap_v6"));
    assert_eq!(written[3].param("hop_limit"), vec![64u8]);
    assert_eq!(written[5].action().as_deref(), Some("set_geneve_decap_outer_hdr"));
}

#[test]
fn es2k_native_untagged_tunnel_pops_and_pushes_vlan() {
    let (dispatcher, switch) = fake_dispatcher(Target::Es2k);
    let vxlan = TunnelInfo {
        vlan_info: native_untagged(30),
        ..v4_tunnel()
    };
    let geneve = TunnelInfo {
        tunnel_type: TunnelType::Geneve,
        vlan_info: native_untagged(30),
        ..v6_tunnel()
    };
    dispatcher.config_tunnel_entry(&vxlan, true).unwrap();
    dispatcher.config_tunnel_entry(&geneve, true).unwrap();

    let written = decode_writes(&switch);
    assert_eq!(
        tables(&written),
        [
            "vxlan_encap_vlan_pop_mod_table",
            "vxlan_decap_and_push_vlan_mod_table",
            "ipv4_tunnel_term_table",
            "geneve_encap_v6_vlan_pop_mod_table",
            "geneve_decap_and_push_vlan_mod_table",
            "ipv6_tunnel_term_table",
        ]
    );
    assert_eq!(written[0].action().as_deref(), Some("vxlan_encap_vlan_pop"));
    assert_eq!(written[0].param("vni"), vec![0x12u8, 0x34, 0x56]);

    let push = &written[1];
    assert_eq!(push.exact_values(), vec![vec![0x12u8, 0x34, 0x56]]);
    assert_eq!(push.action().as_deref(), Some("vxlan_decap_and_push_vlan"));
    assert_eq!(push.params(), vec![vec![1u8], vec![0], vec![0, 30]]);
    assert_eq!(written[2].action().as_deref(), Some("set_vxlan_decap_outer_and_push_vlan"));

    assert_eq!(written[3].action().as_deref(), Some("geneve_encap_v6_vlan_pop"));
    assert_eq!(written[4].action().as_deref(), Some("geneve_decap_and_push_vlan"));
    assert_eq!(written[5].action().as_deref(), Some("set_geneve_decap_outer_and_push_vlan"));
    assert_eq!(written[5].param("tunnel_id"), vec![0u8, 0, 7]);
}

#[test]
fn es2k_tunnel_delete_keeps_order() {
    let (dispatcher, switch) = fake_dispatcher(Target::Es2k);
    dispatcher.config_tunnel_entry(&v4_tunnel(), true).unwrap();
    dispatcher.config_tunnel_entry(&v4_tunnel(), false).unwrap();

    let written = decode_writes(&switch);
    assert_eq!(tables(&written[..3]), tables(&written[3..]));
    assert!(written[3..].iter().all(|w| w.update_type == Update_Type::DELETE));
    assert!(switch.lock().unwrap().entries.is_empty());
}

#[test]
fn dpdk_rejects_geneve_tunnel() {
    let (dispatcher, switch) = fake_dispatcher(Target::Dpdk);
    let info = TunnelInfo {
        tunnel_type: TunnelType::Geneve,
        ..v4_tunnel()
    };
    let err = dispatcher.config_tunnel_entry(&info, true).unwrap_err();
    assert!(matches!(
        err,
        Error::TunnelTypeUnsupported { target: Target::Dpdk, tunnel_type: TunnelType::Geneve }
    ));
    assert!(switch.lock().unwrap().writes.is_empty());
}

#[test]
fn mixed_address_families_are_refused() {
    let (dispatcher, switch) = fake_dispatcher(Target::Es2k);
    let info = TunnelInfo {
        remote_ip: v6_tunnel().remote_ip,
        ..v4_tunnel()
    };
    let err = dispatcher.config_tunnel_entry(&info, true).unwrap_err();
    assert!(matches!(err, Error::MixedAddressFamilies { .. }));
    assert!(switch.lock().unwrap().writes.is_empty());
}

#[test]
fn dpdk_skips_unsupported_programs() {
    let (dispatcher, switch) = fake_dispatcher(Target::Dpdk);
    dispatcher
        .config_src_port_entry(&SrcPortInfo { bridge_id: 1, vlan_id: 2, src_port: 3 }, true)
        .unwrap();
    dispatcher.config_vlan_entry(10, true).unwrap();
    dispatcher.config_ip_mac_map_entry(&IpMacMapInfo::default(), true).unwrap();

    let switch = switch.lock().unwrap();
    assert!(switch.writes.is_empty());
    assert!(switch.election_ids.is_empty(), "no session should be opened");
}

#[test]
fn es2k_src_port() {
    let (dispatcher, switch) = fake_dispatcher(Target::Es2k);
    dispatcher
        .config_src_port_entry(&SrcPortInfo { bridge_id: 4, vlan_id: 100, src_port: 0x0102 }, true)
        .unwrap();

    let written = decode_writes(&switch);
    assert_eq!(tables(&written), ["source_port_to_bridge_map"]);
    let entry = &written[0].entry;
    assert_eq!(entry.priority, 1);
    let fm = entry.get_field_match();
    assert_eq!(fm[0].get_ternary().value, vec![0x01u8, 0x02]);
    assert_eq!(fm[0].get_ternary().mask, vec![0xffu8, 0xff]);
    assert_eq!(fm[1].get_ternary().value, vec![0u8, 100]);
    assert_eq!(fm[1].get_ternary().mask, vec![0x0fu8, 0xff]);
    assert_eq!(written[0].param("bridge_id"), vec![4u8]);
}

#[test]
fn es2k_vlan_push_and_pop() {
    let (dispatcher, switch) = fake_dispatcher(Target::Es2k);
    dispatcher.config_vlan_entry(20, true).unwrap();
    dispatcher.config_vlan_entry(20, false).unwrap();

    let written = decode_writes(&switch);
    assert_eq!(
        tables(&written),
        ["vlan_push_mod_table", "vlan_pop_mod_table", "vlan_push_mod_table", "vlan_pop_mod_table"]
    );
    assert_eq!(written[0].exact_values(), vec![vec![20u8]]);
    assert_eq!(written[0].action().as_deref(), Some("vlan_push"));
    assert_eq!(written[0].params(), vec![vec![1u8], vec![0], vec![0, 20]]);
    assert_eq!(written[1].action().as_deref(), Some("vlan_pop"));
    assert!(written[1].params().is_empty());
    assert!(written[2..].iter().all(|w| !w.entry.has_action()));
}

#[test]
fn es2k_ip_mac_skips_invalid_address() {
    let (dispatcher, switch) = fake_dispatcher(Target::Es2k);
    let info = IpMacMapInfo {
        src_mac_addr: MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]),
        dst_mac_addr: MacAddr(MAC),
        src_ip_addr: Ipv4Addr::new(192, 168, 1, 10).into(),
        dst_ip_addr: IpAddress::default(),
    };
    dispatcher.config_ip_mac_map_entry(&info, true).unwrap();

    let written = decode_writes(&switch);
    assert_eq!(tables(&written), ["vm_src_ip4_mac_map_table"]);
    assert_eq!(written[0].exact_values(), vec![vec![192u8, 168, 1, 10]]);
    assert_eq!(
        written[0].params(),
        vec![vec![0x00u8, 0x11], vec![0x22, 0x33], vec![0x44, 0x55]]
    );
}

#[test]
fn first_failed_write_ends_the_call() {
    let (dispatcher, switch) = fake_dispatcher(Target::Es2k);
    switch.lock().unwrap().fail_write = Some(1);

    let err = dispatcher.config_fdb_entry(&vlan_learn(5, 9), true).unwrap_err();
    match err {
        Error::Write { table, op, key, source } => {
            assert_eq!(table, "linux_networking_control.l2_fwd_tx_ipv6_table");
            assert_eq!(op, "insert");
            assert_eq!(key, "aa:bb:cc:dd:ee:ff");
            assert!(matches!(source, SessionError::Write(_)));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(decode_writes(&switch).len(), 1);
}

#[test]
fn unknown_table_is_a_resolve_error() {
    let switch = Arc::new(Mutex::new(FakeSwitch::new(dpdk_p4info())));
    let dispatcher = Dispatcher::new(config(Target::Es2k), FakeConnector(switch.clone())).unwrap();

    let err = dispatcher.config_vlan_entry(20, true).unwrap_err();
    assert!(matches!(
        err,
        Error::Resolve(ResolveError::Table(ref name)) if name == "linux_networking_control.vlan_push_mod_table"
    ));
    assert!(switch.lock().unwrap().writes.is_empty());
}

#[test]
fn missing_pipeline_is_reported() {
    let (dispatcher, switch) = fake_dispatcher(Target::Es2k);
    switch.lock().unwrap().p4info = None;
    let err = dispatcher.config_vlan_entry(20, true).unwrap_err();
    assert!(matches!(err, Error::Session(SessionError::MissingP4Info)));
}

#[test]
fn device_mismatch_fails_connect() {
    let (dispatcher, switch) = fake_dispatcher(Target::Es2k);
    switch.lock().unwrap().device_id = 2;
    let err = dispatcher.config_vlan_entry(20, true).unwrap_err();
    assert!(matches!(
        err,
        Error::Session(SessionError::Connect(ConnectError::DeviceIdMismatch { expected: 1, actual: 2 }))
    ));
    let switch = switch.lock().unwrap();
    assert!(switch.writes.is_empty());
    assert_eq!(switch.finished_streams, 1);
}

#[derive(Clone, Default)]
struct Shared(Arc<Mutex<Vec<u8>>>);

impl Write for Shared {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn journal_records_calls_even_when_they_fail() {
    let (dispatcher, switch) = fake_dispatcher(Target::Dpdk);
    let buf = Shared::default();
    let dispatcher = dispatcher.with_journal(Journal::new(buf.clone()));
    switch.lock().unwrap().device_id = 9;

    assert!(dispatcher.config_fdb_entry(&vlan_learn(5, 9), true).is_err());
    dispatcher.config_vlan_entry(3, false).unwrap();

    let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
    let records = ovsp4rt::journal::read_records(text.as_bytes())
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].func_name, "ovsp4rt_config_fdb_entry");
    assert_eq!(records[0].params.event, Event::Fdb(vlan_learn(5, 9)));
    assert_eq!(records[1].params.event, Event::Vlan(3));
    assert!(!records[1].params.insert_entry);
}

#[test]
fn replayed_record_matches_direct_call() {
    let (direct, direct_switch) = fake_dispatcher(Target::Es2k);
    direct.config_src_port_entry(&SrcPortInfo { bridge_id: 1, vlan_id: 2, src_port: 3 }, true).unwrap();

    let line = r#"{"func_name":"ovsp4rt_config_src_port_entry","schema":1,"struct_name":"src_port_info",
                   "params":{"port_info":{"bridge_id":1,"vlan_id":2,"src_port":3},"insert_entry":true}}"#
        .replace('\n', "");
    let record = ovsp4rt::journal::read_records(line.as_bytes()).next().unwrap().unwrap();
    let (replay, replay_switch) = fake_dispatcher(Target::Es2k);
    replay.dispatch(&record.params.event, record.params.insert_entry).unwrap();

    let a = decode_writes(&direct_switch);
    let b = decode_writes(&replay_switch);
    assert_eq!(a.len(), 1);
    assert_eq!(a[0].entry, b[0].entry);
}

#[test]
fn concurrent_calls_use_distinct_election_ids() {
    let (dispatcher, switch) = fake_dispatcher(Target::Es2k);
    let dispatcher = Arc::new(dispatcher.with_election_ids(Arc::new(ElectionIdSource::with_seed(1 << 32))));

    let handles = (0..8u16)
        .map(|i| {
            let dispatcher = dispatcher.clone();
            thread::spawn(move || dispatcher.config_vlan_entry(i + 1, true))
        })
        .collect::<Vec<_>>();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    let switch = switch.lock().unwrap();
    assert_eq!(switch.writes.len(), 16);
    let ids = switch.election_ids.iter().collect::<HashSet<_>>();
    assert_eq!(ids.len(), 8);
}

#[test]
fn separately_built_dispatchers_use_distinct_election_ids() {
    let switch = Arc::new(Mutex::new(FakeSwitch::new(es2k_p4info())));
    let a = Dispatcher::new(config(Target::Es2k), FakeConnector(switch.clone())).unwrap();
    let b = Dispatcher::new(config(Target::Es2k), FakeConnector(switch.clone())).unwrap();
    a.config_vlan_entry(1, true).unwrap();
    b.config_vlan_entry(2, true).unwrap();

    let switch = switch.lock().unwrap();
    assert_eq!(switch.election_ids.len(), 2);
    assert_ne!(switch.election_ids[0], switch.election_ids[1]);
}

#[test]
fn grpc_connector_falls_back_to_insecure() {
    let config = ovsp4rt::Config {
        certs_dir: std::env::temp_dir().join(format!("ovsp4rt-no-certs-{}", std::process::id())),
        role_config_file: None,
        ..Default::default()
    };
    let dispatcher = Dispatcher::from_config(config).unwrap();
    assert!(ovsp4rt::Connector::connect(dispatcher.connector(), dispatcher.config()).is_ok());
}
