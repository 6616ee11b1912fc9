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

//! Table programs for the ES2K (IPU) hardware target.
//!
//! Most programs have an IPv4 and an IPv6 flavor.  Tunnel programs pick the flavor from the
//! tunnel's address family; FDB VLAN entries go into both, because the learned MAC may carry
//! either kind of traffic.
//!
//! A port in native-untagged VLAN mode strips the VLAN tag on the way into a tunnel and pushes
//! it back on the way out, so its encap, decap, and termination entries use the VLAN-aware
//! actions.

use p4ext::codec::{encode_ipv4, encode_ipv6, encode_mac, encode_tunnel_id, encode_u16, encode_value, encode_vni, valid_ipv4};
use p4ext::Schema;

use std::net::IpAddr;

use super::{p4name, Program, TablePrograms, Target};
use crate::entry::{Entry, EntryBuilder};
use crate::error::Error;
use crate::events::{
    IpAddress,
    IpMacMapInfo,
    MacAddr,
    MacLearningInfo,
    PortVlanInfo,
    PortVlanMode,
    SrcPortInfo,
    TunnelInfo,
};

/// Offset from a source port to its vport id in the bypass table.
pub const ES2K_VPORT_ID_OFFSET: u32 = 16;

const TUN_FLAG: &str = "user_meta.pmeta.tun_flag1_d0";
const MOD_BLOB_PTR: &str = "vmeta.common.mod_blob_ptr";

/// `tun_flag1_d0` value in FDB entries that send to a tunnel.
const TUN_FLAG_TX_TUNNEL: u64 = 1;
/// `tun_flag1_d0` value in tunnel termination entries.
const TUN_FLAG_TERM: u64 = 2;

const VLAN_PUSH_PCP: u64 = 1;
const VLAN_PUSH_DEI: u64 = 0;
const ENCAP_V6_HOP_LIMIT: u64 = 64;

const SOURCE_PORT_MASK: u16 = 0xffff;
const VID_MASK: u16 = 0x0fff;

pub struct Es2k;

enum Family {
    V4,
    V6,
}

#[derive(Clone, Copy)]
enum Side {
    Src,
    Dst,
}

/// Both endpoints of a tunnel must have the same address family.
fn tunnel_family(info: &TunnelInfo) -> Result<Family, Error> {
    match (info.local_ip.addr, info.remote_ip.addr) {
        (IpAddr::V4(_), IpAddr::V4(_)) => Ok(Family::V4),
        (IpAddr::V6(_), IpAddr::V6(_)) => Ok(Family::V6),
        (local, remote) => Err(Error::MixedAddressFamilies { local, remote }),
    }
}

fn ipv4_bytes(ip: &IpAddress) -> Vec<u8> {
    ip.ipv4().map(encode_ipv4).unwrap_or_else(|| vec![0; 4])
}

fn ipv6_bytes(ip: &IpAddress) -> Vec<u8> {
    ip.ipv6().map(encode_ipv6).unwrap_or_else(|| vec![0; 16])
}

fn native_untagged(vlan: &PortVlanInfo) -> bool {
    vlan.port_vlan_mode == PortVlanMode::NativeUntagged
}

/// Splits a MAC into the three 16-bit words that the IP-MAC map actions take.
fn mac_words(mac: &MacAddr) -> [Vec<u8>; 3] {
    let m = mac.octets();
    [m[0..2].to_vec(), m[2..4].to_vec(), m[4..6].to_vec()]
}

impl Es2k {
    /// Transmit side.  Frames leaving a native-untagged port lose their VLAN tag.
    fn fdb_tx_entry(&self, schema: &Schema, table: &str, info: &MacLearningInfo, insert: bool) -> Result<Entry, Error> {
        let port = encode_value(u64::from(info.src_port), 8);
        let builder = EntryBuilder::new(schema, p4name(table), insert)?
            .key(info.mac_addr)
            .exact("dst_mac", encode_mac(info.mac_addr.octets()))?;
        let builder = if native_untagged(&info.vlan_info) {
            let vlan_ptr = encode_value(u64::from(info.vlan_info.port_vlan), 8);
            builder.action(&p4name("remove_vlan_and_fwd"), vec![("port_id", port), ("vlan_ptr", vlan_ptr)])?
        } else {
            builder.action(&p4name("l2_fwd"), vec![("port", port)])?
        };
        Ok(builder.build())
    }

    /// Receive side, which forwards to the port the MAC was learned on from the wire.
    fn fdb_rx_entry(&self, schema: &Schema, table: &str, info: &MacLearningInfo, insert: bool) -> Result<Entry, Error> {
        Ok(EntryBuilder::new(schema, p4name(table), insert)?
            .key(info.mac_addr)
            .exact("dst_mac", encode_mac(info.mac_addr.octets()))?
            .action(&p4name("l2_fwd"), vec![("port", encode_value(u64::from(info.rx_src_port), 8))])?
            .build())
    }

    fn fdb_bypass_entry(&self, schema: &Schema, info: &MacLearningInfo, insert: bool) -> Result<Entry, Error> {
        let port_id = info.src_port.wrapping_add(ES2K_VPORT_ID_OFFSET);
        Ok(EntryBuilder::new(schema, p4name("sem_bypass"), insert)?
            .key(info.mac_addr)
            .exact("dst_mac", encode_mac(info.mac_addr.octets()))?
            .action(&p4name("set_dest"), vec![("port_id", encode_value(u64::from(port_id), 8))])?
            .build())
    }

    /// The match part of an FDB entry that sends `info.mac_addr` into a tunnel.
    fn fdb_tunnel_builder<'a>(
        &self,
        schema: &'a Schema,
        table: &str,
        info: &MacLearningInfo,
        insert: bool,
    ) -> Result<EntryBuilder<'a>, Error> {
        Ok(EntryBuilder::new(schema, p4name(table), insert)?
            .key(info.mac_addr)
            .exact("dst_mac", encode_mac(info.mac_addr.octets()))?
            .exact(TUN_FLAG, encode_value(TUN_FLAG_TX_TUNNEL, 8))?)
    }

    fn fdb_tunnel_entry(&self, schema: &Schema, info: &MacLearningInfo, insert: bool) -> Result<Entry, Error> {
        let tunnel = &info.tunnel_info;
        let tunnel_id = encode_tunnel_id(tunnel.vni);
        let (table, action, params) = match tunnel.remote_ip.addr {
            IpAddr::V4(remote) => (
                "l2_fwd_tx_table",
                "set_tunnel_underlay_v4_overlay_v4",
                vec![("tunnel_id", tunnel_id), ("dst_addr", encode_ipv4(remote))],
            ),
            IpAddr::V6(remote) => {
                let octets = remote.octets();
                (
                    "l2_fwd_tx_ipv6_table",
                    "set_tunnel_underlay_v6_overlay_v6",
                    vec![
                        ("tunnel_id", tunnel_id),
                        ("ipv6_1", octets[0..4].to_vec()),
                        ("ipv6_2", octets[4..8].to_vec()),
                        ("ipv6_3", octets[8..12].to_vec()),
                        ("ipv6_4", octets[12..16].to_vec()),
                    ],
                )
            }
        };
        Ok(self
            .fdb_tunnel_builder(schema, table, info, insert)?
            .action(&p4name(action), params)?
            .build())
    }

    fn encap_entry(&self, schema: &Schema, info: &TunnelInfo, family: &Family, insert: bool) -> Result<Entry, Error> {
        let vni = encode_vni(info.vni);
        let mut params = match family {
            Family::V4 => vec![("src_addr", ipv4_bytes(&info.local_ip)), ("dst_addr", ipv4_bytes(&info.remote_ip))],
            Family::V6 => vec![
                ("src_addr", ipv6_bytes(&info.local_ip)),
                ("dst_addr", ipv6_bytes(&info.remote_ip)),
                ("ds", encode_value(0, 6)),
                ("ecn", encode_value(0, 2)),
                ("flow_label", encode_value(0, 20)),
                ("hop_limit", encode_value(ENCAP_V6_HOP_LIMIT, 8)),
            ],
        };
        params.extend(vec![
            ("src_port", encode_u16(info.dst_port.wrapping_mul(2))),
            ("dst_port", encode_u16(info.dst_port)),
            ("vni", vni.clone()),
        ]);
        let action = format!(
            "{}_encap{}{}",
            info.tunnel_type,
            match family {
                Family::V4 => "",
                Family::V6 => "_v6",
            },
            if native_untagged(&info.vlan_info) { "_vlan_pop" } else { "" },
        );
        Ok(EntryBuilder::new(schema, p4name(&format!("{}_mod_table", action)), insert)?
            .key(format!("vni {}", info.vni))
            .exact(MOD_BLOB_PTR, vni)?
            .action(&p4name(&action), params)?
            .build())
    }

    /// Strips the outer headers of a terminated tunnel, restoring the VLAN tag for a
    /// native-untagged port.
    fn decap_mod_entry(&self, schema: &Schema, info: &TunnelInfo, insert: bool) -> Result<Entry, Error> {
        let tunnel_type = info.tunnel_type;
        let (table, action, params) = if native_untagged(&info.vlan_info) {
            (
                format!("{}_decap_and_push_vlan_mod_table", tunnel_type),
                format!("{}_decap_and_push_vlan", tunnel_type),
                vec![
                    ("pcp", encode_value(VLAN_PUSH_PCP, 8)),
                    ("dei", encode_value(VLAN_PUSH_DEI, 8)),
                    ("vlan_id", encode_u16(info.vlan_info.port_vlan)),
                ],
            )
        } else {
            (
                format!("{}_decap_mod_table", tunnel_type),
                format!("{}_decap_outer_hdr", tunnel_type),
                vec![],
            )
        };
        Ok(EntryBuilder::new(schema, p4name(&table), insert)?
            .key(format!("vni {}", info.vni))
            .exact(MOD_BLOB_PTR, encode_vni(info.vni))?
            .action(&p4name(&action), params)?
            .build())
    }

    fn term_entry(&self, schema: &Schema, info: &TunnelInfo, family: &Family, insert: bool) -> Result<Entry, Error> {
        let (table, src_field, dst_field, src, dst) = match family {
            Family::V4 => (
                "ipv4_tunnel_term_table",
                "ipv4_src",
                "ipv4_dst",
                ipv4_bytes(&info.remote_ip),
                ipv4_bytes(&info.local_ip),
            ),
            Family::V6 => (
                "ipv6_tunnel_term_table",
                "ipv6_src",
                "ipv6_dst",
                ipv6_bytes(&info.remote_ip),
                ipv6_bytes(&info.local_ip),
            ),
        };
        let action = if native_untagged(&info.vlan_info) {
            format!("set_{}_decap_outer_and_push_vlan", info.tunnel_type)
        } else {
            format!("set_{}_decap_outer_hdr", info.tunnel_type)
        };
        Ok(EntryBuilder::new(schema, p4name(table), insert)?
            .key(format!("{} -> {}", info.remote_ip.addr, info.local_ip.addr))
            .exact(TUN_FLAG, encode_value(TUN_FLAG_TERM, 8))?
            .exact(src_field, src)?
            .exact(dst_field, dst)?
            .action(&p4name(&action), vec![("tunnel_id", encode_tunnel_id(info.vni))])?
            .build())
    }

    fn ip_mac_entry(
        &self,
        schema: &Schema,
        side: Side,
        ip: &IpAddress,
        mac: &MacAddr,
        insert: bool,
    ) -> Result<Option<Entry>, Error> {
        let addr = match ip.ipv4() {
            Some(addr) if valid_ipv4(addr) => addr,
            _ => return Ok(None),
        };
        let (table, field, action, prefix) = match side {
            Side::Src => ("vm_src_ip4_mac_map_table", "ipv4_src", "vm_src_ip4_mac_map_action", "smac"),
            Side::Dst => ("vm_dst_ip4_mac_map_table", "ipv4_dst", "vm_dst_ip4_mac_map_action", "dmac"),
        };
        let [high, mid, low] = mac_words(mac);
        let (p_high, p_mid, p_low) = (
            format!("{}_high", prefix),
            format!("{}_mid", prefix),
            format!("{}_low", prefix),
        );
        Ok(Some(
            EntryBuilder::new(schema, p4name(table), insert)?
                .key(addr)
                .exact(field, encode_ipv4(addr))?
                .action(
                    &p4name(action),
                    vec![(p_high.as_str(), high), (p_mid.as_str(), mid), (p_low.as_str(), low)],
                )?
                .build(),
        ))
    }
}

impl TablePrograms for Es2k {
    fn target(&self) -> Target {
        Target::Es2k
    }

    fn supports(&self, _program: Program) -> bool {
        true
    }

    fn fdb_entries(&self, schema: &Schema, info: &MacLearningInfo, insert: bool) -> Result<Vec<Entry>, Error> {
        if info.is_tunnel {
            Ok(vec![self.fdb_tunnel_entry(schema, info, insert)?])
        } else if info.is_vlan {
            Ok(vec![
                self.fdb_tx_entry(schema, "l2_fwd_tx_table", info, insert)?,
                self.fdb_tx_entry(schema, "l2_fwd_tx_ipv6_table", info, insert)?,
                self.fdb_rx_entry(schema, "l2_fwd_rx_with_tunnel_table", info, insert)?,
                self.fdb_rx_entry(schema, "l2_fwd_rx_ipv6_with_tunnel_table", info, insert)?,
                self.fdb_bypass_entry(schema, info, insert)?,
            ])
        } else {
            Ok(Vec::new())
        }
    }

    fn fdb_tunnel_lookups(&self, schema: &Schema, info: &MacLearningInfo) -> Result<Vec<Entry>, Error> {
        Ok(vec![
            self.fdb_tunnel_builder(schema, "l2_fwd_tx_table", info, false)?.build(),
            self.fdb_tunnel_builder(schema, "l2_fwd_tx_ipv6_table", info, false)?.build(),
        ])
    }

    fn tunnel_entries(&self, schema: &Schema, info: &TunnelInfo, insert: bool) -> Result<Vec<Entry>, Error> {
        let family = tunnel_family(info)?;
        Ok(vec![
            self.encap_entry(schema, info, &family, insert)?,
            self.decap_mod_entry(schema, info, insert)?,
            self.term_entry(schema, info, &family, insert)?,
        ])
    }

    fn src_port_entries(&self, schema: &Schema, info: &SrcPortInfo, insert: bool) -> Result<Vec<Entry>, Error> {
        let entry = EntryBuilder::new(schema, p4name("source_port_to_bridge_map"), insert)?
            .key(format!("port {} vlan {}", info.src_port, info.vlan_id))
            .ternary(
                "user_meta.cmeta.source_port",
                encode_value(u64::from(info.src_port), 16),
                encode_u16(SOURCE_PORT_MASK),
            )?
            .ternary(
                "hdrs.vlan_ext[vmeta.common.depth].hdr.vid",
                encode_u16(info.vlan_id),
                encode_u16(VID_MASK),
            )?
            .priority(1)
            .action(&p4name("set_bridge_id"), vec![("bridge_id", encode_value(u64::from(info.bridge_id), 8))])?
            .build();
        Ok(vec![entry])
    }

    fn vlan_entries(&self, schema: &Schema, vlan_id: u16, insert: bool) -> Result<Vec<Entry>, Error> {
        let mod_ptr = encode_value(u64::from(vlan_id), 8);
        let push = EntryBuilder::new(schema, p4name("vlan_push_mod_table"), insert)?
            .key(format!("vlan {}", vlan_id))
            .exact(MOD_BLOB_PTR, mod_ptr.clone())?
            .action(
                &p4name("vlan_push"),
                vec![
                    ("pcp", encode_value(VLAN_PUSH_PCP, 8)),
                    ("dei", encode_value(VLAN_PUSH_DEI, 8)),
                    ("vlan_id", encode_u16(vlan_id)),
                ],
            )?
            .build();
        let pop = EntryBuilder::new(schema, p4name("vlan_pop_mod_table"), insert)?
            .key(format!("vlan {}", vlan_id))
            .exact(MOD_BLOB_PTR, mod_ptr)?
            .action(&p4name("vlan_pop"), vec![])?
            .build();
        Ok(vec![push, pop])
    }

    fn ip_mac_map_entries(&self, schema: &Schema, info: &IpMacMapInfo, insert: bool) -> Result<Vec<Entry>, Error> {
        let src = self.ip_mac_entry(schema, Side::Src, &info.src_ip_addr, &info.src_mac_addr, insert)?;
        let dst = self.ip_mac_entry(schema, Side::Dst, &info.dst_ip_addr, &info.dst_mac_addr, insert)?;
        Ok(src.into_iter().chain(dst).collect())
    }
}
