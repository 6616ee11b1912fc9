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

//! Table programs for the DPDK software target.
//!
//! The DPDK pipeline has no source-port, VLAN-mod, or IP-MAC tables, and its tunnel tables only
//! handle IPv4 VXLAN.  FDB entries toward any tunnel share one `set_tunnel` action.

use p4ext::codec::{encode_ipv4, encode_mac, encode_u16, encode_value};
use p4ext::Schema;

use std::net::Ipv4Addr;

use super::{p4name, Program, TablePrograms, Target};
use crate::entry::{Entry, EntryBuilder};
use crate::error::Error;
use crate::events::{IpAddress, MacLearningInfo, TunnelInfo, TunnelType};

/// Value of the `tunnel_type` key for VXLAN.
const TUNNEL_TYPE_VXLAN: u64 = 2;

pub struct Dpdk;

impl Dpdk {
    fn ipv4(&self, program: Program, ip: &IpAddress) -> Result<Ipv4Addr, Error> {
        ip.ipv4().ok_or(Error::Ipv6Unsupported {
            target: Target::Dpdk,
            program,
        })
    }

    /// The vport that VLAN `vlan_id` maps to.  Only the low byte is significant.
    fn vlan_port(vlan_id: u16) -> Vec<u8> {
        encode_value(u64::from(vlan_id.wrapping_sub(1)), 8)
    }

    fn fdb_vlan_entry(&self, schema: &Schema, table: &str, info: &MacLearningInfo, insert: bool) -> Result<Entry, Error> {
        Ok(EntryBuilder::new(schema, p4name(table), insert)?
            .key(info.mac_addr)
            .exact("dst_mac", encode_mac(info.mac_addr.octets()))?
            .action(&p4name("l2_fwd"), vec![("port", Self::vlan_port(info.vlan_id))])?
            .build())
    }

    fn fdb_tunnel_entry(&self, schema: &Schema, info: &MacLearningInfo, insert: bool) -> Result<Entry, Error> {
        let tunnel = &info.tunnel_info;
        let remote = self.ipv4(Program::Fdb, &tunnel.remote_ip)?;
        Ok(EntryBuilder::new(schema, p4name("l2_fwd_tx_table"), insert)?
            .key(info.mac_addr)
            .exact("dst_mac", encode_mac(info.mac_addr.octets()))?
            .action(
                &p4name("set_tunnel"),
                vec![
                    ("tunnel_id", encode_value(u64::from(tunnel.vni), 8)),
                    ("dst_addr", encode_ipv4(remote)),
                ],
            )?
            .build())
    }
}

impl TablePrograms for Dpdk {
    fn target(&self) -> Target {
        Target::Dpdk
    }

    fn supports(&self, program: Program) -> bool {
        matches!(program, Program::Fdb | Program::Tunnel)
    }

    fn fdb_entries(&self, schema: &Schema, info: &MacLearningInfo, insert: bool) -> Result<Vec<Entry>, Error> {
        if info.is_tunnel {
            Ok(vec![self.fdb_tunnel_entry(schema, info, insert)?])
        } else if info.is_vlan {
            Ok(vec![
                self.fdb_vlan_entry(schema, "l2_fwd_tx_table", info, insert)?,
                self.fdb_vlan_entry(schema, "l2_fwd_rx_with_tunnel_table", info, insert)?,
            ])
        } else {
            Ok(Vec::new())
        }
    }

    fn tunnel_entries(&self, schema: &Schema, info: &TunnelInfo, insert: bool) -> Result<Vec<Entry>, Error> {
        if info.tunnel_type != TunnelType::Vxlan {
            return Err(Error::TunnelTypeUnsupported {
                target: Target::Dpdk,
                tunnel_type: info.tunnel_type,
            });
        }
        let local = self.ipv4(Program::Tunnel, &info.local_ip)?;
        let remote = self.ipv4(Program::Tunnel, &info.remote_ip)?;
        let vni = encode_value(u64::from(info.vni), 8);

        let encap = EntryBuilder::new(schema, p4name("vxlan_encap_mod_table"), insert)?
            .key(format!("vni {}", info.vni))
            .exact("vendormeta_mod_data_ptr", vni.clone())?
            .action(
                &p4name("vxlan_encap"),
                vec![
                    ("src_addr", encode_ipv4(local)),
                    ("dst_addr", encode_ipv4(remote)),
                    ("dst_port", encode_u16(info.dst_port)),
                    ("vni", vni.clone()),
                ],
            )?
            .build();

        let term = EntryBuilder::new(schema, p4name("ipv4_tunnel_term_table"), insert)?
            .key(format!("{} -> {}", remote, local))
            .exact("tunnel_type", encode_value(TUNNEL_TYPE_VXLAN, 8))?
            .exact("ipv4_src", encode_ipv4(remote))?
            .exact("ipv4_dst", encode_ipv4(local))?
            .action(&p4name("decap_outer_ipv4"), vec![("tunnel_id", vni)])?
            .build();

        Ok(vec![encap, term])
    }
}
