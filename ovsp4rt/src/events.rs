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

//! The records that Open vSwitch hands over when it wants forwarding state programmed.
//!
//! All of them serialize with `serde`, which is how calls are written to and replayed from the
//! journal.

use serde::{Deserialize, Serialize};

use std::fmt::{self, Display};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use thiserror::Error;

/// An Ethernet address.  Serializes as an array of six octets.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MacAddr(pub [u8; 6]);

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{0:?} is not an Ethernet address (expected xx:xx:xx:xx:xx:xx)")]
pub struct ParseMacError(String);

impl MacAddr {
    pub fn octets(&self) -> &[u8; 6] {
        &self.0
    }
}

impl From<[u8; 6]> for MacAddr {
    fn from(octets: [u8; 6]) -> Self {
        MacAddr(octets)
    }
}

impl FromStr for MacAddr {
    type Err = ParseMacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for octet in octets.iter_mut() {
            let part = parts.next().ok_or_else(|| ParseMacError(s.into()))?;
            if part.is_empty() || part.len() > 2 {
                return Err(ParseMacError(s.into()));
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| ParseMacError(s.into()))?;
        }
        if parts.next().is_some() {
            return Err(ParseMacError(s.into()));
        }
        Ok(MacAddr(octets))
    }
}

impl Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// An IPv4 or IPv6 address with a prefix length.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IpAddress {
    pub addr: IpAddr,
    #[serde(default)]
    pub prefix_len: u8,
}

impl IpAddress {
    /// A host address: the prefix covers the whole address.
    pub fn host<A: Into<IpAddr>>(addr: A) -> Self {
        let addr = addr.into();
        let prefix_len = if addr.is_ipv4() { 32 } else { 128 };
        IpAddress { addr, prefix_len }
    }

    pub fn is_ipv6(&self) -> bool {
        self.addr.is_ipv6()
    }

    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        match self.addr {
            IpAddr::V4(a) => Some(a),
            IpAddr::V6(_) => None,
        }
    }

    pub fn ipv6(&self) -> Option<Ipv6Addr> {
        match self.addr {
            IpAddr::V6(a) => Some(a),
            IpAddr::V4(_) => None,
        }
    }
}

impl Default for IpAddress {
    fn default() -> Self {
        IpAddress {
            addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            prefix_len: 0,
        }
    }
}

impl From<Ipv4Addr> for IpAddress {
    fn from(addr: Ipv4Addr) -> Self {
        IpAddress::host(addr)
    }
}

impl From<Ipv6Addr> for IpAddress {
    fn from(addr: Ipv6Addr) -> Self {
        IpAddress::host(addr)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{0:?} is not an IP address with optional /prefix")]
pub struct ParseIpAddressError(String);

/// Parses `addr` or `addr/prefix_len`.
impl FromStr for IpAddress {
    type Err = ParseIpAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseIpAddressError(s.into());
        let (addr, prefix_len) = match s.split_once('/') {
            Some((addr, len)) => (addr, Some(len.parse::<u8>().map_err(|_| err())?)),
            None => (s, None),
        };
        let mut ip = IpAddress::host(addr.parse::<IpAddr>().map_err(|_| err())?);
        if let Some(len) = prefix_len {
            if len > ip.prefix_len {
                return Err(err());
            }
            ip.prefix_len = len;
        }
        Ok(ip)
    }
}

impl Display for IpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PortVlanMode {
    Trunk,
    Access,
    NativeTagged,
    NativeUntagged,
    #[serde(rename = "dot1q-tunnel")]
    DotOneQTunnel,
}

impl Default for PortVlanMode {
    fn default() -> Self {
        PortVlanMode::Trunk
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortVlanInfo {
    pub port_vlan_mode: PortVlanMode,
    pub port_vlan: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelType {
    Vxlan,
    Geneve,
}

impl Default for TunnelType {
    fn default() -> Self {
        TunnelType::Vxlan
    }
}

impl Display for TunnelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelType::Vxlan => write!(f, "vxlan"),
            TunnelType::Geneve => write!(f, "geneve"),
        }
    }
}

/// Maps an OVS interface type name to a tunnel type.
pub fn str_to_tunnel_type(name: &str) -> Option<TunnelType> {
    match name {
        "vxlan" => Some(TunnelType::Vxlan),
        "geneve" => Some(TunnelType::Geneve),
        _ => None,
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelInfo {
    pub ifindex: u32,
    pub port_id: u32,
    pub src_port: u32,
    pub local_ip: IpAddress,
    pub remote_ip: IpAddress,
    pub dst_port: u16,
    pub vni: u32,
    pub vlan_info: PortVlanInfo,
    pub bridge_id: u8,
    pub tunnel_type: TunnelType,
}

/// A MAC address learned on a bridge port.
///
/// `tunnel_info` is meaningful when `is_tunnel` is set and `vlan_id` when `is_vlan` is set.  If
/// both are set, the entry is a tunnel entry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacLearningInfo {
    pub is_tunnel: bool,
    pub is_vlan: bool,
    pub mac_addr: MacAddr,
    pub bridge_id: u8,
    pub src_port: u32,
    pub rx_src_port: u32,
    pub vlan_info: PortVlanInfo,
    #[serde(rename = "tnl_info")]
    pub tunnel_info: TunnelInfo,
    pub vlan_id: u16,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SrcPortInfo {
    pub bridge_id: u8,
    pub vlan_id: u16,
    pub src_port: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpMacMapInfo {
    pub src_mac_addr: MacAddr,
    pub dst_mac_addr: MacAddr,
    pub src_ip_addr: IpAddress,
    pub dst_ip_addr: IpAddress,
}

/// One programming request.  The variant names double as the journal's parameter keys.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    #[serde(rename = "learn_info")]
    Fdb(MacLearningInfo),
    #[serde(rename = "tunnel_info")]
    Tunnel(TunnelInfo),
    #[serde(rename = "port_info")]
    SrcPort(SrcPortInfo),
    #[serde(rename = "vlan_id")]
    Vlan(u16),
    #[serde(rename = "ip_mac_map_info")]
    IpMacMap(IpMacMapInfo),
}

impl Event {
    /// Name of the entry point that handles this event.
    pub fn func_name(&self) -> &'static str {
        match self {
            Event::Fdb(_) => "ovsp4rt_config_fdb_entry",
            Event::Tunnel(_) => "ovsp4rt_config_tunnel_entry",
            Event::SrcPort(_) => "ovsp4rt_config_src_port_entry",
            Event::Vlan(_) => "ovsp4rt_config_vlan_entry",
            Event::IpMacMap(_) => "ovsp4rt_config_ip_mac_map_entry",
        }
    }

    pub fn struct_name(&self) -> Option<&'static str> {
        match self {
            Event::Fdb(_) => Some("mac_learning_info"),
            Event::Tunnel(_) => Some("tunnel_info"),
            Event::SrcPort(_) => Some("src_port_info"),
            Event::Vlan(_) => None,
            Event::IpMacMap(_) => Some("ip_mac_map_info"),
        }
    }
}
