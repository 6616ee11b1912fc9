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

//! Byte encodings for P4Runtime match values and action parameters.
//!
//! P4Runtime carries every value as a big-endian byte string.  The device's
//! pipeline dictates how many bytes each field takes, so the helpers here are
//! named after the width they produce rather than the field they fill.

use byteorder::{BigEndian, ByteOrder};

use std::net::{Ipv4Addr, Ipv6Addr};

/// Copies `bytes` verbatim.  The result has exactly as many bytes as the input.
pub fn encode_bytes(bytes: &[u8]) -> Vec<u8> {
    bytes.to_vec()
}

pub fn encode_mac(mac: &[u8; 6]) -> Vec<u8> {
    encode_bytes(mac)
}

/// Four bytes in network order.
pub fn encode_ipv4(addr: Ipv4Addr) -> Vec<u8> {
    encode_bytes(&addr.octets())
}

pub fn encode_ipv6(addr: Ipv6Addr) -> Vec<u8> {
    encode_bytes(&addr.octets())
}

pub fn encode_u16(value: u16) -> Vec<u8> {
    let mut buf = [0u8; 2];
    BigEndian::write_u16(&mut buf, value);
    buf.to_vec()
}

/// The low 24 bits of `vni`, for `bit<24>` VNI and mod-pointer fields.
pub fn encode_vni(vni: u32) -> Vec<u8> {
    let mut buf = [0u8; 3];
    BigEndian::write_u24(&mut buf, vni & 0x00ff_ffff);
    buf.to_vec()
}

/// The low 20 bits of `vni` in three bytes, for `bit<20>` tunnel ids.
pub fn encode_tunnel_id(vni: u32) -> Vec<u8> {
    let mut buf = [0u8; 3];
    BigEndian::write_u24(&mut buf, vni & 0x000f_ffff);
    buf.to_vec()
}

/// Encodes `value` in the `(bit_width + 7) / 8` bytes that P4Runtime expects for a field of
/// `bit_width` bits.  High-order bytes that do not fit are dropped.
pub fn encode_value(value: u64, bit_width: i32) -> Vec<u8> {
    let mut buf = [0u8; 8];
    BigEndian::write_u64(&mut buf, value);

    let num_bytes = ((bit_width.max(1) + 7) / 8).min(8) as usize;
    buf[buf.len() - num_bytes..].to_vec()
}

pub fn decode_ipv4(bytes: &[u8]) -> Option<Ipv4Addr> {
    if bytes.len() < 4 {
        return None;
    }
    Some(Ipv4Addr::from(BigEndian::read_u32(bytes)))
}

/// Reads a big-endian value of one to four bytes.
pub fn decode_u32(bytes: &[u8]) -> Option<u32> {
    match bytes.len() {
        1..=4 => Some(BigEndian::read_uint(bytes, bytes.len()) as u32),
        _ => None,
    }
}

/// True for an address that can name a single remote host.
pub fn valid_ipv4(addr: Ipv4Addr) -> bool {
    !(addr.is_unspecified() || addr.is_broadcast() || addr.is_loopback())
}
