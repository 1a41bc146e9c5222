// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Header access over a caller-owned IPv4 packet buffer.
//!
//! The buffer handed to the engine is the packet followed by whatever
//! spare room the caller has; the IPv4 total length says where the
//! packet ends. Field access goes through the `smoltcp` wire types;
//! checksum maintenance goes through [`super::checksum`].

use super::checksum;
use super::tcp_state::TcpFlags;
use crate::api::AliasError;
use crate::api::Protocol;
use smoltcp::wire::Ipv4Address;
use smoltcp::wire::Ipv4Packet;
use smoltcp::wire::TcpPacket;
use smoltcp::wire::TcpSeqNumber;
use smoltcp::wire::UdpPacket;
use std::net::Ipv4Addr;

pub const IPV4_MIN_HDR_LEN: usize = 20;
pub const TCP_MIN_HDR_LEN: usize = 20;
pub const UDP_HDR_LEN: usize = 8;
pub const ICMP_HDR_LEN: usize = 8;

pub fn from_wire(addr: Ipv4Address) -> Ipv4Addr {
    Ipv4Addr::from(addr.0)
}

pub fn to_wire(addr: Ipv4Addr) -> Ipv4Address {
    Ipv4Address(addr.octets())
}

/// The parts of an IPv4 header the engine looks at.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Ipv4Meta {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub proto: Protocol,
    pub hdr_len: usize,
    pub total_len: usize,
    pub ident: u16,
    pub more_frags: bool,
    /// Fragment offset in bytes.
    pub frag_offset: u16,
}

impl Ipv4Meta {
    /// Offset of the L4 header.
    pub fn l4_start(&self) -> usize {
        self.hdr_len
    }

    /// Number of bytes after the IP header.
    pub fn l4_len(&self) -> usize {
        self.total_len - self.hdr_len
    }

    pub fn is_first_fragment(&self) -> bool {
        self.frag_offset == 0
    }
}

/// Parse the IPv4 header at the front of `buf`.
///
/// The whole packet, as given by the total length field, must lie
/// within `buf`.
pub fn parse_ipv4(buf: &[u8]) -> Result<Ipv4Meta, AliasError> {
    let ip = Ipv4Packet::new_checked(buf)
        .map_err(|e| AliasError::Malformed(format!("ipv4: {e}")))?;

    if ip.version() != 4 {
        return Err(AliasError::Malformed(format!(
            "ip version {}",
            ip.version()
        )));
    }

    Ok(Ipv4Meta {
        src: from_wire(ip.src_addr()),
        dst: from_wire(ip.dst_addr()),
        proto: Protocol::from(ip.next_header()),
        hdr_len: usize::from(ip.header_len()),
        total_len: usize::from(ip.total_len()),
        ident: ip.ident(),
        more_frags: ip.more_frags(),
        frag_offset: ip.frag_offset(),
    })
}

/// Rewrite the IPv4 source address, keeping the header checksum.
pub fn set_ip_src(buf: &mut [u8], addr: Ipv4Addr) {
    let mut ip = Ipv4Packet::new_unchecked(buf);
    let old = from_wire(ip.src_addr());
    let csum = checksum::update_addr(ip.checksum(), old, addr);
    ip.set_src_addr(to_wire(addr));
    ip.set_checksum(csum);
}

/// Rewrite the IPv4 destination address, keeping the header checksum.
pub fn set_ip_dst(buf: &mut [u8], addr: Ipv4Addr) {
    let mut ip = Ipv4Packet::new_unchecked(buf);
    let old = from_wire(ip.dst_addr());
    let csum = checksum::update_addr(ip.checksum(), old, addr);
    ip.set_dst_addr(to_wire(addr));
    ip.set_checksum(csum);
}

/// Rewrite the IPv4 total length, keeping the header checksum.
pub fn set_ip_total_len(buf: &mut [u8], len: u16) {
    let mut ip = Ipv4Packet::new_unchecked(buf);
    let csum = checksum::update_u16(ip.checksum(), ip.total_len(), len);
    ip.set_total_len(len);
    ip.set_checksum(csum);
}

/// The parts of a TCP header the engine looks at.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TcpMeta {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    pub flags: TcpFlags,
    pub hdr_len: usize,
}

/// Parse the TCP header in `seg`, the bytes following the IP header.
pub fn parse_tcp(seg: &[u8]) -> Option<TcpMeta> {
    let tcp = TcpPacket::new_checked(seg).ok()?;
    Some(TcpMeta {
        src_port: tcp.src_port(),
        dst_port: tcp.dst_port(),
        seq: tcp.seq_number().0 as u32,
        ack: tcp.ack_number().0 as u32,
        flags: TcpFlags::from_bits_truncate(seg[13]),
        hdr_len: usize::from(tcp.header_len()),
    })
}

/// Rewrite TCP header fields, folding every change into one checksum
/// update. The pseudo-header address change is passed in as
/// `addr_change` because the TCP checksum covers it too.
#[derive(Default)]
pub struct TcpRewrite {
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
    pub seq: Option<u32>,
    pub ack: Option<u32>,
    pub addr_change: Option<(Ipv4Addr, Ipv4Addr)>,
}

impl TcpRewrite {
    pub fn apply(&self, seg: &mut [u8]) {
        let mut tcp = TcpPacket::new_unchecked(seg);
        let mut csum = tcp.checksum();

        if let Some(port) = self.src_port {
            csum = checksum::update_u16(csum, tcp.src_port(), port);
            tcp.set_src_port(port);
        }

        if let Some(port) = self.dst_port {
            csum = checksum::update_u16(csum, tcp.dst_port(), port);
            tcp.set_dst_port(port);
        }

        if let Some(seq) = self.seq {
            let old = tcp.seq_number().0 as u32;
            csum = checksum::update_u32(csum, old, seq);
            tcp.set_seq_number(TcpSeqNumber(seq as i32));
        }

        if let Some(ack) = self.ack {
            let old = tcp.ack_number().0 as u32;
            csum = checksum::update_u32(csum, old, ack);
            tcp.set_ack_number(TcpSeqNumber(ack as i32));
        }

        if let Some((old, new)) = self.addr_change {
            csum = checksum::update_addr(csum, old, new);
        }

        tcp.set_checksum(csum);
    }
}

/// Recompute the TCP checksum of the packet in `buf` from scratch.
pub fn fill_tcp_checksum(buf: &mut [u8], meta: &Ipv4Meta) {
    let seg = &mut buf[meta.l4_start()..meta.total_len];
    seg[16] = 0;
    seg[17] = 0;
    let csum = checksum::l4_field(meta.src, meta.dst, 6, seg);
    TcpPacket::new_unchecked(seg).set_checksum(csum);
}

/// Source and destination ports of a UDP datagram.
///
/// A header fragment holds fewer bytes than the datagram claims, so the
/// length field is only checked when `whole` is set.
pub fn parse_udp(seg: &[u8], whole: bool) -> Option<(u16, u16)> {
    if seg.len() < UDP_HDR_LEN {
        return None;
    }

    let udp = UdpPacket::new_unchecked(seg);
    // A datagram claiming more than the IP payload holds is bogus.
    if whole && usize::from(udp.len()) > seg.len() {
        return None;
    }
    Some((udp.src_port(), udp.dst_port()))
}

/// Rewrite UDP ports; a zero checksum means "none" and stays zero.
pub fn rewrite_udp(
    seg: &mut [u8],
    src_port: Option<u16>,
    dst_port: Option<u16>,
    addr_change: Option<(Ipv4Addr, Ipv4Addr)>,
) {
    let mut udp = UdpPacket::new_unchecked(seg);
    let mut csum = udp.checksum();
    let has_csum = csum != 0;

    if let Some(port) = src_port {
        csum = checksum::update_u16(csum, udp.src_port(), port);
        udp.set_src_port(port);
    }

    if let Some(port) = dst_port {
        csum = checksum::update_u16(csum, udp.dst_port(), port);
        udp.set_dst_port(port);
    }

    if let Some((old, new)) = addr_change {
        csum = checksum::update_addr(csum, old, new);
    }

    if has_csum {
        // 0 is reserved for "no checksum"; RFC 768 transmits 0xFFFF.
        udp.set_checksum(if csum == 0 { 0xFFFF } else { csum });
    }
}
