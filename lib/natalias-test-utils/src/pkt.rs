// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Routines for building and picking apart IPv4 packets.
//!
//! Every builder returns the packet followed by [`SPARE`] bytes of
//! room, which is what the engine expects to be handed.

use smoltcp::wire::Icmpv4Message;
use smoltcp::wire::Icmpv4Packet;
use smoltcp::wire::IpAddress;
use smoltcp::wire::IpProtocol;
use smoltcp::wire::Ipv4Address;
use smoltcp::wire::Ipv4Packet;
use smoltcp::wire::TcpPacket;
use smoltcp::wire::TcpSeqNumber;
use smoltcp::wire::UdpPacket;
use std::net::Ipv4Addr;
use std::net::SocketAddrV4;

pub const SPARE: usize = 256;

const IP_HDR: usize = 20;
const TCP_HDR: usize = 20;
const UDP_HDR: usize = 8;
const ICMP_HDR: usize = 8;

pub const FIN: u8 = 0x01;
pub const SYN: u8 = 0x02;
pub const RST: u8 = 0x04;
pub const PSH: u8 = 0x08;
pub const ACK: u8 = 0x10;

fn wire(addr: Ipv4Addr) -> Ipv4Address {
    Ipv4Address(addr.octets())
}

fn ip_wire(addr: Ipv4Addr) -> IpAddress {
    IpAddress::Ipv4(wire(addr))
}

fn unwire(addr: Ipv4Address) -> Ipv4Addr {
    Ipv4Addr::from(addr.0)
}

fn ipv4(
    src: Ipv4Addr,
    dst: Ipv4Addr,
    proto: IpProtocol,
    l4_len: usize,
) -> Vec<u8> {
    let total = IP_HDR + l4_len;
    let mut buf = vec![0u8; total + SPARE];
    let mut ip = Ipv4Packet::new_unchecked(&mut buf[..total]);
    ip.set_version(4);
    ip.set_header_len(IP_HDR as u8);
    ip.set_total_len(total as u16);
    ip.set_ident(0x1234);
    ip.clear_flags();
    ip.set_hop_limit(64);
    ip.set_next_header(proto);
    ip.set_src_addr(wire(src));
    ip.set_dst_addr(wire(dst));
    ip.fill_checksum();
    buf
}

/// The IP total length of the packet at the start of `buf`.
pub fn ip_len(buf: &[u8]) -> usize {
    usize::from(u16::from_be_bytes([buf[2], buf[3]]))
}

fn ihl(buf: &[u8]) -> usize {
    usize::from(buf[0] & 0x0F) * 4
}

/// A TCP segment from `src` to `dst`.
pub fn tcp(
    src: SocketAddrV4,
    dst: SocketAddrV4,
    flags: u8,
    seq: u32,
    ack: u32,
    payload: &[u8],
) -> Vec<u8> {
    let l4_len = TCP_HDR + payload.len();
    let mut buf = ipv4(*src.ip(), *dst.ip(), IpProtocol::Tcp, l4_len);
    {
        let seg = &mut buf[IP_HDR..IP_HDR + l4_len];
        let mut tcp = TcpPacket::new_unchecked(seg);
        tcp.set_src_port(src.port());
        tcp.set_dst_port(dst.port());
        tcp.set_seq_number(TcpSeqNumber(seq as i32));
        tcp.set_ack_number(TcpSeqNumber(ack as i32));
        tcp.set_header_len(TCP_HDR as u8);
        tcp.clear_flags();
        tcp.set_fin(flags & FIN != 0);
        tcp.set_syn(flags & SYN != 0);
        tcp.set_rst(flags & RST != 0);
        tcp.set_psh(flags & PSH != 0);
        tcp.set_ack(flags & ACK != 0);
        tcp.set_window_len(65535);
        tcp.payload_mut().copy_from_slice(payload);
        tcp.fill_checksum(&ip_wire(*src.ip()), &ip_wire(*dst.ip()));
    }
    buf
}

/// A UDP datagram from `src` to `dst`.
pub fn udp(src: SocketAddrV4, dst: SocketAddrV4, payload: &[u8]) -> Vec<u8> {
    let l4_len = UDP_HDR + payload.len();
    let mut buf = ipv4(*src.ip(), *dst.ip(), IpProtocol::Udp, l4_len);
    {
        let seg = &mut buf[IP_HDR..IP_HDR + l4_len];
        let mut udp = UdpPacket::new_unchecked(seg);
        udp.set_src_port(src.port());
        udp.set_dst_port(dst.port());
        udp.set_len(l4_len as u16);
        udp.payload_mut().copy_from_slice(payload);
        udp.fill_checksum(&ip_wire(*src.ip()), &ip_wire(*dst.ip()));
    }
    buf
}

/// An ICMP echo request, or reply when `reply` is set.
pub fn icmp_echo(
    src: Ipv4Addr,
    dst: Ipv4Addr,
    reply: bool,
    ident: u16,
    seq: u16,
) -> Vec<u8> {
    let data = b"ping";
    let l4_len = ICMP_HDR + data.len();
    let mut buf = ipv4(src, dst, IpProtocol::Icmp, l4_len);
    {
        let msg = &mut buf[IP_HDR..IP_HDR + l4_len];
        let mut icmp = Icmpv4Packet::new_unchecked(msg);
        icmp.set_msg_type(if reply {
            Icmpv4Message::EchoReply
        } else {
            Icmpv4Message::EchoRequest
        });
        icmp.set_msg_code(0);
        icmp.set_echo_ident(ident);
        icmp.set_echo_seq_no(seq);
        icmp.data_mut().copy_from_slice(data);
        icmp.fill_checksum();
    }
    buf
}

/// A port unreachable error from `src` to `dst` quoting the IP header
/// and first eight payload bytes of `quoted`.
pub fn icmp_unreachable(src: Ipv4Addr, dst: Ipv4Addr, quoted: &[u8]) -> Vec<u8> {
    let q_len = ihl(quoted) + 8;
    let l4_len = ICMP_HDR + q_len;
    let mut buf = ipv4(src, dst, IpProtocol::Icmp, l4_len);
    {
        let msg = &mut buf[IP_HDR..IP_HDR + l4_len];
        let mut icmp = Icmpv4Packet::new_unchecked(msg);
        icmp.set_msg_type(Icmpv4Message::DstUnreachable);
        icmp.set_msg_code(3);
        icmp.data_mut().copy_from_slice(&quoted[..q_len]);
        icmp.fill_checksum();
    }
    buf
}

/// A datagram of an IP protocol the engine has no ports for.
pub fn raw_ip(src: Ipv4Addr, dst: Ipv4Addr, proto: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = ipv4(src, dst, IpProtocol::from(proto), payload.len());
    buf[IP_HDR..IP_HDR + payload.len()].copy_from_slice(payload);
    buf
}

/// Split `pkt` in two: a header fragment carrying the first
/// `first_len` payload bytes and a trailing fragment carrying the
/// rest. `first_len` must be a multiple of eight.
pub fn fragment(pkt: &[u8], ident: u16, first_len: usize) -> (Vec<u8>, Vec<u8>) {
    assert_eq!(first_len % 8, 0);
    let hl = ihl(pkt);
    let total = ip_len(pkt);
    let payload = &pkt[hl..total];
    assert!(first_len < payload.len());

    let mk = |data: &[u8], offset: usize, more: bool| {
        let len = hl + data.len();
        let mut buf = vec![0u8; len + SPARE];
        buf[..hl].copy_from_slice(&pkt[..hl]);
        buf[hl..len].copy_from_slice(data);
        let mut ip = Ipv4Packet::new_unchecked(&mut buf[..len]);
        ip.set_total_len(len as u16);
        ip.set_ident(ident);
        ip.clear_flags();
        ip.set_more_frags(more);
        ip.set_frag_offset(offset as u16);
        ip.fill_checksum();
        buf
    };

    (
        mk(&payload[..first_len], 0, true),
        mk(&payload[first_len..], first_len, false),
    )
}

/// Assert that the IP header checksum and, for unfragmented packets,
/// the transport checksum are correct.
#[track_caller]
pub fn assert_checksums(buf: &[u8]) {
    let total = ip_len(buf);
    let ip = Ipv4Packet::new_checked(&buf[..total]).unwrap();
    assert!(ip.verify_checksum(), "bad IP checksum");

    if ip.more_frags() || ip.frag_offset() != 0 {
        return;
    }

    let src = IpAddress::Ipv4(ip.src_addr());
    let dst = IpAddress::Ipv4(ip.dst_addr());
    let l4 = ip.payload();

    match ip.next_header() {
        IpProtocol::Tcp => {
            let tcp = TcpPacket::new_checked(l4).unwrap();
            assert!(tcp.verify_checksum(&src, &dst), "bad TCP checksum");
        }

        IpProtocol::Udp => {
            let udp = UdpPacket::new_checked(l4).unwrap();
            assert!(udp.verify_checksum(&src, &dst), "bad UDP checksum");
        }

        IpProtocol::Icmp => {
            let icmp = Icmpv4Packet::new_checked(l4).unwrap();
            assert!(icmp.verify_checksum(), "bad ICMP checksum");
        }

        _ => {}
    }
}

/// Source and destination addresses.
pub fn addrs(buf: &[u8]) -> (Ipv4Addr, Ipv4Addr) {
    let ip = Ipv4Packet::new_unchecked(buf);
    (unwire(ip.src_addr()), unwire(ip.dst_addr()))
}

/// Source and destination of a TCP or UDP packet.
pub fn endpoints(buf: &[u8]) -> (SocketAddrV4, SocketAddrV4) {
    let (src, dst) = addrs(buf);
    let l4 = &buf[ihl(buf)..];
    let sport = u16::from_be_bytes([l4[0], l4[1]]);
    let dport = u16::from_be_bytes([l4[2], l4[3]]);
    (SocketAddrV4::new(src, sport), SocketAddrV4::new(dst, dport))
}

/// Sequence and acknowledgment numbers of a TCP segment.
pub fn seq_ack(buf: &[u8]) -> (u32, u32) {
    let tcp = TcpPacket::new_unchecked(&buf[ihl(buf)..ip_len(buf)]);
    (tcp.seq_number().0 as u32, tcp.ack_number().0 as u32)
}

/// The payload of a TCP segment.
pub fn tcp_payload(buf: &[u8]) -> Vec<u8> {
    let tcp = TcpPacket::new_unchecked(&buf[ihl(buf)..ip_len(buf)]);
    tcp.payload().to_vec()
}

/// The identifier of an ICMP echo message.
pub fn echo_ident(buf: &[u8]) -> u16 {
    Icmpv4Packet::new_unchecked(&buf[ihl(buf)..ip_len(buf)]).echo_ident()
}

/// The packet quoted inside an ICMP error.
pub fn icmp_quoted(buf: &[u8]) -> Vec<u8> {
    buf[ihl(buf) + ICMP_HDR..ip_len(buf)].to_vec()
}

/// Put a reassembled datagram back together from a header fragment
/// and one trailing fragment.
pub fn reassemble(head: &[u8], tail: &[u8]) -> Vec<u8> {
    let mut buf = head[..ip_len(head)].to_vec();
    buf.extend_from_slice(&tail[ihl(tail)..ip_len(tail)]);
    let total = buf.len();
    let mut ip = Ipv4Packet::new_unchecked(&mut buf[..]);
    ip.set_total_len(total as u16);
    ip.clear_flags();
    ip.set_frag_offset(0);
    ip.fill_checksum();
    buf.resize(total + SPARE, 0);
    buf
}
