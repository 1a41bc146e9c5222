// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Per-packet translation.
//!
//! Outbound packets have their source rewritten to the alias endpoint,
//! inbound packets their destination restored to the original one.
//! Every header change goes through a differential checksum update;
//! only a handler that rewrites payload recomputes a checksum from
//! scratch.

use super::checksum;
use super::handler::FixupError;
use super::handler::HandlerCtx;
use super::handler::HandlerRegistry;
use super::handler::ProtoMask;
use super::link_table::LinkTable;
use super::packet::ICMP_HDR_LEN;
use super::packet::IPV4_MIN_HDR_LEN;
use super::packet::Ipv4Meta;
use super::packet::TcpMeta;
use super::packet::TcpRewrite;
use super::packet::from_wire;
use super::packet::parse_ipv4;
use super::packet::parse_tcp;
use super::packet::parse_udp;
use super::packet::rewrite_udp;
use super::packet::set_ip_dst;
use super::packet::set_ip_src;
use crate::api::AliasError;
use crate::api::AliasResult;
use crate::api::Direction;
use crate::api::LinkId;
use crate::api::PacketResult;
use crate::api::Protocol;
use crate::provider::LogLevel;
use smoltcp::wire::Icmpv4Packet;
use smoltcp::wire::Ipv4Packet;
use std::net::Ipv4Addr;

const ICMP_ECHO_REPLY: u8 = 0;
const ICMP_UNREACH: u8 = 3;
const ICMP_SOURCE_QUENCH: u8 = 4;
const ICMP_ECHO: u8 = 8;
const ICMP_TIME_EXCEEDED: u8 = 11;
const ICMP_PARAM_PROBLEM: u8 = 12;
const ICMP_TIMESTAMP: u8 = 13;
const ICMP_TIMESTAMP_REPLY: u8 = 14;

/// The bytes of the offending datagram's transport header an ICMP
/// error is guaranteed to quote.
const ICMP_QUOTE_LEN: usize = 8;

// The endpoints of a link with instance defaults filled in.
struct Endpoints {
    alias: Ipv4Addr,
    alias_port: u16,
    original: Ipv4Addr,
    original_port: u16,
    proxy_addr: Option<Ipv4Addr>,
    proxy_port: Option<u16>,
}

fn endpoints(table: &LinkTable, id: LinkId) -> AliasResult<Endpoints> {
    let link = table.link(id).ok_or(AliasError::NoSuchLink(id))?;
    Ok(Endpoints {
        alias: table.alias_addr_of(link),
        alias_port: link.alias_port,
        original: table.original_addr_of(link),
        original_port: link.src_port,
        proxy_addr: link.proxy_addr,
        proxy_port: link.proxy_port,
    })
}

// Make sure the buffer holds what the header claims. `None` means the
// packet should be left alone.
fn check_ipv4(buf: &[u8]) -> AliasResult<Option<Ipv4Meta>> {
    if buf.len() < IPV4_MIN_HDR_LEN {
        return Err(AliasError::Malformed(format!(
            "{} bytes is too short for IPv4",
            buf.len()
        )));
    }

    let total_len = usize::from(u16::from_be_bytes([buf[2], buf[3]]));
    let hdr_len = usize::from(buf[0] & 0x0F) * 4;
    if total_len > buf.len() || hdr_len > buf.len() {
        return Ok(None);
    }

    parse_ipv4(buf).map(Some)
}

#[allow(clippy::too_many_arguments)]
fn run_handlers(
    table: &mut LinkTable,
    registry: &HandlerRegistry,
    dir: Direction,
    proto: ProtoMask,
    buf: &mut [u8],
    ip: Ipv4Meta,
    link: Option<LinkId>,
    ports: (u16, u16),
) -> bool {
    let mut ctx = HandlerCtx {
        table,
        link,
        dir,
        buf,
        ip,
        src_port: ports.0,
        dst_port: ports.1,
    };

    match registry.dispatch(proto, &mut ctx) {
        Some(Ok(())) => true,
        None | Some(Err(FixupError::UnrecognizedProtocolMessage)) => false,
        Some(Err(e)) => {
            ctx.table.log(LogLevel::Note, &format!("{dir} fixup: {e}"));
            false
        }
    }
}

fn tcp_meta(buf: &[u8], ip: &Ipv4Meta) -> AliasResult<TcpMeta> {
    parse_tcp(&buf[ip.l4_start()..ip.total_len])
        .ok_or_else(|| AliasError::Malformed("truncated TCP header".into()))
}

fn udp_ports(buf: &[u8], ip: &Ipv4Meta) -> AliasResult<(u16, u16)> {
    parse_udp(&buf[ip.l4_start()..ip.total_len], !ip.more_frags)
        .ok_or_else(|| AliasError::Malformed("truncated UDP header".into()))
}

pub(crate) fn process_out(
    table: &mut LinkTable,
    registry: &HandlerRegistry,
    buf: &mut [u8],
    create: bool,
) -> AliasResult<PacketResult> {
    table.house_keeping();
    let Some(ip) = check_ipv4(buf)? else {
        return Ok(PacketResult::Ignored);
    };

    if !ip.is_first_fragment() {
        let alias = table.find_alias_address(ip.src);
        set_ip_src(buf, alias);
        return Ok(PacketResult::Aliased);
    }

    match ip.proto {
        Protocol::ICMP => icmp_out(table, buf, &ip, create),
        Protocol::UDP => udp_out(table, registry, buf, &ip, create),
        Protocol::TCP => tcp_out(table, registry, buf, &ip, create),
        other => {
            let handled = run_handlers(
                table,
                registry,
                Direction::Out,
                ProtoMask::IP,
                buf,
                ip,
                None,
                (0, 0),
            );
            if handled {
                return Ok(PacketResult::Aliased);
            }
            proto_out(table, buf, &ip, u8::from(other), create)
        }
    }
}

pub(crate) fn process_in(
    table: &mut LinkTable,
    registry: &HandlerRegistry,
    buf: &mut [u8],
) -> AliasResult<PacketResult> {
    table.house_keeping();
    let Some(ip) = check_ipv4(buf)? else {
        return Ok(PacketResult::Ignored);
    };

    if !ip.is_first_fragment() {
        return Ok(fragment_rest_in(table, buf, &ip));
    }

    let res = match ip.proto {
        Protocol::ICMP => icmp_in(table, buf, &ip)?,
        Protocol::UDP => udp_in(table, registry, buf, &ip)?,
        Protocol::TCP => tcp_in(table, registry, buf, &ip)?,
        other => {
            let handled = run_handlers(
                table,
                registry,
                Direction::In,
                ProtoMask::IP,
                buf,
                ip,
                None,
                (0, 0),
            );
            if handled {
                PacketResult::Aliased
            } else {
                proto_in(table, buf, &ip, u8::from(other))
            }
        }
    };

    if ip.more_frags {
        // Later fragments carry no ports; remember where this datagram
        // went so they can follow it.
        let link = table.find_fragment_in1(ip.src, ip.dst, ip.ident)?;
        let translated = from_wire(Ipv4Packet::new_unchecked(&*buf).dst_addr());
        table.set_fragment_addr(link, translated);
        return Ok(PacketResult::FoundHeaderFragment);
    }

    Ok(res)
}

fn fragment_rest_in(
    table: &mut LinkTable,
    buf: &mut [u8],
    ip: &Ipv4Meta,
) -> PacketResult {
    let original = table
        .find_fragment_in2(ip.src, ip.dst, ip.ident)
        .and_then(|id| table.fragment_addr(id));

    match original {
        Some(addr) => {
            set_ip_dst(buf, addr);
            PacketResult::Aliased
        }
        None => PacketResult::UnresolvedFragment,
    }
}

fn tcp_out(
    table: &mut LinkTable,
    registry: &HandlerRegistry,
    buf: &mut [u8],
    ip: &Ipv4Meta,
    create: bool,
) -> AliasResult<PacketResult> {
    let tcp = tcp_meta(buf, ip)?;
    let found = table.find_udp_tcp_out(
        ip.src,
        ip.dst,
        tcp.src_port,
        tcp.dst_port,
        Protocol::TCP,
        create,
    )?;
    let Some(id) = found else {
        return Ok(PacketResult::Ignored);
    };

    if let Some(link) = table.link_mut(id)
        && let Some(expire) = link.tcp_mut().and_then(|t| t.monitor_out(tcp.flags))
    {
        link.expire = expire;
    }

    run_handlers(
        table,
        registry,
        Direction::Out,
        ProtoMask::TCP,
        buf,
        *ip,
        Some(id),
        (tcp.src_port, tcp.dst_port),
    );

    // A fixup may have resized the packet.
    let ip = parse_ipv4(buf)?;
    let ep = endpoints(table, id)?;
    let seq = table
        .link(id)
        .and_then(|l| l.tcp())
        .filter(|t| t.ack_modified())
        .map(|t| t.delta_for_outgoing_seq(tcp.seq))
        .filter(|delta| *delta != 0)
        .map(|delta| tcp.seq.wrapping_add_signed(delta));

    TcpRewrite {
        src_port: Some(ep.alias_port),
        seq,
        addr_change: Some((ip.src, ep.alias)),
        ..Default::default()
    }
    .apply(&mut buf[ip.l4_start()..ip.total_len]);
    set_ip_src(buf, ep.alias);
    Ok(PacketResult::Aliased)
}

fn tcp_in(
    table: &mut LinkTable,
    registry: &HandlerRegistry,
    buf: &mut [u8],
    ip: &Ipv4Meta,
) -> AliasResult<PacketResult> {
    let tcp = tcp_meta(buf, ip)?;
    let found = table.find_udp_tcp_in(
        ip.src,
        ip.dst,
        tcp.src_port,
        tcp.dst_port,
        Protocol::TCP,
        true,
    );
    let Some(id) = found else {
        return Ok(PacketResult::Ignored);
    };

    run_handlers(
        table,
        registry,
        Direction::In,
        ProtoMask::TCP,
        buf,
        *ip,
        Some(id),
        (tcp.src_port, tcp.dst_port),
    );

    let ip = parse_ipv4(buf)?;
    let ep = endpoints(table, id)?;
    let ack = table
        .link(id)
        .and_then(|l| l.tcp())
        .filter(|t| t.ack_modified())
        .map(|t| t.delta_for_incoming_ack(tcp.ack))
        .filter(|delta| *delta != 0)
        .map(|delta| tcp.ack.wrapping_add_signed(delta.wrapping_neg()));

    let seg = &mut buf[ip.l4_start()..ip.total_len];
    TcpRewrite {
        dst_port: Some(ep.original_port),
        ack,
        addr_change: Some((ip.dst, ep.original)),
        ..Default::default()
    }
    .apply(seg);

    if ep.proxy_port.is_some() || ep.proxy_addr.is_some() {
        TcpRewrite {
            src_port: ep.proxy_port,
            addr_change: ep.proxy_addr.map(|a| (ip.src, a)),
            ..Default::default()
        }
        .apply(seg);
    }

    set_ip_dst(buf, ep.original);
    if let Some(addr) = ep.proxy_addr {
        set_ip_src(buf, addr);
    }

    if let Some(link) = table.link_mut(id)
        && let Some(expire) = link.tcp_mut().and_then(|t| t.monitor_in(tcp.flags))
    {
        link.expire = expire;
    }

    Ok(PacketResult::Aliased)
}

fn udp_out(
    table: &mut LinkTable,
    registry: &HandlerRegistry,
    buf: &mut [u8],
    ip: &Ipv4Meta,
    create: bool,
) -> AliasResult<PacketResult> {
    let (sport, dport) = udp_ports(buf, ip)?;
    let found = table.find_udp_tcp_out(
        ip.src,
        ip.dst,
        sport,
        dport,
        Protocol::UDP,
        create,
    )?;
    let Some(id) = found else {
        return Ok(PacketResult::Ignored);
    };

    run_handlers(
        table,
        registry,
        Direction::Out,
        ProtoMask::UDP,
        buf,
        *ip,
        Some(id),
        (sport, dport),
    );

    let ip = parse_ipv4(buf)?;
    let ep = endpoints(table, id)?;
    rewrite_udp(
        &mut buf[ip.l4_start()..ip.total_len],
        Some(ep.alias_port),
        None,
        Some((ip.src, ep.alias)),
    );
    set_ip_src(buf, ep.alias);
    Ok(PacketResult::Aliased)
}

fn udp_in(
    table: &mut LinkTable,
    registry: &HandlerRegistry,
    buf: &mut [u8],
    ip: &Ipv4Meta,
) -> AliasResult<PacketResult> {
    let (sport, dport) = udp_ports(buf, ip)?;
    let found =
        table.find_udp_tcp_in(ip.src, ip.dst, sport, dport, Protocol::UDP, true);
    let Some(id) = found else {
        return Ok(PacketResult::Ignored);
    };

    run_handlers(
        table,
        registry,
        Direction::In,
        ProtoMask::UDP,
        buf,
        *ip,
        Some(id),
        (sport, dport),
    );

    let ip = parse_ipv4(buf)?;
    let ep = endpoints(table, id)?;
    let seg = &mut buf[ip.l4_start()..ip.total_len];
    rewrite_udp(
        seg,
        None,
        Some(ep.original_port),
        Some((ip.dst, ep.original)),
    );

    if ep.proxy_port.is_some() || ep.proxy_addr.is_some() {
        rewrite_udp(
            seg,
            ep.proxy_port,
            None,
            ep.proxy_addr.map(|a| (ip.src, a)),
        );
    }

    set_ip_dst(buf, ep.original);
    if let Some(addr) = ep.proxy_addr {
        set_ip_src(buf, addr);
    }
    Ok(PacketResult::Aliased)
}

fn proto_out(
    table: &mut LinkTable,
    buf: &mut [u8],
    ip: &Ipv4Meta,
    proto: u8,
    create: bool,
) -> AliasResult<PacketResult> {
    if !create {
        return Ok(PacketResult::Ignored);
    }

    let Some(id) = table.find_proto_out(ip.src, ip.dst, proto) else {
        return Ok(PacketResult::Ignored);
    };
    let ep = endpoints(table, id)?;
    set_ip_src(buf, ep.alias);
    Ok(PacketResult::Aliased)
}

fn proto_in(
    table: &mut LinkTable,
    buf: &mut [u8],
    ip: &Ipv4Meta,
    proto: u8,
) -> PacketResult {
    let Some(id) = table.find_proto_in(ip.src, ip.dst, proto) else {
        return PacketResult::Ignored;
    };

    match endpoints(table, id) {
        Ok(ep) => {
            set_ip_dst(buf, ep.original);
            PacketResult::Aliased
        }
        Err(_) => PacketResult::Ignored,
    }
}

fn icmp_header(buf: &[u8], ip: &Ipv4Meta) -> AliasResult<(u8, u8, u16)> {
    let icmp = Icmpv4Packet::new_checked(&buf[ip.l4_start()..ip.total_len])
        .map_err(|e| AliasError::Malformed(format!("icmp: {e}")))?;
    let msg_type = u8::from(icmp.msg_type());
    let code = icmp.msg_code();
    // Echo and timestamp messages keep their identifier in the same
    // place.
    let ident = icmp.echo_ident();
    Ok((msg_type, code, ident))
}

fn set_icmp_ident(buf: &mut [u8], ip: &Ipv4Meta, ident: u16) {
    let mut icmp =
        Icmpv4Packet::new_unchecked(&mut buf[ip.l4_start()..ip.total_len]);
    let csum = checksum::update_u16(icmp.checksum(), icmp.echo_ident(), ident);
    icmp.set_echo_ident(ident);
    icmp.set_checksum(csum);
}

fn is_icmp_error(msg_type: u8) -> bool {
    matches!(
        msg_type,
        ICMP_UNREACH | ICMP_SOURCE_QUENCH | ICMP_TIME_EXCEEDED | ICMP_PARAM_PROBLEM
    )
}

fn is_icmp_query(msg_type: u8) -> bool {
    matches!(msg_type, ICMP_ECHO | ICMP_TIMESTAMP)
}

fn icmp_out(
    table: &mut LinkTable,
    buf: &mut [u8],
    ip: &Ipv4Meta,
    create: bool,
) -> AliasResult<PacketResult> {
    let (msg_type, code, ident) = icmp_header(buf, ip)?;

    match msg_type {
        ICMP_ECHO | ICMP_TIMESTAMP if code == 0 => {
            icmp_query_out(table, buf, ip, ident, create)
        }
        ICMP_ECHO_REPLY | ICMP_TIMESTAMP_REPLY => {
            icmp_query_out(table, buf, ip, ident, create)
        }
        t if is_icmp_error(t) => icmp_error_out(table, buf, ip),
        _ => Ok(PacketResult::Ignored),
    }
}

fn icmp_in(
    table: &mut LinkTable,
    buf: &mut [u8],
    ip: &Ipv4Meta,
) -> AliasResult<PacketResult> {
    let (msg_type, code, ident) = icmp_header(buf, ip)?;

    match msg_type {
        ICMP_ECHO_REPLY | ICMP_TIMESTAMP_REPLY if code == 0 => {
            icmp_query_in(table, buf, ip, ident)
        }
        ICMP_ECHO | ICMP_TIMESTAMP => icmp_query_in(table, buf, ip, ident),
        t if is_icmp_error(t) => icmp_error_in(table, buf, ip),
        _ => Ok(PacketResult::Ignored),
    }
}

fn icmp_query_out(
    table: &mut LinkTable,
    buf: &mut [u8],
    ip: &Ipv4Meta,
    ident: u16,
    create: bool,
) -> AliasResult<PacketResult> {
    let Some(id) = table.find_icmp_out(ip.src, ip.dst, ident, create)? else {
        return Ok(PacketResult::Ignored);
    };

    let ep = endpoints(table, id)?;
    set_icmp_ident(buf, ip, ep.alias_port);
    set_ip_src(buf, ep.alias);
    Ok(PacketResult::Aliased)
}

fn icmp_query_in(
    table: &mut LinkTable,
    buf: &mut [u8],
    ip: &Ipv4Meta,
    ident: u16,
) -> AliasResult<PacketResult> {
    let Some(id) = table.find_icmp_in(ip.src, ip.dst, ident, true) else {
        return Ok(PacketResult::Ignored);
    };

    let ep = endpoints(table, id)?;
    set_icmp_ident(buf, ip, ep.original_port);
    set_ip_dst(buf, ep.original);
    Ok(PacketResult::Aliased)
}

// The datagram quoted by an ICMP error.
struct Quoted {
    /// Offset of the quoted IP header in the buffer.
    start: usize,
    hdr_len: usize,
    proto: Protocol,
    src: Ipv4Addr,
    dst: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    /// Type and identifier of a quoted ICMP message.
    icmp_type: u8,
    icmp_ident: u16,
}

impl Quoted {
    // Offset of the quoted transport header.
    fn l4(&self) -> usize {
        self.start + self.hdr_len
    }

    // The part of the ICMP payload that gets rewritten.
    fn region(&self) -> core::ops::Range<usize> {
        self.start..self.l4() + ICMP_QUOTE_LEN
    }
}

fn quoted(buf: &[u8], ip: &Ipv4Meta) -> Option<Quoted> {
    let start = ip.l4_start() + ICMP_HDR_LEN;
    let end = ip.total_len;
    if start + IPV4_MIN_HDR_LEN > end {
        return None;
    }

    let qip = Ipv4Packet::new_unchecked(&buf[start..end]);
    let hdr_len = usize::from(qip.header_len());
    if hdr_len < IPV4_MIN_HDR_LEN || start + hdr_len + ICMP_QUOTE_LEN > end {
        return None;
    }

    let l4 = start + hdr_len;
    let word = |off: usize| u16::from_be_bytes([buf[l4 + off], buf[l4 + off + 1]]);
    Some(Quoted {
        start,
        hdr_len,
        proto: Protocol::from(qip.next_header()),
        src: from_wire(qip.src_addr()),
        dst: from_wire(qip.dst_addr()),
        src_port: word(0),
        dst_port: word(2),
        icmp_type: buf[l4],
        icmp_ident: word(4),
    })
}

// Rewrite the quoted datagram with `edit`, carrying the change into
// the outer ICMP checksum.
fn edit_quoted(
    buf: &mut [u8],
    ip: &Ipv4Meta,
    q: &Quoted,
    edit: impl FnOnce(&mut [u8]),
) {
    let before = buf[q.region()].to_vec();
    edit(buf);

    // The region starts at an even offset into the ICMP message, so
    // the one's complement words line up.
    let icmp = ip.l4_start()..ip.total_len;
    let field = Icmpv4Packet::new_unchecked(&buf[icmp.clone()]).checksum();
    let csum = checksum::update(field, &before, &buf[q.region()]);
    Icmpv4Packet::new_unchecked(&mut buf[icmp]).set_checksum(csum);
}

fn put_u16(buf: &mut [u8], at: usize, val: u16) {
    buf[at..at + 2].copy_from_slice(&val.to_be_bytes());
}

fn icmp_error_in(
    table: &mut LinkTable,
    buf: &mut [u8],
    ip: &Ipv4Meta,
) -> AliasResult<PacketResult> {
    let Some(q) = quoted(buf, ip) else {
        return Ok(PacketResult::Ignored);
    };

    // The quoted datagram is one we sent: its source is our alias.
    let found = match q.proto {
        Protocol::UDP | Protocol::TCP => table.find_udp_tcp_in(
            q.dst, q.src, q.dst_port, q.src_port, q.proto, false,
        ),
        Protocol::ICMP if is_icmp_query(q.icmp_type) => {
            table.find_icmp_in(q.dst, q.src, q.icmp_ident, false)
        }
        _ => None,
    };
    let Some(id) = found else {
        return Ok(PacketResult::Ignored);
    };

    let ep = endpoints(table, id)?;
    edit_quoted(buf, ip, &q, |buf| {
        set_ip_src(&mut buf[q.start..], ep.original);
        match q.proto {
            Protocol::ICMP => put_u16(buf, q.l4() + 4, ep.original_port),
            _ => put_u16(buf, q.l4(), ep.original_port),
        }
    });
    set_ip_dst(buf, ep.original);
    Ok(PacketResult::Aliased)
}

fn icmp_error_out(
    table: &mut LinkTable,
    buf: &mut [u8],
    ip: &Ipv4Meta,
) -> AliasResult<PacketResult> {
    let Some(q) = quoted(buf, ip) else {
        return Ok(PacketResult::Ignored);
    };

    // The quoted datagram came in to a private host from outside.
    let found = match q.proto {
        Protocol::UDP | Protocol::TCP => table.find_udp_tcp_out(
            q.dst, q.src, q.dst_port, q.src_port, q.proto, false,
        )?,
        Protocol::ICMP if is_icmp_query(q.icmp_type) => {
            table.find_icmp_out(q.dst, q.src, q.icmp_ident, false)?
        }
        _ => None,
    };
    let Some(id) = found else {
        return Ok(PacketResult::Ignored);
    };

    let ep = endpoints(table, id)?;
    edit_quoted(buf, ip, &q, |buf| {
        set_ip_dst(&mut buf[q.start..], ep.alias);
        match q.proto {
            Protocol::ICMP => put_u16(buf, q.l4() + 4, ep.alias_port),
            _ => put_u16(buf, q.l4() + 2, ep.alias_port),
        }
    });

    // Errors from the host the datagram was for give away its private
    // address.
    if ip.src == q.dst {
        set_ip_src(buf, ep.alias);
    }
    Ok(PacketResult::Aliased)
}

/// Park a fragment that arrived before its header fragment.
pub(crate) fn save_fragment(table: &mut LinkTable, buf: &[u8]) -> AliasResult<()> {
    let Some(ip) = check_ipv4(buf)? else {
        return Err(AliasError::Malformed("truncated fragment".into()));
    };

    table.add_fragment_ptr_link(ip.src, ip.ident, buf[..ip.total_len].to_vec())?;
    Ok(())
}

/// Take back a fragment parked for the datagram `header` starts.
pub(crate) fn get_fragment(
    table: &mut LinkTable,
    header: &[u8],
) -> AliasResult<Option<Vec<u8>>> {
    let Some(ip) = check_ipv4(header)? else {
        return Ok(None);
    };
    Ok(table.take_fragment_ptr(ip.src, ip.ident))
}

/// Give a parked fragment the destination its translated header
/// fragment has.
pub(crate) fn fragment_in(header: &[u8], frag: &mut [u8]) -> AliasResult<()> {
    if header.len() < IPV4_MIN_HDR_LEN || frag.len() < IPV4_MIN_HDR_LEN {
        return Err(AliasError::Malformed("short fragment".into()));
    }

    let dst = from_wire(Ipv4Packet::new_unchecked(header).dst_addr());
    set_ip_dst(frag, dst);
    Ok(())
}
