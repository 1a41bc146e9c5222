// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! FTP control channel fixup.
//!
//! FTP negotiates its data connections in-band: the client names an
//! endpoint with PORT (RFC 959) or EPRT (RFC 2428), the server with a
//! 227 or 229 reply to PASV/EPSV. When the named endpoint is behind
//! the NAT the message is rewritten to carry the alias endpoint, and a
//! link is created so the data connection finds its way back. The
//! rewritten message rarely has the original length, so the control
//! connection's sequence numbering is corrected from then on.
//!
//! An active mode PORT/EPRT arriving from outside for a server behind
//! the NAT is not rewritten; instead the outbound data link is created
//! ahead of time so the server's connection from port 20 is aliased.

use super::handler::DirMask;
use super::handler::FixupError;
use super::handler::HandlerCtx;
use super::handler::ProtoHandler;
use super::handler::ProtoMask;
use super::link::ProtoFlags;
use super::link_table::FTP_DATA_PORT;
use super::link_table::NewLink;
use super::packet::fill_tcp_checksum;
use super::packet::parse_tcp;
use super::packet::set_ip_total_len;
use crate::api::AliasError;
use crate::api::LinkId;
use crate::api::LinkType;
use crate::api::Protocol;
use std::net::Ipv4Addr;
use std::sync::Arc;

pub const FTP_CONTROL_PORT: u16 = 21;

/// Longer payloads are never parsed.
pub const MAX_MESSAGE_SIZE: usize = 128;

/// Ports below this are never accepted as a data endpoint.
const RESERVED_PORTS: u16 = 1024;

const FTP_PRIORITY: u16 = 80;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FtpMessageKind {
    /// `PORT h1,h2,h3,h4,p1,p2`
    Port,
    /// `EPRT |1|a.b.c.d|port|`
    Eprt,
    /// `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)`
    Passive,
    /// `229 Entering Extended Passive Mode (|||port|)`
    ExtPassive,
}

/// A data endpoint found in a control message.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FtpMessage {
    pub kind: FtpMessageKind,
    /// Unspecified for a 229 reply, which only carries a port.
    pub addr: Ipv4Addr,
    pub port: u16,
}

impl FtpMessage {
    /// The same message naming `addr` and `port` instead.
    pub fn render(&self, addr: Ipv4Addr, port: u16) -> String {
        let [a, b, c, d] = addr.octets();
        let [p1, p2] = port.to_be_bytes();
        match self.kind {
            FtpMessageKind::Port => {
                format!("PORT {a},{b},{c},{d},{p1},{p2}\r\n")
            }
            FtpMessageKind::Eprt => format!("EPRT |1|{a}.{b}.{c}.{d}|{port}|\r\n"),
            FtpMessageKind::Passive => format!(
                "227 Entering Passive Mode ({a},{b},{c},{d},{p1},{p2})\r\n"
            ),
            FtpMessageKind::ExtPassive => {
                format!("229 Entering Extended Passive Mode (|||{port}|)\r\n")
            }
        }
    }
}

// A forward-only reader over a control message.
struct Scanner<'a> {
    msg: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(msg: &'a [u8], pos: usize) -> Self {
        Self { msg, pos }
    }

    fn next(&mut self) -> Option<u8> {
        let ch = *self.msg.get(self.pos)?;
        self.pos += 1;
        Some(ch)
    }

    fn skip_ws(&mut self) {
        while self.msg.get(self.pos).is_some_and(|c| c.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, want: u8) -> Option<()> {
        (self.next()? == want).then_some(())
    }

    // Skip past the next `want`.
    fn seek(&mut self, want: u8) -> Option<()> {
        while self.next()? != want {}
        Some(())
    }

    // One or more digits and the byte that ended them. Running out of
    // input before the terminator is a failure.
    fn number(&mut self) -> Option<(u32, u8)> {
        let mut val = None;
        loop {
            let ch = self.next()?;
            match (ch.is_ascii_digit(), val) {
                (true, v) => {
                    let v: u32 = v.unwrap_or(0);
                    val = Some(
                        v.saturating_mul(10).saturating_add(u32::from(ch - b'0')),
                    );
                }
                (false, Some(v)) => return Some((v, ch)),
                (false, None) => return None,
            }
        }
    }

    // `n,n,n,n,n,n`: the last number may end in `last_term` as well.
    fn six_numbers(&mut self, last_term: impl Fn(u8) -> bool) -> Option<[u32; 6]> {
        let mut vals = [0u32; 6];
        for (i, v) in vals.iter_mut().enumerate() {
            let (n, term) = self.number()?;
            let ok = term == b',' || (i == 5 && last_term(term));
            if !ok {
                return None;
            }
            *v = n;
        }
        Some(vals)
    }
}

fn octet(v: u32) -> Result<u8, FixupError> {
    u8::try_from(v).map_err(|_| FixupError::MalformedEmbeddedAddress)
}

fn port(v: u32) -> Result<u16, FixupError> {
    u16::try_from(v).map_err(|_| FixupError::MalformedEmbeddedAddress)
}

fn endpoint(
    kind: FtpMessageKind,
    vals: [u32; 6],
) -> Result<FtpMessage, FixupError> {
    let addr = Ipv4Addr::new(
        octet(vals[0])?,
        octet(vals[1])?,
        octet(vals[2])?,
        octet(vals[3])?,
    );
    let port = u16::from_be_bytes([octet(vals[4])?, octet(vals[5])?]);
    Ok(FtpMessage { kind, addr, port })
}

/// Parse a `PORT` command.
pub fn parse_port(msg: &[u8]) -> Result<Option<FtpMessage>, FixupError> {
    if msg.len() < 18 || !msg[..5].eq_ignore_ascii_case(b"PORT ") {
        return Ok(None);
    }

    let mut s = Scanner::new(msg, 5);
    s.skip_ws();
    match s.six_numbers(|_| true) {
        Some(vals) => endpoint(FtpMessageKind::Port, vals).map(Some),
        None => Ok(None),
    }
}

/// Parse an `EPRT` command. Only the IPv4 form is understood.
pub fn parse_eprt(msg: &[u8]) -> Result<Option<FtpMessage>, FixupError> {
    if msg.len() < 18 || !msg[..5].eq_ignore_ascii_case(b"EPRT ") {
        return Ok(None);
    }

    let mut s = Scanner::new(msg, 5);
    let mut scan = || -> Option<([u32; 4], u32)> {
        s.skip_ws();
        let delim = s.next()?;
        s.expect(b'1')?;
        s.expect(delim)?;

        let mut addr = [0u32; 4];
        for (i, v) in addr.iter_mut().enumerate() {
            let (n, term) = s.number()?;
            if i < 3 && term != b'.' {
                return None;
            }
            *v = n;
        }

        let (p, term) = s.number()?;
        (term == delim).then_some((addr, p))
    };

    let Some((a, p)) = scan() else {
        return Ok(None);
    };

    Ok(Some(FtpMessage {
        kind: FtpMessageKind::Eprt,
        addr: Ipv4Addr::new(octet(a[0])?, octet(a[1])?, octet(a[2])?, octet(a[3])?),
        port: port(p)?,
    }))
}

/// Parse a `227` reply to PASV.
pub fn parse_227(msg: &[u8]) -> Result<Option<FtpMessage>, FixupError> {
    if msg.len() < 17 || !msg.starts_with(b"227 ") {
        return Ok(None);
    }

    let mut s = Scanner::new(msg, 4);
    let vals = s.seek(b'(').and_then(|_| s.six_numbers(|t| t == b')'));
    match vals {
        Some(vals) => endpoint(FtpMessageKind::Passive, vals).map(Some),
        None => Ok(None),
    }
}

/// Parse a `229` reply to EPSV. The address is left unspecified.
pub fn parse_229(msg: &[u8]) -> Result<Option<FtpMessage>, FixupError> {
    if msg.len() < 11 || !msg.starts_with(b"229 ") {
        return Ok(None);
    }

    let mut s = Scanner::new(msg, 4);
    let mut scan = || -> Option<u32> {
        s.seek(b'(')?;
        let delim = s.next()?;
        s.expect(delim)?;
        s.expect(delim)?;
        let (p, term) = s.number()?;
        if term != delim {
            return None;
        }
        s.expect(b')')?;
        Some(p)
    };

    match scan() {
        Some(p) => Ok(Some(FtpMessage {
            kind: FtpMessageKind::ExtPassive,
            addr: Ipv4Addr::UNSPECIFIED,
            port: port(p)?,
        })),
        None => Ok(None),
    }
}

// Where the payload of the control segment is.
struct Segment {
    /// IP plus TCP header length.
    hlen: usize,
    dlen: usize,
    seq: u32,
}

fn segment(ctx: &HandlerCtx) -> Option<Segment> {
    let ip = &ctx.ip;
    let tcp = parse_tcp(&ctx.buf[ip.l4_start()..ip.total_len])?;
    let hlen = ip.hdr_len + tcp.hdr_len;
    let dlen = ip.total_len.checked_sub(hlen)?;
    Some(Segment { hlen, dlen, seq: tcp.seq })
}

fn waiting_for_crlf(ctx: &HandlerCtx, link: LinkId) -> bool {
    ctx.table
        .link(link)
        .is_some_and(|l| l.pflags().contains(ProtoFlags::WAIT_CRLF))
}

// Remember whether the control stream is in the middle of a line, in
// which case the next segment cannot start a command.
fn track_crlf(ctx: &mut HandlerCtx, link: LinkId, dlen: usize) {
    if dlen == 0 {
        return;
    }

    let end = ctx.ip.total_len;
    let complete = end >= 2 && &ctx.buf[end - 2..end] == b"\r\n";
    if let Some(l) = ctx.table.link_mut(link) {
        l.pflags.set(ProtoFlags::WAIT_CRLF, !complete);
    }
}

fn ftp_fingerprint(ctx: &HandlerCtx) -> bool {
    ctx.link.is_some()
        && (ctx.src_port == FTP_CONTROL_PORT || ctx.dst_port == FTP_CONTROL_PORT)
}

// Alias the data endpoint of an outbound control message.
fn rewrite_message(
    ctx: &mut HandlerCtx,
    control: LinkId,
    seg: &Segment,
    msg: FtpMessage,
) -> Result<(), FixupError> {
    // Only endpoints of the sender itself, and never a reserved port.
    if msg.addr != ctx.ip.src || msg.port < RESERVED_PORTS {
        return Ok(());
    }

    let table = &mut *ctx.table;
    let (remote, alias) = match table.link(control) {
        Some(l) => (l.dst_addr(), table.alias_addr_of(l)),
        None => return Err(AliasError::NoSuchLink(control).into()),
    };

    // A retransmitted message must name the same alias port again.
    let existing =
        table.find_link_out(msg.addr, remote, msg.port, 0, LinkType::Tcp, true);
    let created = existing.is_none();
    let data = match existing {
        Some(data) => data,
        None => {
            let data = table.add_link(NewLink {
                src_addr: msg.addr,
                src_port: msg.port,
                dst_addr: remote,
                dst_port: 0,
                alias_addr: alias,
                alias_port: None,
                link_type: LinkType::Tcp,
            })?;
            table.punch_fw_hole(data);
            data
        }
    };

    let alias_port = match table.link(data) {
        Some(l) => l.alias_port(),
        None => return Err(AliasError::NoSuchLink(data).into()),
    };

    let text = msg.render(alias, alias_port);
    let slen = text.len();
    let new_len = seg.hlen + slen;
    let fits = new_len <= ctx.buf.len() && u16::try_from(new_len).is_ok();
    if !fits {
        if created {
            table.delete_link(data, true);
        }
        return Err(AliasError::BufferTooSmall.into());
    }

    ctx.buf[seg.hlen..new_len].copy_from_slice(text.as_bytes());

    if let Some(t) = table.link_mut(control).and_then(|l| l.tcp_mut()) {
        t.set_ack_modified();
        let delta = t.delta_for_outgoing_seq(seg.seq) + slen as i32
            - seg.dlen as i32;
        t.add_seq(delta, seg.seq, seg.dlen as u32);
    }

    set_ip_total_len(ctx.buf, new_len as u16);
    ctx.ip.total_len = new_len;
    fill_tcp_checksum(ctx.buf, &ctx.ip);
    Ok(())
}

/// Rewrites PORT/EPRT from clients and 227/229 from servers behind the
/// NAT.
pub struct FtpOut;

impl ProtoHandler for FtpOut {
    fn name(&self) -> &str {
        "ftp-out"
    }

    fn priority(&self) -> u16 {
        FTP_PRIORITY
    }

    fn dir(&self) -> DirMask {
        DirMask::OUT
    }

    fn proto(&self) -> ProtoMask {
        ProtoMask::TCP
    }

    fn fingerprint(&self, ctx: &HandlerCtx) -> bool {
        ftp_fingerprint(ctx)
    }

    fn apply(&self, ctx: &mut HandlerCtx) -> Result<(), FixupError> {
        let Some(link) = ctx.link else {
            return Err(FixupError::UnrecognizedProtocolMessage);
        };
        let Some(seg) = segment(ctx) else {
            return Err(FixupError::UnrecognizedProtocolMessage);
        };

        let mut res = Err(FixupError::UnrecognizedProtocolMessage);
        if seg.dlen <= MAX_MESSAGE_SIZE && !waiting_for_crlf(ctx, link) {
            let payload = &ctx.buf[seg.hlen..seg.hlen + seg.dlen];
            let parsed = if ctx.dst_port == FTP_CONTROL_PORT {
                parse_port(payload).and_then(|m| match m {
                    Some(m) => Ok(Some(m)),
                    None => parse_eprt(payload),
                })
            } else if ctx.src_port == FTP_CONTROL_PORT {
                parse_227(payload).and_then(|m| match m {
                    Some(m) => Ok(Some(m)),
                    None => parse_229(payload)
                        .map(|m| m.map(|m| FtpMessage { addr: ctx.ip.src, ..m })),
                })
            } else {
                Ok(None)
            };

            res = match parsed {
                Ok(Some(msg)) => rewrite_message(ctx, link, &seg, msg),
                Ok(None) => Err(FixupError::UnrecognizedProtocolMessage),
                Err(e) => Err(e),
            };
        }

        track_crlf(ctx, link, seg.dlen);
        res
    }
}

/// Prepares the data link for active mode requests to servers behind
/// the NAT.
pub struct FtpIn;

impl ProtoHandler for FtpIn {
    fn name(&self) -> &str {
        "ftp-in"
    }

    fn priority(&self) -> u16 {
        FTP_PRIORITY
    }

    fn dir(&self) -> DirMask {
        DirMask::IN
    }

    fn proto(&self) -> ProtoMask {
        ProtoMask::TCP
    }

    fn fingerprint(&self, ctx: &HandlerCtx) -> bool {
        ftp_fingerprint(ctx)
    }

    fn apply(&self, ctx: &mut HandlerCtx) -> Result<(), FixupError> {
        let Some(link) = ctx.link else {
            return Err(FixupError::UnrecognizedProtocolMessage);
        };
        let Some(seg) = segment(ctx) else {
            return Err(FixupError::UnrecognizedProtocolMessage);
        };

        let mut res = Err(FixupError::UnrecognizedProtocolMessage);
        if seg.dlen <= MAX_MESSAGE_SIZE
            && !waiting_for_crlf(ctx, link)
            && ctx.dst_port == FTP_CONTROL_PORT
        {
            let payload = &ctx.buf[seg.hlen..seg.hlen + seg.dlen];
            let parsed = parse_port(payload).and_then(|m| match m {
                Some(m) => Ok(Some(m)),
                None => parse_eprt(payload),
            });

            res = match parsed {
                Ok(Some(msg)) => open_active_data(ctx, link, msg),
                Ok(None) => Err(FixupError::UnrecognizedProtocolMessage),
                Err(e) => Err(e),
            };
        }

        track_crlf(ctx, link, seg.dlen);
        res
    }
}

// The server behind the NAT will connect from port 20 to the endpoint
// the client named; make sure that connection gets aliased.
fn open_active_data(
    ctx: &mut HandlerCtx,
    control: LinkId,
    msg: FtpMessage,
) -> Result<(), FixupError> {
    let table = &mut *ctx.table;
    let server = match table.link(control) {
        Some(l) => table.original_addr_of(l),
        None => return Err(AliasError::NoSuchLink(control).into()),
    };

    let data = table.find_udp_tcp_out(
        server,
        msg.addr,
        FTP_DATA_PORT,
        msg.port,
        Protocol::TCP,
        true,
    )?;
    if let Some(data) = data {
        table.punch_fw_hole(data);
    }
    Ok(())
}

/// The stock FTP handlers.
pub fn handlers() -> Vec<Arc<dyn ProtoHandler>> {
    vec![Arc::new(FtpOut), Arc::new(FtpIn)]
}
