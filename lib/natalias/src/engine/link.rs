// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! A single translated flow.

use super::tcp_state::TcpTracker;
use crate::api::LinkId;
use crate::api::LinkInfo;
use crate::api::LinkType;
use crate::time::Moment;
use bitflags::bitflags;
use std::io;
use std::net::Ipv4Addr;
use std::net::SocketAddrV4;
use std::net::TcpListener;
use std::net::UdpSocket;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct LinkFlags: u8 {
        const UNKNOWN_DEST_ADDR = 0x01;
        const UNKNOWN_DEST_PORT = 0x02;
        const PERMANENT = 0x04;
        /// Never punch a firewall hole for this link.
        const UNFIREWALLED = 0x08;

        const PARTIALLY_SPECIFIED =
            Self::UNKNOWN_DEST_ADDR.bits() | Self::UNKNOWN_DEST_PORT.bits();
    }
}

impl LinkFlags {
    /// The "unknown" flags implied by a destination.
    pub fn for_dest(dst_addr: Ipv4Addr, dst_port: u16) -> Self {
        let mut flags = Self::empty();
        if dst_addr.is_unspecified() {
            flags |= Self::UNKNOWN_DEST_ADDR;
        }
        if dst_port == 0 {
            flags |= Self::UNKNOWN_DEST_PORT;
        }
        flags
    }
}

bitflags! {
    /// State kept on behalf of protocol fixups.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct ProtoFlags: u8 {
        /// The last payload seen did not end in CRLF.
        const WAIT_CRLF = 0x01;
    }
}

/// Link-type specific state.
#[derive(Debug, Default)]
pub enum LinkAux {
    #[default]
    None,
    Tcp(Box<TcpTracker>),
    /// The original destination of the fragmented datagram.
    FragAddr(Ipv4Addr),
    /// A parked fragment.
    FragPtr(Option<Vec<u8>>),
}

/// Private endpoints an LSNAT link hands new flows to, in turn.
#[derive(Clone, Debug, Default)]
pub struct ServerPool {
    servers: Vec<SocketAddrV4>,
    cursor: usize,
}

impl ServerPool {
    pub fn push(&mut self, server: SocketAddrV4) {
        self.servers.push(server);
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    /// Take the server under the cursor and move the cursor on.
    pub fn next_server(&mut self) -> Option<SocketAddrV4> {
        if self.servers.is_empty() {
            return None;
        }

        let server = self.servers[self.cursor];
        self.cursor = (self.cursor + 1) % self.servers.len();
        Some(server)
    }
}

/// A host socket held to keep the host stack off an alias port.
#[derive(Debug)]
pub enum Reservation {
    Tcp(TcpListener),
    Udp(UdpSocket),
}

impl Reservation {
    pub fn bind(link_type: LinkType, port: u16) -> io::Result<Self> {
        let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
        match link_type {
            LinkType::Tcp => Ok(Self::Tcp(TcpListener::bind(addr)?)),
            _ => Ok(Self::Udp(UdpSocket::bind(addr)?)),
        }
    }
}

/// The key of the outbound index. Field order is the comparison order.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct OutKey {
    pub src_port: u16,
    pub src_addr: Ipv4Addr,
    pub dst_addr: Ipv4Addr,
    pub dst_port: u16,
    pub link_type: LinkType,
}

/// The key of an alias group.
pub type GroupKey = (Ipv4Addr, u16, LinkType);

#[derive(Debug)]
pub struct Link {
    pub(crate) id: LinkId,
    pub(crate) link_type: LinkType,
    /// The private endpoint.
    pub(crate) src_addr: Ipv4Addr,
    pub(crate) src_port: u16,
    /// The remote endpoint.
    pub(crate) dst_addr: Ipv4Addr,
    pub(crate) dst_port: u16,
    /// The public endpoint standing in for the private one.
    pub(crate) alias_addr: Ipv4Addr,
    pub(crate) alias_port: u16,
    pub(crate) proxy_addr: Option<Ipv4Addr>,
    pub(crate) proxy_port: Option<u16>,
    pub(crate) flags: LinkFlags,
    pub(crate) pflags: ProtoFlags,
    pub(crate) timestamp: Moment,
    /// Idle seconds allowed before the link may be swept.
    pub(crate) expire: u64,
    pub(crate) aux: LinkAux,
    pub(crate) servers: Option<ServerPool>,
    pub(crate) reservation: Option<Reservation>,
    /// Position in the expiration queue.
    pub(crate) queue_seq: u64,
}

impl Link {
    pub fn id(&self) -> LinkId {
        self.id
    }

    pub fn link_type(&self) -> LinkType {
        self.link_type
    }

    pub fn original_addr(&self) -> Ipv4Addr {
        self.src_addr
    }

    pub fn original_port(&self) -> u16 {
        self.src_port
    }

    pub fn dst_addr(&self) -> Ipv4Addr {
        self.dst_addr
    }

    pub fn dst_port(&self) -> u16 {
        self.dst_port
    }

    pub fn alias_port(&self) -> u16 {
        self.alias_port
    }

    pub fn is_permanent(&self) -> bool {
        self.flags.contains(LinkFlags::PERMANENT)
    }

    pub fn is_partial(&self) -> bool {
        self.flags.intersects(LinkFlags::PARTIALLY_SPECIFIED)
    }

    pub fn pflags(&self) -> ProtoFlags {
        self.pflags
    }

    pub fn tcp(&self) -> Option<&TcpTracker> {
        match &self.aux {
            LinkAux::Tcp(t) => Some(t),
            _ => None,
        }
    }

    pub fn tcp_mut(&mut self) -> Option<&mut TcpTracker> {
        match &mut self.aux {
            LinkAux::Tcp(t) => Some(t),
            _ => None,
        }
    }

    pub(crate) fn out_key(&self) -> OutKey {
        OutKey {
            src_port: self.src_port,
            src_addr: self.src_addr,
            dst_addr: self.dst_addr,
            dst_port: self.dst_port,
            link_type: self.link_type,
        }
    }

    pub(crate) fn group_key(&self) -> GroupKey {
        (self.alias_addr, self.alias_port, self.link_type)
    }

    /// Snapshot the link. `alias` and `original` are the addresses
    /// after substituting the instance default for `0.0.0.0`.
    pub(crate) fn info(
        &self,
        now: Moment,
        alias: Ipv4Addr,
        original: Ipv4Addr,
    ) -> LinkInfo {
        LinkInfo {
            id: self.id,
            link_type: self.link_type,
            original_addr: original,
            original_port: self.src_port,
            dst_addr: self.dst_addr,
            dst_port: self.dst_port,
            alias_addr: alias,
            alias_port: self.alias_port,
            proxy_addr: self.proxy_addr,
            proxy_port: self.proxy_port,
            permanent: self.is_permanent(),
            partial: self.is_partial(),
            expire_secs: self.expire,
            idle_ms: now.delta_as_millis(self.timestamp),
            servers: self.servers.as_ref().map(|s| s.len()).unwrap_or(0),
        }
    }
}
