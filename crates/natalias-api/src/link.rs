// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use super::ModeFlags;
use super::Protocol;
use core::fmt;
use core::fmt::Display;
use serde::Deserialize;
use serde::Serialize;
use std::net::Ipv4Addr;

/// Default lifetime of an ICMP echo/timestamp link, in seconds.
pub const ICMP_EXPIRE_TIME: u64 = 60;
/// Default lifetime of a UDP link, in seconds.
pub const UDP_EXPIRE_TIME: u64 = 60;
/// Default lifetime of a generic IP protocol link, in seconds.
pub const PROTO_EXPIRE_TIME: u64 = 60;
/// Lifetime of a fragment-by-id link, in seconds.
pub const FRAGMENT_ID_EXPIRE_TIME: u64 = 10;
/// Lifetime of a parked fragment, in seconds.
pub const FRAGMENT_PTR_EXPIRE_TIME: u64 = 30;

/// TCP connection not yet established on both sides.
pub const TCP_EXPIRE_INITIAL: u64 = 300;
/// Both sides of the TCP connection are established.
pub const TCP_EXPIRE_CONNECTED: u64 = 86400;
/// One side closed before the other ever connected.
pub const TCP_EXPIRE_DEAD: u64 = 10;
/// One side closed after the other reached the connected state.
pub const TCP_EXPIRE_SINGLEDEAD: u64 = 90;

/// The kind of flow a link tracks.
///
/// The order of the variants is part of the outbound index order, so
/// it must not be shuffled.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd,
    Serialize,
)]
pub enum LinkType {
    Icmp,
    Udp,
    Tcp,
    /// Address-only translation (static NAT).
    Addr,
    FragmentId,
    FragmentPtr,
    Pptp,
    /// Address-only translation of some other IP protocol.
    Proto(u8),
}

impl LinkType {
    /// Map an IP protocol onto the link type that tracks it.
    pub fn for_proto(proto: Protocol) -> Self {
        match proto {
            Protocol::ICMP => Self::Icmp,
            Protocol::TCP => Self::Tcp,
            Protocol::UDP => Self::Udp,
            other => Self::Proto(u8::from(other)),
        }
    }

    /// The expire duration a freshly created link of this type gets,
    /// or `None` if the type never times out on its own.
    pub const fn default_expire(&self) -> Option<u64> {
        match self {
            Self::Icmp => Some(ICMP_EXPIRE_TIME),
            Self::Udp => Some(UDP_EXPIRE_TIME),
            Self::Tcp => Some(TCP_EXPIRE_INITIAL),
            Self::FragmentId => Some(FRAGMENT_ID_EXPIRE_TIME),
            Self::FragmentPtr => Some(FRAGMENT_PTR_EXPIRE_TIME),
            Self::Proto(_) => Some(PROTO_EXPIRE_TIME),
            Self::Addr | Self::Pptp => None,
        }
    }

    /// Is this a transport link whose alias port is a real port
    /// number?
    pub const fn is_udp_tcp(&self) -> bool {
        matches!(self, Self::Udp | Self::Tcp)
    }
}

impl Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Icmp => write!(f, "ICMP"),
            Self::Udp => write!(f, "UDP"),
            Self::Tcp => write!(f, "TCP"),
            Self::Addr => write!(f, "ADDR"),
            Self::FragmentId => write!(f, "FRAG_ID"),
            Self::FragmentPtr => write!(f, "FRAG_PTR"),
            Self::Pptp => write!(f, "PPTP"),
            Self::Proto(p) => write!(f, "PROTO({p})"),
        }
    }
}

/// A handle naming one link inside one engine instance.
///
/// Handles are never reused for the lifetime of an instance, so a
/// stale handle simply fails to resolve.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd,
    Serialize,
)]
pub struct LinkId(pub u64);

impl Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How long a link should live.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Expire {
    /// Delete the link right away, permanent or not.
    Now,
    /// Make the link permanent.
    Never,
    /// Expire after this many idle seconds.
    After(u64),
}

/// A snapshot of one link, as reported to callers.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct LinkInfo {
    pub id: LinkId,
    pub link_type: LinkType,
    pub original_addr: Ipv4Addr,
    pub original_port: u16,
    pub dst_addr: Ipv4Addr,
    pub dst_port: u16,
    pub alias_addr: Ipv4Addr,
    pub alias_port: u16,
    pub proxy_addr: Option<Ipv4Addr>,
    pub proxy_port: Option<u16>,
    pub permanent: bool,
    pub partial: bool,
    /// Idle timeout in seconds.
    pub expire_secs: u64,
    /// Milliseconds since the link was last used.
    pub idle_ms: u64,
    /// Number of LSNAT servers attached.
    pub servers: usize,
}

/// Everything an instance knows, for display.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct LinkDump {
    pub alias_addr: Ipv4Addr,
    pub target_addr: Ipv4Addr,
    pub mode: ModeFlags,
    pub port_lower: u16,
    pub port_len: u32,
    pub counts: LinkCounts,
    pub links: Vec<LinkInfo>,
}

/// Per-type link counters for one engine instance.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct LinkCounts {
    pub icmp: u32,
    pub udp: u32,
    pub tcp: u32,
    pub pptp: u32,
    pub proto: u32,
    pub frag_id: u32,
    pub frag_ptr: u32,
    /// Host sockets currently held to reserve alias ports.
    pub sockets: u32,
}

impl LinkCounts {
    pub fn total(&self) -> u32 {
        self.icmp
            + self.udp
            + self.tcp
            + self.pptp
            + self.proto
            + self.frag_id
            + self.frag_ptr
    }

    fn slot(&mut self, lt: LinkType) -> &mut u32 {
        match lt {
            LinkType::Icmp => &mut self.icmp,
            LinkType::Udp => &mut self.udp,
            LinkType::Tcp => &mut self.tcp,
            LinkType::Pptp => &mut self.pptp,
            LinkType::FragmentId => &mut self.frag_id,
            LinkType::FragmentPtr => &mut self.frag_ptr,
            LinkType::Addr | LinkType::Proto(_) => &mut self.proto,
        }
    }

    pub fn incr(&mut self, lt: LinkType) {
        *self.slot(lt) += 1;
    }

    pub fn decr(&mut self, lt: LinkType) {
        let slot = self.slot(lt);
        debug_assert!(*slot > 0, "link counter underflow for {lt}");
        *slot = slot.saturating_sub(1);
    }

    /// The count of the links housekeeping cares about.
    pub fn udp_tcp(&self) -> u32 {
        self.udp + self.tcp
    }
}

impl Display for LinkCounts {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "icmp={}, udp={}, tcp={}, pptp={}, proto={}, frag_id={} \
             frag_ptr={} / tot={} (sock={})",
            self.icmp,
            self.udp,
            self.tcp,
            self.pptp,
            self.proto,
            self.frag_id,
            self.frag_ptr,
            self.total(),
            self.sockets,
        )
    }
}
