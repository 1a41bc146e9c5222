// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The link table.
//!
//! Every link is owned by a single map keyed by [`LinkId`]. Three
//! further structures hold ids only:
//!
//! * The outbound index, ordered by [`OutKey`]: source port, source
//!   address, destination address, destination port, link type.
//!
//! * The alias groups, keyed by (alias address, alias port, link
//!   type), each with a "full" list for links whose destination is
//!   known and a "partial" list for the rest. Newer links go to the
//!   front of their list.
//!
//! * The expiration queue, in order of last use.
//!
//! A link is in all three or in none of them. Housekeeping inspects
//! the head of the expiration queue, one link per packet.

use super::firewall::FwHoles;
use super::link::GroupKey;
use super::link::Link;
use super::link::LinkAux;
use super::link::LinkFlags;
use super::link::OutKey;
use super::link::Reservation;
use super::link::ServerPool;
use super::nat::NatConfig;
use super::port_alloc::PortAllocator;
use crate::api::ANY_ADDR;
use crate::api::AliasError;
use crate::api::AliasResult;
use crate::api::Expire;
use crate::api::LinkCounts;
use crate::api::LinkDump;
use crate::api::LinkId;
use crate::api::LinkInfo;
use crate::api::LinkType;
use crate::api::ModeFlags;
use crate::api::Protocol;
use crate::provider::LogLevel;
use crate::provider::Providers;
use crate::time::Moment;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::net::SocketAddrV4;

/// Packets between clock samples until the packet rate is known.
const INITIAL_PACKET_LIMIT: u32 = 1000;

/// Port 20, the active mode FTP data port.
pub const FTP_DATA_PORT: u16 = 20;

#[derive(Debug, Default)]
struct AliasGroup {
    full: VecDeque<LinkId>,
    partial: VecDeque<LinkId>,
}

impl AliasGroup {
    fn is_empty(&self) -> bool {
        self.full.is_empty() && self.partial.is_empty()
    }

    fn iter(&self) -> impl Iterator<Item = &LinkId> {
        self.full.iter().chain(self.partial.iter())
    }
}

/// The identity of a link about to be created.
///
/// `0.0.0.0` as the destination address and `0` as the destination
/// port mean "not known yet". `0.0.0.0` as the source or alias
/// address means "the instance default".
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NewLink {
    pub src_addr: Ipv4Addr,
    pub src_port: u16,
    pub dst_addr: Ipv4Addr,
    pub dst_port: u16,
    pub alias_addr: Ipv4Addr,
    /// `None` asks for a port from the allocator.
    pub alias_port: Option<u16>,
    pub link_type: LinkType,
}

// Throttled clock sampling.
struct Sampler {
    packets: u32,
    limit: u32,
}

pub struct LinkTable {
    links: BTreeMap<LinkId, Link>,
    out_index: BTreeSet<(OutKey, LinkId)>,
    groups: BTreeMap<GroupKey, AliasGroup>,
    queue: BTreeMap<u64, LinkId>,
    next_id: u64,
    next_seq: u64,
    ports: PortAllocator,
    fw: FwHoles,
    mode: ModeFlags,
    alias_addr: Ipv4Addr,
    target_addr: Ipv4Addr,
    counts: LinkCounts,
    providers: Providers,
    now: Moment,
    sampler: Sampler,
}

impl LinkTable {
    pub fn new(cfg: &NatConfig, providers: Providers) -> AliasResult<Self> {
        let mut ports = PortAllocator::new(cfg.seed);
        ports.set_range(cfg.port_lower, cfg.port_len)?;
        let now = providers.clock.now();

        Ok(Self {
            links: BTreeMap::new(),
            out_index: BTreeSet::new(),
            groups: BTreeMap::new(),
            queue: BTreeMap::new(),
            next_id: 1,
            next_seq: 0,
            ports,
            fw: FwHoles::default(),
            mode: cfg.mode,
            alias_addr: cfg.alias_addr,
            target_addr: cfg.target_addr,
            counts: LinkCounts::default(),
            providers,
            now,
            sampler: Sampler { packets: 0, limit: INITIAL_PACKET_LIMIT },
        })
    }

    pub fn log(&self, level: LogLevel, msg: &str) {
        self.providers.log.log(level, msg);
    }

    fn log_counts(&self) {
        if self.mode.contains(ModeFlags::LOG) {
            self.log(LogLevel::Note, &self.counts.to_string());
        }
    }

    /// The time as of the last clock sample.
    pub fn now(&self) -> Moment {
        self.now
    }

    pub fn mode(&self) -> ModeFlags {
        self.mode
    }

    pub(crate) fn set_mode(&mut self, mode: ModeFlags) {
        self.mode = mode;
    }

    pub fn alias_addr(&self) -> Ipv4Addr {
        self.alias_addr
    }

    pub(crate) fn set_alias_addr(&mut self, addr: Ipv4Addr) {
        self.alias_addr = addr;
    }

    pub fn target_addr(&self) -> Ipv4Addr {
        self.target_addr
    }

    pub(crate) fn set_target_addr(&mut self, addr: Ipv4Addr) {
        self.target_addr = addr;
    }

    pub fn ports(&mut self) -> &mut PortAllocator {
        &mut self.ports
    }

    pub fn fw(&mut self) -> &mut FwHoles {
        &mut self.fw
    }

    pub fn counts(&self) -> LinkCounts {
        self.counts
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(&id)
    }

    pub fn link_mut(&mut self, id: LinkId) -> Option<&mut Link> {
        self.links.get_mut(&id)
    }

    fn get(&self, id: LinkId) -> AliasResult<&Link> {
        self.links.get(&id).ok_or(AliasError::NoSuchLink(id))
    }

    fn get_mut(&mut self, id: LinkId) -> AliasResult<&mut Link> {
        self.links.get_mut(&id).ok_or(AliasError::NoSuchLink(id))
    }

    /// The public address of `link`.
    pub fn alias_addr_of(&self, link: &Link) -> Ipv4Addr {
        if link.alias_addr.is_unspecified() {
            self.alias_addr
        } else {
            link.alias_addr
        }
    }

    /// The private address of `link`.
    pub fn original_addr_of(&self, link: &Link) -> Ipv4Addr {
        if link.src_addr.is_unspecified() {
            self.alias_addr
        } else {
            link.src_addr
        }
    }

    fn next_queue_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    // Move a link to the tail of the expiration queue.
    fn requeue(&mut self, id: LinkId) {
        let seq = self.next_queue_seq();
        if let Some(link) = self.links.get_mut(&id) {
            self.queue.remove(&link.queue_seq);
            link.queue_seq = seq;
            self.queue.insert(seq, id);
        }
    }

    fn is_expired(&self, link: &Link) -> bool {
        self.now.delta_as_secs(link.timestamp) > link.expire
    }

    // Delete the link if it outlived its expire time, requeue it at
    // the tail otherwise. Returns whether the link survived.
    fn cleanup_link(&mut self, id: LinkId) -> bool {
        let Some(link) = self.links.get(&id) else {
            return false;
        };

        if self.is_expired(link) && self.delete_link(id, false) {
            return false;
        }

        self.requeue(id);
        true
    }

    // Mark a link as just used.
    fn use_link(&mut self, id: LinkId) -> Option<LinkId> {
        if !self.cleanup_link(id) {
            return None;
        }

        let now = self.now;
        if let Some(link) = self.links.get_mut(&id) {
            link.timestamp = now;
        }
        Some(id)
    }

    // Does some link in the group already go to this destination?
    fn dest_taken(
        groups: &BTreeMap<GroupKey, AliasGroup>,
        links: &BTreeMap<LinkId, Link>,
        key: GroupKey,
        dst_addr: Ipv4Addr,
        dst_port: u16,
    ) -> bool {
        groups.get(&key).is_some_and(|grp| {
            grp.iter()
                .filter_map(|id| links.get(id))
                .any(|l| l.dst_addr == dst_addr && l.dst_port == dst_port)
        })
    }

    fn new_alias_port(
        &mut self,
        new: &NewLink,
        partial: bool,
        reservation: &mut Option<Reservation>,
    ) -> AliasResult<u16> {
        let preferred =
            self.mode.contains(ModeFlags::SAME_PORTS).then_some(new.src_port);
        let use_sockets = self.mode.contains(ModeFlags::USE_SOCKETS)
            && partial
            && new.link_type.is_udp_tcp();
        let Self { ports, groups, links, .. } = self;

        ports.allocate(preferred, |port| {
            let key = (new.alias_addr, port, new.link_type);
            if Self::dest_taken(groups, links, key, new.dst_addr, new.dst_port)
            {
                return false;
            }

            if use_sockets {
                match Reservation::bind(new.link_type, port) {
                    Ok(r) => *reservation = Some(r),
                    Err(_) => return false,
                }
            }

            true
        })
    }

    /// Create a link and enter it into every index.
    pub fn add_link(&mut self, new: NewLink) -> AliasResult<LinkId> {
        let mut flags = LinkFlags::for_dest(new.dst_addr, new.dst_port);
        let partial = flags.intersects(LinkFlags::PARTIALLY_SPECIFIED);
        let mut reservation = None;

        let alias_port = match new.alias_port {
            Some(port) => port,
            None => self.new_alias_port(&new, partial, &mut reservation)?,
        };

        let expire = match new.link_type.default_expire() {
            Some(secs) => secs,
            None => {
                flags |= LinkFlags::PERMANENT;
                0
            }
        };

        let aux = match new.link_type {
            LinkType::Tcp => LinkAux::Tcp(Box::default()),
            LinkType::FragmentId => LinkAux::FragAddr(ANY_ADDR),
            LinkType::FragmentPtr => LinkAux::FragPtr(None),
            _ => LinkAux::None,
        };

        let id = LinkId(self.next_id);
        self.next_id += 1;
        let queue_seq = self.next_queue_seq();

        let link = Link {
            id,
            link_type: new.link_type,
            src_addr: new.src_addr,
            src_port: new.src_port,
            dst_addr: new.dst_addr,
            dst_port: new.dst_port,
            alias_addr: new.alias_addr,
            alias_port,
            proxy_addr: None,
            proxy_port: None,
            flags,
            pflags: Default::default(),
            timestamp: self.now,
            expire,
            aux,
            servers: None,
            reservation,
            queue_seq,
        };

        self.out_index.insert((link.out_key(), id));
        let grp = self.groups.entry(link.group_key()).or_default();
        if partial {
            grp.partial.push_front(id);
        } else {
            grp.full.push_front(id);
        }
        self.queue.insert(queue_seq, id);

        if link.reservation.is_some() {
            self.counts.sockets += 1;
        }
        self.counts.incr(link.link_type);
        self.links.insert(id, link);
        self.log_counts();
        Ok(id)
    }

    /// Delete a link. Permanent links are left alone unless `force` is
    /// set. Returns whether the link was deleted.
    pub fn delete_link(&mut self, id: LinkId, force: bool) -> bool {
        match self.links.get(&id) {
            None => return false,
            Some(l) if l.is_permanent() && !force => return false,
            _ => {}
        }

        let Some(mut link) = self.links.remove(&id) else {
            return false;
        };

        if let Some(slot) = link.tcp_mut().and_then(|t| t.fw_slot.take()) {
            self.fw.close(slot);
        }

        let indexed = self.out_index.remove(&(link.out_key(), id));
        debug_assert!(indexed, "link {id} missing from outbound index");

        let key = link.group_key();
        match self.groups.get_mut(&key) {
            Some(grp) => {
                let list =
                    if link.is_partial() { &mut grp.partial } else { &mut grp.full };
                let before = list.len();
                list.retain(|l| *l != id);
                debug_assert_eq!(before, list.len() + 1, "link {id} group");

                if grp.is_empty() {
                    self.groups.remove(&key);
                }
            }

            None => debug_assert!(false, "link {id} has no alias group"),
        }

        let queued = self.queue.remove(&link.queue_seq);
        debug_assert_eq!(queued, Some(id), "link {id} expiration queue");

        if link.reservation.take().is_some() {
            self.counts.sockets = self.counts.sockets.saturating_sub(1);
        }
        self.counts.decr(link.link_type);
        self.log_counts();
        true
    }

    /// Replace `old` with a link for `new`, carrying over any firewall
    /// hole. The old link goes away unless it is permanent.
    pub fn relink(&mut self, old: LinkId, new: NewLink) -> AliasResult<LinkId> {
        let had_hole = self
            .links
            .get(&old)
            .and_then(|l| l.tcp())
            .is_some_and(|t| t.fw_slot.is_some());

        let res = self.add_link(new);
        if let Ok(id) = res
            && had_hole
        {
            self.punch_fw_hole(id);
        }
        self.delete_link(old, false);
        res
    }

    fn find_out_exact(
        &mut self,
        src_addr: Ipv4Addr,
        dst_addr: Ipv4Addr,
        src_port: u16,
        dst_port: u16,
        link_type: LinkType,
    ) -> Option<LinkId> {
        let key = OutKey { src_port, src_addr, dst_addr, dst_port, link_type };
        let (_, id) = self
            .out_index
            .range((key, LinkId(0))..=(key, LinkId(u64::MAX)))
            .next_back()?;
        self.use_link(*id)
    }

    fn find_out(
        &mut self,
        src_addr: Ipv4Addr,
        dst_addr: Ipv4Addr,
        src_port: u16,
        dst_port: u16,
        link_type: LinkType,
        replace_partial: bool,
    ) -> Option<LinkId> {
        if let Some(id) =
            self.find_out_exact(src_addr, dst_addr, src_port, dst_port, link_type)
        {
            return Some(id);
        }

        let mut found = None;
        if dst_port != 0 && !dst_addr.is_unspecified() {
            found = self
                .find_out_exact(src_addr, dst_addr, src_port, 0, link_type)
                .or_else(|| {
                    self.find_out_exact(
                        src_addr, ANY_ADDR, src_port, dst_port, link_type,
                    )
                });
        }

        if found.is_none() && (dst_port != 0 || !dst_addr.is_unspecified()) {
            found =
                self.find_out_exact(src_addr, ANY_ADDR, src_port, 0, link_type);
        }

        let id = found?;
        if !replace_partial {
            return Some(id);
        }

        let link = self.links.get(&id)?;
        let new = NewLink {
            src_addr,
            src_port,
            dst_addr,
            dst_port,
            alias_addr: link.alias_addr,
            alias_port: Some(link.alias_port),
            link_type,
        };
        self.relink(id, new).ok()
    }

    /// Find the link for an outbound packet.
    ///
    /// An exact match comes first. Failing that, links that do not know
    /// the destination port, the destination address, or either, are
    /// tried in that order; with `replace_partial` set such a match is
    /// upgraded to a fully specified link. A source equal to the
    /// default alias address also matches links created for the
    /// default (`0.0.0.0`) source.
    pub fn find_link_out(
        &mut self,
        src_addr: Ipv4Addr,
        dst_addr: Ipv4Addr,
        src_port: u16,
        dst_port: u16,
        link_type: LinkType,
        replace_partial: bool,
    ) -> Option<LinkId> {
        let found = self.find_out(
            src_addr,
            dst_addr,
            src_port,
            dst_port,
            link_type,
            replace_partial,
        );

        if found.is_none()
            && !self.alias_addr.is_unspecified()
            && src_addr == self.alias_addr
        {
            return self.find_out(
                ANY_ADDR,
                dst_addr,
                src_port,
                dst_port,
                link_type,
                replace_partial,
            );
        }

        found
    }

    // Look through one alias group. The flag says whether the match
    // is exact.
    fn match_in(
        &self,
        dst_addr: Ipv4Addr,
        alias_addr: Ipv4Addr,
        dst_port: u16,
        alias_port: u16,
        link_type: LinkType,
    ) -> Option<(LinkId, bool)> {
        let grp = self.groups.get(&(alias_addr, alias_port, link_type))?;
        let flags_in = LinkFlags::for_dest(dst_addr, dst_port);
        let link = |id: &LinkId| self.links.get(id);

        let mut unknown_port = None;
        let mut unknown_addr = None;
        let mut unknown_all = None;

        if flags_in.is_empty() {
            let exact = grp.full.iter().find(|id| {
                link(id)
                    .is_some_and(|l| l.dst_addr == dst_addr && l.dst_port == dst_port)
            });
            if let Some(id) = exact {
                return Some((*id, true));
            }
        } else if flags_in == LinkFlags::UNKNOWN_DEST_PORT {
            unknown_port = grp
                .full
                .iter()
                .find(|id| link(id).is_some_and(|l| l.dst_addr == dst_addr))
                .copied();
        } else if flags_in == LinkFlags::UNKNOWN_DEST_ADDR {
            unknown_addr = grp
                .full
                .iter()
                .find(|id| link(id).is_some_and(|l| l.dst_port == dst_port))
                .copied();
        } else {
            unknown_all = grp.full.front().copied();
        }

        if unknown_port.is_none() {
            for id in &grp.partial {
                let Some(l) = link(id) else {
                    continue;
                };
                let flags =
                    (flags_in | l.flags) & LinkFlags::PARTIALLY_SPECIFIED;

                if flags == LinkFlags::PARTIALLY_SPECIFIED
                    && unknown_all.is_none()
                {
                    unknown_all = Some(*id);
                }

                if flags == LinkFlags::UNKNOWN_DEST_ADDR
                    && l.dst_port == dst_port
                    && unknown_addr.is_none()
                {
                    unknown_addr = Some(*id);
                }

                if (flags == LinkFlags::UNKNOWN_DEST_PORT
                    || flags == LinkFlags::PARTIALLY_SPECIFIED)
                    && l.dst_addr == dst_addr
                {
                    unknown_port = Some(*id);
                    break;
                }
            }
        }

        unknown_port.or(unknown_addr).or(unknown_all).map(|id| (id, false))
    }

    fn find_in(
        &mut self,
        dst_addr: Ipv4Addr,
        alias_addr: Ipv4Addr,
        dst_port: u16,
        alias_port: u16,
        link_type: LinkType,
        replace_partial: bool,
    ) -> Option<LinkId> {
        // An expired exact match is gone once looked at; search the
        // group again so a partial link behind it can still match.
        let id = loop {
            let (id, exact) = self
                .match_in(dst_addr, alias_addr, dst_port, alias_port, link_type)?;
            if !exact {
                break id;
            }
            if let Some(id) = self.use_link(id) {
                return Some(id);
            }
        };

        if !replace_partial {
            return Some(id);
        }

        let link = self.links.get_mut(&id)?;
        if !link.is_partial() {
            return Some(id);
        }

        // An LSNAT link hands each new flow to the next server.
        let (src_addr, src_port) =
            match link.servers.as_mut().and_then(|p| p.next_server()) {
                Some(server) => (*server.ip(), server.port()),
                None => (link.src_addr, link.src_port),
            };

        let new = NewLink {
            src_addr,
            src_port,
            dst_addr,
            dst_port,
            alias_addr,
            alias_port: Some(alias_port),
            link_type,
        };
        self.relink(id, new).ok()
    }

    /// Find the link for an inbound packet, given its source
    /// (`dst_*`, the remote end from the link's point of view) and the
    /// alias endpoint it was sent to.
    ///
    /// An exact match in the group's full list wins. Otherwise the most
    /// specific partial match is taken: one missing only the destination
    /// port, then one missing only the destination address, then one
    /// missing both. With `replace_partial` set a partial match is
    /// upgraded to a fully specified link.
    pub fn find_link_in(
        &mut self,
        dst_addr: Ipv4Addr,
        alias_addr: Ipv4Addr,
        dst_port: u16,
        alias_port: u16,
        link_type: LinkType,
        replace_partial: bool,
    ) -> Option<LinkId> {
        let found = self.find_in(
            dst_addr,
            alias_addr,
            dst_port,
            alias_port,
            link_type,
            replace_partial,
        );

        if found.is_none()
            && !self.alias_addr.is_unspecified()
            && alias_addr == self.alias_addr
        {
            return self.find_in(
                dst_addr,
                ANY_ADDR,
                dst_port,
                alias_port,
                link_type,
                replace_partial,
            );
        }

        found
    }

    /// Per-packet housekeeping.
    ///
    /// The clock is only read every so many packets, tuned so that it
    /// is sampled about three times a second at the current packet
    /// rate. Each call inspects the link at the head of the expiration
    /// queue while the packet count since the last new second is below
    /// the number of TCP and UDP links.
    pub fn house_keeping(&mut self) {
        let s = &mut self.sampler;
        s.packets = s.packets.wrapping_add(1);

        if s.limit <= 1 || s.packets % s.limit == 0 {
            let now = self.providers.clock.now();
            if now.secs() != self.now.secs() {
                s.limit = s.packets / 3;
                s.packets = 0;
            }
            self.now = now;
        }

        if self.sampler.packets < self.counts.udp_tcp() {
            self.cleanup_head();
        }
    }

    /// Read the clock and inspect the head of the expiration queue,
    /// regardless of packet rate.
    pub fn tick(&mut self) {
        let now = self.providers.clock.now();
        if now.secs() != self.now.secs() {
            self.sampler.packets = 0;
        }
        self.now = now;
        self.cleanup_head();
    }

    fn cleanup_head(&mut self) {
        if let Some((_, id)) = self.queue.first_key_value() {
            let id = *id;
            self.cleanup_link(id);
        }
    }

    /// Delete every link; permanent ones only with `force`.
    pub fn cleanup_all(&mut self, force: bool) {
        let ids: Vec<LinkId> = self.links.keys().copied().collect();
        for id in ids {
            self.delete_link(id, force);
        }
    }

    pub fn set_expire(&mut self, id: LinkId, expire: Expire) -> AliasResult<()> {
        match expire {
            Expire::Now => {
                if !self.delete_link(id, true) {
                    return Err(AliasError::NoSuchLink(id));
                }
            }

            Expire::Never => {
                self.get_mut(id)?.flags |= LinkFlags::PERMANENT;
            }

            Expire::After(secs) => {
                let link = self.get_mut(id)?;
                link.flags.remove(LinkFlags::PERMANENT);
                link.expire = secs;
            }
        }

        Ok(())
    }

    pub fn set_permanent(&mut self, id: LinkId, permanent: bool) -> AliasResult<()> {
        let link = self.get_mut(id)?;
        link.flags.set(LinkFlags::PERMANENT, permanent);
        Ok(())
    }

    pub fn set_proxy(
        &mut self,
        id: LinkId,
        addr: Option<Ipv4Addr>,
        port: Option<u16>,
    ) -> AliasResult<()> {
        let link = self.get_mut(id)?;
        link.proxy_addr = addr;
        link.proxy_port = port;
        Ok(())
    }

    /// Keep the firewall away from this link.
    pub fn set_unfirewalled(&mut self, id: LinkId) -> AliasResult<()> {
        self.get_mut(id)?.flags |= LinkFlags::UNFIREWALLED;
        Ok(())
    }

    pub fn add_server(&mut self, id: LinkId, server: SocketAddrV4) -> AliasResult<()> {
        let link = self.get_mut(id)?;
        link.servers.get_or_insert_with(ServerPool::default).push(server);
        Ok(())
    }

    /// Ask the firewall to let `id`'s connection through.
    pub fn punch_fw_hole(&mut self, id: LinkId) {
        if !self.mode.contains(ModeFlags::PUNCH_FW) || !self.fw.is_configured() {
            return;
        }

        let Some(link) = self.links.get(&id) else {
            return;
        };

        if link.link_type != LinkType::Tcp
            || link.flags.contains(LinkFlags::UNFIREWALLED)
            || link.tcp().is_some_and(|t| t.fw_slot.is_some())
        {
            return;
        }

        let orig = SocketAddrV4::new(self.original_addr_of(link), link.src_port);
        let dst = SocketAddrV4::new(link.dst_addr, link.dst_port);

        match self.fw.open(orig, dst) {
            Ok(Some(slot)) => {
                if let Some(t) = self.links.get_mut(&id).and_then(|l| l.tcp_mut())
                {
                    t.fw_slot = Some(slot);
                }
            }

            Ok(None) => {
                self.log(LogLevel::Note, &format!("link {id}: no firewall slot"));
            }

            Err(e) => self.log(LogLevel::Warn, &format!("link {id}: {e}")),
        }
    }

    /// Close every firewall hole and forget the slots.
    pub fn clear_all_fw_holes(&mut self) {
        for link in self.links.values_mut() {
            if let Some(t) = link.tcp_mut() {
                t.fw_slot = None;
            }
        }
        self.fw.clear_all();
    }

    /// The alias address to use for traffic from `original`.
    pub fn find_alias_address(&mut self, original: Ipv4Addr) -> Ipv4Addr {
        let default = if self.alias_addr.is_unspecified() {
            original
        } else {
            self.alias_addr
        };

        match self.find_link_out(original, ANY_ADDR, 0, 0, LinkType::Addr, false)
        {
            Some(id) => match self.links.get(&id) {
                Some(l) if !l.alias_addr.is_unspecified() => l.alias_addr,
                _ => default,
            },
            None => default,
        }
    }

    /// The private address that unsolicited traffic to `alias` goes to.
    pub fn find_original_address(&mut self, alias: Ipv4Addr) -> Ipv4Addr {
        let default = if self.alias_addr.is_unspecified() {
            alias
        } else {
            self.alias_addr
        };

        let found = self.find_link_in(ANY_ADDR, alias, 0, 0, LinkType::Addr, false);
        let Some(link) = found.and_then(|id| self.links.get_mut(&id)) else {
            return if self.target_addr.is_unspecified() {
                alias
            } else if self.target_addr == Ipv4Addr::BROADCAST {
                default
            } else {
                self.target_addr
            };
        };

        if let Some(server) = link.servers.as_mut().and_then(|p| p.next_server())
        {
            return *server.ip();
        }

        if link.src_addr.is_unspecified() { default } else { link.src_addr }
    }

    pub fn find_udp_tcp_in(
        &mut self,
        dst_addr: Ipv4Addr,
        alias_addr: Ipv4Addr,
        dst_port: u16,
        alias_port: u16,
        proto: Protocol,
        create: bool,
    ) -> Option<LinkId> {
        let link_type = LinkType::for_proto(proto);
        let found = self.find_link_in(
            dst_addr, alias_addr, dst_port, alias_port, link_type, create,
        );
        if found.is_some()
            || !create
            || self.mode.contains(ModeFlags::DENY_INCOMING)
        {
            return found;
        }

        let target = self.find_original_address(alias_addr);
        self.add_link(NewLink {
            src_addr: target,
            src_port: alias_port,
            dst_addr,
            dst_port,
            alias_addr,
            alias_port: Some(alias_port),
            link_type,
        })
        .ok()
    }

    pub fn find_udp_tcp_out(
        &mut self,
        src_addr: Ipv4Addr,
        dst_addr: Ipv4Addr,
        src_port: u16,
        dst_port: u16,
        proto: Protocol,
        create: bool,
    ) -> AliasResult<Option<LinkId>> {
        let link_type = LinkType::for_proto(proto);
        let found = self.find_link_out(
            src_addr, dst_addr, src_port, dst_port, link_type, create,
        );
        if found.is_some() || !create {
            return Ok(found);
        }

        let alias_addr = self.find_alias_address(src_addr);
        self.add_link(NewLink {
            src_addr,
            src_port,
            dst_addr,
            dst_port,
            alias_addr,
            alias_port: None,
            link_type,
        })
        .map(Some)
    }

    pub fn find_icmp_in(
        &mut self,
        dst_addr: Ipv4Addr,
        alias_addr: Ipv4Addr,
        id_alias: u16,
        create: bool,
    ) -> Option<LinkId> {
        let found =
            self.find_link_in(dst_addr, alias_addr, 0, id_alias, LinkType::Icmp, false);
        if found.is_some()
            || !create
            || self.mode.contains(ModeFlags::DENY_INCOMING)
        {
            return found;
        }

        let target = self.find_original_address(alias_addr);
        self.add_link(NewLink {
            src_addr: target,
            src_port: id_alias,
            dst_addr,
            dst_port: 0,
            alias_addr,
            alias_port: Some(id_alias),
            link_type: LinkType::Icmp,
        })
        .ok()
    }

    pub fn find_icmp_out(
        &mut self,
        src_addr: Ipv4Addr,
        dst_addr: Ipv4Addr,
        id: u16,
        create: bool,
    ) -> AliasResult<Option<LinkId>> {
        let found =
            self.find_link_out(src_addr, dst_addr, id, 0, LinkType::Icmp, false);
        if found.is_some() || !create {
            return Ok(found);
        }

        let alias_addr = self.find_alias_address(src_addr);
        self.add_link(NewLink {
            src_addr,
            src_port: id,
            dst_addr,
            dst_port: 0,
            alias_addr,
            alias_port: None,
            link_type: LinkType::Icmp,
        })
        .map(Some)
    }

    pub fn find_proto_in(
        &mut self,
        dst_addr: Ipv4Addr,
        alias_addr: Ipv4Addr,
        proto: u8,
    ) -> Option<LinkId> {
        let link_type = LinkType::Proto(proto);
        let found = self.find_link_in(dst_addr, alias_addr, 0, 0, link_type, true);
        if found.is_some() || self.mode.contains(ModeFlags::DENY_INCOMING) {
            return found;
        }

        let target = self.find_original_address(alias_addr);
        self.add_link(NewLink {
            src_addr: target,
            src_port: 0,
            dst_addr,
            dst_port: 0,
            alias_addr,
            alias_port: Some(0),
            link_type,
        })
        .ok()
    }

    pub fn find_proto_out(
        &mut self,
        src_addr: Ipv4Addr,
        dst_addr: Ipv4Addr,
        proto: u8,
    ) -> Option<LinkId> {
        let link_type = LinkType::Proto(proto);
        let found = self.find_link_out(src_addr, dst_addr, 0, 0, link_type, true);
        if found.is_some() {
            return found;
        }

        let alias_addr = self.find_alias_address(src_addr);
        self.add_link(NewLink {
            src_addr,
            src_port: 0,
            dst_addr,
            dst_port: 0,
            alias_addr,
            alias_port: Some(0),
            link_type,
        })
        .ok()
    }

    /// Find or create the fragment link for a datagram whose first
    /// fragment just went through.
    pub fn find_fragment_in1(
        &mut self,
        dst_addr: Ipv4Addr,
        alias_addr: Ipv4Addr,
        ip_id: u16,
    ) -> AliasResult<LinkId> {
        let found = self.find_link_in(
            dst_addr,
            alias_addr,
            0,
            ip_id,
            LinkType::FragmentId,
            false,
        );
        match found {
            Some(id) => Ok(id),
            None => self.add_link(NewLink {
                src_addr: ANY_ADDR,
                src_port: 0,
                dst_addr,
                dst_port: 0,
                alias_addr,
                alias_port: Some(ip_id),
                link_type: LinkType::FragmentId,
            }),
        }
    }

    /// Find the fragment link for a trailing fragment.
    pub fn find_fragment_in2(
        &mut self,
        dst_addr: Ipv4Addr,
        alias_addr: Ipv4Addr,
        ip_id: u16,
    ) -> Option<LinkId> {
        self.find_link_in(
            dst_addr,
            alias_addr,
            0,
            ip_id,
            LinkType::FragmentId,
            false,
        )
    }

    pub fn set_fragment_addr(&mut self, id: LinkId, addr: Ipv4Addr) {
        if let Some(link) = self.links.get_mut(&id) {
            link.aux = LinkAux::FragAddr(addr);
        }
    }

    pub fn fragment_addr(&self, id: LinkId) -> Option<Ipv4Addr> {
        match self.links.get(&id)?.aux {
            LinkAux::FragAddr(addr) if !addr.is_unspecified() => Some(addr),
            _ => None,
        }
    }

    /// Park a fragment that arrived ahead of its header fragment.
    pub fn add_fragment_ptr_link(
        &mut self,
        src_addr: Ipv4Addr,
        ip_id: u16,
        frag: Vec<u8>,
    ) -> AliasResult<LinkId> {
        let id = self.add_link(NewLink {
            src_addr: ANY_ADDR,
            src_port: 0,
            dst_addr: src_addr,
            dst_port: 0,
            alias_addr: ANY_ADDR,
            alias_port: Some(ip_id),
            link_type: LinkType::FragmentPtr,
        })?;

        if let Some(link) = self.links.get_mut(&id) {
            link.aux = LinkAux::FragPtr(Some(frag));
        }
        Ok(id)
    }

    /// Take back a parked fragment; its link goes away with it.
    pub fn take_fragment_ptr(
        &mut self,
        src_addr: Ipv4Addr,
        ip_id: u16,
    ) -> Option<Vec<u8>> {
        let id = self.find_link_in(
            src_addr,
            ANY_ADDR,
            0,
            ip_id,
            LinkType::FragmentPtr,
            false,
        )?;

        let frag = match &mut self.links.get_mut(&id)?.aux {
            LinkAux::FragPtr(frag) => frag.take(),
            _ => None,
        };
        self.delete_link(id, true);
        frag
    }

    /// Find the base of `count` consecutive free alias ports toward
    /// `(dst_addr, dst_port)`.
    #[allow(clippy::too_many_arguments)]
    pub fn find_new_port_group(
        &mut self,
        dst_addr: Ipv4Addr,
        alias_addr: Ipv4Addr,
        src_port: u16,
        dst_port: u16,
        count: u16,
        proto: Protocol,
        even: bool,
    ) -> Option<u16> {
        let link_type = LinkType::for_proto(proto);
        let preferred =
            self.mode.contains(ModeFlags::SAME_PORTS).then_some(src_port);
        let Self { ports, groups, links, .. } = self;

        ports.allocate_range(count, even, preferred, |port| {
            let key = (alias_addr, port, link_type);
            !Self::dest_taken(groups, links, key, dst_addr, dst_port)
        })
    }

    pub fn link_info(&self, id: LinkId) -> AliasResult<LinkInfo> {
        let link = self.get(id)?;
        Ok(link.info(
            self.now,
            self.alias_addr_of(link),
            self.original_addr_of(link),
        ))
    }

    pub fn dump(&self) -> LinkDump {
        let (port_lower, port_len) = self.ports.range();
        LinkDump {
            alias_addr: self.alias_addr,
            target_addr: self.target_addr,
            mode: self.mode,
            port_lower,
            port_len,
            counts: self.counts,
            links: self
                .links
                .values()
                .map(|l| {
                    l.info(self.now, self.alias_addr_of(l), self.original_addr_of(l))
                })
                .collect(),
        }
    }

    /// Check that the indices agree with each other.
    #[cfg(any(test, feature = "test-help"))]
    pub fn check_consistency(&self) {
        assert_eq!(self.out_index.len(), self.links.len());
        assert_eq!(self.queue.len(), self.links.len());
        let grouped: usize = self.groups.values().map(|g| g.iter().count()).sum();
        assert_eq!(grouped, self.links.len());
        assert_eq!(self.counts.total() as usize, self.links.len());

        for (id, link) in &self.links {
            assert!(self.out_index.contains(&(link.out_key(), *id)));
            assert_eq!(self.queue.get(&link.queue_seq), Some(id));
            let grp = &self.groups[&link.group_key()];
            let list = if link.is_partial() { &grp.partial } else { &grp.full };
            assert!(list.contains(id));
        }

        for grp in self.groups.values() {
            assert!(!grp.is_empty());
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::TCP_EXPIRE_INITIAL;
    use crate::api::UDP_EXPIRE_TIME;
    use crate::provider::ManualClock;
    use crate::provider::NullLog;

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    fn table(mode: ModeFlags) -> (LinkTable, ManualClock) {
        let clock = ManualClock::new();
        let cfg = NatConfig {
            alias_addr: ip("203.0.113.9"),
            mode,
            seed: Some(0xa11a5),
            ..Default::default()
        };
        let providers = Providers {
            log: Box::new(NullLog),
            clock: Box::new(clock.clone()),
        };
        (LinkTable::new(&cfg, providers).unwrap(), clock)
    }

    fn tcp(src: &str, sport: u16, dst: &str, dport: u16) -> NewLink {
        NewLink {
            src_addr: ip(src),
            src_port: sport,
            dst_addr: ip(dst),
            dst_port: dport,
            alias_addr: ip("203.0.113.9"),
            alias_port: None,
            link_type: LinkType::Tcp,
        }
    }

    fn udp(sport: u16) -> NewLink {
        NewLink { link_type: LinkType::Udp, ..tcp("10.0.0.5", sport, "198.51.100.7", 53) }
    }

    #[test]
    fn house_keeping_samples_clock_by_packet_count() {
        let (mut t, clock) = table(ModeFlags::empty());
        let start = t.now;
        let stale = t.add_link(udp(5000)).unwrap();
        clock.advance_secs(UDP_EXPIRE_TIME + 1);

        // Short of the limit the clock is never read, so nothing looks
        // expired yet.
        for _ in 1..INITIAL_PACKET_LIMIT {
            t.house_keeping();
        }
        assert_eq!(t.now, start);
        assert!(t.link(stale).is_some());

        // The limit-th packet reads the clock, sees a new second, sizes
        // the limit to a third of the packets seen and checks the head.
        t.house_keeping();
        assert_eq!(t.now.delta_as_secs(start), UDP_EXPIRE_TIME + 1);
        assert_eq!(t.sampler.limit, INITIAL_PACKET_LIMIT / 3);
        assert_eq!(t.sampler.packets, 0);
        assert!(t.link(stale).is_none());
    }

    #[test]
    fn house_keeping_checks_head_early_in_second() {
        let (mut t, clock) = table(ModeFlags::empty());
        for _ in 0..INITIAL_PACKET_LIMIT {
            t.house_keeping();
        }
        // The limit only moves when the second changes.
        assert_eq!(t.sampler.limit, INITIAL_PACKET_LIMIT);

        clock.advance_secs(1);
        for _ in 0..INITIAL_PACKET_LIMIT {
            t.house_keeping();
        }
        let limit = INITIAL_PACKET_LIMIT * 2 / 3;
        assert_eq!(t.sampler.limit, limit);

        // Static links never expire and do not widen the window.
        for (host, public) in [("10.0.0.20", "203.0.113.20"), ("10.0.0.21", "203.0.113.21")] {
            t.add_link(NewLink {
                src_addr: ip(host),
                src_port: 0,
                dst_addr: ANY_ADDR,
                dst_port: 0,
                alias_addr: ip(public),
                alias_port: Some(0),
                link_type: LinkType::Addr,
            })
            .unwrap();
        }
        let ids: Vec<LinkId> =
            (6000..6003).map(|p| t.add_link(udp(p)).unwrap()).collect();
        clock.advance_secs(UDP_EXPIRE_TIME + 1);

        // The first two packets of the old second rotate the two static
        // links to the tail without expiring anything: the clock has
        // not been read.
        for _ in 1..limit {
            t.house_keeping();
        }
        assert_eq!(t.counts().udp, 3);

        // From the new second on, each packet checks the head only
        // while the packet count is below the number of links.
        t.house_keeping();
        assert_eq!(t.sampler.limit, limit / 3);
        assert_eq!(t.counts().udp, 2);
        t.house_keeping();
        assert_eq!(t.counts().udp, 1);
        for _ in 0..50 {
            t.house_keeping();
        }
        assert_eq!(t.counts().udp, 1);
        assert!(t.link(ids[2]).is_some());
        assert_eq!(t.counts().proto, 2);
    }

    #[test]
    fn identity() {
        let (mut t, _) = table(ModeFlags::empty());
        let id = t.add_link(tcp("10.0.0.5", 4000, "198.51.100.7", 80)).unwrap();
        let aport = t.link(id).unwrap().alias_port();
        assert!(aport >= 0x8000);

        let out = t.find_link_out(
            ip("10.0.0.5"),
            ip("198.51.100.7"),
            4000,
            80,
            LinkType::Tcp,
            true,
        );
        assert_eq!(out, Some(id));

        let inb = t.find_link_in(
            ip("198.51.100.7"),
            ip("203.0.113.9"),
            80,
            aport,
            LinkType::Tcp,
            true,
        );
        assert_eq!(inb, Some(id));
        assert_eq!(t.counts().tcp, 1);
        t.check_consistency();

        assert!(t.delete_link(id, false));
        assert_eq!(t.len(), 0);
        t.check_consistency();
    }

    #[test]
    fn same_ports_preference() {
        let (mut t, _) = table(ModeFlags::SAME_PORTS);
        let a = t.add_link(tcp("10.0.0.5", 4000, "198.51.100.7", 80)).unwrap();
        assert_eq!(t.link(a).unwrap().alias_port(), 4000);

        // Same alias port toward another destination is fine.
        let b = t.add_link(tcp("10.0.0.6", 4000, "198.51.100.8", 80)).unwrap();
        assert_eq!(t.link(b).unwrap().alias_port(), 4000);

        // Toward the same destination it is not.
        let c = t.add_link(tcp("10.0.0.7", 4000, "198.51.100.7", 80)).unwrap();
        assert_ne!(t.link(c).unwrap().alias_port(), 4000);
        t.check_consistency();
    }

    #[test]
    fn window_of_one_collides() {
        let (mut t, _) = table(ModeFlags::empty());
        t.ports().set_range(50000, 1).unwrap();
        t.add_link(tcp("10.0.0.5", 4000, "198.51.100.7", 80)).unwrap();
        assert_eq!(
            t.add_link(tcp("10.0.0.6", 4001, "198.51.100.7", 80)),
            Err(AliasError::PortAllocationExhausted)
        );
        t.check_consistency();
    }

    #[test]
    fn partial_upgrade_is_unique() {
        let (mut t, _) = table(ModeFlags::empty());
        // A data link whose remote port is not known yet.
        let partial =
            t.add_link(tcp("10.0.0.5", 4000, "198.51.100.7", 0)).unwrap();
        let aport = t.link(partial).unwrap().alias_port();
        assert!(t.link(partial).unwrap().is_partial());

        let up = t
            .find_link_in(
                ip("198.51.100.7"),
                ip("203.0.113.9"),
                20,
                aport,
                LinkType::Tcp,
                true,
            )
            .unwrap();
        assert_ne!(up, partial);
        assert!(t.link(partial).is_none());

        let link = t.link(up).unwrap();
        assert!(!link.is_partial());
        assert_eq!(link.original_addr(), ip("10.0.0.5"));
        assert_eq!(link.original_port(), 4000);
        assert_eq!(link.dst_port(), 20);
        assert_eq!(t.len(), 1);
        t.check_consistency();

        // The same packet again finds the upgraded link exactly.
        let again = t.find_link_in(
            ip("198.51.100.7"),
            ip("203.0.113.9"),
            20,
            aport,
            LinkType::Tcp,
            true,
        );
        assert_eq!(again, Some(up));
    }

    #[test]
    fn most_specific_partial_wins() {
        let (mut t, _) = table(ModeFlags::empty());
        let mk = |dst: &str, dport| NewLink {
            alias_port: Some(7000),
            ..tcp("10.0.0.5", 80, dst, dport)
        };
        let all = t.add_link(mk("0.0.0.0", 0)).unwrap();
        let no_addr = t.add_link(mk("0.0.0.0", 5555)).unwrap();
        let no_port = t.add_link(mk("198.51.100.7", 0)).unwrap();
        let alias = ip("203.0.113.9");

        let hit = |t: &mut LinkTable, src: &str, sport| {
            t.find_link_in(ip(src), alias, sport, 7000, LinkType::Tcp, false)
        };
        assert_eq!(hit(&mut t, "198.51.100.7", 5555), Some(no_port));
        assert_eq!(hit(&mut t, "198.51.100.8", 5555), Some(no_addr));
        assert_eq!(hit(&mut t, "198.51.100.8", 6666), Some(all));
        let miss =
            t.find_link_in(ip("1.1.1.1"), alias, 1, 7001, LinkType::Tcp, false);
        assert_eq!(miss, None);
    }

    #[test]
    fn outbound_partial_fallback() {
        let (mut t, _) = table(ModeFlags::empty());
        // A permanent redirect with no known remote.
        let redir = t
            .add_link(NewLink {
                alias_port: Some(8080),
                ..tcp("10.0.0.5", 80, "0.0.0.0", 0)
            })
            .unwrap();
        t.set_permanent(redir, true).unwrap();

        let full = t
            .find_link_out(
                ip("10.0.0.5"),
                ip("198.51.100.7"),
                80,
                40000,
                LinkType::Tcp,
                true,
            )
            .unwrap();
        assert_ne!(full, redir);
        // Permanent links survive the upgrade.
        assert!(t.link(redir).is_some());
        assert_eq!(t.link(full).unwrap().alias_port(), 8080);
        assert_eq!(t.len(), 2);
        t.check_consistency();
    }

    #[test]
    fn lsnat_round_robin() {
        let (mut t, _) = table(ModeFlags::empty());
        let pool = t
            .add_link(NewLink {
                alias_port: Some(80),
                ..tcp("10.0.0.1", 80, "0.0.0.0", 0)
            })
            .unwrap();
        t.set_permanent(pool, true).unwrap();
        let servers: Vec<SocketAddrV4> = ["10.0.0.1:80", "10.0.0.2:80", "10.0.0.3:8080"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        for s in &servers {
            t.add_server(pool, *s).unwrap();
        }

        let mut picked = vec![];
        for i in 0..6u16 {
            let id = t
                .find_link_in(
                    ip("198.51.100.7"),
                    ip("203.0.113.9"),
                    40000 + i,
                    80,
                    LinkType::Tcp,
                    true,
                )
                .unwrap();
            let l = t.link(id).unwrap();
            picked.push(SocketAddrV4::new(l.original_addr(), l.original_port()));
        }

        let expected: Vec<SocketAddrV4> =
            servers.iter().chain(servers.iter()).copied().collect();
        assert_eq!(picked, expected);
        t.check_consistency();
    }

    #[test]
    fn expiry_lower_bound() {
        let (mut t, clock) = table(ModeFlags::empty());
        let mut udp = tcp("10.0.0.5", 5353, "198.51.100.7", 53);
        udp.link_type = LinkType::Udp;
        let id = t.add_link(udp).unwrap();
        let tcp_id = t.add_link(tcp("10.0.0.5", 4000, "198.51.100.7", 80)).unwrap();

        // Exactly at the expire time the link is still alive.
        clock.advance_secs(UDP_EXPIRE_TIME);
        for _ in 0..4 {
            t.tick();
        }
        assert!(t.link(id).is_some());

        clock.advance_secs(1);
        for _ in 0..4 {
            t.tick();
        }
        assert!(t.link(id).is_none());
        assert!(t.link(tcp_id).is_some());

        clock.advance_secs(TCP_EXPIRE_INITIAL);
        for _ in 0..4 {
            t.tick();
        }
        assert_eq!(t.len(), 0);
        t.check_consistency();
    }

    #[test]
    fn lookup_refreshes_and_drops_stale() {
        let (mut t, clock) = table(ModeFlags::empty());
        let mut udp = tcp("10.0.0.5", 5353, "198.51.100.7", 53);
        udp.link_type = LinkType::Udp;
        let id = t.add_link(udp).unwrap();

        clock.advance_secs(UDP_EXPIRE_TIME - 1);
        t.tick();
        let hit = t.find_link_out(
            ip("10.0.0.5"),
            ip("198.51.100.7"),
            5353,
            53,
            LinkType::Udp,
            false,
        );
        assert_eq!(hit, Some(id));

        // Refreshed, so a further full period is needed.
        clock.advance_secs(UDP_EXPIRE_TIME);
        t.tick();
        assert!(t.link(id).is_some());

        // A lookup of a stale link deletes it instead.
        clock.advance_secs(2);
        let now = t.providers.clock.now();
        t.now = now;
        let hit = t.find_link_out(
            ip("10.0.0.5"),
            ip("198.51.100.7"),
            5353,
            53,
            LinkType::Udp,
            false,
        );
        assert_eq!(hit, None);
        assert_eq!(t.len(), 0);
    }

    #[test]
    fn permanent_survives_sweep_not_force() {
        let (mut t, clock) = table(ModeFlags::empty());
        let id = t.add_link(tcp("10.0.0.5", 4000, "198.51.100.7", 80)).unwrap();
        t.set_expire(id, Expire::Never).unwrap();
        clock.advance_secs(100_000);
        t.tick();
        assert!(t.link(id).is_some());
        assert!(!t.delete_link(id, false));
        t.set_expire(id, Expire::Now).unwrap();
        assert!(t.link(id).is_none());
        assert_eq!(
            t.set_expire(id, Expire::Now),
            Err(AliasError::NoSuchLink(id))
        );
    }

    #[test]
    fn addr_redirects() {
        let (mut t, _) = table(ModeFlags::empty());
        let public = ip("203.0.113.50");
        t.add_link(NewLink {
            src_addr: ip("10.0.0.8"),
            src_port: 0,
            dst_addr: ANY_ADDR,
            dst_port: 0,
            alias_addr: public,
            alias_port: Some(0),
            link_type: LinkType::Addr,
        })
        .unwrap();

        assert_eq!(t.find_alias_address(ip("10.0.0.8")), public);
        assert_eq!(t.find_alias_address(ip("10.0.0.9")), ip("203.0.113.9"));
        assert_eq!(t.find_original_address(public), ip("10.0.0.8"));

        // Without a target address unsolicited traffic is for us.
        assert_eq!(t.find_original_address(ip("203.0.113.9")), ip("203.0.113.9"));
        t.set_target_addr(ip("10.0.0.100"));
        assert_eq!(t.find_original_address(ip("203.0.113.9")), ip("10.0.0.100"));
    }

    #[test]
    fn fragment_links() {
        let (mut t, _) = table(ModeFlags::empty());
        let remote = ip("198.51.100.7");
        let alias = ip("203.0.113.9");

        assert_eq!(t.find_fragment_in2(remote, alias, 0x1234), None);
        let id = t.find_fragment_in1(remote, alias, 0x1234).unwrap();
        t.set_fragment_addr(id, ip("10.0.0.5"));
        let found = t.find_fragment_in2(remote, alias, 0x1234).unwrap();
        assert_eq!(found, id);
        assert_eq!(t.fragment_addr(found), Some(ip("10.0.0.5")));
        // Asking again for the header does not make a second link.
        assert_eq!(t.find_fragment_in1(remote, alias, 0x1234), Ok(id));

        t.add_fragment_ptr_link(remote, 0x99, vec![1, 2, 3]).unwrap();
        assert_eq!(t.counts().frag_ptr, 1);
        assert_eq!(t.take_fragment_ptr(remote, 0x99), Some(vec![1, 2, 3]));
        assert_eq!(t.take_fragment_ptr(remote, 0x99), None);
        assert_eq!(t.counts().frag_ptr, 0);
        t.check_consistency();
    }

    #[test]
    fn port_group() {
        let (mut t, _) = table(ModeFlags::empty());
        t.ports().set_range(9000, 8).unwrap();
        for p in [9001u16, 9005] {
            t.add_link(NewLink {
                alias_port: Some(p),
                ..tcp("10.0.0.5", p, "198.51.100.7", 554)
            })
            .unwrap();
        }

        let base = t
            .find_new_port_group(
                ip("198.51.100.7"),
                ip("203.0.113.9"),
                0,
                554,
                2,
                Protocol::TCP,
                true,
            )
            .unwrap();
        assert!(base == 9002 || base == 9006, "{base}");

        assert_eq!(
            t.find_new_port_group(
                ip("198.51.100.7"),
                ip("203.0.113.9"),
                0,
                554,
                4,
                Protocol::TCP,
                false,
            ),
            None
        );
    }
}
