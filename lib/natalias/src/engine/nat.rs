// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! An engine instance.
//!
//! A [`Nat`] owns one link table behind one lock and shares a handler
//! registry with whoever else holds it. Every entry point takes the
//! instance lock for its whole duration, so packets and administrative
//! calls are serialized per instance. Distinct instances are fully
//! independent.

use super::firewall::FirewallControl;
use super::handler::HandlerRegistry;
use super::handler::ProtoHandler;
use super::link_table::LinkTable;
use super::link_table::NewLink;
use super::port_alloc::DEFAULT_ALIAS_PORT_LEN;
use super::port_alloc::DEFAULT_ALIAS_PORT_LOWER;
use super::xlate;
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
use crate::api::PacketResult;
use crate::api::Protocol;
use crate::api::RedirectAddrReq;
use crate::api::RedirectPortReq;
use crate::api::RedirectProtoReq;
use crate::provider::ClockProvider;
use crate::provider::LogProvider;
use crate::provider::NullLog;
use crate::provider::Providers;
use crate::provider::SystemClock;
use crate::sync::KMutex;
use crate::sync::KMutexGuard;
use serde::Deserialize;
use serde::Serialize;
use std::net::Ipv4Addr;
use std::net::SocketAddrV4;
use std::sync::Arc;

/// Static configuration of an instance.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct NatConfig {
    /// The default public address. `0.0.0.0` leaves addresses alone
    /// and only aliases ports.
    pub alias_addr: Ipv4Addr,
    /// Where unsolicited inbound traffic goes. `0.0.0.0` keeps it on
    /// the alias address, `255.255.255.255` sends it to the alias
    /// address as well.
    pub target_addr: Ipv4Addr,
    pub port_lower: u16,
    pub port_len: u32,
    pub mode: ModeFlags,
    /// Seed for alias port selection; random when not given.
    pub seed: Option<u64>,
    /// First firewall rule number the instance may use.
    pub fw_base: u32,
    /// Number of firewall rule numbers the instance may use.
    pub fw_num: u32,
}

impl Default for NatConfig {
    fn default() -> Self {
        Self {
            alias_addr: ANY_ADDR,
            target_addr: ANY_ADDR,
            port_lower: DEFAULT_ALIAS_PORT_LOWER,
            port_len: DEFAULT_ALIAS_PORT_LEN,
            mode: ModeFlags::SAME_PORTS | ModeFlags::RESET_ON_ADDR_CHANGE,
            seed: None,
            fw_base: 0,
            fw_num: 0,
        }
    }
}

#[derive(Default)]
pub struct NatBuilder {
    cfg: NatConfig,
    log: Option<Box<dyn LogProvider>>,
    clock: Option<Box<dyn ClockProvider>>,
    registry: Option<Arc<HandlerRegistry>>,
    firewall: Option<Arc<dyn FirewallControl>>,
}

impl NatBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, cfg: NatConfig) -> Self {
        self.cfg = cfg;
        self
    }

    pub fn log(mut self, log: Box<dyn LogProvider>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn clock(mut self, clock: Box<dyn ClockProvider>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Share `registry` instead of getting a private one with the
    /// stock handlers.
    pub fn registry(mut self, registry: Arc<HandlerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Punch holes through `firewall` using the rule numbers in the
    /// configuration.
    pub fn firewall(mut self, firewall: Arc<dyn FirewallControl>) -> Self {
        self.firewall = Some(firewall);
        self
    }

    pub fn build(self) -> AliasResult<Nat> {
        let providers = Providers {
            log: self.log.unwrap_or_else(|| Box::new(NullLog)),
            clock: self.clock.unwrap_or_else(|| Box::new(SystemClock::new())),
        };

        let mut table = LinkTable::new(&self.cfg, providers)?;
        if let Some(fw) = self.firewall {
            table.fw().configure(fw, self.cfg.fw_base, self.cfg.fw_num);
        }

        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(HandlerRegistry::with_defaults()));

        Ok(Nat { table: KMutex::new(table), registry })
    }
}

pub struct Nat {
    table: KMutex<LinkTable>,
    registry: Arc<HandlerRegistry>,
}

impl Nat {
    /// An instance with the given configuration and default providers.
    pub fn new(cfg: NatConfig) -> AliasResult<Self> {
        NatBuilder::new().config(cfg).build()
    }

    /// Direct access to the link table, for diagnostics.
    pub fn table(&self) -> KMutexGuard<'_, LinkTable> {
        self.table.lock()
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Translate a packet leaving the private side.
    ///
    /// `buf` holds the packet, possibly followed by spare room a fixup
    /// may grow the packet into.
    pub fn process_out(&self, buf: &mut [u8]) -> AliasResult<PacketResult> {
        self.process_out_try(buf, true)
    }

    /// Like [`Self::process_out`], but only creates links when `create`
    /// is set. Without it, packets of unknown flows are ignored.
    pub fn process_out_try(
        &self,
        buf: &mut [u8],
        create: bool,
    ) -> AliasResult<PacketResult> {
        let mut table = self.table.lock();
        xlate::process_out(&mut table, &self.registry, buf, create)
    }

    /// Translate a packet arriving from the public side.
    pub fn process_in(&self, buf: &mut [u8]) -> AliasResult<PacketResult> {
        let mut table = self.table.lock();
        xlate::process_in(&mut table, &self.registry, buf)
    }

    /// Park a fragment [`Self::process_in`] reported as unresolved.
    pub fn save_fragment(&self, buf: &[u8]) -> AliasResult<()> {
        let mut table = self.table.lock();
        xlate::save_fragment(&mut table, buf)
    }

    /// Take back one fragment parked for the datagram whose translated
    /// header fragment is `header`. Call until it returns `None`.
    pub fn get_fragment(&self, header: &[u8]) -> AliasResult<Option<Vec<u8>>> {
        let mut table = self.table.lock();
        xlate::get_fragment(&mut table, header)
    }

    /// Translate a parked fragment the way `header` was translated.
    pub fn fragment_in(&self, header: &[u8], frag: &mut [u8]) -> AliasResult<()> {
        xlate::fragment_in(header, frag)
    }

    /// Send traffic for an alias port to a private endpoint.
    pub fn redirect_port(&self, req: &RedirectPortReq) -> AliasResult<LinkId> {
        let link_type = match req.proto {
            Protocol::TCP | Protocol::UDP => LinkType::for_proto(req.proto),
            other => return Err(AliasError::UnsupportedProtocol(other)),
        };

        let mut table = self.table.lock();
        let id = table.add_link(NewLink {
            src_addr: req.local_addr,
            src_port: req.local_port,
            dst_addr: req.remote_addr,
            dst_port: req.remote_port,
            alias_addr: req.alias_addr,
            alias_port: Some(req.alias_port),
            link_type,
        })?;
        table.set_permanent(id, true)?;

        for server in &req.servers {
            table.add_server(id, *server)?;
        }
        Ok(id)
    }

    /// Map a public address onto a private one, in both directions.
    pub fn redirect_addr(&self, req: &RedirectAddrReq) -> AliasResult<LinkId> {
        let mut table = self.table.lock();
        let id = table.add_link(NewLink {
            src_addr: req.local_addr,
            src_port: 0,
            dst_addr: ANY_ADDR,
            dst_port: 0,
            alias_addr: req.alias_addr,
            alias_port: Some(0),
            link_type: LinkType::Addr,
        })?;
        table.set_permanent(id, true)?;
        Ok(id)
    }

    /// Send a whole IP protocol arriving at an alias address to a
    /// private host.
    pub fn redirect_proto(&self, req: &RedirectProtoReq) -> AliasResult<LinkId> {
        let mut table = self.table.lock();
        let id = table.add_link(NewLink {
            src_addr: req.local_addr,
            src_port: 0,
            dst_addr: req.remote_addr,
            dst_port: 0,
            alias_addr: req.alias_addr,
            alias_port: Some(0),
            link_type: LinkType::Proto(req.proto),
        })?;
        table.set_permanent(id, true)?;
        Ok(id)
    }

    /// Add an LSNAT server to a redirect.
    pub fn add_server(&self, link: LinkId, server: SocketAddrV4) -> AliasResult<()> {
        self.table.lock().add_server(link, server)
    }

    /// Let a fully specified redirect expire like a dynamic link.
    pub fn redirect_dynamic(&self, link: LinkId) -> AliasResult<()> {
        let mut table = self.table.lock();
        let partial = table
            .link(link)
            .ok_or(AliasError::NoSuchLink(link))?
            .is_partial();
        if partial {
            return Err(AliasError::PartiallySpecified(link));
        }
        table.set_permanent(link, false)
    }

    pub fn redirect_delete(&self, link: LinkId) -> AliasResult<()> {
        if self.table.lock().delete_link(link, true) {
            Ok(())
        } else {
            Err(AliasError::NoSuchLink(link))
        }
    }

    pub fn set_expire(&self, link: LinkId, expire: Expire) -> AliasResult<()> {
        self.table.lock().set_expire(link, expire)
    }

    pub fn link_info(&self, link: LinkId) -> AliasResult<LinkInfo> {
        self.table.lock().link_info(link)
    }

    /// Make inbound traffic on `link` appear to come from a proxy.
    pub fn set_proxy(
        &self,
        link: LinkId,
        addr: Option<Ipv4Addr>,
        port: Option<u16>,
    ) -> AliasResult<()> {
        self.table.lock().set_proxy(link, addr, port)
    }

    /// Never punch firewall holes for `link`.
    pub fn set_unfirewalled(&self, link: LinkId) -> AliasResult<()> {
        self.table.lock().set_unfirewalled(link)
    }

    /// Change the default alias address. With
    /// [`ModeFlags::RESET_ON_ADDR_CHANGE`] set, a real change flushes
    /// every link that is not permanent.
    pub fn set_alias_addr(&self, addr: Ipv4Addr) {
        let mut table = self.table.lock();
        if table.alias_addr() != addr
            && table.mode().contains(ModeFlags::RESET_ON_ADDR_CHANGE)
        {
            table.cleanup_all(false);
        }
        table.set_alias_addr(addr);
    }

    pub fn set_target_addr(&self, addr: Ipv4Addr) {
        self.table.lock().set_target_addr(addr);
    }

    /// The public address traffic from `original` leaves with.
    pub fn find_alias_address(&self, original: Ipv4Addr) -> Ipv4Addr {
        self.table.lock().find_alias_address(original)
    }

    /// The private address unsolicited traffic to `alias` is sent to.
    pub fn find_original_address(&self, alias: Ipv4Addr) -> Ipv4Addr {
        self.table.lock().find_original_address(alias)
    }

    /// Restrict alias ports to `[lower, lower + len)`. A zero `len`
    /// restores the default range.
    pub fn set_alias_port_range(&self, lower: u16, len: u32) -> AliasResult<()> {
        self.table.lock().ports().set_range(lower, len)
    }

    /// Set the mode bits selected by `mask` to their value in `flags`
    /// and return the resulting mode.
    pub fn set_mode(&self, flags: ModeFlags, mask: ModeFlags) -> ModeFlags {
        let mut table = self.table.lock();
        let old = table.mode();
        let new = (flags & mask) | (old - mask);

        if old.contains(ModeFlags::PUNCH_FW) && !new.contains(ModeFlags::PUNCH_FW)
        {
            table.clear_all_fw_holes();
        }

        table.set_mode(new);
        new
    }

    /// Use `firewall` and rule numbers `[base, base + num)` for
    /// holes from now on. Existing holes are closed.
    pub fn set_firewall(
        &self,
        firewall: Arc<dyn FirewallControl>,
        base: u32,
        num: u32,
    ) {
        let mut table = self.table.lock();
        table.clear_all_fw_holes();
        table.fw().configure(firewall, base, num);
    }

    pub fn register_handler(&self, handler: Arc<dyn ProtoHandler>) -> AliasResult<()> {
        self.registry.register(handler)
    }

    pub fn unregister_handler(&self, name: &str) -> AliasResult<()> {
        self.registry.unregister(name)
    }

    pub fn link_counts(&self) -> LinkCounts {
        self.table.lock().counts()
    }

    pub fn dump_links(&self) -> LinkDump {
        self.table.lock().dump()
    }

    /// Find `count` consecutive free alias ports toward
    /// `(dst_addr, dst_port)`, even-aligned if asked. Nothing is
    /// reserved.
    #[allow(clippy::too_many_arguments)]
    pub fn find_new_port_group(
        &self,
        dst_addr: Ipv4Addr,
        alias_addr: Ipv4Addr,
        src_port: u16,
        dst_port: u16,
        count: u16,
        proto: Protocol,
        even: bool,
    ) -> Option<u16> {
        self.table.lock().find_new_port_group(
            dst_addr, alias_addr, src_port, dst_port, count, proto, even,
        )
    }

    /// Read the clock and look at the least recently used link, even
    /// when no packets are flowing.
    pub fn house_keeping(&self) {
        self.table.lock().tick();
    }

    /// Is `link` still there and permanent?
    pub fn is_permanent(&self, link: LinkId) -> bool {
        self.table
            .lock()
            .link(link)
            .is_some_and(|l| l.is_permanent())
    }
}

impl Drop for Nat {
    fn drop(&mut self) {
        let mut table = self.table.lock();
        table.cleanup_all(true);
        table.clear_all_fw_holes();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::firewall::RecordingFirewall;
    use crate::provider::CaptureLog;
    use crate::provider::LogLevel;

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    fn nat(mode: ModeFlags) -> Nat {
        let cfg = NatConfig {
            alias_addr: ip("203.0.113.9"),
            mode,
            seed: Some(9),
            ..Default::default()
        };
        Nat::new(cfg).unwrap()
    }

    fn port_req(proto: Protocol) -> RedirectPortReq {
        RedirectPortReq {
            proto,
            local_addr: ip("10.0.0.5"),
            local_port: 80,
            remote_addr: ANY_ADDR,
            remote_port: 0,
            alias_addr: ip("203.0.113.9"),
            alias_port: 8080,
            servers: vec![],
        }
    }

    #[test]
    fn config_toml() {
        let cfg: NatConfig = toml::from_str(
            r#"
            alias_addr = "203.0.113.9"
            mode = "LOG | DENY_INCOMING"
            port_lower = 40000
            port_len = 1000
            "#,
        )
        .unwrap();
        assert_eq!(cfg.alias_addr, ip("203.0.113.9"));
        assert_eq!(cfg.mode, ModeFlags::LOG | ModeFlags::DENY_INCOMING);
        assert_eq!(cfg.target_addr, ANY_ADDR);
        assert_eq!(cfg.seed, None);
    }

    #[test]
    fn bad_port_range_fails_build() {
        let cfg =
            NatConfig { port_lower: 0xFFFF, port_len: 2, ..Default::default() };
        assert!(matches!(
            Nat::new(cfg),
            Err(AliasError::InvalidPortRange { .. })
        ));
    }

    #[test]
    fn redirect_lifecycle() {
        let nat = nat(ModeFlags::empty());
        assert_eq!(
            nat.redirect_port(&port_req(Protocol::ICMP)),
            Err(AliasError::UnsupportedProtocol(Protocol::ICMP))
        );

        let id = nat.redirect_port(&port_req(Protocol::TCP)).unwrap();
        assert!(nat.is_permanent(id));
        let info = nat.link_info(id).unwrap();
        assert_eq!(info.alias_port, 8080);
        assert!(info.partial);

        // A redirect without a remote cannot become dynamic.
        assert_eq!(
            nat.redirect_dynamic(id),
            Err(AliasError::PartiallySpecified(id))
        );

        let full = nat
            .redirect_port(&RedirectPortReq {
                remote_addr: ip("198.51.100.7"),
                remote_port: 5000,
                alias_port: 8081,
                ..port_req(Protocol::UDP)
            })
            .unwrap();
        nat.redirect_dynamic(full).unwrap();
        assert!(!nat.is_permanent(full));

        nat.redirect_delete(id).unwrap();
        assert_eq!(nat.redirect_delete(id), Err(AliasError::NoSuchLink(id)));
        assert_eq!(nat.link_counts().total(), 1);
    }

    #[test]
    fn alias_change_flushes_dynamic() {
        let nat = nat(ModeFlags::RESET_ON_ADDR_CHANGE);
        let keep = nat.redirect_port(&port_req(Protocol::TCP)).unwrap();
        {
            let mut t = nat.table();
            let mut l = NewLink {
                src_addr: ip("10.0.0.6"),
                src_port: 4000,
                dst_addr: ip("198.51.100.7"),
                dst_port: 80,
                alias_addr: ip("203.0.113.9"),
                alias_port: None,
                link_type: LinkType::Tcp,
            };
            t.add_link(l).unwrap();
            l.src_port = 4001;
            t.add_link(l).unwrap();
        }
        assert_eq!(nat.link_counts().tcp, 3);

        // Setting the same address again is not a change.
        nat.set_alias_addr(ip("203.0.113.9"));
        assert_eq!(nat.link_counts().tcp, 3);

        nat.set_alias_addr(ip("203.0.113.10"));
        assert_eq!(nat.link_counts().tcp, 1);
        assert!(nat.is_permanent(keep));

        nat.set_mode(ModeFlags::empty(), ModeFlags::RESET_ON_ADDR_CHANGE);
        nat.table()
            .add_link(NewLink {
                src_addr: ip("10.0.0.6"),
                src_port: 4000,
                dst_addr: ip("198.51.100.7"),
                dst_port: 80,
                alias_addr: ANY_ADDR,
                alias_port: None,
                link_type: LinkType::Udp,
            })
            .unwrap();
        nat.set_alias_addr(ip("203.0.113.11"));
        assert_eq!(nat.link_counts().udp, 1);
    }

    #[test]
    fn mode_mask() {
        let nat = nat(ModeFlags::SAME_PORTS);
        let m = nat.set_mode(
            ModeFlags::LOG | ModeFlags::DENY_INCOMING,
            ModeFlags::LOG,
        );
        assert_eq!(m, ModeFlags::SAME_PORTS | ModeFlags::LOG);
        let m = nat.set_mode(ModeFlags::empty(), ModeFlags::SAME_PORTS);
        assert_eq!(m, ModeFlags::LOG);
    }

    #[test]
    fn log_mode_reports_counts() {
        let log = CaptureLog::default();
        let nat = NatBuilder::new()
            .config(NatConfig {
                mode: ModeFlags::LOG,
                seed: Some(1),
                ..Default::default()
            })
            .log(Box::new(log.clone()))
            .build()
            .unwrap();

        let id = nat.redirect_port(&port_req(Protocol::TCP)).unwrap();
        nat.redirect_delete(id).unwrap();

        let lines = log.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].0, LogLevel::Note);
        assert!(lines[0].1.contains("tcp=1"));
        assert!(lines[1].1.contains("tot=0"));
    }

    #[test]
    fn punch_off_clears_holes() {
        let fw = Arc::new(RecordingFirewall::default());
        let nat = NatBuilder::new()
            .config(NatConfig {
                mode: ModeFlags::PUNCH_FW,
                seed: Some(1),
                fw_base: 100,
                fw_num: 10,
                ..Default::default()
            })
            .firewall(fw.clone())
            .build()
            .unwrap();

        let id = nat
            .redirect_port(&RedirectPortReq {
                remote_addr: ip("198.51.100.7"),
                remote_port: 20,
                ..port_req(Protocol::TCP)
            })
            .unwrap();
        nat.table().punch_fw_hole(id);
        assert_eq!(fw.rules().len(), 2);
        assert!(fw.rules().iter().all(|r| r.slot == 100));

        nat.set_mode(ModeFlags::empty(), ModeFlags::PUNCH_FW);
        assert!(fw.rules().is_empty());

        // Nothing punched while the mode is off.
        nat.table().punch_fw_hole(id);
        assert!(fw.rules().is_empty());
    }
}
