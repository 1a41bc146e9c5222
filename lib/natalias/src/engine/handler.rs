// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Protocol handlers.
//!
//! A protocol handler is an application-layer fixup: it looks at a
//! packet on its way through the engine and, if it recognizes the
//! conversation, rewrites the payload and creates whatever links the
//! conversation needs. Handlers live in a [`HandlerRegistry`] shared by
//! any number of engine instances and are tried in priority order; the
//! first one whose masks match and whose fingerprint accepts the
//! packet gets to apply its fixup.
//!
//! Handlers run with the instance's link table locked. The registry
//! lock is always taken after the instance lock and only for reading
//! while a packet is being processed.

use super::ftp;
use super::link_table::LinkTable;
use super::packet::Ipv4Meta;
use crate::api::AliasError;
use crate::api::AliasResult;
use crate::api::Direction;
use crate::api::LinkId;
use crate::api::Protocol;
use crate::sync::KRwLock;
use bitflags::bitflags;
use std::sync::Arc;
use thiserror::Error;

bitflags! {
    /// The directions a handler wants to see.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct DirMask: u8 {
        const IN = 0x01;
        const OUT = 0x02;
    }
}

impl From<Direction> for DirMask {
    fn from(dir: Direction) -> Self {
        match dir {
            Direction::In => Self::IN,
            Direction::Out => Self::OUT,
        }
    }
}

bitflags! {
    /// The transports a handler wants to see. `IP` covers every
    /// protocol other than TCP, UDP and ICMP.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct ProtoMask: u8 {
        const IP = 0x01;
        const TCP = 0x02;
        const UDP = 0x04;
    }
}

impl ProtoMask {
    pub fn for_proto(proto: Protocol) -> Self {
        match proto {
            Protocol::TCP => Self::TCP,
            Protocol::UDP => Self::UDP,
            _ => Self::IP,
        }
    }
}

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum FixupError {
    /// The payload is not a message this handler rewrites. This is the
    /// normal outcome for most packets and is not worth logging.
    #[error("unrecognized protocol message")]
    UnrecognizedProtocolMessage,

    #[error("malformed address in payload")]
    MalformedEmbeddedAddress,

    #[error(transparent)]
    Alias(#[from] AliasError),
}

/// What a handler gets to work with.
pub struct HandlerCtx<'a> {
    pub table: &'a mut LinkTable,
    /// The link the packet matched. `None` for packets of protocols
    /// without ports.
    pub link: Option<LinkId>,
    pub dir: Direction,
    /// The whole packet buffer, including spare room at the end.
    pub buf: &'a mut [u8],
    /// The IPv4 header as it was before translation. A handler that
    /// resizes the packet must keep `total_len` current.
    pub ip: Ipv4Meta,
    pub src_port: u16,
    pub dst_port: u16,
}

pub trait ProtoHandler: Send + Sync {
    fn name(&self) -> &str;

    /// Lower runs first.
    fn priority(&self) -> u16;

    fn dir(&self) -> DirMask;

    fn proto(&self) -> ProtoMask;

    /// Is this packet part of a conversation this handler knows?
    fn fingerprint(&self, ctx: &HandlerCtx) -> bool;

    fn apply(&self, ctx: &mut HandlerCtx) -> Result<(), FixupError>;
}

/// An ordered set of protocol handlers.
pub struct HandlerRegistry {
    handlers: KRwLock<Vec<Arc<dyn ProtoHandler>>>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistry {
    /// A registry with no handlers at all.
    pub fn new() -> Self {
        Self { handlers: KRwLock::new(Vec::new()) }
    }

    /// A registry with the stock handlers installed.
    pub fn with_defaults() -> Self {
        let reg = Self::new();
        for h in ftp::handlers() {
            let res = reg.register(h);
            debug_assert!(res.is_ok(), "stock handlers collide: {res:?}");
        }
        reg
    }

    /// Add a handler. Handlers of equal priority keep registration
    /// order; two handlers of equal priority may not share a direction
    /// and a transport.
    pub fn register(&self, handler: Arc<dyn ProtoHandler>) -> AliasResult<()> {
        let mut handlers = self.handlers.write();
        let pri = handler.priority();

        let clash = handlers.iter().any(|h| {
            h.priority() == pri
                && h.dir().intersects(handler.dir())
                && h.proto().intersects(handler.proto())
        });
        if clash {
            return Err(AliasError::HandlerExists {
                name: handler.name().to_string(),
                priority: pri,
            });
        }

        let pos = handlers
            .iter()
            .position(|h| h.priority() > pri)
            .unwrap_or(handlers.len());
        handlers.insert(pos, handler);
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> AliasResult<()> {
        let mut handlers = self.handlers.write();
        match handlers.iter().position(|h| h.name() == name) {
            Some(idx) => {
                handlers.remove(idx);
                Ok(())
            }

            None => Err(AliasError::NoSuchHandler(name.to_string())),
        }
    }

    /// The handler names in dispatch order.
    pub fn names(&self) -> Vec<String> {
        self.handlers.read().iter().map(|h| h.name().to_string()).collect()
    }

    /// Run the first matching handler. Returns `None` when no handler
    /// took the packet.
    pub fn dispatch(
        &self,
        proto: ProtoMask,
        ctx: &mut HandlerCtx,
    ) -> Option<Result<(), FixupError>> {
        let dir = DirMask::from(ctx.dir);
        let handlers = self.handlers.read();

        handlers
            .iter()
            .filter(|h| h.dir().intersects(dir) && h.proto().intersects(proto))
            .find(|h| h.fingerprint(ctx))
            .map(|h| h.apply(ctx))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::nat::NatConfig;
    use crate::engine::packet::parse_ipv4;
    use crate::provider::Providers;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    struct Probe {
        name: &'static str,
        pri: u16,
        dir: DirMask,
        proto: ProtoMask,
        port: u16,
        hits: AtomicUsize,
    }

    impl Probe {
        fn new(name: &'static str, pri: u16, dir: DirMask, port: u16) -> Self {
            Self {
                name,
                pri,
                dir,
                proto: ProtoMask::TCP,
                port,
                hits: AtomicUsize::new(0),
            }
        }
    }

    impl ProtoHandler for Probe {
        fn name(&self) -> &str {
            self.name
        }

        fn priority(&self) -> u16 {
            self.pri
        }

        fn dir(&self) -> DirMask {
            self.dir
        }

        fn proto(&self) -> ProtoMask {
            self.proto
        }

        fn fingerprint(&self, ctx: &HandlerCtx) -> bool {
            ctx.dst_port == self.port
        }

        fn apply(&self, _ctx: &mut HandlerCtx) -> Result<(), FixupError> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn min_ipv4() -> Vec<u8> {
        let mut pkt = vec![0u8; 40];
        pkt[0] = 0x45;
        pkt[3] = 40;
        pkt[9] = 6;
        pkt
    }

    #[test]
    fn ordering_and_conflicts() {
        let reg = HandlerRegistry::new();
        reg.register(Arc::new(Probe::new("b", 20, DirMask::OUT, 1))).unwrap();
        reg.register(Arc::new(Probe::new("a", 10, DirMask::OUT, 1))).unwrap();
        reg.register(Arc::new(Probe::new("c", 20, DirMask::IN, 1))).unwrap();
        reg.register(Arc::new(Probe::new("d", 30, DirMask::all(), 1))).unwrap();
        assert_eq!(reg.names(), vec!["a", "b", "c", "d"]);

        let res =
            reg.register(Arc::new(Probe::new("e", 20, DirMask::all(), 1)));
        assert_eq!(
            res,
            Err(AliasError::HandlerExists { name: "e".into(), priority: 20 })
        );

        reg.unregister("b").unwrap();
        assert_eq!(reg.names(), vec!["a", "c", "d"]);
        assert_eq!(
            reg.unregister("b"),
            Err(AliasError::NoSuchHandler("b".into()))
        );
    }

    #[test]
    fn first_fingerprint_wins() {
        let reg = HandlerRegistry::new();
        let low = Arc::new(Probe::new("low", 1, DirMask::OUT, 99));
        let mid = Arc::new(Probe::new("mid", 2, DirMask::OUT, 80));
        let high = Arc::new(Probe::new("high", 3, DirMask::OUT, 80));
        reg.register(low.clone()).unwrap();
        reg.register(mid.clone()).unwrap();
        reg.register(high.clone()).unwrap();

        let mut table =
            LinkTable::new(&NatConfig::default(), Providers::default())
                .unwrap();
        let mut buf = min_ipv4();
        let ip = parse_ipv4(&buf).unwrap();
        let mut ctx = HandlerCtx {
            table: &mut table,
            link: None,
            dir: Direction::Out,
            buf: &mut buf,
            ip,
            src_port: 4000,
            dst_port: 80,
        };

        assert_eq!(reg.dispatch(ProtoMask::TCP, &mut ctx), Some(Ok(())));
        assert_eq!(low.hits.load(Ordering::SeqCst), 0);
        assert_eq!(mid.hits.load(Ordering::SeqCst), 1);
        assert_eq!(high.hits.load(Ordering::SeqCst), 0);

        // Wrong transport or direction: nobody is asked.
        assert_eq!(reg.dispatch(ProtoMask::UDP, &mut ctx), None);
        ctx.dir = Direction::In;
        assert_eq!(reg.dispatch(ProtoMask::TCP, &mut ctx), None);
    }

    #[test]
    fn defaults_have_ftp() {
        let reg = HandlerRegistry::with_defaults();
        assert_eq!(reg.names(), vec!["ftp-out", "ftp-in"]);

        // Installing them twice is the clash `with_defaults` guards
        // against.
        for h in ftp::handlers() {
            assert!(matches!(
                reg.register(h),
                Err(AliasError::HandlerExists { .. })
            ));
        }
        assert_eq!(reg.names().len(), 2);
    }
}
