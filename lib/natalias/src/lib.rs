// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! A network address translation engine.
//!
//! The engine keeps the mapping between private ("original") and public
//! ("alias") endpoints for IPv4 TCP, UDP, ICMP and other IP traffic,
//! hands out alias ports, expires idle mappings, and lets
//! application-layer fixups (FTP being the stock one) rewrite
//! addresses carried inside payloads without breaking checksums or TCP
//! sequence numbering.
//!
//! The caller owns packet I/O. It hands the engine a captured IPv4
//! packet in a buffer with room to grow and gets the rewritten packet
//! back in the same buffer. See [`engine::nat::Nat`].

#![allow(clippy::len_without_is_empty)]
#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

pub mod api {
    pub use natalias_api::*;
}
pub mod engine;
pub mod print;
pub mod provider;
pub mod sync;
pub mod time;

pub use engine::nat::Nat;
pub use engine::nat::NatBuilder;
pub use engine::nat::NatConfig;
