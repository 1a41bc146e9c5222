// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Common routines for integration tests.

// This type of pedantry is more trouble than it's worth here.
#![allow(dead_code)]

pub mod pcap;
pub mod pkt;

// Let's make our lives easier and pub use a bunch of stuff.
pub use natalias::Nat;
pub use natalias::NatBuilder;
pub use natalias::NatConfig;
pub use natalias::api::*;
pub use natalias::engine::firewall::RecordingFirewall;
pub use natalias::engine::handler::HandlerRegistry;
pub use natalias::provider::CaptureLog;
pub use natalias::provider::ManualClock;
pub use pcap::PcapBuilder;
pub use pcap::read_pkts;
pub use pkt::*;
pub use std::net::Ipv4Addr;
pub use std::net::SocketAddrV4;

/// The private host most tests send from.
pub const LOCAL: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);

/// The public address of the instance.
pub const ALIAS: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 9);

/// Somebody on the internet.
pub const REMOTE: Ipv4Addr = Ipv4Addr::new(198, 51, 100, 7);

pub fn ep(addr: Ipv4Addr, port: u16) -> SocketAddrV4 {
    SocketAddrV4::new(addr, port)
}

/// An instance aliasing to [`ALIAS`] with a deterministic port
/// allocator and a clock the test controls.
pub fn nat_with_clock(mode: ModeFlags) -> (Nat, ManualClock) {
    let clock = ManualClock::new();
    let cfg = NatConfig {
        alias_addr: ALIAS,
        mode,
        seed: Some(0x5eed),
        ..Default::default()
    };
    let nat = NatBuilder::new()
        .config(cfg)
        .clock(Box::new(clock.clone()))
        .build()
        .unwrap();
    (nat, clock)
}

/// Run a packet out and check it is still well formed.
#[track_caller]
pub fn out(nat: &Nat, pkt: &mut [u8]) -> PacketResult {
    let res = nat.process_out(pkt).unwrap();
    assert_checksums(pkt);
    nat.table().check_consistency();
    res
}

/// Run a packet in and check it is still well formed.
#[track_caller]
pub fn inb(nat: &Nat, pkt: &mut [u8]) -> PacketResult {
    let res = nat.process_in(pkt).unwrap();
    assert_checksums(pkt);
    nat.table().check_consistency();
    res
}
