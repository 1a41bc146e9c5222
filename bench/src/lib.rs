// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Setup shared by the engine benchmarks.

use natalias_test_utils::*;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// An instance carrying `n` established outbound TCP flows from
/// random private endpoints to random remote ports, and one packet of
/// each flow.
pub fn loaded(n: usize) -> (Nat, Vec<Vec<u8>>) {
    let (nat, _clock) = nat_with_clock(ModeFlags::empty());
    let mut rng = StdRng::seed_from_u64(0xbe7c4);
    let mut pkts = Vec::with_capacity(n);

    while pkts.len() < n {
        let addr = Ipv4Addr::new(10, 0, rng.random(), rng.random());
        let src = ep(addr, rng.random_range(1024..=u16::MAX));
        let dst = ep(REMOTE, rng.random_range(1..1024));
        let mut syn = tcp(src, dst, SYN, 1, 0, &[]);
        if nat.process_out(&mut syn).is_ok() {
            pkts.push(tcp(src, dst, ACK, 2, 1, b"payload"));
        }
    }

    (nat, pkts)
}
