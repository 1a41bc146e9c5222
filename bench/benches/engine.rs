// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use criterion::BatchSize;
use criterion::Criterion;
use criterion::criterion_group;
use criterion::criterion_main;
use natalias::engine::checksum;
use natalias_bench::loaded;
use natalias_test_utils::*;
use std::hint::black_box;

pub fn checksums(c: &mut Criterion) {
    let mut c = c.benchmark_group("checksum");
    let data = vec![0x5au8; 1460];

    c.bench_function("full 1460B", |b| {
        b.iter(|| checksum::compute_field(black_box(&data)))
    });

    c.bench_function("incremental addr", |b| {
        b.iter(|| checksum::update_addr(black_box(0x1c46), LOCAL, ALIAS))
    });
}

pub fn translate(c: &mut Criterion) {
    let mut c = c.benchmark_group("translate");

    for n in [16, 4096] {
        let (nat, pkts) = loaded(n);
        let pkt = pkts[n / 2].clone();
        c.bench_function(format!("out established {n} links"), |b| {
            b.iter_batched(
                || pkt.clone(),
                |mut p| nat.process_out(black_box(&mut p)),
                BatchSize::SmallInput,
            )
        });
    }

    let (nat, _clock) = nat_with_clock(ModeFlags::SAME_PORTS);
    let mut syn = tcp(ep(LOCAL, 3000), ep(REMOTE, 21), SYN, 999, 0, &[]);
    let _ = nat.process_out(&mut syn);
    let port = tcp(
        ep(LOCAL, 3000),
        ep(REMOTE, 21),
        ACK | PSH,
        1000,
        1,
        b"PORT 10,0,0,5,15,160\r\n",
    );
    c.bench_function("ftp PORT rewrite", |b| {
        b.iter_batched(
            || port.clone(),
            |mut p| nat.process_out(black_box(&mut p)),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(engine, checksums, translate);
criterion_main!(engine);
