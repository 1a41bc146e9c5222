// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Replay captured traffic through an instance built from a
//! configuration file.

use aliasadm::AdmConfig;
use aliasadm::capture::Capture;
use aliasadm::capture::Frame;
use aliasadm::replay::ReplayStats;
use aliasadm::replay::replay;
use natalias::provider::NullLog;
use natalias_test_utils::*;
use pcap_parser::Linktype;
use slog::Discard;
use slog::Logger;
use slog::o;

const CFG: &str = r#"
[nat]
alias_addr = "203.0.113.9"
seed = 7

[[redirect_port]]
proto = "TCP"
local_addr = "10.0.0.5"
local_port = 22
alias_port = 2222
"#;

fn frame(pkt: &[u8]) -> Frame {
    let ip = pkt[..ip_len(pkt)].to_vec();
    Frame { ts_sec: 0, ts_usec: 0, l2: vec![], ip: Some(ip.clone()), raw: ip }
}

fn capture(pkts: &[Vec<u8>]) -> Capture {
    Capture {
        linktype: Linktype::RAW,
        snaplen: 65535,
        frames: pkts.iter().map(|p| frame(p)).collect(),
    }
}

fn datagram(cap: &Capture, idx: usize) -> Vec<u8> {
    cap.frames[idx].ip.clone().unwrap()
}

fn log() -> Logger {
    Logger::root(Discard, o!())
}

#[test]
fn outbound_then_inbound() {
    let nat = AdmConfig::from_toml(CFG).unwrap().build(Box::new(NullLog)).unwrap();

    let mut outbound = capture(&[
        tcp(ep(LOCAL, 40000), ep(REMOTE, 443), SYN, 1, 0, &[]),
        udp(ep(LOCAL, 5000), ep(REMOTE, 53), b"query"),
    ]);
    let stats = replay(&nat, &mut outbound, Direction::Out, &log());
    assert_eq!(stats, ReplayStats { aliased: 2, ..Default::default() });
    for idx in 0..2 {
        let pkt = datagram(&outbound, idx);
        assert_checksums(&pkt);
        assert_eq!(addrs(&pkt).0, ALIAS);
    }

    let mut inbound = capture(&[
        tcp(ep(REMOTE, 50000), ep(ALIAS, 2222), SYN, 9, 0, &[]),
        udp(ep(REMOTE, 53), ep(ALIAS, 5000), b"answer"),
        udp(ep(REMOTE, 53), ep(ALIAS, 5999), b"stray"),
    ]);
    let stats = replay(&nat, &mut inbound, Direction::In, &log());
    assert_eq!(stats.aliased, 2);
    assert_eq!(stats.ignored, 1);
    assert_eq!(endpoints(&datagram(&inbound, 0)).1, ep(LOCAL, 22));
    assert_eq!(endpoints(&datagram(&inbound, 1)).1, ep(LOCAL, 5000));
    assert_eq!(endpoints(&datagram(&inbound, 2)).1, ep(ALIAS, 5999));
}

#[test]
fn parked_fragments_released() {
    let nat = AdmConfig::from_toml(CFG).unwrap().build(Box::new(NullLog)).unwrap();

    let mut outbound = capture(&[udp(ep(LOCAL, 5000), ep(REMOTE, 53), b"q")]);
    replay(&nat, &mut outbound, Direction::Out, &log());

    let big = udp(ep(REMOTE, 53), ep(ALIAS, 5000), &[0xab; 40]);
    let (head, tail) = fragment(&big, 0x77, 24);
    let mut inbound = capture(&[tail, head]);

    let stats = replay(&nat, &mut inbound, Direction::In, &log());
    assert_eq!(stats.unresolved_frags, 1);
    assert_eq!(stats.header_frags, 1);
    assert_eq!(nat.link_counts().frag_ptr, 0);

    let tail = datagram(&inbound, 0);
    let head = datagram(&inbound, 1);
    assert_checksums(&tail);
    assert_eq!(addrs(&tail).1, LOCAL);
    assert_checksums(&reassemble(&head, &tail));
}

#[test]
fn non_ip_frames_skipped() {
    let nat = AdmConfig::default().build(Box::new(NullLog)).unwrap();
    let mut cap = capture(&[]);
    cap.frames.push(Frame {
        ts_sec: 0,
        ts_usec: 0,
        l2: vec![],
        ip: None,
        raw: vec![0x60; 40],
    });

    let stats = replay(&nat, &mut cap, Direction::Out, &log());
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.total(), 1);
}

#[test]
fn written_capture_reads_back() {
    let nat = AdmConfig::from_toml(CFG).unwrap().build(Box::new(NullLog)).unwrap();
    let mut cap = capture(&[udp(ep(LOCAL, 6000), ep(REMOTE, 123), b"ntp")]);
    replay(&nat, &mut cap, Direction::Out, &log());

    let mut bytes = vec![];
    cap.write(&mut bytes).unwrap();
    let again = Capture::parse(&bytes).unwrap();
    assert_eq!(again.frames[0].raw, datagram(&cap, 0));
    assert_eq!(addrs(&again.frames[0].raw).0, ALIAS);
}
