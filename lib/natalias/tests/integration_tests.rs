// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Integration tests.
//!
//! Every test drives a whole instance with real packets and checks
//! both the rewritten headers and the checksums.

use natalias_test_utils::*;
use std::sync::Arc;

#[test]
fn tcp_identity_and_reply() {
    let (nat, _clock) = nat_with_clock(ModeFlags::SAME_PORTS);
    let mut syn = tcp(ep(LOCAL, 4000), ep(REMOTE, 80), SYN, 100, 0, &[]);
    assert_eq!(out(&nat, &mut syn), PacketResult::Aliased);
    assert_eq!(endpoints(&syn), (ep(ALIAS, 4000), ep(REMOTE, 80)));

    let mut syn_ack =
        tcp(ep(REMOTE, 80), ep(ALIAS, 4000), SYN | ACK, 900, 101, &[]);
    assert_eq!(inb(&nat, &mut syn_ack), PacketResult::Aliased);
    assert_eq!(endpoints(&syn_ack), (ep(REMOTE, 80), ep(LOCAL, 4000)));

    // The same flow keeps its link.
    let mut data = tcp(ep(LOCAL, 4000), ep(REMOTE, 80), ACK, 101, 901, b"GET /");
    out(&nat, &mut data);
    assert_eq!(endpoints(&data).0, ep(ALIAS, 4000));
    assert_eq!(nat.link_counts().tcp, 1);
}

#[test]
fn udp_without_same_ports() {
    let (nat, _clock) = nat_with_clock(ModeFlags::empty());
    let mut q = udp(ep(LOCAL, 5353), ep(REMOTE, 53), b"query");
    out(&nat, &mut q);
    let (alias, _) = endpoints(&q);
    assert_eq!(*alias.ip(), ALIAS);
    assert!(alias.port() >= 0x8000);

    let mut a = udp(ep(REMOTE, 53), alias, b"answer");
    inb(&nat, &mut a);
    assert_eq!(endpoints(&a).1, ep(LOCAL, 5353));

    // Unknown alias port: a new inbound link toward the alias address.
    let mut stray = udp(ep(REMOTE, 53), ep(ALIAS, 1), b"x");
    assert_eq!(inb(&nat, &mut stray), PacketResult::Aliased);
    assert_eq!(endpoints(&stray).1, ep(ALIAS, 1));
}

#[test]
fn deny_incoming() {
    let (nat, _clock) = nat_with_clock(ModeFlags::DENY_INCOMING);
    let mut stray = udp(ep(REMOTE, 53), ep(ALIAS, 7777), b"x");
    let before = stray.clone();
    assert_eq!(inb(&nat, &mut stray), PacketResult::Ignored);
    assert_eq!(stray, before);
    assert_eq!(nat.link_counts().total(), 0);
}

#[test]
fn process_out_try_only_follows_existing() {
    let (nat, _clock) = nat_with_clock(ModeFlags::SAME_PORTS);
    let mut q = udp(ep(LOCAL, 5000), ep(REMOTE, 53), b"q");
    assert_eq!(nat.process_out_try(&mut q, false).unwrap(), PacketResult::Ignored);
    assert_eq!(nat.link_counts().total(), 0);

    out(&nat, &mut q.clone());
    assert_eq!(nat.process_out_try(&mut q, false).unwrap(), PacketResult::Aliased);
    assert_eq!(endpoints(&q).0, ep(ALIAS, 5000));
}

#[test]
fn icmp_echo_ident_aliased() {
    let (nat, _clock) = nat_with_clock(ModeFlags::empty());
    let mut req = icmp_echo(LOCAL, REMOTE, false, 0x0042, 1);
    out(&nat, &mut req);
    assert_eq!(addrs(&req), (ALIAS, REMOTE));
    let alias_id = echo_ident(&req);

    let mut reply = icmp_echo(REMOTE, ALIAS, true, alias_id, 1);
    inb(&nat, &mut reply);
    assert_eq!(addrs(&reply), (REMOTE, LOCAL));
    assert_eq!(echo_ident(&reply), 0x0042);
}

#[test]
fn icmp_error_quotes_original() {
    let (nat, _clock) = nat_with_clock(ModeFlags::empty());
    let mut q = udp(ep(LOCAL, 5000), ep(REMOTE, 53), b"query");
    out(&nat, &mut q);

    // The remote end complains about the datagram it actually got.
    let mut err = icmp_unreachable(REMOTE, ALIAS, &q);
    assert_eq!(inb(&nat, &mut err), PacketResult::Aliased);
    assert_eq!(addrs(&err), (REMOTE, LOCAL));

    let quoted = icmp_quoted(&err);
    assert_eq!(endpoints(&quoted), (ep(LOCAL, 5000), ep(REMOTE, 53)));
}

#[test]
fn icmp_error_from_private_host() {
    let (nat, _clock) = nat_with_clock(ModeFlags::empty());
    let mut q = udp(ep(LOCAL, 5000), ep(REMOTE, 53), b"query");
    out(&nat, &mut q);
    let alias = endpoints(&q).0;

    let mut reply = udp(ep(REMOTE, 53), alias, b"late");
    inb(&nat, &mut reply);

    // The private host rejects the reply; the error must not leak its
    // address or port.
    let mut err = icmp_unreachable(LOCAL, REMOTE, &reply);
    assert_eq!(out(&nat, &mut err), PacketResult::Aliased);
    assert_eq!(addrs(&err), (ALIAS, REMOTE));
    assert_eq!(endpoints(&icmp_quoted(&err)), (ep(REMOTE, 53), alias));
}

#[test]
fn partial_redirect_upgrades_per_remote() {
    let (nat, _clock) = nat_with_clock(ModeFlags::empty());
    let redir = nat
        .redirect_port(&RedirectPortReq {
            proto: Protocol::TCP,
            local_addr: LOCAL,
            local_port: 22,
            remote_addr: ANY_ADDR,
            remote_port: 0,
            alias_addr: ALIAS,
            alias_port: 2222,
            servers: vec![],
        })
        .unwrap();

    for port in [40000, 40001] {
        let mut syn = tcp(ep(REMOTE, port), ep(ALIAS, 2222), SYN, 1, 0, &[]);
        inb(&nat, &mut syn);
        assert_eq!(endpoints(&syn).1, ep(LOCAL, 22));

        let mut syn_ack =
            tcp(ep(LOCAL, 22), ep(REMOTE, port), SYN | ACK, 7, 2, &[]);
        out(&nat, &mut syn_ack);
        assert_eq!(endpoints(&syn_ack).0, ep(ALIAS, 2222));
    }

    // The redirect itself stays, plus one full link per remote.
    assert!(nat.is_permanent(redir));
    assert_eq!(nat.link_counts().tcp, 3);
}

#[test]
fn expired_flow_falls_back_to_redirect() {
    let (nat, clock) = nat_with_clock(ModeFlags::empty());
    nat.redirect_port(&RedirectPortReq {
        proto: Protocol::TCP,
        local_addr: LOCAL,
        local_port: 80,
        remote_addr: ANY_ADDR,
        remote_port: 0,
        alias_addr: ALIAS,
        alias_port: 8080,
        servers: vec![],
    })
    .unwrap();

    let mut syn = tcp(ep(REMOTE, 40000), ep(ALIAS, 8080), SYN, 1, 0, &[]);
    inb(&nat, &mut syn);
    let mut rst = tcp(ep(REMOTE, 40000), ep(ALIAS, 8080), RST, 2, 0, &[]);
    inb(&nat, &mut rst);

    clock.advance_secs(TCP_EXPIRE_DEAD + 1);
    nat.house_keeping();

    // The same remote endpoint starts over and still reaches the
    // redirect target.
    let mut syn = tcp(ep(REMOTE, 40000), ep(ALIAS, 8080), SYN, 100, 0, &[]);
    assert_eq!(inb(&nat, &mut syn), PacketResult::Aliased);
    assert_eq!(endpoints(&syn).1, ep(LOCAL, 80));
    assert_eq!(nat.link_counts().tcp, 2);
}

#[test]
fn lsnat_round_robin() {
    let (nat, _clock) = nat_with_clock(ModeFlags::empty());
    let servers: Vec<SocketAddrV4> = (1..=3)
        .map(|i| ep(Ipv4Addr::new(10, 0, 0, i), 80))
        .collect();
    nat.redirect_port(&RedirectPortReq {
        proto: Protocol::TCP,
        local_addr: *servers[0].ip(),
        local_port: 80,
        remote_addr: ANY_ADDR,
        remote_port: 0,
        alias_addr: ALIAS,
        alias_port: 8080,
        servers: servers.clone(),
    })
    .unwrap();

    let mut seen = Vec::new();
    for port in 5000..5004 {
        let mut syn = tcp(ep(REMOTE, port), ep(ALIAS, 8080), SYN, 1, 0, &[]);
        inb(&nat, &mut syn);
        seen.push(endpoints(&syn).1);
    }
    assert_eq!(seen, vec![servers[0], servers[1], servers[2], servers[0]]);

    // Replies from the second server leave through the pool's port.
    let mut reply = tcp(servers[1], ep(REMOTE, 5001), SYN | ACK, 9, 2, &[]);
    out(&nat, &mut reply);
    assert_eq!(endpoints(&reply).0, ep(ALIAS, 8080));
}

#[test]
fn tcp_expiry_follows_state() {
    let (nat, clock) = nat_with_clock(ModeFlags::SAME_PORTS);
    let mut syn = tcp(ep(LOCAL, 4000), ep(REMOTE, 80), SYN, 1, 0, &[]);
    out(&nat, &mut syn);
    let mut syn_ack = tcp(ep(REMOTE, 80), ep(ALIAS, 4000), SYN | ACK, 1, 2, &[]);
    inb(&nat, &mut syn_ack);

    // Established connections outlive the initial timeout.
    clock.advance_secs(TCP_EXPIRE_INITIAL + 100);
    nat.house_keeping();
    assert_eq!(nat.link_counts().tcp, 1);

    let mut fin = tcp(ep(LOCAL, 4000), ep(REMOTE, 80), FIN | ACK, 2, 2, &[]);
    out(&nat, &mut fin);

    clock.advance_secs(TCP_EXPIRE_SINGLEDEAD + 1);
    nat.house_keeping();
    assert_eq!(nat.link_counts().tcp, 0);
}

#[test]
fn udp_expiry() {
    let (nat, clock) = nat_with_clock(ModeFlags::SAME_PORTS);
    let mut q = udp(ep(LOCAL, 5000), ep(REMOTE, 53), b"q");
    out(&nat, &mut q);

    clock.advance_secs(UDP_EXPIRE_TIME);
    nat.house_keeping();
    assert_eq!(nat.link_counts().udp, 1);

    clock.advance_secs(2);
    nat.house_keeping();
    assert_eq!(nat.link_counts().udp, 0);

    // The late answer no longer finds its way in.
    let mut a = udp(ep(REMOTE, 53), ep(ALIAS, 5000), b"a");
    inb(&nat, &mut a);
    assert_eq!(endpoints(&a).1, ep(ALIAS, 5000));
}

#[test]
fn one_port_window() {
    let (nat, _clock) = nat_with_clock(ModeFlags::empty());
    nat.set_alias_port_range(40000, 1).unwrap();

    let mut a = tcp(ep(LOCAL, 5000), ep(REMOTE, 80), SYN, 1, 0, &[]);
    out(&nat, &mut a);
    assert_eq!(endpoints(&a).0, ep(ALIAS, 40000));

    // Same destination: the only alias port is taken.
    let mut b = tcp(ep(LOCAL, 5001), ep(REMOTE, 80), SYN, 1, 0, &[]);
    assert_eq!(
        nat.process_out(&mut b),
        Err(AliasError::PortAllocationExhausted)
    );

    // A different destination can share it.
    let mut c = tcp(ep(LOCAL, 5001), ep(REMOTE, 443), SYN, 1, 0, &[]);
    out(&nat, &mut c);
    assert_eq!(endpoints(&c).0, ep(ALIAS, 40000));

    assert_eq!(
        nat.set_alias_port_range(0xFFFF, 2),
        Err(AliasError::InvalidPortRange { lower: 0xFFFF, len: 2 })
    );
}

#[test]
fn fragments_in_order() {
    let (nat, _clock) = nat_with_clock(ModeFlags::SAME_PORTS);
    let mut q = udp(ep(LOCAL, 5000), ep(REMOTE, 53), b"q");
    out(&nat, &mut q);

    let big = udp(ep(REMOTE, 53), ep(ALIAS, 5000), &[0xAB; 40]);
    let (mut head, mut tail) = fragment(&big, 0x77, 16);

    assert_eq!(inb(&nat, &mut head), PacketResult::FoundHeaderFragment);
    assert_eq!(addrs(&head).1, LOCAL);
    assert_eq!(inb(&nat, &mut tail), PacketResult::Aliased);
    assert_eq!(addrs(&tail).1, LOCAL);

    let whole = reassemble(&head, &tail);
    assert_checksums(&whole);
    assert_eq!(endpoints(&whole), (ep(REMOTE, 53), ep(LOCAL, 5000)));
}

#[test]
fn fragments_out_of_order() {
    let (nat, _clock) = nat_with_clock(ModeFlags::SAME_PORTS);
    let mut q = udp(ep(LOCAL, 5000), ep(REMOTE, 53), b"q");
    out(&nat, &mut q);

    let big = udp(ep(REMOTE, 53), ep(ALIAS, 5000), &[0xCD; 40]);
    let (mut head, mut tail) = fragment(&big, 0x99, 16);

    assert_eq!(inb(&nat, &mut tail), PacketResult::UnresolvedFragment);
    nat.save_fragment(&tail).unwrap();
    assert_eq!(nat.link_counts().frag_ptr, 1);

    assert_eq!(inb(&nat, &mut head), PacketResult::FoundHeaderFragment);
    let mut parked = nat.get_fragment(&head).unwrap().unwrap();
    assert_eq!(nat.get_fragment(&head).unwrap(), None);
    assert_eq!(nat.link_counts().frag_ptr, 0);

    nat.fragment_in(&head, &mut parked).unwrap();
    assert_checksums(&parked);
    assert_eq!(addrs(&parked).1, LOCAL);

    let whole = reassemble(&head, &parked);
    assert_checksums(&whole);
}

#[test]
fn outbound_trailing_fragment_gets_alias() {
    let (nat, _clock) = nat_with_clock(ModeFlags::SAME_PORTS);
    let big = udp(ep(LOCAL, 5000), ep(REMOTE, 53), &[1; 40]);
    let (mut head, mut tail) = fragment(&big, 0x11, 16);
    out(&nat, &mut head);
    out(&nat, &mut tail);
    assert_eq!(addrs(&head).0, ALIAS);
    assert_eq!(addrs(&tail).0, ALIAS);
    assert_checksums(&reassemble(&head, &tail));
}

#[test]
fn proto_and_addr_redirects() {
    let (nat, _clock) = nat_with_clock(ModeFlags::empty());
    let public = Ipv4Addr::new(203, 0, 113, 50);
    nat.redirect_addr(&RedirectAddrReq { local_addr: LOCAL, alias_addr: public })
        .unwrap();

    // Everything from the host leaves as its public address.
    let mut q = udp(ep(LOCAL, 5000), ep(REMOTE, 53), b"q");
    out(&nat, &mut q);
    assert_eq!(*endpoints(&q).0.ip(), public);
    assert_eq!(nat.find_alias_address(LOCAL), public);
    assert_eq!(nat.find_original_address(public), LOCAL);
    assert_eq!(nat.find_alias_address(Ipv4Addr::new(10, 0, 0, 6)), ALIAS);

    // GRE arriving at the alias address goes to the tunnel endpoint.
    let tunnel = Ipv4Addr::new(10, 0, 0, 9);
    nat.redirect_proto(&RedirectProtoReq {
        proto: 47,
        local_addr: tunnel,
        remote_addr: ANY_ADDR,
        alias_addr: ALIAS,
    })
    .unwrap();
    let mut gre = raw_ip(REMOTE, ALIAS, 47, &[0, 0, 0x08, 0]);
    assert_eq!(inb(&nat, &mut gre), PacketResult::Aliased);
    assert_eq!(addrs(&gre), (REMOTE, tunnel));

    let mut back = raw_ip(tunnel, REMOTE, 47, &[0, 0, 0x08, 0]);
    out(&nat, &mut back);
    assert_eq!(addrs(&back), (ALIAS, REMOTE));
}

#[test]
fn proxy_rewrites_inbound_source() {
    let (nat, _clock) = nat_with_clock(ModeFlags::SAME_PORTS);
    let mut q = tcp(ep(LOCAL, 4000), ep(REMOTE, 80), SYN, 1, 0, &[]);
    out(&nat, &mut q);

    let id = nat.dump_links().links[0].id;
    let proxy = Ipv4Addr::new(10, 0, 0, 254);
    nat.set_proxy(id, Some(proxy), Some(3128)).unwrap();

    let mut r = tcp(ep(REMOTE, 80), ep(ALIAS, 4000), SYN | ACK, 1, 2, &[]);
    inb(&nat, &mut r);
    assert_eq!(endpoints(&r), (ep(proxy, 3128), ep(LOCAL, 4000)));
}

#[test]
fn shared_registry_and_logging() {
    let registry = Arc::new(HandlerRegistry::with_defaults());
    let log = CaptureLog::default();
    let cfg = NatConfig {
        alias_addr: ALIAS,
        mode: ModeFlags::LOG,
        seed: Some(3),
        ..Default::default()
    };
    let a = NatBuilder::new()
        .config(cfg.clone())
        .registry(registry.clone())
        .log(Box::new(log.clone()))
        .build()
        .unwrap();
    let b = NatBuilder::new().config(cfg).registry(registry.clone()).build().unwrap();

    a.unregister_handler("ftp-in").unwrap();
    assert_eq!(b.registry().names(), vec!["ftp-out"]);

    let mut q = udp(ep(LOCAL, 5000), ep(REMOTE, 53), b"q");
    out(&a, &mut q);
    assert!(log.lines().iter().any(|(_, l)| l.contains("udp=1")));
    assert_eq!(b.link_counts().total(), 0);
}

#[test]
fn dump_and_print() {
    let (nat, _clock) = nat_with_clock(ModeFlags::SAME_PORTS);
    let mut q = udp(ep(LOCAL, 5000), ep(REMOTE, 53), b"q");
    out(&nat, &mut q);

    let dump = nat.dump_links();
    assert_eq!(dump.links.len(), 1);
    assert_eq!(dump.links[0].alias_port, 5000);
    assert_eq!(dump.counts.udp, 1);

    let mut text = Vec::new();
    natalias::print::print_links_into(&mut text, &dump).unwrap();
    let text = String::from_utf8(text).unwrap();
    assert!(text.contains("203.0.113.9:5000"));
    assert!(text.contains("198.51.100.7:53"));
}

// Write the translated flow out as a capture and make sure what comes
// back is exactly what left the engine.
#[test]
fn capture_translated_flow() {
    let (nat, _clock) = nat_with_clock(ModeFlags::empty());
    let path = std::env::temp_dir()
        .join(format!("natalias-capture-{}.pcap", std::process::id()));
    let mut cap = PcapBuilder::new(&path);

    let mut syn = tcp(ep(LOCAL, 4444), ep(REMOTE, 80), SYN, 1, 0, &[]);
    out(&nat, &mut syn);
    cap.add_pkt(&syn);
    let mut q = udp(ep(LOCAL, 5353), ep(REMOTE, 53), b"query");
    out(&nat, &mut q);
    cap.add_pkt(&q);
    drop(cap);

    let pkts = read_pkts(&path);
    std::fs::remove_file(&path).unwrap();
    assert_eq!(pkts.len(), 2);
    assert_eq!(pkts[0], syn[..ip_len(&syn)]);
    assert_eq!(pkts[1], q[..ip_len(&q)]);
    assert_eq!(addrs(&pkts[1]).0, ALIAS);
}

#[test]
fn punch_fw_for_ftp_data() {
    let fw = Arc::new(RecordingFirewall::default());
    let nat = NatBuilder::new()
        .config(NatConfig {
            alias_addr: ALIAS,
            mode: ModeFlags::SAME_PORTS | ModeFlags::PUNCH_FW,
            seed: Some(4),
            fw_base: 1000,
            fw_num: 4,
            ..Default::default()
        })
        .firewall(fw.clone())
        .build()
        .unwrap();

    let port = b"PORT 10,0,0,5,15,160\r\n";
    let mut ctl = tcp(ep(LOCAL, 3000), ep(REMOTE, 21), ACK | PSH, 10, 1, port);
    out(&nat, &mut ctl);

    // The data link only learns the server's port when the server
    // connects; that is when the rules go in.
    assert!(fw.rules().is_empty());
    let mut data = tcp(ep(REMOTE, 20), ep(ALIAS, 4000), SYN, 1, 0, &[]);
    inb(&nat, &mut data);
    let rules = fw.rules();
    assert_eq!(rules.len(), 2);
    assert!(rules.iter().any(|r| r.src == ep(LOCAL, 4000) && r.dst == ep(REMOTE, 20)));
    assert!(rules.iter().any(|r| r.src == ep(REMOTE, 20) && r.dst == ep(LOCAL, 4000)));

    drop(nat);
    assert!(fw.rules().is_empty());
}
