// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Routines for writing and reading raw IPv4 packet captures.

use crate::pkt::ip_len;
use pcap_parser::Linktype;
use pcap_parser::ToVec;
use pcap_parser::pcap;
use pcap_parser::pcap::LegacyPcapBlock;
use pcap_parser::pcap::PcapHeader;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Build a packet capture file from a series of IPv4 packets.
pub struct PcapBuilder {
    file: File,
    ts_sec: u32,
}

impl PcapBuilder {
    /// Create a new pcap builder, writing all captures to `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let mut file = File::create(path).unwrap();

        let mut hdr = PcapHeader {
            magic_number: 0xa1b2c3d4,
            version_major: 2,
            version_minor: 4,
            thiszone: 0,
            sigfigs: 0,
            snaplen: 65535,
            network: Linktype::RAW,
        };

        file.write_all(&hdr.to_vec().unwrap()).unwrap();

        Self { file, ts_sec: 0 }
    }

    /// Add a packet to the capture. Only the bytes covered by the IP
    /// total length are written; spare room is dropped.
    pub fn add_pkt(&mut self, pkt: &[u8]) {
        let bytes = &pkt[..ip_len(pkt)];
        self.ts_sec += 1;
        let mut block = LegacyPcapBlock {
            ts_sec: self.ts_sec,
            ts_usec: 0,
            caplen: bytes.len() as u32,
            origlen: bytes.len() as u32,
            data: bytes,
        };

        self.file.write_all(&block.to_vec().unwrap()).unwrap();
    }
}

/// Read every packet out of a capture written by [`PcapBuilder`].
pub fn read_pkts(path: impl AsRef<Path>) -> Vec<Vec<u8>> {
    let bytes = std::fs::read(path).unwrap();
    let (mut rest, hdr) = match pcap::parse_pcap_header(&bytes) {
        Ok(v) => v,
        Err(e) => panic!("failed to get header: {e:?}"),
    };
    assert_eq!(hdr.network, Linktype::RAW);

    let mut pkts = vec![];
    while !rest.is_empty() {
        match pcap::parse_pcap_frame(rest) {
            Ok((next, block)) => {
                // We always want access to the entire packet.
                assert_eq!(block.origlen, block.caplen);
                pkts.push(block.data.to_vec());
                rest = next;
            }

            Err(e) => panic!("failed to get next block: {e:?}"),
        }
    }
    pkts
}
