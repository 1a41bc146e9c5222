// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Reading and writing legacy pcap files.
//!
//! Raw IPv4 captures and Ethernet captures are understood. Ethernet
//! frames keep their link header so the capture can be written back
//! out unchanged apart from the IP datagram.

use crate::Error;
use pcap_parser::Linktype;
use pcap_parser::ToVec;
use pcap_parser::pcap;
use pcap_parser::pcap::LegacyPcapBlock;
use pcap_parser::pcap::PcapHeader;
use std::io::Write;

const ETHER_HDR_LEN: usize = 14;
const ETHER_TYPE_IPV4: u16 = 0x0800;

/// Little-endian microsecond magic as it appears on disk.
const MAGIC_LE: [u8; 4] = [0xd4, 0xc3, 0xb2, 0xa1];

/// One captured frame.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Frame {
    pub ts_sec: u32,
    pub ts_usec: u32,
    /// The link-layer header, empty for raw IP captures.
    pub l2: Vec<u8>,
    /// The IPv4 datagram, or `None` when the frame carries something
    /// else or was truncated by the capture.
    pub ip: Option<Vec<u8>>,
    /// The frame exactly as captured.
    pub raw: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct Capture {
    pub linktype: Linktype,
    pub snaplen: u32,
    pub frames: Vec<Frame>,
}

fn l2_len(linktype: Linktype) -> Result<usize, Error> {
    if linktype == Linktype::ETHERNET {
        Ok(ETHER_HDR_LEN)
    } else if linktype == Linktype::RAW || linktype == Linktype::IPV4 {
        Ok(0)
    } else {
        Err(Error::Linktype(linktype.0))
    }
}

fn split_frame(linktype: Linktype, data: &[u8]) -> (Vec<u8>, Option<Vec<u8>>) {
    if linktype != Linktype::ETHERNET {
        let ip = (data.first().map(|b| b >> 4) == Some(4)).then(|| data.to_vec());
        return (vec![], ip);
    }

    if data.len() < ETHER_HDR_LEN {
        return (vec![], None);
    }

    let (l2, l3) = data.split_at(ETHER_HDR_LEN);
    let ether_type = u16::from_be_bytes([l2[12], l2[13]]);
    let ip = (ether_type == ETHER_TYPE_IPV4).then(|| l3.to_vec());
    (l2.to_vec(), ip)
}

impl Capture {
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.get(..4) != Some(&MAGIC_LE[..]) {
            return Err(Error::Capture(
                "only little-endian microsecond captures are supported".into(),
            ));
        }

        let (mut rest, hdr) = pcap::parse_pcap_header(bytes)
            .map_err(|e| Error::Capture(format!("header: {e:?}")))?;
        l2_len(hdr.network)?;

        let mut frames = vec![];
        while !rest.is_empty() {
            let (next, block) = pcap::parse_pcap_frame(rest).map_err(|e| {
                Error::Capture(format!("frame {}: {e:?}", frames.len()))
            })?;

            let (l2, ip) = if block.caplen < block.origlen {
                (vec![], None)
            } else {
                split_frame(hdr.network, block.data)
            };

            frames.push(Frame {
                ts_sec: block.ts_sec,
                ts_usec: block.ts_usec,
                l2,
                ip,
                raw: block.data.to_vec(),
            });
            rest = next;
        }

        Ok(Self { linktype: hdr.network, snaplen: hdr.snaplen, frames })
    }

    /// Serialize the capture. Frames with a datagram are written as
    /// their link header followed by the datagram; the rest are
    /// written as captured.
    pub fn write(&self, out: &mut impl Write) -> Result<(), Error> {
        let mut hdr = PcapHeader {
            magic_number: 0xa1b2c3d4,
            version_major: 2,
            version_minor: 4,
            thiszone: 0,
            sigfigs: 0,
            snaplen: self.snaplen,
            network: self.linktype,
        };
        let hdr_bytes = hdr
            .to_vec()
            .map_err(|e| Error::Capture(format!("header: {e:?}")))?;
        out.write_all(&hdr_bytes).map_err(|e| Error::io("<capture>", e))?;

        for frame in &self.frames {
            let data = match &frame.ip {
                Some(ip) => [&frame.l2[..], &ip[..]].concat(),
                None => frame.raw.clone(),
            };

            let mut block = LegacyPcapBlock {
                ts_sec: frame.ts_sec,
                ts_usec: frame.ts_usec,
                caplen: data.len() as u32,
                origlen: data.len() as u32,
                data: &data,
            };
            let bytes = block
                .to_vec()
                .map_err(|e| Error::Capture(format!("frame: {e:?}")))?;
            out.write_all(&bytes).map_err(|e| Error::io("<capture>", e))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn ether(ether_type: u16, payload: &[u8]) -> Vec<u8> {
        let mut f = vec![0u8; ETHER_HDR_LEN];
        f[..6].copy_from_slice(&[2, 0, 0, 0, 0, 1]);
        f[6..12].copy_from_slice(&[2, 0, 0, 0, 0, 2]);
        f[12..].copy_from_slice(&ether_type.to_be_bytes());
        f.extend_from_slice(payload);
        f
    }

    fn ip_stub() -> Vec<u8> {
        let mut p = vec![0u8; 20];
        p[0] = 0x45;
        p
    }

    #[test]
    fn ethernet_frames_split() {
        let cap = Capture {
            linktype: Linktype::ETHERNET,
            snaplen: 65535,
            frames: vec![
                Frame {
                    ts_sec: 1,
                    ts_usec: 2,
                    l2: vec![],
                    ip: None,
                    raw: ether(ETHER_TYPE_IPV4, &ip_stub()),
                },
                Frame {
                    ts_sec: 3,
                    ts_usec: 4,
                    l2: vec![],
                    ip: None,
                    raw: ether(0x86dd, &[0x60; 40]),
                },
            ],
        };

        let mut bytes = vec![];
        cap.write(&mut bytes).unwrap();
        let parsed = Capture::parse(&bytes).unwrap();

        assert_eq!(parsed.linktype, Linktype::ETHERNET);
        assert_eq!(parsed.frames.len(), 2);
        assert_eq!(parsed.frames[0].ip.as_deref(), Some(&ip_stub()[..]));
        assert_eq!(parsed.frames[0].l2.len(), ETHER_HDR_LEN);
        assert_eq!(parsed.frames[1].ip, None);
        assert_eq!(parsed.frames[1].ts_sec, 3);
    }

    #[test]
    fn rewritten_datagram_written() {
        let mut cap = Capture {
            linktype: Linktype::RAW,
            snaplen: 65535,
            frames: vec![],
        };
        cap.frames.push(Frame {
            ts_sec: 0,
            ts_usec: 0,
            l2: vec![],
            ip: Some(vec![0x45, 1, 2, 3]),
            raw: ip_stub(),
        });

        let mut bytes = vec![];
        cap.write(&mut bytes).unwrap();
        let parsed = Capture::parse(&bytes).unwrap();
        assert_eq!(parsed.frames[0].raw, vec![0x45, 1, 2, 3]);
    }

    #[test]
    fn foreign_linktype_rejected() {
        let cap = Capture {
            linktype: Linktype::NULL,
            snaplen: 65535,
            frames: vec![],
        };
        let mut bytes = vec![];
        cap.write(&mut bytes).unwrap();
        assert!(matches!(Capture::parse(&bytes), Err(Error::Linktype(0))));
    }

    #[test]
    fn big_endian_rejected() {
        let bytes = [0xa1, 0xb2, 0xc3, 0xd4, 0, 2, 0, 4];
        assert!(matches!(Capture::parse(&bytes), Err(Error::Capture(_))));
    }
}
