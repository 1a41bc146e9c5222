// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Push captured traffic through an instance.

use crate::capture::Capture;
use natalias::Nat;
use natalias_api::Direction;
use natalias_api::PacketResult;
use slog::Logger;
use slog::debug;
use slog::warn;
use std::io::Write;
use tabwriter::TabWriter;

/// Room left after each datagram for the engine to grow it into.
pub const SPARE: usize = 1024;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ReplayStats {
    pub aliased: usize,
    pub ignored: usize,
    pub unresolved_frags: usize,
    pub header_frags: usize,
    pub errors: usize,
    /// Frames that carried no IPv4 datagram.
    pub skipped: usize,
}

impl ReplayStats {
    pub fn total(&self) -> usize {
        self.aliased
            + self.ignored
            + self.unresolved_frags
            + self.header_frags
            + self.errors
            + self.skipped
    }

    pub fn print_into(&self, writer: &mut impl Write) -> std::io::Result<()> {
        let mut t = TabWriter::new(writer);
        writeln!(t, "TOTAL\tALIASED\tIGNORED\tFRAG WAIT\tFRAG HEAD\tERRORS\tSKIPPED")?;
        writeln!(
            t,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.total(),
            self.aliased,
            self.ignored,
            self.unresolved_frags,
            self.header_frags,
            self.errors,
            self.skipped,
        )?;
        t.flush()
    }
}

fn ip_total_len(buf: &[u8]) -> Option<usize> {
    let len = usize::from(u16::from_be_bytes([*buf.get(2)?, *buf.get(3)?]));
    (len <= buf.len()).then_some(len)
}

/// Run every datagram of `cap` through `nat` in direction `dir`,
/// replacing each with its rewritten form.
///
/// Trailing fragments that arrive before their header fragment are
/// parked with the instance and fixed up once the header fragment has
/// been translated.
pub fn replay(
    nat: &Nat,
    cap: &mut Capture,
    dir: Direction,
    log: &Logger,
) -> ReplayStats {
    let mut stats = ReplayStats::default();
    // Frame index and original bytes of each parked fragment.
    let mut parked: Vec<(usize, Vec<u8>)> = vec![];

    for idx in 0..cap.frames.len() {
        let Some(ip) = cap.frames[idx].ip.clone() else {
            stats.skipped += 1;
            continue;
        };

        let mut buf = ip.clone();
        buf.resize(ip.len() + SPARE, 0);

        let res = match dir {
            Direction::Out => nat.process_out(&mut buf),
            Direction::In => nat.process_in(&mut buf),
        };

        let res = match res {
            Ok(res) => res,
            Err(e) => {
                warn!(log, "packet rejected"; "frame" => idx, "dir" => %dir, "err" => %e);
                stats.errors += 1;
                continue;
            }
        };
        debug!(log, "frame processed"; "frame" => idx, "result" => %res);

        if let Some(len) = ip_total_len(&buf) {
            buf.truncate(len);
            cap.frames[idx].ip = Some(buf.clone());
        }

        match res {
            PacketResult::Aliased => stats.aliased += 1,
            PacketResult::Ignored => stats.ignored += 1,

            PacketResult::UnresolvedFragment => {
                stats.unresolved_frags += 1;
                match nat.save_fragment(&ip) {
                    Ok(()) => {
                        let len = ip_total_len(&ip).unwrap_or(ip.len());
                        parked.push((idx, ip[..len].to_vec()));
                    }
                    Err(e) => {
                        warn!(log, "failed to park fragment"; "frame" => idx, "err" => %e)
                    }
                }
            }

            PacketResult::FoundHeaderFragment => {
                stats.header_frags += 1;
                release_parked(nat, &buf, &mut parked, cap, log);
            }
        }
    }

    for (idx, _) in parked {
        warn!(log, "fragment never resolved"; "frame" => idx);
    }

    stats
}

fn release_parked(
    nat: &Nat,
    header: &[u8],
    parked: &mut Vec<(usize, Vec<u8>)>,
    cap: &mut Capture,
    log: &Logger,
) {
    loop {
        let mut frag = match nat.get_fragment(header) {
            Ok(Some(frag)) => frag,
            Ok(None) => return,
            Err(e) => {
                warn!(log, "failed to release fragments"; "err" => %e);
                return;
            }
        };

        let Some(pos) = parked.iter().position(|(_, orig)| *orig == frag) else {
            continue;
        };
        let (idx, _) = parked.remove(pos);

        match nat.fragment_in(header, &mut frag) {
            Ok(()) => cap.frames[idx].ip = Some(frag),
            Err(e) => warn!(log, "failed to fix up fragment"; "frame" => idx, "err" => %e),
        }
    }
}
