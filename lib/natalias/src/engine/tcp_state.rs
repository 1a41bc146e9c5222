// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Per-link TCP tracking.
//!
//! Each side of a connection is tracked on its own and only coarsely:
//! we only need to know enough to pick a sensible expire time for the
//! link. The tracker also keeps the sequence number corrections that
//! payload-resizing fixups introduce.

use crate::api::TCP_EXPIRE_CONNECTED;
use crate::api::TCP_EXPIRE_DEAD;
use crate::api::TCP_EXPIRE_SINGLEDEAD;
use bitflags::bitflags;
use core::fmt;
use core::fmt::Display;

bitflags! {
    /// TCP control flags, as found in byte 13 of the header.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct TcpFlags: u8 {
        const FIN = 0x01;
        const SYN = 0x02;
        const RST = 0x04;
        const PSH = 0x08;
        const ACK = 0x10;
        const URG = 0x20;
    }
}

/// The state of one side of a TCP connection.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TcpSideState {
    #[default]
    NotConnected,
    Connected,
    Disconnected,
}

impl Display for TcpSideState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::NotConnected => "NOT_CONNECTED",
            Self::Connected => "CONNECTED",
            Self::Disconnected => "DISCONNECTED",
        };
        write!(f, "{s}")
    }
}

/// Number of sequence corrections remembered per link.
pub const N_ACK_RECORDS: usize = 3;

/// One payload resize: the stream position before and after the
/// rewrite, and the cumulative correction from then on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AckRecord {
    pub old_ack: u32,
    pub new_ack: u32,
    pub delta: i32,
}

/// Signed distance from `from` to `to` in sequence space.
fn seq_diff(from: u32, to: u32) -> i32 {
    to.wrapping_sub(from) as i32
}

#[derive(Clone, Debug, Default)]
pub struct TcpTracker {
    state_in: TcpSideState,
    state_out: TcpSideState,
    ring: [Option<AckRecord>; N_ACK_RECORDS],
    cursor: usize,
    ack_modified: bool,
    /// Firewall rule slot punched for this connection.
    pub(crate) fw_slot: Option<u32>,
}

impl TcpTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state_in(&self) -> TcpSideState {
        self.state_in
    }

    pub fn state_out(&self) -> TcpSideState {
        self.state_out
    }

    /// Set the inbound side's state. Returns the expire time the link
    /// should switch to, if the transition calls for one.
    pub fn set_in(&mut self, state: TcpSideState) -> Option<u64> {
        let expire = Self::expire_for(state, self.state_out);
        self.state_in = state;
        expire
    }

    /// Set the outbound side's state. See [`Self::set_in`].
    pub fn set_out(&mut self, state: TcpSideState) -> Option<u64> {
        let expire = Self::expire_for(state, self.state_in);
        self.state_out = state;
        expire
    }

    fn expire_for(new: TcpSideState, other: TcpSideState) -> Option<u64> {
        match (new, other) {
            (TcpSideState::Disconnected, TcpSideState::Connected) => {
                Some(TCP_EXPIRE_SINGLEDEAD)
            }
            (TcpSideState::Disconnected, _) => Some(TCP_EXPIRE_DEAD),
            (TcpSideState::Connected, TcpSideState::Connected) => {
                Some(TCP_EXPIRE_CONNECTED)
            }
            _ => None,
        }
    }

    /// Feed the flags of an inbound segment through the state machine.
    pub fn monitor_in(&mut self, flags: TcpFlags) -> Option<u64> {
        match Self::next(self.state_in, flags) {
            Some(state) => self.set_in(state),
            None => None,
        }
    }

    /// Feed the flags of an outbound segment through the state machine.
    pub fn monitor_out(&mut self, flags: TcpFlags) -> Option<u64> {
        match Self::next(self.state_out, flags) {
            Some(state) => self.set_out(state),
            None => None,
        }
    }

    fn next(cur: TcpSideState, flags: TcpFlags) -> Option<TcpSideState> {
        match cur {
            TcpSideState::NotConnected if flags.contains(TcpFlags::RST) => {
                Some(TcpSideState::Disconnected)
            }
            TcpSideState::NotConnected if flags.contains(TcpFlags::SYN) => {
                Some(TcpSideState::Connected)
            }
            TcpSideState::Connected
                if flags.intersects(TcpFlags::FIN | TcpFlags::RST) =>
            {
                Some(TcpSideState::Disconnected)
            }
            _ => None,
        }
    }

    /// Has some fixup changed the length of the stream?
    pub fn ack_modified(&self) -> bool {
        self.ack_modified
    }

    pub fn set_ack_modified(&mut self) {
        self.ack_modified = true;
    }

    /// Remember a resize, overwriting the oldest record once the ring
    /// is full.
    pub fn record_delta(&mut self, delta: i32, old_ack: u32, new_ack: u32) {
        self.ring[self.cursor] = Some(AckRecord { old_ack, new_ack, delta });
        self.cursor = (self.cursor + 1) % N_ACK_RECORDS;
    }

    /// Record a resize of the outbound segment starting at `seq` whose
    /// payload was `payload_len` bytes before the rewrite. `delta` is
    /// the cumulative correction that applies after this segment.
    pub fn add_seq(&mut self, delta: i32, seq: u32, payload_len: u32) {
        let old_ack = seq.wrapping_add(payload_len);
        let new_ack = old_ack.wrapping_add_signed(delta);
        self.record_delta(delta, old_ack, new_ack);
    }

    /// The correction to subtract from an inbound ACK number.
    ///
    /// The peer only ever saw the rewritten stream, so its ACKs are in
    /// rewritten numbering. The record that applies is the nearest one
    /// whose rewritten end (`new_ack`) the ACK has reached.
    pub fn delta_for_incoming_ack(&self, ack: u32) -> i32 {
        self.closest(|r| seq_diff(r.new_ack, ack))
    }

    /// The correction to add to an outbound sequence number, found the
    /// same way against the original numbering (`old_ack`).
    pub fn delta_for_outgoing_seq(&self, seq: u32) -> i32 {
        self.closest(|r| seq_diff(r.old_ack, seq))
    }

    fn closest(&self, dist: impl Fn(&AckRecord) -> i32) -> i32 {
        self.ring
            .iter()
            .flatten()
            .map(|r| (dist(r), r.delta))
            .filter(|(d, _)| *d >= 0)
            .min_by_key(|(d, _)| *d)
            .map(|(_, delta)| delta)
            .unwrap_or(0)
    }
}
