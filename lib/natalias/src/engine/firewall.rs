// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Firewall hole punching.
//!
//! When a fixup negotiates a secondary TCP connection (an FTP data
//! channel, say) the engine can ask an external packet filter to let
//! it through. The filter is reached over a [`FirewallControl`]
//! channel; the engine only decides which rule number ("slot") to use
//! and what the two pass rules look like. Slots come from a fixed
//! range `[base, base + num)` tracked in a bitmap and are handed out
//! round-robin.

use crate::api::Protocol;
use core::fmt;
use core::fmt::Display;
use std::net::SocketAddrV4;
use std::sync::Arc;
use thiserror::Error;

#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("firewall channel: {0}")]
pub struct FirewallError(pub String);

/// A single "accept" rule.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PassRule {
    pub slot: u32,
    pub proto: Protocol,
    pub src: SocketAddrV4,
    pub dst: SocketAddrV4,
}

impl Display for PassRule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} accept {} from {} to {}",
            self.slot, self.proto, self.src, self.dst
        )
    }
}

/// The control channel into an external packet filter.
pub trait FirewallControl: Send + Sync {
    /// Install `rule` under its slot number.
    fn install(&self, rule: &PassRule) -> Result<(), FirewallError>;

    /// Remove every rule installed under `slot`.
    fn retract(&self, slot: u32);
}

/// Slot bookkeeping for one engine instance.
#[derive(Default)]
pub struct FwHoles {
    channel: Option<Arc<dyn FirewallControl>>,
    base: u32,
    num: u32,
    cursor: u32,
    field: Vec<u64>,
}

impl FwHoles {
    pub fn is_configured(&self) -> bool {
        self.channel.is_some() && self.num > 0
    }

    /// Point at a new channel and rule range. Any holes punched through
    /// the previous configuration are closed first.
    pub fn configure(
        &mut self,
        channel: Arc<dyn FirewallControl>,
        base: u32,
        num: u32,
    ) {
        self.clear_all();
        self.channel = Some(channel);
        self.base = base;
        self.num = num;
        self.cursor = base;
        self.field = vec![0; (num as usize).div_ceil(64)];
    }

    fn idx(&self, slot: u32) -> (usize, u64) {
        let off = slot - self.base;
        ((off / 64) as usize, 1u64 << (off % 64))
    }

    fn test(&self, slot: u32) -> bool {
        let (w, bit) = self.idx(slot);
        self.field[w] & bit != 0
    }

    fn set(&mut self, slot: u32) {
        let (w, bit) = self.idx(slot);
        self.field[w] |= bit;
    }

    fn clear(&mut self, slot: u32) {
        let (w, bit) = self.idx(slot);
        self.field[w] &= !bit;
    }

    pub fn in_use(&self) -> usize {
        self.field.iter().map(|w| w.count_ones() as usize).sum()
    }

    // Find a free slot starting at the cursor, wrapping around to the
    // base once.
    fn find_free(&mut self) -> Option<u32> {
        let end = self.base + self.num;
        let found = (self.cursor..end)
            .chain(self.base..self.cursor)
            .find(|s| !self.test(*s));

        match found {
            Some(slot) => {
                self.cursor = if slot + 1 >= end { self.base } else { slot + 1 };
                Some(slot)
            }

            None => {
                self.cursor = self.base;
                None
            }
        }
    }

    /// Claim a slot and install the forward and reverse pass rules
    /// between `orig` and `dst`.
    ///
    /// The slot is claimed even when one of the ports is still unknown;
    /// the rules then go in when the link is upgraded and punched again.
    /// Returns `Ok(None)` when punching is not configured or all slots
    /// are taken.
    pub fn open(
        &mut self,
        orig: SocketAddrV4,
        dst: SocketAddrV4,
    ) -> Result<Option<u32>, FirewallError> {
        if !self.is_configured() {
            return Ok(None);
        }

        let Some(slot) = self.find_free() else {
            return Ok(None);
        };

        if let Some(chan) = &self.channel
            && orig.port() != 0
            && dst.port() != 0
        {
            let proto = Protocol::TCP;
            chan.install(&PassRule { slot, proto, src: orig, dst })?;
            if let Err(e) =
                chan.install(&PassRule { slot, proto, src: dst, dst: orig })
            {
                chan.retract(slot);
                return Err(e);
            }
        }

        self.set(slot);
        Ok(Some(slot))
    }

    /// Retract the rules under `slot` and free it.
    pub fn close(&mut self, slot: u32) {
        if slot < self.base || slot >= self.base + self.num {
            return;
        }

        if let Some(chan) = &self.channel {
            chan.retract(slot);
        }
        self.clear(slot);
    }

    /// Retract every hole we own.
    pub fn clear_all(&mut self) {
        let used: Vec<u32> = (self.base..self.base + self.num)
            .filter(|s| self.test(*s))
            .collect();
        for slot in used {
            self.close(slot);
        }
        self.cursor = self.base;
    }
}

/// A [`FirewallControl`] that remembers what it was told, for tests
/// and dry runs.
#[derive(Default)]
pub struct RecordingFirewall {
    rules: std::sync::Mutex<Vec<PassRule>>,
}

impl RecordingFirewall {
    pub fn rules(&self) -> Vec<PassRule> {
        match self.rules.lock() {
            Ok(r) => r.clone(),
            Err(p) => p.into_inner().clone(),
        }
    }
}

impl FirewallControl for RecordingFirewall {
    fn install(&self, rule: &PassRule) -> Result<(), FirewallError> {
        let mut rules = match self.rules.lock() {
            Ok(r) => r,
            Err(p) => p.into_inner(),
        };
        rules.push(*rule);
        Ok(())
    }

    fn retract(&self, slot: u32) {
        let mut rules = match self.rules.lock() {
            Ok(r) => r,
            Err(p) => p.into_inner(),
        };
        rules.retain(|r| r.slot != slot);
    }
}
