// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Alias port selection.
//!
//! The allocator knows nothing about links. It proposes candidate
//! ports from the configured window and the caller decides whether a
//! candidate is free; this keeps the search bounded and the table
//! logic in one place.

use crate::api::AliasError;
use crate::api::AliasResult;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

pub const DEFAULT_ALIAS_PORT_LOWER: u16 = 0x8000;
pub const DEFAULT_ALIAS_PORT_LEN: u32 = 0x8000;

/// Number of candidates tried before giving up.
pub const MAX_TRIALS: usize = 20;

pub struct PortAllocator {
    lower: u16,
    len: u32,
    rng: StdRng,
}

impl PortAllocator {
    /// Create an allocator over the default window. A seed makes the
    /// candidate sequence reproducible.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_os_rng(),
        };

        Self {
            lower: DEFAULT_ALIAS_PORT_LOWER,
            len: DEFAULT_ALIAS_PORT_LEN,
            rng,
        }
    }

    /// The window as `(lower, len)`.
    pub fn range(&self) -> (u16, u32) {
        (self.lower, self.len)
    }

    /// Set the window to `[lower, lower + len)`. A zero `len` restores
    /// the default window.
    pub fn set_range(&mut self, lower: u16, len: u32) -> AliasResult<()> {
        if len == 0 {
            self.lower = DEFAULT_ALIAS_PORT_LOWER;
            self.len = DEFAULT_ALIAS_PORT_LEN;
            return Ok(());
        }

        if u32::from(lower) + len > 0x1_0000 {
            return Err(AliasError::InvalidPortRange { lower, len });
        }

        self.lower = lower;
        self.len = len;
        Ok(())
    }

    fn random_port(&mut self) -> u16 {
        let off = self.rng.random_range(0..self.len);
        // set_range() keeps lower + len within the port space.
        (u32::from(self.lower) + off) as u16
    }

    /// Find a port `accept` agrees to.
    ///
    /// The first candidate is `preferred` when given, every other one
    /// is drawn at random from the window. `accept` may have side
    /// effects (reserving a host socket, say); a rejected candidate is
    /// simply skipped.
    pub fn allocate<F>(
        &mut self,
        preferred: Option<u16>,
        mut accept: F,
    ) -> AliasResult<u16>
    where
        F: FnMut(u16) -> bool,
    {
        for trial in 0..MAX_TRIALS {
            let port = match (trial, preferred) {
                (0, Some(p)) => p,
                _ => self.random_port(),
            };

            if accept(port) {
                return Ok(port);
            }
        }

        Err(AliasError::PortAllocationExhausted)
    }

    /// Find the base of `count` consecutive ports that are all `free`.
    ///
    /// Random bases are drawn so the whole block stays inside the
    /// window. With `even` set, random bases are even.
    pub fn allocate_range<F>(
        &mut self,
        count: u16,
        even: bool,
        preferred: Option<u16>,
        free: F,
    ) -> Option<u16>
    where
        F: Fn(u16) -> bool,
    {
        let count = u32::from(count.max(1));
        if count > self.len {
            return None;
        }

        let block_free = |base: u16| {
            (0..count).all(|j| match u16::try_from(u32::from(base) + j) {
                Ok(port) => free(port),
                Err(_) => false,
            })
        };

        for trial in 0..MAX_TRIALS {
            let base = match (trial, preferred) {
                (0, Some(p)) => p,
                _ => {
                    let off = self.rng.random_range(0..=(self.len - count));
                    let lower = u32::from(self.lower);
                    let mut base = lower + off;
                    if even {
                        base &= !1;
                        if base < lower {
                            base += 2;
                        }
                    }
                    if base + count > lower + self.len {
                        continue;
                    }
                    base as u16
                }
            };

            if block_free(base) {
                return Some(base);
            }
        }

        None
    }
}
