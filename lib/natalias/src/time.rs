// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Moments.

use core::ops::Add;
use core::time::Duration;

/// The number of milliseconds in a second.
pub const MILLIS: u64 = 1_000;

/// A moment in time, in milliseconds since some clock-defined origin.
///
/// Moments only make sense relative to other moments from the same
/// clock (see [`crate::provider::ClockProvider`]).
#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
pub struct Moment {
    millis: u64,
}

impl Add<Duration> for Moment {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        let millis = u64::try_from(rhs.as_millis()).unwrap_or(u64::MAX);
        Self { millis: self.millis.saturating_add(millis) }
    }
}

impl Moment {
    pub const fn from_millis(millis: u64) -> Self {
        Self { millis }
    }

    pub const fn raw_millis(&self) -> u64 {
        self.millis
    }

    /// Whole seconds since the clock's origin.
    pub const fn secs(&self) -> u64 {
        self.millis / MILLIS
    }

    /// Milliseconds elapsed between `earlier` and `self`, zero if
    /// `earlier` is actually later.
    pub fn delta_as_millis(&self, earlier: Moment) -> u64 {
        self.millis.saturating_sub(earlier.millis)
    }

    /// Whole seconds elapsed between `earlier` and `self`.
    pub fn delta_as_secs(&self, earlier: Moment) -> u64 {
        self.secs().saturating_sub(earlier.secs())
    }
}
