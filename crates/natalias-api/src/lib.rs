// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Types shared between the NAT engine and its consumers.
//!
//! Everything in here is plain data: it can be serialized, shown to a
//! human, or handed across a control boundary without dragging the
//! engine along with it.

#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

use core::fmt;
use core::fmt::Display;
use serde::Deserialize;
use serde::Serialize;

pub mod cmd;
pub mod error;
pub mod ip;
pub mod link;
pub mod mode;

pub use cmd::*;
pub use error::*;
pub use ip::*;
pub use link::*;
pub use mode::*;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Direction {
    In = 1,
    Out = 2,
}

impl core::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "in" => Ok(Direction::In),
            "out" => Ok(Direction::Out),
            _ => Err(format!("invalid direction: {s}")),
        }
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let dirstr = match self {
            Direction::In => "IN",
            Direction::Out => "OUT",
        };

        write!(f, "{dirstr}")
    }
}

/// What the engine did with a packet.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum PacketResult {
    /// The packet was translated.
    Aliased,
    /// No link applies; the packet is untouched.
    Ignored,
    /// A trailing fragment arrived before its header fragment. The
    /// caller may park it with `save_fragment`.
    UnresolvedFragment,
    /// The header fragment of a fragmented datagram was translated.
    /// The caller may now release parked fragments.
    FoundHeaderFragment,
}

impl Display for PacketResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Aliased => "aliased",
            Self::Ignored => "ignored",
            Self::UnresolvedFragment => "unresolved fragment",
            Self::FoundHeaderFragment => "found header fragment",
        };
        write!(f, "{s}")
    }
}
