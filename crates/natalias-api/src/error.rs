// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use super::LinkId;
use super::Protocol;
use thiserror::Error;

/// Errors reported by the engine's packet and administrative entry
/// points.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum AliasError {
    /// No free alias port (or block of ports) was found within the
    /// bounded number of trials.
    #[error("no free alias port found")]
    PortAllocationExhausted,

    /// Auxiliary link state could not be allocated.
    #[error("failed to allocate link state")]
    LinkAllocationFailed,

    #[error("no such link: {0}")]
    NoSuchLink(LinkId),

    #[error("invalid alias port range: lower={lower} len={len}")]
    InvalidPortRange { lower: u16, len: u32 },

    #[error("protocol {0} cannot be redirected this way")]
    UnsupportedProtocol(Protocol),

    /// The operation needs a link whose destination is fully known.
    #[error("link {0} is partially specified")]
    PartiallySpecified(LinkId),

    /// The packet could not be parsed as IPv4.
    #[error("malformed packet: {0}")]
    Malformed(String),

    /// The caller's buffer cannot hold the rewritten packet.
    #[error("packet buffer too small")]
    BufferTooSmall,

    #[error("handler {name} conflicts at priority {priority}")]
    HandlerExists { name: String, priority: u16 },

    #[error("no such handler: {0}")]
    NoSuchHandler(String),
}

pub type AliasResult<T> = core::result::Result<T, AliasError>;
