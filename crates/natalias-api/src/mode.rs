// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use bitflags::bitflags;
use serde::Deserialize;
use serde::Serialize;

bitflags! {
    /// Operating mode of an engine instance.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ModeFlags: u32 {
        /// Log the per-type link counts whenever a link comes or goes.
        const LOG = 0x01;
        /// Never create a link for unsolicited inbound traffic.
        const DENY_INCOMING = 0x02;
        /// Try to keep the original source port as the alias port.
        const SAME_PORTS = 0x04;
        /// Bind a host socket to each partially specified TCP/UDP
        /// alias port so the host stack does not hand it out.
        const USE_SOCKETS = 0x08;
        /// Flush all dynamic links when the alias address changes.
        const RESET_ON_ADDR_CHANGE = 0x20;
        /// Open firewall holes for negotiated secondary connections.
        const PUNCH_FW = 0x100;
    }
}
