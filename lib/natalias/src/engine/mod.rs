// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The translation engine.
pub mod checksum;
pub mod firewall;
pub mod ftp;
pub mod handler;
pub mod link;
pub mod link_table;
pub mod nat;
pub mod packet;
pub mod port_alloc;
pub mod tcp_state;
mod xlate;

pub use natalias_api::Direction;
