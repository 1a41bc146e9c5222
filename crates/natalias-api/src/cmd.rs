// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Administrative requests that can be described as data.

use super::Protocol;
use serde::Deserialize;
use serde::Serialize;
use std::net::Ipv4Addr;
use std::net::SocketAddrV4;

fn any_addr() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

/// Statically redirect traffic arriving at an alias port to a private
/// endpoint.
///
/// A non-empty `servers` list turns the redirect into an LSNAT rule:
/// each new inbound connection is handed to the next server in turn.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RedirectPortReq {
    pub proto: Protocol,
    pub local_addr: Ipv4Addr,
    pub local_port: u16,
    #[serde(default = "any_addr")]
    pub remote_addr: Ipv4Addr,
    #[serde(default)]
    pub remote_port: u16,
    #[serde(default = "any_addr")]
    pub alias_addr: Ipv4Addr,
    pub alias_port: u16,
    #[serde(default)]
    pub servers: Vec<SocketAddrV4>,
}

/// Statically map one public address onto one private address.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RedirectAddrReq {
    pub local_addr: Ipv4Addr,
    pub alias_addr: Ipv4Addr,
}

/// Statically redirect a whole IP protocol.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RedirectProtoReq {
    pub proto: u8,
    pub local_addr: Ipv4Addr,
    #[serde(default = "any_addr")]
    pub remote_addr: Ipv4Addr,
    #[serde(default = "any_addr")]
    pub alias_addr: Ipv4Addr,
}
