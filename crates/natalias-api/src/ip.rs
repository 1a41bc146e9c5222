// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use core::fmt;
use core::fmt::Display;
use serde::Deserialize;
use serde::Serialize;
use std::net::Ipv4Addr;

pub const PROTO_ICMP: u8 = 0x1;
pub const PROTO_TCP: u8 = 0x6;
pub const PROTO_UDP: u8 = 0x11;
pub const PROTO_GRE: u8 = 0x2F;

/// The "unspecified" address. In a link key it means "not known yet",
/// never "any address".
pub const ANY_ADDR: Ipv4Addr = Ipv4Addr::UNSPECIFIED;

/// The IP protocol carried by a packet.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd,
    Serialize,
)]
pub enum Protocol {
    ICMP,
    TCP,
    UDP,
    GRE,
    Unknown(u8),
}

impl Default for Protocol {
    fn default() -> Self {
        Self::Unknown(255)
    }
}

impl Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ICMP => write!(f, "ICMP"),
            Self::TCP => write!(f, "TCP"),
            Self::UDP => write!(f, "UDP"),
            Self::GRE => write!(f, "GRE"),
            Self::Unknown(p) => write!(f, "PROTO({p})"),
        }
    }
}

impl core::str::FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "icmp" => Ok(Self::ICMP),
            "tcp" => Ok(Self::TCP),
            "udp" => Ok(Self::UDP),
            "gre" => Ok(Self::GRE),
            other => other
                .parse::<u8>()
                .map(Self::from)
                .map_err(|_| format!("invalid protocol: {s}")),
        }
    }
}

impl From<u8> for Protocol {
    fn from(proto: u8) -> Self {
        match proto {
            PROTO_ICMP => Self::ICMP,
            PROTO_TCP => Self::TCP,
            PROTO_UDP => Self::UDP,
            PROTO_GRE => Self::GRE,
            _ => Self::Unknown(proto),
        }
    }
}

impl From<Protocol> for u8 {
    fn from(proto: Protocol) -> u8 {
        match proto {
            Protocol::ICMP => PROTO_ICMP,
            Protocol::TCP => PROTO_TCP,
            Protocol::UDP => PROTO_UDP,
            Protocol::GRE => PROTO_GRE,
            Protocol::Unknown(v) => v,
        }
    }
}

impl From<smoltcp::wire::IpProtocol> for Protocol {
    fn from(proto: smoltcp::wire::IpProtocol) -> Self {
        Self::from(u8::from(proto))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn proto_numbers() {
        assert_eq!(Protocol::from(6), Protocol::TCP);
        assert_eq!(u8::from(Protocol::Unknown(132)), 132);
        assert_eq!("udp".parse::<Protocol>().unwrap(), Protocol::UDP);
        assert_eq!("50".parse::<Protocol>().unwrap(), Protocol::Unknown(50));
        assert_eq!(
            Protocol::from(smoltcp::wire::IpProtocol::Tcp),
            Protocol::TCP
        );
    }
}
