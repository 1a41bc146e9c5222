// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The TOML description of an instance and its static redirects.
//!
//! ```toml
//! [nat]
//! alias_addr = "203.0.113.9"
//! mode = ["SAME_PORTS"]
//!
//! [[redirect_port]]
//! proto = "TCP"
//! local_addr = "10.0.0.5"
//! local_port = 80
//! alias_port = 8080
//! ```

use crate::Error;
use natalias::Nat;
use natalias::NatBuilder;
use natalias::NatConfig;
use natalias::provider::LogProvider;
use natalias_api::LinkId;
use natalias_api::RedirectAddrReq;
use natalias_api::RedirectPortReq;
use natalias_api::RedirectProtoReq;
use serde::Deserialize;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tabwriter::TabWriter;

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdmConfig {
    pub nat: NatConfig,
    pub redirect_port: Vec<RedirectPortReq>,
    pub redirect_addr: Vec<RedirectAddrReq>,
    pub redirect_proto: Vec<RedirectProtoReq>,
}

impl AdmConfig {
    pub fn from_toml(s: &str) -> Result<Self, Error> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let s = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_toml(&s)
    }

    pub fn to_toml(&self) -> Result<String, Error> {
        Ok(toml::to_string(self)?)
    }

    /// Build an instance from the `[nat]` section and install every
    /// redirect.
    pub fn build(&self, log: Box<dyn LogProvider>) -> Result<Nat, Error> {
        let nat = NatBuilder::new().config(self.nat.clone()).log(log).build()?;
        self.apply(&nat)?;
        Ok(nat)
    }

    /// Install the redirects on an existing instance, returning the
    /// links created in the order they appear in the file.
    pub fn apply(&self, nat: &Nat) -> Result<Vec<LinkId>, Error> {
        let mut ids = Vec::with_capacity(
            self.redirect_port.len()
                + self.redirect_addr.len()
                + self.redirect_proto.len(),
        );

        for req in &self.redirect_port {
            ids.push(nat.redirect_port(req)?);
        }

        for req in &self.redirect_addr {
            ids.push(nat.redirect_addr(req)?);
        }

        for req in &self.redirect_proto {
            ids.push(nat.redirect_proto(req)?);
        }

        Ok(ids)
    }
}

/// Print the redirects of a configuration.
pub fn print_redirects_into(
    writer: &mut impl Write,
    cfg: &AdmConfig,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);
    writeln!(t, "KIND\tPROTO\tLOCAL\tALIAS\tREMOTE\tSERVERS")?;

    for r in &cfg.redirect_port {
        let servers = r
            .servers
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(",");
        writeln!(
            t,
            "port\t{}\t{}:{}\t{}:{}\t{}:{}\t{}",
            r.proto,
            r.local_addr,
            r.local_port,
            r.alias_addr,
            r.alias_port,
            r.remote_addr,
            r.remote_port,
            if servers.is_empty() { "-".to_string() } else { servers },
        )?;
    }

    for r in &cfg.redirect_addr {
        writeln!(t, "addr\t-\t{}\t{}\t-\t-", r.local_addr, r.alias_addr)?;
    }

    for r in &cfg.redirect_proto {
        writeln!(
            t,
            "proto\t{}\t{}\t{}\t{}\t-",
            r.proto, r.local_addr, r.alias_addr, r.remote_addr
        )?;
    }

    t.flush()
}
