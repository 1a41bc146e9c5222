// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Print link table state in a human-friendly manner.
//!
//! This is mostly just a place to hang printing routines so that they
//! can be used by both aliasadm and integration tests.

use crate::api::LinkCounts;
use crate::api::LinkDump;
use crate::api::LinkInfo;
use itertools::Itertools;
use std::io::Write;
use std::net::Ipv4Addr;
use tabwriter::TabWriter;

/// Print a [`LinkDump`].
pub fn print_links(dump: &LinkDump) -> std::io::Result<()> {
    print_links_into(&mut std::io::stdout(), dump)
}

/// Print a [`LinkDump`] into a given writer.
pub fn print_links_into(
    writer: &mut impl Write,
    dump: &LinkDump,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);

    writeln!(t, "Alias address:\t{}", dump.alias_addr)?;
    writeln!(t, "Target address:\t{}", dump.target_addr)?;
    writeln!(t, "Mode:\t{:?}", dump.mode)?;
    writeln!(
        t,
        "Alias ports:\t{}-{}",
        dump.port_lower,
        u32::from(dump.port_lower) + dump.port_len.saturating_sub(1)
    )?;
    t.flush()?;

    writeln!(t)?;
    write_hrb(&mut t)?;
    writeln!(t, "Links")?;
    write_hr(&mut t)?;
    print_link_header(&mut t)?;
    for link in dump.links.iter().sorted_by_key(|l| l.id) {
        print_link(&mut t, link)?;
    }
    t.flush()?;

    writeln!(t)?;
    print_counts_into(&mut t, &dump.counts)?;
    t.flush()
}

/// Print a [`LinkCounts`].
pub fn print_counts(counts: &LinkCounts) -> std::io::Result<()> {
    print_counts_into(&mut std::io::stdout(), counts)
}

/// Print a [`LinkCounts`] into a given writer.
pub fn print_counts_into(
    writer: &mut impl Write,
    counts: &LinkCounts,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);
    writeln!(t, "ICMP\tUDP\tTCP\tPPTP\tPROTO\tFRAG ID\tFRAG PTR\tTOTAL\tSOCKETS")?;
    writeln!(
        t,
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
        counts.icmp,
        counts.udp,
        counts.tcp,
        counts.pptp,
        counts.proto,
        counts.frag_id,
        counts.frag_ptr,
        counts.total(),
        counts.sockets,
    )?;
    t.flush()
}

/// Print the header for the [`print_link()`] output.
pub fn print_link_header(t: &mut impl Write) -> std::io::Result<()> {
    writeln!(t, "ID\tTYPE\tORIGINAL\tALIAS\tREMOTE\tFLAGS\tEXPIRE\tIDLE")
}

/// Print one link.
pub fn print_link(t: &mut impl Write, link: &LinkInfo) -> std::io::Result<()> {
    let mut flags = String::new();
    if link.permanent {
        flags.push('P');
    }
    if link.partial {
        flags.push('*');
    }
    if link.proxy_addr.is_some() || link.proxy_port.is_some() {
        flags.push('X');
    }
    if link.servers > 0 {
        flags.push('L');
    }
    if flags.is_empty() {
        flags.push('-');
    }

    writeln!(
        t,
        "{}\t{}\t{}\t{}\t{}\t{}\t{}s\t{}ms",
        link.id,
        link.link_type,
        endpoint(link.original_addr, link.original_port),
        endpoint(link.alias_addr, link.alias_port),
        endpoint(link.dst_addr, link.dst_port),
        flags,
        link.expire_secs,
        link.idle_ms,
    )
}

fn endpoint(addr: Ipv4Addr, port: u16) -> String {
    let addr = if addr.is_unspecified() { "*".to_string() } else { addr.to_string() };
    match port {
        0 => addr,
        _ => format!("{addr}:{port}"),
    }
}

/// Write a horizontal rule in bold.
pub fn write_hrb(t: &mut impl Write) -> std::io::Result<()> {
    writeln!(t, "{:=<70}", "=")
}

/// Write a horizontal rule.
pub fn write_hr(t: &mut impl Write) -> std::io::Result<()> {
    writeln!(t, "{:-<70}", "-")
}
