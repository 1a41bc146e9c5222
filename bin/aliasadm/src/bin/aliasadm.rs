// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use aliasadm::AdmConfig;
use aliasadm::capture::Capture;
use aliasadm::config::print_redirects_into;
use aliasadm::log::SlogLog;
use aliasadm::log::term_logger;
use aliasadm::replay::replay;
use anyhow::Context;
use clap::Parser;
use natalias::print::print_links;
use natalias_api::Direction;
use slog::info;
use std::fs::File;
use std::io::BufWriter;
use std::io::Write;
use std::path::PathBuf;

/// Drive a natalias instance from the command line.
#[derive(Debug, Parser)]
#[command(version)]
enum Command {
    /// Push every packet of a capture through an instance.
    Replay {
        /// The instance configuration.
        #[arg(short, long)]
        config: PathBuf,

        /// A raw IPv4 or Ethernet pcap file.
        pcap: PathBuf,

        /// Which way the captured traffic flows: `in` or `out`.
        #[arg(short, long, default_value = "out")]
        dir: Direction,

        /// Write the rewritten capture here.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Print the link table once the capture is done.
        #[arg(short, long)]
        print: bool,
    },

    /// Validate a configuration and list its redirects.
    CheckConfig {
        config: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cmd = Command::parse();
    match cmd {
        Command::Replay { config, pcap, dir, out, print } => {
            let log = term_logger();
            let cfg = AdmConfig::load(&config)?;
            let nat = cfg
                .build(Box::new(SlogLog::new(&log)))
                .with_context(|| format!("configuring {}", config.display()))?;

            let bytes = std::fs::read(&pcap)
                .with_context(|| format!("reading {}", pcap.display()))?;
            let mut cap = Capture::parse(&bytes)
                .with_context(|| format!("parsing {}", pcap.display()))?;

            let stats = replay(&nat, &mut cap, dir, &log);
            info!(log, "replay done"; "frames" => stats.total(), "dir" => %dir);
            stats.print_into(&mut std::io::stdout())?;

            if let Some(out) = out {
                let file = File::create(&out)
                    .with_context(|| format!("creating {}", out.display()))?;
                let mut w = BufWriter::new(file);
                cap.write(&mut w)?;
                w.flush()?;
            }

            if print {
                println!();
                print_links(&nat.dump_links())?;
            }
        }

        Command::CheckConfig { config } => {
            let cfg = AdmConfig::load(&config)?;
            // Building catches what parsing cannot: bad port ranges and
            // conflicting redirects.
            cfg.build(Box::new(natalias::provider::NullLog))
                .with_context(|| format!("configuring {}", config.display()))?;
            println!("{}: ok", config.display());
            print_redirects_into(&mut std::io::stdout(), &cfg)?;
        }
    }

    Ok(())
}
