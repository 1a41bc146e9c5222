// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Offline administration of a natalias instance: load a configuration,
//! push captured traffic through it, and look at the resulting links.

use std::path::PathBuf;
use thiserror::Error;

pub mod capture;
pub mod config;
pub mod log;
pub mod replay;

pub use config::AdmConfig;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("failed to serialize configuration: {0}")]
    ConfigOut(#[from] toml::ser::Error),

    #[error("bad capture: {0}")]
    Capture(String),

    #[error("unsupported link type: {0}")]
    Linktype(i32),

    #[error(transparent)]
    Alias(#[from] natalias_api::AliasError),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}
