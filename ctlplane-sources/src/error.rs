// SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

use crate::listen_addr::ListenAddrError;
use ctlplane_core::config::ConfigError;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path:?}: {reason}")]
    Parse { path: String, reason: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    ListenAddr(#[from] ListenAddrError),
    #[error("bind failed on {addr:?}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}
