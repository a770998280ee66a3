// SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
// SPDX-License-Identifier: Apache-2.0

//! Listen address grammar (spec §6): empty, `tcp://host:port`,
//! `unix:///abs/path` / `unix:/abs/path`, or bare `host:port`.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListenAddrError {
    #[error("unknown listen address scheme in {0:?}")]
    UnknownScheme(String),
    #[error("empty unix socket path in {0:?}")]
    EmptyUnixPath(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddr {
    /// TCP at an unspecified port — the empty-string form.
    TcpUnspecified,
    Tcp(String),
    Unix(String),
}

/// Parse a listen address string per the grammar in spec §6. Does not touch
/// the filesystem or network; binding and stale-socket cleanup are the
/// caller's job (see [`crate::rpc`]).
pub fn parse(raw: &str) -> Result<ListenAddr, ListenAddrError> {
    if raw.is_empty() {
        return Ok(ListenAddr::TcpUnspecified);
    }
    if let Some(rest) = raw.strip_prefix("tcp://") {
        return Ok(ListenAddr::Tcp(rest.to_string()));
    }
    if let Some(rest) = raw.strip_prefix("unix://") {
        if rest.is_empty() {
            return Err(ListenAddrError::EmptyUnixPath(raw.to_string()));
        }
        return Ok(ListenAddr::Unix(rest.to_string()));
    }
    if let Some(rest) = raw.strip_prefix("unix:") {
        if rest.is_empty() {
            return Err(ListenAddrError::EmptyUnixPath(raw.to_string()));
        }
        return Ok(ListenAddr::Unix(rest.to_string()));
    }
    if raw.contains("://") {
        return Err(ListenAddrError::UnknownScheme(raw.to_string()));
    }
    Ok(ListenAddr::Tcp(raw.to_string()))
}

/// Remove a stale Unix domain socket file at `path` before binding
/// (Lstat + unlink per spec §6). A directory at the path is left alone —
/// the subsequent bind attempt is expected to fail with that as the cause.
pub fn remove_stale_unix_socket(path: &str) -> std::io::Result<()> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if meta.is_dir() {
        return Ok(());
    }
    std::fs::remove_file(path)
}
