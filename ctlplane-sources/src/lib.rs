// SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
// SPDX-License-Identifier: Apache-2.0

//! The two configuration sources (spec §4.3): a file loader and the
//! `ConfigControl` RPC service, plus the listen-address grammar the RPC
//! service's binding uses.

pub mod error;
pub mod file;
pub mod listen_addr;
pub mod rpc;

pub use error::SourceError;
pub use file::FileSource;
pub use listen_addr::{ListenAddr, ListenAddrError};
pub use rpc::RpcService;
