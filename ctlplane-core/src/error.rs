// SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
// SPDX-License-Identifier: Apache-2.0

//! The crate-wide error type the binary and `ctlplane-sources` see.

use thiserror::Error;

use crate::config::ConfigError;
use crate::lifecycle::LifecycleTransitionError;
use crate::orchestrator::OrchestratorError;
use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleTransitionError),
}
