// SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
// SPDX-License-Identifier: Apache-2.0

//! The participant contract (spec §4.4, §9).
//!
//! A participant is any subsystem the saga orchestrator drives through
//! execute -> apply, or compensate on failure. Implementations vary wildly
//! (an HTTP listener, a script-runtime registry) — the core knows none of
//! their internals, only this capability set.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

use crate::lifecycle::Runnable;
use crate::transaction::Transaction;

#[derive(Error, Debug, Clone)]
#[error("{0}")]
pub struct ParticipantError(pub String);

impl ParticipantError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<String> for ParticipantError {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ParticipantError {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Per-participant state within a single transaction's processing (spec
/// §3). Compensation is only ever attempted on a participant that reached
/// `Succeeded` (P3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantState {
    NotStarted,
    Executing,
    Succeeded,
    Failed,
    Compensating,
    Compensated,
}

impl fmt::Display for ParticipantState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A subsystem registered with the saga orchestrator.
///
/// Per spec §9, a participant is any value satisfying the capability set
/// `{Name, Run, Stop, GetState, GetStateChan, ExecuteConfig,
/// CompensateConfig, ApplyPendingConfig}` — the first five are the same
/// lifecycle contract every long-lived runnable implements, so
/// `Participant` is simply `Runnable` plus the saga-specific three.
///
/// `execute_config` prepares but must not yet externalize the new
/// configuration; `apply_pending_config` swaps the prepared configuration
/// in; `compensate_config` releases whatever `execute_config` prepared.
/// Implementations must be safe to call in any order relative to other
/// registered participants — the orchestrator fixes a lexicographic order
/// across participants but provides no cross-participant barrier within a
/// phase.
#[async_trait]
pub trait Participant: Runnable {
    /// Stable name, used both for lexicographic ordering and as the key in
    /// `GetTransactionStatus`'s participant map.
    fn name(&self) -> &str;

    async fn execute_config(&self, tx: &Transaction) -> Result<(), ParticipantError>;

    async fn apply_pending_config(&self) -> Result<(), ParticipantError>;

    async fn compensate_config(&self, tx: &Transaction) -> Result<(), ParticipantError>;

    /// Participants that drive their own reload loop independently of the
    /// orchestrator must report `true` here. `RegisterParticipant` rejects
    /// such participants outright, since the orchestrator itself drives the
    /// apply/reload step and a double-reload would otherwise occur.
    fn has_independent_reload(&self) -> bool {
        false
    }
}
