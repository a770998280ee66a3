// SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
// SPDX-License-Identifier: Apache-2.0

//! The transaction pipeline: lifecycle supervisor, transaction state
//! machine, the current-plus-history storage ring, the siphon feeding the
//! orchestrator, and the saga orchestrator itself.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod orchestrator;
pub mod participant;
pub mod siphon;
pub mod storage;
pub mod transaction;

pub use config::Config;
pub use error::CoreError;
pub use lifecycle::{
    BroadcastMode, LifecycleState, LifecycleSupervisor, Runnable, DEFAULT_READINESS_INTERVAL,
    DEFAULT_READINESS_TIMEOUT,
};
pub use orchestrator::{SagaOrchestrator, TransactionStatus};
pub use participant::{Participant, ParticipantError, ParticipantState};
pub use storage::{ListFilter, TransactionStorage};
pub use transaction::{Source, Transaction, TransactionId, TxState};
