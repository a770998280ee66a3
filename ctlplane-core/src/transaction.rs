// SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
// SPDX-License-Identifier: Apache-2.0

//! The transaction: an immutable proposal plus mutable lifecycle state plus
//! its own bounded log buffer (spec §3, §4.2).
//!
//! The state machine is an instance of [`ctlplane_common::state_machine`]'s
//! table-driven kernel, shared with the lifecycle supervisor per the design
//! note in spec §9 rather than a second hand-coded `match` ladder.

use chrono::{DateTime, Utc};
use ctlplane_common::{IllegalTransition, TransitionTable};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Mutex;
use uuid::Uuid;

use crate::config::Config;

/// Opaque transaction identifier, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(Uuid);

impl TransactionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::str::FromStr for TransactionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Where a transaction's proposal originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    File,
    Api,
    Test,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Source::File => "file",
            Source::Api => "api",
            Source::Test => "test",
        };
        f.write_str(s)
    }
}

/// Transaction lifecycle state (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxState {
    Created,
    Validating,
    Validated,
    Executing,
    Succeeded,
    Completed,
    Compensating,
    Compensated,
    Error,
}

impl TxState {
    /// P1: Completed, Compensated and Error are terminal — no further
    /// transition is ever permitted out of them.
    pub fn is_terminal(self) -> bool {
        matches!(self, TxState::Completed | TxState::Compensated | TxState::Error)
    }
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TxEvent {
    BeginValidation,
    MarkValidated,
    MarkValidationFailed,
    BeginExecution,
    MarkSucceeded,
    BeginCompensation,
    MarkCompensationFailed,
    MarkCompensated,
    MarkCompleted,
    MarkApplyError,
}

fn transition_table() -> TransitionTable<TxState, TxEvent> {
    use TxEvent::*;
    use TxState::*;
    TransitionTable::new([
        (Created, BeginValidation, Validating),
        (Validating, MarkValidated, Validated),
        (Validating, MarkValidationFailed, Error),
        (Validated, BeginExecution, Executing),
        (Executing, MarkSucceeded, Succeeded),
        (Executing, BeginCompensation, Compensating),
        (Compensating, MarkCompensationFailed, Error),
        (Compensating, MarkCompensated, Compensated),
        (Succeeded, MarkCompleted, Completed),
        (Succeeded, MarkApplyError, Error),
    ])
}

/// Severity of a captured log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone)]
pub struct LogRecord {
    pub time: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
    pub attributes: HashMap<String, String>,
}

/// Bounded, ordered log captured while a transaction is being processed.
/// This is the mechanism by which `ListConfigTransactions` exposes a
/// per-transaction diagnostic trail without a separate log store (spec §9).
#[derive(Debug, Clone)]
pub struct LogBuffer {
    records: VecDeque<LogRecord>,
    capacity: usize,
}

pub const DEFAULT_LOG_CAPACITY: usize = 256;

impl LogBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    fn push(&mut self, record: LogRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn records(&self) -> impl Iterator<Item = &LogRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

struct Inner {
    state: TxState,
    is_valid: Option<bool>,
    failure: Option<String>,
    log: LogBuffer,
}

/// A proposed configuration change, carried through validate -> execute ->
/// apply, or compensate, on failure.
///
/// Identity/source/config/created_at are write-once; everything mutable
/// lives behind a single mutex so every transition on one instance is
/// totally ordered, matching the "serialized within a single transaction
/// instance" rule in spec §4.2.
pub struct Transaction {
    id: TransactionId,
    source: Source,
    source_detail: String,
    config: Config,
    created_at: DateTime<Utc>,
    table: TransitionTable<TxState, TxEvent>,
    inner: Mutex<Inner>,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("source", &self.source)
            .field("state", &self.state())
            .finish()
    }
}

impl Transaction {
    pub fn new(source: Source, source_detail: impl Into<String>, config: Config) -> Self {
        Self {
            id: TransactionId::new(),
            source,
            source_detail: source_detail.into(),
            config,
            created_at: Utc::now(),
            table: transition_table(),
            inner: Mutex::new(Inner {
                state: TxState::Created,
                is_valid: None,
                failure: None,
                log: LogBuffer::new(DEFAULT_LOG_CAPACITY),
            }),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn source_detail(&self) -> &str {
        &self.source_detail
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> TxState {
        self.inner.lock().unwrap().state
    }

    pub fn is_valid(&self) -> Option<bool> {
        self.inner.lock().unwrap().is_valid
    }

    pub fn failure(&self) -> Option<String> {
        self.inner.lock().unwrap().failure.clone()
    }

    /// Append a log record under this transaction's processing scope.
    pub fn log(&self, severity: Severity, message: impl Into<String>) {
        self.log_with_attributes(severity, message, HashMap::new());
    }

    pub fn log_with_attributes(
        &self,
        severity: Severity,
        message: impl Into<String>,
        attributes: HashMap<String, String>,
    ) {
        let mut inner = self.inner.lock().unwrap();
        inner.log.push(LogRecord {
            time: Utc::now(),
            severity,
            message: message.into(),
            attributes,
        });
    }

    pub fn with_log<R>(&self, f: impl FnOnce(&LogBuffer) -> R) -> R {
        let inner = self.inner.lock().unwrap();
        f(&inner.log)
    }

    fn apply(&self, event: TxEvent) -> Result<TxState, IllegalTransition<TxState, TxEvent>> {
        let mut inner = self.inner.lock().unwrap();
        let next = self.table.apply(inner.state, event)?;
        inner.state = next;
        Ok(next)
    }

    pub fn begin_validation(&self) -> Result<(), IllegalTransition<TxState, TxEvent>> {
        self.apply(TxEvent::BeginValidation)?;
        Ok(())
    }

    /// Record the outcome of validation. `IsValid` is set exactly once here.
    /// On success: Validating -> Validated. On failure: Validating -> Error.
    pub fn complete_validation(
        &self,
        valid: bool,
        error: Option<String>,
    ) -> Result<(), IllegalTransition<TxState, TxEvent>> {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.is_valid.is_some() {
                // IsValid is set exactly once; a repeat call is a no-op on
                // the flag (the FSM below still rejects a repeat transition).
            } else {
                inner.is_valid = Some(valid);
            }
            if let Some(err) = &error {
                inner.failure = Some(err.clone());
            }
        }
        if valid {
            self.apply(TxEvent::MarkValidated)?;
        } else {
            self.apply(TxEvent::MarkValidationFailed)?;
        }
        Ok(())
    }

    pub fn begin_execution(&self) -> Result<(), IllegalTransition<TxState, TxEvent>> {
        self.apply(TxEvent::BeginExecution)?;
        Ok(())
    }

    pub fn mark_succeeded(&self) -> Result<(), IllegalTransition<TxState, TxEvent>> {
        self.apply(TxEvent::MarkSucceeded)?;
        Ok(())
    }

    /// Record the cause of an execute-phase failure without yet changing
    /// state — the orchestrator still owns driving `begin_compensation`
    /// once it has finished marking participants.
    pub fn record_execution_failure(&self, error: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap();
        inner.failure = Some(error.into());
    }

    pub fn begin_compensation(&self) -> Result<(), IllegalTransition<TxState, TxEvent>> {
        self.apply(TxEvent::BeginCompensation)?;
        Ok(())
    }

    pub fn mark_compensated(&self) -> Result<(), IllegalTransition<TxState, TxEvent>> {
        self.apply(TxEvent::MarkCompensated)?;
        Ok(())
    }

    /// Compensation itself could not proceed (distinct from an individual
    /// participant's `CompensateConfig` failing, which is logged but does
    /// not abort the compensation sweep).
    pub fn mark_compensation_aborted(
        &self,
        error: impl Into<String>,
    ) -> Result<(), IllegalTransition<TxState, TxEvent>> {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.failure = Some(error.into());
        }
        self.apply(TxEvent::MarkCompensationFailed)?;
        Ok(())
    }

    pub fn mark_completed(&self) -> Result<(), IllegalTransition<TxState, TxEvent>> {
        self.apply(TxEvent::MarkCompleted)?;
        Ok(())
    }

    pub fn mark_apply_error(
        &self,
        error: impl Into<String>,
    ) -> Result<(), IllegalTransition<TxState, TxEvent>> {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.failure = Some(error.into());
        }
        self.apply(TxEvent::MarkApplyError)?;
        Ok(())
    }
}
