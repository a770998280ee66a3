// SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
// SPDX-License-Identifier: Apache-2.0

//! The saga orchestrator: drives a validated transaction through every
//! registered participant's execute phase, then either applies or
//! compensates (spec §4.4).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::{info, warn};

use crate::participant::{Participant, ParticipantState};
use crate::storage::{StorageError, TransactionStorage};
use crate::transaction::{Severity, Transaction, TransactionId, TxState};

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("participant {0:?} already registered")]
    DuplicateParticipant(String),
    #[error(
        "participant {0:?} reports an independent reload loop; the orchestrator already drives apply"
    )]
    IndependentReloadNotAllowed(String),
    #[error("transaction {0} not found")]
    TransactionNotFound(TransactionId),
    #[error("transaction {0} is not Validated, cannot begin execution")]
    NotValidated(TransactionId),
    #[error("illegal transaction state transition: {0}")]
    Transition(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A snapshot of one transaction's progress, the shape `GetTransactionStatus`
/// returns (spec §4.3).
#[derive(Debug, Clone)]
pub struct TransactionStatus {
    pub id: TransactionId,
    pub state: TxState,
    pub is_valid: Option<bool>,
    pub failure: Option<String>,
    pub participants: HashMap<String, ParticipantState>,
}

struct Registration {
    participant: Arc<dyn Participant>,
}

/// Drives transactions through the saga. Owns no transaction state itself
/// (that lives in [`Transaction`]/[`TransactionStorage`]) — only the
/// participant registry and the per-transaction participant-state map
/// needed for `GetTransactionStatus`.
pub struct SagaOrchestrator {
    storage: Arc<TransactionStorage>,
    participants: RwLock<Vec<Registration>>,
    progress: RwLock<HashMap<TransactionId, HashMap<String, ParticipantState>>>,
}

impl SagaOrchestrator {
    pub fn new(storage: Arc<TransactionStorage>) -> Self {
        Self {
            storage,
            participants: RwLock::new(Vec::new()),
            progress: RwLock::new(HashMap::new()),
        }
    }

    /// Register a participant. Rejected outright if a participant of the
    /// same name already exists, or if it reports an independent reload
    /// loop (spec §9) — the orchestrator is the sole driver of the apply
    /// step and a second reloader would race it.
    pub fn register_participant(
        &self,
        participant: Arc<dyn Participant>,
    ) -> Result<(), OrchestratorError> {
        if participant.has_independent_reload() {
            return Err(OrchestratorError::IndependentReloadNotAllowed(
                participant.name().to_string(),
            ));
        }
        let mut participants = self.participants.write().unwrap();
        if participants.iter().any(|r| r.participant.name() == participant.name()) {
            return Err(OrchestratorError::DuplicateParticipant(
                participant.name().to_string(),
            ));
        }
        participants.push(Registration { participant });
        Ok(())
    }

    /// Participants in lexicographic name order — the orchestrator's only
    /// ordering guarantee (spec §4.4).
    fn ordered_participants(&self) -> Vec<Arc<dyn Participant>> {
        let mut names: Vec<Arc<dyn Participant>> = self
            .participants
            .read()
            .unwrap()
            .iter()
            .map(|r| r.participant.clone())
            .collect();
        names.sort_by(|a, b| a.name().cmp(b.name()));
        names
    }

    /// Drive `tx` from `Validated` through to `Completed` or `Error`. The
    /// caller is responsible for having already run validation
    /// (`begin_validation` / `complete_validation`).
    pub async fn process(&self, tx: Arc<Transaction>) -> Result<(), OrchestratorError> {
        if tx.state() != TxState::Validated {
            return Err(OrchestratorError::NotValidated(tx.id()));
        }
        let participants = self.ordered_participants();
        self.init_progress(tx.id(), &participants);

        tx.begin_execution()
            .map_err(|e| OrchestratorError::Transition(e.to_string()))?;

        let mut succeeded: Vec<Arc<dyn Participant>> = Vec::new();
        let mut failure: Option<String> = None;

        for participant in &participants {
            self.set_progress(tx.id(), participant.name(), ParticipantState::Executing);
            match participant.execute_config(&tx).await {
                Ok(()) => {
                    self.set_progress(tx.id(), participant.name(), ParticipantState::Succeeded);
                    succeeded.push(participant.clone());
                }
                Err(e) => {
                    self.set_progress(tx.id(), participant.name(), ParticipantState::Failed);
                    tx.log(
                        Severity::Error,
                        format!("participant {} execute failed: {e}", participant.name()),
                    );
                    failure = Some(format!("participant {} failed: {e}", participant.name()));
                    break;
                }
            }
        }

        if let Some(failure) = failure {
            tx.record_execution_failure(&failure);
            tx.begin_compensation()
                .map_err(|e| OrchestratorError::Transition(e.to_string()))?;
            self.compensate(&tx, &succeeded).await;
            tx.mark_compensated()
                .map_err(|e| OrchestratorError::Transition(e.to_string()))?;
            warn!(transaction = %tx.id(), "transaction compensated: {failure}");
            return Ok(());
        }

        tx.mark_succeeded()
            .map_err(|e| OrchestratorError::Transition(e.to_string()))?;

        let mut apply_failure: Option<String> = None;
        for participant in &succeeded {
            if let Err(e) = participant.apply_pending_config().await {
                apply_failure = Some(format!("participant {} apply failed: {e}", participant.name()));
                break;
            }
        }

        match apply_failure {
            None => {
                tx.mark_completed()
                    .map_err(|e| OrchestratorError::Transition(e.to_string()))?;
                self.storage.set_current(tx.id())?;
                info!(transaction = %tx.id(), "transaction completed");
            }
            Some(failure) => {
                tx.mark_apply_error(&failure)
                    .map_err(|e| OrchestratorError::Transition(e.to_string()))?;
                warn!(transaction = %tx.id(), "transaction apply failed: {failure}");
            }
        }
        Ok(())
    }

    async fn compensate(&self, tx: &Transaction, succeeded: &[Arc<dyn Participant>]) {
        for participant in succeeded {
            self.set_progress(tx.id(), participant.name(), ParticipantState::Compensating);
            match participant.compensate_config(tx).await {
                Ok(()) => {
                    self.set_progress(tx.id(), participant.name(), ParticipantState::Compensated);
                }
                Err(e) => {
                    // A participant's own compensation failing does not
                    // abort the sweep — every succeeded participant still
                    // gets a compensate attempt.
                    tx.log(
                        Severity::Error,
                        format!("participant {} compensate failed: {e}", participant.name()),
                    );
                }
            }
        }
    }

    fn init_progress(&self, id: TransactionId, participants: &[Arc<dyn Participant>]) {
        let map = participants
            .iter()
            .map(|p| (p.name().to_string(), ParticipantState::NotStarted))
            .collect();
        self.progress.write().unwrap().insert(id, map);
    }

    fn set_progress(&self, id: TransactionId, name: &str, state: ParticipantState) {
        if let Some(map) = self.progress.write().unwrap().get_mut(&id) {
            map.insert(name.to_string(), state);
        }
    }

    pub fn transaction_status(&self, id: TransactionId) -> Option<TransactionStatus> {
        let tx = self.storage.get(id)?;
        let participants = self
            .progress
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_default();
        Some(TransactionStatus {
            id: tx.id(),
            state: tx.state(),
            is_valid: tx.is_valid(),
            failure: tx.failure(),
            participants,
        })
    }
}
