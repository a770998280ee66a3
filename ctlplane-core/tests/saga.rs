// SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
// SPDX-License-Identifier: Apache-2.0

//! End-to-end saga scenarios (spec §8: S1 happy path, S2 compensation).

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_stream::wrappers::ReceiverStream;

use ctlplane_core::{
    BroadcastMode, Config, LifecycleState, Participant, ParticipantError, SagaOrchestrator,
    Source, Transaction, TransactionStorage, TxState,
};
use ctlplane_core::lifecycle::Runnable;

struct StubParticipant {
    name: String,
    fail_execute: bool,
    executed: Arc<AtomicUsize>,
    applied: Arc<AtomicUsize>,
    compensated: Arc<AtomicUsize>,
}

impl StubParticipant {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fail_execute: false,
            executed: Arc::new(AtomicUsize::new(0)),
            applied: Arc::new(AtomicUsize::new(0)),
            compensated: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn failing(name: &str) -> Self {
        Self {
            fail_execute: true,
            ..Self::new(name)
        }
    }
}

#[async_trait]
impl Runnable for StubParticipant {
    async fn run(&self, _ctx: ctlplane_common::Context) -> anyhow::Result<()> {
        Ok(())
    }

    fn stop(&self) {}

    fn get_state(&self) -> LifecycleState {
        LifecycleState::Running
    }

    fn get_state_chan(
        &self,
        ctx: ctlplane_common::Context,
        _mode: BroadcastMode,
    ) -> ReceiverStream<String> {
        let (_tx, rx) = tokio::sync::mpsc::channel(1);
        drop(ctx);
        ReceiverStream::new(rx)
    }
}

#[async_trait]
impl Participant for StubParticipant {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute_config(&self, _tx: &Transaction) -> Result<(), ParticipantError> {
        self.executed.fetch_add(1, Ordering::SeqCst);
        if self.fail_execute {
            Err(ParticipantError::new("stub execute failure"))
        } else {
            Ok(())
        }
    }

    async fn apply_pending_config(&self) -> Result<(), ParticipantError> {
        self.applied.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn compensate_config(&self, _tx: &Transaction) -> Result<(), ParticipantError> {
        self.compensated.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn validated_tx() -> Arc<Transaction> {
    let tx = Transaction::new(Source::Test, "integration", Config::new("v1", vec![1, 2]));
    tx.begin_validation().unwrap();
    tx.complete_validation(true, None).unwrap();
    Arc::new(tx)
}

#[tokio::test]
async fn happy_path_completes_and_becomes_current() {
    let storage = Arc::new(TransactionStorage::default());
    let orchestrator = SagaOrchestrator::new(storage.clone());

    let a = Arc::new(StubParticipant::new("a-listener"));
    let b = Arc::new(StubParticipant::new("b-listener"));
    orchestrator.register_participant(a.clone()).unwrap();
    orchestrator.register_participant(b.clone()).unwrap();

    let tx = validated_tx();
    storage.register(tx.clone());
    orchestrator.process(tx.clone()).await.unwrap();

    assert_eq!(tx.state(), TxState::Completed);
    assert_eq!(a.applied.load(Ordering::SeqCst), 1);
    assert_eq!(b.applied.load(Ordering::SeqCst), 1);
    assert_eq!(storage.current().unwrap().id(), tx.id());

    let status = orchestrator.transaction_status(tx.id()).unwrap();
    assert_eq!(status.state, TxState::Completed);
    assert_eq!(status.participants.len(), 2);
}

#[tokio::test]
async fn one_participant_failure_compensates_the_others() {
    let storage = Arc::new(TransactionStorage::default());
    let orchestrator = SagaOrchestrator::new(storage.clone());

    let a = Arc::new(StubParticipant::new("a-listener"));
    let b = Arc::new(StubParticipant::failing("b-listener"));
    orchestrator.register_participant(a.clone()).unwrap();
    orchestrator.register_participant(b.clone()).unwrap();

    let tx = validated_tx();
    storage.register(tx.clone());
    orchestrator.process(tx.clone()).await.unwrap();

    assert_eq!(tx.state(), TxState::Compensated);
    assert_eq!(a.compensated.load(Ordering::SeqCst), 1);
    // b never reached Succeeded, so it is never compensated.
    assert_eq!(b.compensated.load(Ordering::SeqCst), 0);
    assert!(storage.current().is_none());
}

#[tokio::test]
async fn independent_reload_participant_is_rejected() {
    struct IndependentReloader(StubParticipant);

    #[async_trait]
    impl Runnable for IndependentReloader {
        async fn run(&self, ctx: ctlplane_common::Context) -> anyhow::Result<()> {
            self.0.run(ctx).await
        }
        fn stop(&self) {}
        fn get_state(&self) -> LifecycleState {
            self.0.get_state()
        }
        fn get_state_chan(
            &self,
            ctx: ctlplane_common::Context,
            mode: BroadcastMode,
        ) -> ReceiverStream<String> {
            self.0.get_state_chan(ctx, mode)
        }
    }

    #[async_trait]
    impl Participant for IndependentReloader {
        fn name(&self) -> &str {
            self.0.name()
        }
        async fn execute_config(&self, tx: &Transaction) -> Result<(), ParticipantError> {
            self.0.execute_config(tx).await
        }
        async fn apply_pending_config(&self) -> Result<(), ParticipantError> {
            self.0.apply_pending_config().await
        }
        async fn compensate_config(&self, tx: &Transaction) -> Result<(), ParticipantError> {
            self.0.compensate_config(tx).await
        }
        fn has_independent_reload(&self) -> bool {
            true
        }
    }

    let storage = Arc::new(TransactionStorage::default());
    let orchestrator = SagaOrchestrator::new(storage);
    let rejected_flag = AtomicBool::new(false);
    let result = orchestrator
        .register_participant(Arc::new(IndependentReloader(StubParticipant::new("rogue"))));
    if result.is_err() {
        rejected_flag.store(true, Ordering::SeqCst);
    }
    assert!(rejected_flag.load(Ordering::SeqCst));
}
