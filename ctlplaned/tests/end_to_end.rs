// SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
// SPDX-License-Identifier: Apache-2.0

//! Wires the pipeline the same way `main` does, minus the network
//! listener, and exercises the S1/S4 scenarios from spec §8 end to end.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_stream::wrappers::ReceiverStream;

use ctlplane_common::Context;
use ctlplane_core::lifecycle::{BroadcastMode, LifecycleState, Runnable};
use ctlplane_core::orchestrator::SagaOrchestrator;
use ctlplane_core::participant::{Participant, ParticipantError};
use ctlplane_core::siphon;
use ctlplane_core::storage::TransactionStorage;
use ctlplane_core::transaction::Transaction;
use ctlplane_sources::file::FileSource;

struct CountingParticipant {
    name: String,
    applied: Arc<AtomicUsize>,
}

#[async_trait]
impl Runnable for CountingParticipant {
    async fn run(&self, _ctx: Context) -> anyhow::Result<()> {
        Ok(())
    }
    fn stop(&self) {}
    fn get_state(&self) -> LifecycleState {
        LifecycleState::Running
    }
    fn get_state_chan(&self, ctx: Context, _mode: BroadcastMode) -> ReceiverStream<String> {
        let (_tx, rx) = tokio::sync::mpsc::channel(1);
        drop(ctx);
        ReceiverStream::new(rx)
    }
}

#[async_trait]
impl Participant for CountingParticipant {
    fn name(&self) -> &str {
        &self.name
    }
    async fn execute_config(&self, _tx: &Transaction) -> Result<(), ParticipantError> {
        Ok(())
    }
    async fn apply_pending_config(&self) -> Result<(), ParticipantError> {
        self.applied.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
    async fn compensate_config(&self, _tx: &Transaction) -> Result<(), ParticipantError> {
        Ok(())
    }
}

#[tokio::test]
async fn file_source_feeds_orchestrator_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ctlplane.conf");
    std::fs::write(&path, b"first").unwrap();

    let storage = Arc::new(TransactionStorage::default());
    let orchestrator = Arc::new(SagaOrchestrator::new(storage.clone()));
    let applied = Arc::new(AtomicUsize::new(0));
    orchestrator
        .register_participant(Arc::new(CountingParticipant {
            name: "p".to_string(),
            applied: applied.clone(),
        }))
        .unwrap();

    let (siphon_tx, mut siphon_rx) = siphon::channel::<Arc<Transaction>>();
    let file_source = Arc::new(FileSource::new(path, storage.clone(), siphon_tx));

    let root = Context::new();
    let source_ctx = root.child();
    let source_handle = {
        let file_source = file_source.clone();
        tokio::spawn(async move { file_source.run(source_ctx).await })
    };

    let consume_ctx = root.clone();
    let tx = siphon_rx.recv(&consume_ctx).await.unwrap();
    orchestrator.process(tx.clone()).await.unwrap();

    assert_eq!(tx.state(), ctlplane_core::TxState::Completed);
    assert_eq!(applied.load(Ordering::SeqCst), 1);
    assert_eq!(storage.current().unwrap().id(), tx.id());

    root.cancel();
    source_handle.await.unwrap().unwrap();
}
