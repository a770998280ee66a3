// SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
// SPDX-License-Identifier: Apache-2.0

//! The file configuration source (spec §4.3). Reads a single file at boot,
//! publishes it to the siphon, then blocks until `ctx` cancels. `Reload`
//! re-reads the file and publishes only if the content actually changed.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info};

use ctlplane_common::Context;
use ctlplane_core::config::Config;
use ctlplane_core::lifecycle::{BroadcastMode, LifecycleState, LifecycleSupervisor, Runnable};
use ctlplane_core::storage::TransactionStorage;
use ctlplane_core::transaction::{Severity, Source, Transaction};
use ctlplane_core::siphon::SiphonSender;

use crate::error::SourceError;

/// Turn raw file bytes into a [`Config`]. The domain TOML-like grammar is
/// explicitly out of scope (spec §1) — the file's entire contents become
/// the opaque payload, tagged with the one version this control plane
/// accepts.
fn config_from_bytes(bytes: Vec<u8>) -> Config {
    Config::new(ctlplane_core::config::SUPPORTED_VERSION, bytes)
}

pub struct FileSource {
    path: PathBuf,
    storage: Arc<TransactionStorage>,
    siphon: SiphonSender<Arc<Transaction>>,
    lifecycle: LifecycleSupervisor,
    last_published: Mutex<Option<Config>>,
    /// The child of whatever ctx `run` was given. `stop` cancels this
    /// directly, unblocking `run`'s suspension points without the caller
    /// needing to hold onto the original ctx (spec §5).
    internal_ctx: Mutex<Option<Context>>,
}

impl FileSource {
    pub fn new(
        path: impl Into<PathBuf>,
        storage: Arc<TransactionStorage>,
        siphon: SiphonSender<Arc<Transaction>>,
    ) -> Self {
        Self {
            path: path.into(),
            storage,
            siphon,
            lifecycle: LifecycleSupervisor::new(),
            last_published: Mutex::new(None),
            internal_ctx: Mutex::new(None),
        }
    }

    fn read_config(&self) -> Result<Config, SourceError> {
        let bytes = std::fs::read(&self.path).map_err(|e| SourceError::Read {
            path: self.path.display().to_string(),
            source: e,
        })?;
        Ok(config_from_bytes(bytes))
    }

    async fn publish(&self, ctx: &Context, config: Config) -> Result<(), SourceError> {
        let tx = Arc::new(Transaction::new(
            Source::File,
            self.path.display().to_string(),
            config.clone(),
        ));
        self.storage.register(tx.clone());
        tx.begin_validation().expect("Created -> Validating is always legal");
        match config.validate() {
            Ok(()) => {
                tx.complete_validation(true, None)
                    .expect("Validating -> Validated is always legal");
                if self.siphon.send(tx.clone(), ctx).await.is_ok() {
                    *self.last_published.lock().unwrap() = Some(config);
                    info!(transaction = %tx.id(), path = %self.path.display(), "published file config");
                } else {
                    info!(transaction = %tx.id(), "publish cancelled by shutdown");
                }
                Ok(())
            }
            Err(e) => {
                tx.complete_validation(false, Some(e.to_string()))
                    .expect("Validating -> Error is always legal");
                tx.log(Severity::Error, format!("config validation failed: {e}"));
                error!(path = %self.path.display(), error = %e, "file config failed validation");
                Err(SourceError::Config(e))
            }
        }
    }
}

#[async_trait]
impl Runnable for FileSource {
    async fn run(&self, ctx: Context) -> anyhow::Result<()> {
        let internal = ctx.child();
        *self.internal_ctx.lock().unwrap() = Some(internal.clone());

        self.lifecycle.boot().await?;
        let config = match self.read_config() {
            Ok(c) => c,
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "file source failed to boot");
                self.lifecycle.fail().await?;
                return Err(e.into());
            }
        };
        // Boot-time validation/publish failures do not stop the component —
        // only read/parse failure does (spec §4.3).
        let _ = self.publish(&internal, config).await;
        self.lifecycle.mark_running().await?;
        internal.cancelled().await;
        self.lifecycle.begin_stop().await?;
        self.lifecycle.mark_stopped().await?;
        Ok(())
    }

    fn stop(&self) {
        if let Some(ctx) = self.internal_ctx.lock().unwrap().as_ref() {
            ctx.cancel();
        }
    }

    async fn reload(&self) -> anyhow::Result<()> {
        let ctx = Context::new();
        let config = match self.read_config() {
            Ok(c) => c,
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "reload read failed, retaining previous config");
                return Ok(());
            }
        };
        let unchanged = self
            .last_published
            .lock()
            .unwrap()
            .as_ref()
            .map(|prev| prev.equals(&config))
            .unwrap_or(false);
        if unchanged {
            return Ok(());
        }
        if let Err(e) = self.publish(&ctx, config).await {
            error!(path = %self.path.display(), error = %e, "reload publish failed");
        }
        Ok(())
    }

    fn get_state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    fn get_state_chan(&self, ctx: Context, mode: BroadcastMode) -> ReceiverStream<String> {
        self.lifecycle.state_chan(ctx, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctlplane_core::siphon;

    fn write_file(dir: &tempfile::TempDir, contents: &[u8]) -> PathBuf {
        let path = dir.path().join("ctlplane.conf");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn run_publishes_once_then_blocks_until_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, b"hello=1");
        let storage = Arc::new(TransactionStorage::default());
        let (tx, mut rx) = siphon::channel::<Arc<Transaction>>();
        let source = Arc::new(FileSource::new(path, storage.clone(), tx));

        let ctx = Context::new();
        let run_ctx = ctx.clone();
        let source_run = source.clone();
        let handle = tokio::spawn(async move { source_run.run(run_ctx).await });

        let published = rx.recv(&ctx).await.unwrap();
        assert_eq!(published.source(), Source::File);
        assert_eq!(storage.len(), 1);

        ctx.cancel();
        handle.await.unwrap().unwrap();
        assert_eq!(source.get_state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn reload_is_a_no_op_when_content_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, b"same");
        let storage = Arc::new(TransactionStorage::default());
        let (tx, mut rx) = siphon::channel::<Arc<Transaction>>();
        let source = Arc::new(FileSource::new(path, storage.clone(), tx));

        let ctx = Context::new();
        let run_ctx = ctx.clone();
        let source_run = source.clone();
        let handle = tokio::spawn(async move { source_run.run(run_ctx).await });
        rx.recv(&ctx).await.unwrap();
        assert_eq!(storage.len(), 1);

        source.reload().await.unwrap();
        assert_eq!(storage.len(), 1, "unchanged content must not republish");

        ctx.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn reload_publishes_exactly_once_on_changed_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, b"v1");
        let storage = Arc::new(TransactionStorage::default());
        let (tx, mut rx) = siphon::channel::<Arc<Transaction>>();
        let source = Arc::new(FileSource::new(path.clone(), storage.clone(), tx));

        let ctx = Context::new();
        let run_ctx = ctx.clone();
        let source_run = source.clone();
        let handle = tokio::spawn(async move { source_run.run(run_ctx).await });
        let first = rx.recv(&ctx).await.unwrap();

        std::fs::write(&path, b"v2").unwrap();
        let source_reload = source.clone();
        let reload_ctx = ctx.clone();
        let reload_handle = tokio::spawn(async move {
            let _ = reload_ctx;
            source_reload.reload().await
        });
        let second = rx.recv(&ctx).await.unwrap();
        reload_handle.await.unwrap().unwrap();

        assert_ne!(first.id(), second.id());
        assert_eq!(storage.len(), 2);

        ctx.cancel();
        handle.await.unwrap().unwrap();
    }
}
