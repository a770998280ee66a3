// SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
// SPDX-License-Identifier: Apache-2.0

//! The lifecycle supervisor every long-lived runnable shares (spec §4.1).
//!
//! `LifecycleSupervisor` is the bookkeeping half — the state machine plus
//! broadcast subscribers — that a `Runnable` implementation embeds. It is
//! an instance of the same table-driven kernel the transaction state
//! machine uses (spec §9), not a second hand-coded state machine.

use async_trait::async_trait;
use ctlplane_common::{Context, IllegalTransition, TransitionTable};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    New,
    Booting,
    Running,
    Reloading,
    Stopping,
    Stopped,
    Error,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::New => "New",
            LifecycleState::Booting => "Booting",
            LifecycleState::Running => "Running",
            LifecycleState::Reloading => "Reloading",
            LifecycleState::Stopping => "Stopping",
            LifecycleState::Stopped => "Stopped",
            LifecycleState::Error => "Error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum LifecycleEvent {
    Boot,
    MarkRunning,
    BeginReload,
    EndReload,
    BeginStop,
    MarkStopped,
    Fail,
}

fn transition_table() -> TransitionTable<LifecycleState, LifecycleEvent> {
    use LifecycleEvent::*;
    use LifecycleState::*;
    TransitionTable::new([
        (New, Boot, Booting),
        (Booting, MarkRunning, Running),
        (Running, BeginReload, Reloading),
        (Reloading, EndReload, Running),
        (Running, BeginStop, Stopping),
        (Reloading, BeginStop, Stopping),
        (Stopping, MarkStopped, Stopped),
        (New, Fail, Error),
        (Booting, Fail, Error),
        (Running, Fail, Error),
        (Reloading, Fail, Error),
        (Stopping, Fail, Error),
    ])
}

/// Lossy (drop-on-full) is the default; synchronous guarantees the
/// producer blocks until this subscriber reads, at the cost of being able
/// to stall the supervisor if the subscriber stops reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastMode {
    DropOnFull,
    Synchronous,
}

/// Depth of the lossy, drop-on-full subscriber queue.
const DROP_ON_FULL_BUFFER: usize = 16;

struct Subscriber {
    tx: mpsc::Sender<String>,
    mode: BroadcastMode,
}

struct Broadcaster {
    next_id: AtomicU64,
    subscribers: std::sync::Arc<Mutex<HashMap<u64, Subscriber>>>,
}

impl Broadcaster {
    fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            subscribers: std::sync::Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn subscribe(&self, ctx: Context, mode: BroadcastMode) -> ReceiverStream<String> {
        let capacity = match mode {
            BroadcastMode::DropOnFull => DROP_ON_FULL_BUFFER,
            BroadcastMode::Synchronous => 1,
        };
        let (tx, rx) = mpsc::channel(capacity);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers
            .lock()
            .unwrap()
            .insert(id, Subscriber { tx, mode });

        // One cleanup task per subscriber (§9): when its own context
        // cancels, remove (and thereby close) its queue. No global sweeper.
        let subscribers = self.subscribers.clone();
        tokio::spawn(async move {
            ctx.cancelled().await;
            subscribers.lock().unwrap().remove(&id);
        });

        ReceiverStream::new(rx)
    }

    async fn publish(&self, state: &str) {
        let snapshot: Vec<(u64, mpsc::Sender<String>, BroadcastMode)> = {
            let subs = self.subscribers.lock().unwrap();
            subs.iter()
                .map(|(id, s)| (*id, s.tx.clone(), s.mode))
                .collect()
        };
        for (_id, tx, mode) in snapshot {
            match mode {
                BroadcastMode::DropOnFull => {
                    let _ = tx.try_send(state.to_string());
                }
                BroadcastMode::Synchronous => {
                    let _ = tx.send(state.to_string()).await;
                }
            }
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(transparent)]
pub struct LifecycleTransitionError(#[from] IllegalTransition<LifecycleState, LifecycleEvent>);

/// The per-runnable state machine plus broadcast every component embeds.
pub struct LifecycleSupervisor {
    table: TransitionTable<LifecycleState, LifecycleEvent>,
    state: Mutex<LifecycleState>,
    broadcaster: Broadcaster,
}

impl Default for LifecycleSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleSupervisor {
    pub fn new() -> Self {
        Self {
            table: transition_table(),
            state: Mutex::new(LifecycleState::New),
            broadcaster: Broadcaster::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap()
    }

    async fn apply(&self, event: LifecycleEvent) -> Result<(), LifecycleTransitionError> {
        let next = {
            let mut state = self.state.lock().unwrap();
            let next = self.table.apply(*state, event)?;
            *state = next;
            next
        };
        self.broadcaster.publish(&next.to_string()).await;
        Ok(())
    }

    pub async fn boot(&self) -> Result<(), LifecycleTransitionError> {
        self.apply(LifecycleEvent::Boot).await
    }

    pub async fn mark_running(&self) -> Result<(), LifecycleTransitionError> {
        self.apply(LifecycleEvent::MarkRunning).await
    }

    pub async fn begin_reload(&self) -> Result<(), LifecycleTransitionError> {
        self.apply(LifecycleEvent::BeginReload).await
    }

    pub async fn end_reload(&self) -> Result<(), LifecycleTransitionError> {
        self.apply(LifecycleEvent::EndReload).await
    }

    pub async fn begin_stop(&self) -> Result<(), LifecycleTransitionError> {
        self.apply(LifecycleEvent::BeginStop).await
    }

    pub async fn mark_stopped(&self) -> Result<(), LifecycleTransitionError> {
        self.apply(LifecycleEvent::MarkStopped).await
    }

    pub async fn fail(&self) -> Result<(), LifecycleTransitionError> {
        self.apply(LifecycleEvent::Fail).await
    }

    /// Subscribe to state-change notifications. The stream ends once `ctx`
    /// cancels.
    pub fn state_chan(&self, ctx: Context, mode: BroadcastMode) -> ReceiverStream<String> {
        self.broadcaster.subscribe(ctx, mode)
    }
}

/// The contract every long-lived runnable exposes (spec §4.1, §9).
#[async_trait]
pub trait Runnable: Send + Sync {
    /// Blocks until `ctx` cancels or an internal stop request arrives.
    async fn run(&self, ctx: Context) -> anyhow::Result<()>;

    /// Idempotent, non-blocking request to terminate.
    fn stop(&self);

    /// Idempotent request to refresh state. Not every runnable supports
    /// this; the default is a no-op success.
    async fn reload(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn get_state(&self) -> LifecycleState;

    fn get_state_chan(&self, ctx: Context, mode: BroadcastMode) -> ReceiverStream<String>;

    /// Poll `get_state` until it reports `Running` or `timeout` elapses.
    /// The control plane imposes no timeout on validation or participant
    /// calls themselves (spec §5) — this is only the optional readiness
    /// probe used after an apply that is expected to bring a participant
    /// up, with the spec's default 30s/100ms cadence.
    async fn wait_until_running(&self, timeout: std::time::Duration, interval: std::time::Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.get_state() == LifecycleState::Running {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(interval).await;
        }
    }
}

/// Spec §5 default readiness-probe cadence.
pub const DEFAULT_READINESS_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);
pub const DEFAULT_READINESS_INTERVAL: std::time::Duration = std::time::Duration::from_millis(100);
