// SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
// SPDX-License-Identifier: Apache-2.0

//! The cancellation context every long-lived component's `Run` accepts.
//!
//! A [`Context`] is cheaply cloneable; cancelling any clone cancels every
//! clone. [`Context::child`] derives a context that is cancelled whenever
//! the parent is, giving the hierarchical propagation the control plane
//! needs (parent cancel -> every component unblocks) without pulling in an
//! extra crate on top of `tokio`, which every component already depends on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// A cancellation handle, shared by clone.
#[derive(Debug, Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once this context is cancelled.
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            let notified = self.inner.notify.notified();
            // Re-check after registering for notification to avoid missing a
            // cancel that happened between the check above and this await.
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Derive a child context cancelled whenever `self` is cancelled (or
    /// independently, via the returned handle).
    pub fn child(&self) -> Self {
        let child = Self::new();
        let parent = self.clone();
        let watched = child.clone();
        tokio::spawn(async move {
            parent.cancelled().await;
            watched.cancel();
        });
        child
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancel_is_observed_by_waiters() {
        let ctx = Context::new();
        assert!(!ctx.is_cancelled());
        let waiter = ctx.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        ctx.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter must observe cancellation")
            .unwrap();
    }

    #[tokio::test]
    async fn child_is_cancelled_with_parent() {
        let parent = Context::new();
        let child = parent.child();
        assert!(!child.is_cancelled());
        parent.cancel();
        tokio::time::timeout(Duration::from_secs(1), child.cancelled())
            .await
            .expect("child must be cancelled when parent is");
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn already_cancelled_context_resolves_immediately() {
        let ctx = Context::new();
        ctx.cancel();
        tokio::time::timeout(Duration::from_millis(50), ctx.cancelled())
            .await
            .expect("already-cancelled context must resolve immediately");
    }
}
