// SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
// SPDX-License-Identifier: Apache-2.0

//! The siphon: a single-slot rendezvous channel from configuration sources
//! to the saga orchestrator (spec §3, §5, §9).
//!
//! `tokio::sync::mpsc` with a buffer of one is *not* a rendezvous: `send`
//! returns as soon as the one slot is free, whether or not a reader has
//! actually taken the value (P7 requires the producer to block until a
//! consumer reads it). This builds true rendezvous out of that same
//! buffer-of-one channel plus a `oneshot` handshake: the receiver only
//! acks once it has actually dequeued the item, and the sender's `send`
//! doesn't return until that ack arrives.

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use ctlplane_common::Context;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("publish cancelled: context was cancelled before a consumer read the transaction")]
pub struct SendCancelled;

struct Envelope<T> {
    item: T,
    ack: oneshot::Sender<()>,
}

#[derive(Clone)]
pub struct SiphonSender<T> {
    tx: mpsc::Sender<Envelope<T>>,
}

impl<T> SiphonSender<T> {
    /// Publish `item`, blocking until the orchestrator's `recv` actually
    /// takes it, or until `ctx` cancels.
    pub async fn send(&self, item: T, ctx: &Context) -> Result<(), SendCancelled> {
        let (ack_tx, ack_rx) = oneshot::channel();
        tokio::select! {
            biased;
            _ = ctx.cancelled() => return Err(SendCancelled),
            res = self.tx.send(Envelope { item, ack: ack_tx }) => {
                res.map_err(|_| SendCancelled)?;
            }
        }
        tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(SendCancelled),
            _ = ack_rx => Ok(()),
        }
    }
}

pub struct SiphonReceiver<T> {
    rx: mpsc::Receiver<Envelope<T>>,
}

impl<T> SiphonReceiver<T> {
    /// Take the next published item, acking the sender's `send` as soon as
    /// it is dequeued (not after the caller finishes processing it — the
    /// rendezvous is about delivery, not completion).
    pub async fn recv(&mut self, ctx: &Context) -> Option<T> {
        tokio::select! {
            biased;
            _ = ctx.cancelled() => None,
            envelope = self.rx.recv() => {
                let envelope = envelope?;
                let _ = envelope.ack.send(());
                Some(envelope.item)
            }
        }
    }
}

/// Construct a siphon. There is exactly one receiver (the orchestrator);
/// the sender half is `Clone` so every configuration source can hold one.
pub fn channel<T>() -> (SiphonSender<T>, SiphonReceiver<T>) {
    let (tx, rx) = mpsc::channel(1);
    (SiphonSender { tx }, SiphonReceiver { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// P7: a publish attempt with no reader does not return until a
    /// consumer reads it.
    #[tokio::test]
    async fn send_blocks_until_consumer_reads() {
        let (tx, mut rx) = channel::<u32>();
        let ctx = Context::new();
        let delivered = Arc::new(AtomicBool::new(false));

        let sender_delivered = delivered.clone();
        let sender_ctx = ctx.clone();
        let send_task = tokio::spawn(async move {
            tx.send(42, &sender_ctx).await.unwrap();
            sender_delivered.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!delivered.load(Ordering::SeqCst), "send must still be blocked");

        let item = rx.recv(&ctx).await.unwrap();
        assert_eq!(item, 42);

        tokio::time::timeout(Duration::from_secs(1), send_task)
            .await
            .expect("send must unblock once consumed")
            .unwrap();
        assert!(delivered.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn send_is_cancelled_by_context() {
        let (tx, _rx) = channel::<u32>();
        let ctx = Context::new();
        let send_ctx = ctx.clone();
        let send_task = tokio::spawn(async move { tx.send(1, &send_ctx).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        ctx.cancel();
        let result = tokio::time::timeout(Duration::from_secs(1), send_task)
            .await
            .expect("cancel must unblock the sender")
            .unwrap();
        assert_eq!(result, Err(SendCancelled));
    }

    #[tokio::test]
    async fn second_publish_waits_for_first_to_be_consumed() {
        let (tx, mut rx) = channel::<u32>();
        let ctx = Context::new();

        let tx2 = tx.clone();
        let ctx2 = ctx.clone();
        let first = tokio::spawn(async move { tx.send(1, &ctx).await });
        // Give the first publish a chance to occupy the slot.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let ctx3 = ctx2.clone();
        let second = tokio::spawn(async move { tx2.send(2, &ctx3).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let first_item = rx.recv(&ctx2).await.unwrap();
        assert_eq!(first_item, 1);
        first.await.unwrap().unwrap();

        let second_item = rx.recv(&ctx2).await.unwrap();
        assert_eq!(second_item, 2);
        second.await.unwrap().unwrap();
    }
}
