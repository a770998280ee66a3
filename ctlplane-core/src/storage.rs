// SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
// SPDX-License-Identifier: Apache-2.0

//! In-memory transaction history: a current-transaction pointer plus an
//! ordered, capacity-bounded ring of every transaction ever registered
//! (spec §3). Many readers (list/get), one writer (the orchestrator,
//! setting current and pruning) — a `RwLock` is all that calls for.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use thiserror::Error;

use crate::transaction::{Source, Transaction, TransactionId, TxState};

pub const DEFAULT_CAPACITY: usize = 1000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("transaction {0} is not in a terminal success state, cannot become current")]
    NotSuccessful(TransactionId),
    #[error("transaction {0} not found")]
    NotFound(TransactionId),
}

/// Filter applied by `list`. `None` in either field means "no filter on
/// this axis", matching the RPC surface's optional `stateFilter`/
/// `sourceFilter` (spec §4.3).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub state: Option<TxState>,
    pub source: Option<Source>,
}

impl ListFilter {
    fn matches(&self, tx: &Transaction) -> bool {
        self.state.map(|s| s == tx.state()).unwrap_or(true)
            && self.source.map(|s| s == tx.source()).unwrap_or(true)
    }
}

struct Inner {
    current: Option<TransactionId>,
    // Insertion order, oldest first.
    history: VecDeque<Arc<Transaction>>,
}

pub struct TransactionStorage {
    capacity: usize,
    inner: RwLock<Inner>,
}

impl Default for TransactionStorage {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl TransactionStorage {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: RwLock::new(Inner {
                current: None,
                history: VecDeque::new(),
            }),
        }
    }

    /// Register a newly created transaction. Evicts the oldest non-current
    /// entry if the history is at capacity.
    pub fn register(&self, tx: Arc<Transaction>) {
        let mut inner = self.inner.write().unwrap();
        if inner.history.len() >= self.capacity {
            let evict_at = inner
                .history
                .iter()
                .position(|t| Some(t.id()) != inner.current)
                .unwrap_or(inner.history.len());
            if evict_at < inner.history.len() {
                inner.history.remove(evict_at);
            }
        }
        inner.history.push_back(tx);
    }

    /// Point `current` at `id`. Only legal once that transaction has
    /// reached `Completed` — the one terminal state that represents a
    /// fully-applied configuration.
    pub fn set_current(&self, id: TransactionId) -> Result<(), StorageError> {
        let mut inner = self.inner.write().unwrap();
        let tx = inner
            .history
            .iter()
            .find(|t| t.id() == id)
            .cloned()
            .ok_or(StorageError::NotFound(id))?;
        if tx.state() != TxState::Completed {
            return Err(StorageError::NotSuccessful(id));
        }
        inner.current = Some(id);
        Ok(())
    }

    pub fn current(&self) -> Option<Arc<Transaction>> {
        let inner = self.inner.read().unwrap();
        let id = inner.current?;
        inner.history.iter().find(|t| t.id() == id).cloned()
    }

    pub fn get(&self, id: TransactionId) -> Option<Arc<Transaction>> {
        let inner = self.inner.read().unwrap();
        inner.history.iter().find(|t| t.id() == id).cloned()
    }

    /// Filter + paginate. Insertion order is used (spec §9 Open Question
    /// (a) resolved: insertion order, documented in DESIGN.md). Returns the
    /// matching page and the total number of matches across the whole
    /// history (for callers computing whether a next page exists).
    pub fn list(
        &self,
        filter: ListFilter,
        offset: usize,
        page_size: usize,
    ) -> (Vec<Arc<Transaction>>, usize) {
        let inner = self.inner.read().unwrap();
        let matching: Vec<Arc<Transaction>> = inner
            .history
            .iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        let total = matching.len();
        let page = matching.into_iter().skip(offset).take(page_size).collect();
        (page, total)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Prune history down to the `keep_last` most recently-registered
    /// transactions, always preserving the current pointer even if it
    /// falls outside that window. Returns the number of transactions
    /// evicted.
    pub fn clear(&self, keep_last: usize) -> usize {
        let mut inner = self.inner.write().unwrap();
        let total = inner.history.len();
        if total <= keep_last {
            return 0;
        }
        let cutoff = total - keep_last;
        let current = inner.current;
        let mut cleared = 0usize;
        let mut kept = VecDeque::with_capacity(total - cutoff + 1);
        for (idx, tx) in inner.history.drain(..).enumerate() {
            let within_window = idx >= cutoff;
            let is_current = Some(tx.id()) == current;
            if within_window || is_current {
                kept.push_back(tx);
            } else {
                cleared += 1;
            }
        }
        inner.history = kept;
        cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn completed_tx() -> Arc<Transaction> {
        let t = Transaction::new(Source::Test, "t", Config::new("v1", vec![]));
        t.begin_validation().unwrap();
        t.complete_validation(true, None).unwrap();
        t.begin_execution().unwrap();
        t.mark_succeeded().unwrap();
        t.mark_completed().unwrap();
        Arc::new(t)
    }

    #[test]
    fn set_current_requires_completed_state() {
        let storage = TransactionStorage::default();
        let t = Transaction::new(Source::Test, "t", Config::new("v1", vec![]));
        let t = Arc::new(t);
        storage.register(t.clone());
        assert_eq!(
            storage.set_current(t.id()),
            Err(StorageError::NotSuccessful(t.id()))
        );
    }

    #[test]
    fn current_pointer_survives_capacity_eviction() {
        let storage = TransactionStorage::new(3);
        let first = completed_tx();
        storage.register(first.clone());
        storage.set_current(first.id()).unwrap();
        for _ in 0..5 {
            storage.register(completed_tx());
        }
        assert_eq!(storage.len(), 3);
        assert_eq!(storage.current().unwrap().id(), first.id());
    }

    #[test]
    fn list_paginates_in_insertion_order() {
        let storage = TransactionStorage::default();
        let ids: Vec<_> = (0..25)
            .map(|_| {
                let tx = completed_tx();
                storage.register(tx.clone());
                tx.id()
            })
            .collect();

        let (page1, total) = storage.list(ListFilter::default(), 0, 10);
        assert_eq!(total, 25);
        assert_eq!(page1.len(), 10);
        assert_eq!(page1.iter().map(|t| t.id()).collect::<Vec<_>>(), ids[0..10]);

        let (page2, _) = storage.list(ListFilter::default(), 10, 10);
        assert_eq!(page2.iter().map(|t| t.id()).collect::<Vec<_>>(), ids[10..20]);

        let (page3, _) = storage.list(ListFilter::default(), 20, 10);
        assert_eq!(page3.len(), 5);
    }

    #[test]
    fn clear_never_evicts_current() {
        let storage = TransactionStorage::default();
        let first = completed_tx();
        storage.register(first.clone());
        storage.set_current(first.id()).unwrap();
        for _ in 0..10 {
            storage.register(completed_tx());
        }
        let cleared = storage.clear(2);
        assert_eq!(storage.current().unwrap().id(), first.id());
        assert!(storage.get(first.id()).is_some());
        assert_eq!(cleared + storage.len(), 11);
    }
}
