// SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
// SPDX-License-Identifier: Apache-2.0

//! A small, table-driven state-machine kernel.
//!
//! Both the lifecycle supervisor (`ctlplane-core::lifecycle`) and the
//! transaction state machine (`ctlplane-core::transaction`) are instances of
//! this same kernel rather than hand-rolled `match` ladders: each owns a
//! [`TransitionTable`] mapping `(current state, event)` to the next state,
//! and calls [`TransitionTable::apply`] to move forward. An event not
//! listed for the current state is rejected and the state is left
//! unchanged, matching the "illegal transition -> error, state unchanged"
//! rule every state machine in the control plane follows.

use crate::error::IllegalTransition;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

/// A transition table: `(from, event) -> to`.
#[derive(Debug, Clone)]
pub struct TransitionTable<S, E> {
    rules: HashMap<(S, E), S>,
}

impl<S, E> TransitionTable<S, E>
where
    S: Copy + Eq + Hash + Debug,
    E: Copy + Eq + Hash + Debug,
{
    pub fn new(rules: impl IntoIterator<Item = (S, E, S)>) -> Self {
        Self {
            rules: rules.into_iter().map(|(f, e, t)| ((f, e), t)).collect(),
        }
    }

    /// Look up the transition for `(current, event)` without applying it.
    pub fn peek(&self, current: S, event: E) -> Option<S> {
        self.rules.get(&(current, event)).copied()
    }

    /// Apply `event` to `current`, returning the resulting state or the
    /// illegal-transition error. Callers are responsible for persisting the
    /// returned state; this kernel is itself stateless.
    pub fn apply(&self, current: S, event: E) -> Result<S, IllegalTransition<S, E>> {
        self.peek(current, event)
            .ok_or(IllegalTransition { from: current, event })
    }
}
