// SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
// SPDX-License-Identifier: Apache-2.0

//! Shared error plumbing used across the control plane crates.

use thiserror::Error;

/// An attempted state transition that the transition table does not permit.
///
/// Carried by both the lifecycle supervisor and the transaction state
/// machine, since both are driven by [`crate::state_machine::TransitionTable`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("illegal transition: {event:?} is not valid from state {from:?}")]
pub struct IllegalTransition<S: std::fmt::Debug, E: std::fmt::Debug> {
    pub from: S,
    pub event: E,
}
