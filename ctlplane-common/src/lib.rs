// SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
// SPDX-License-Identifier: Apache-2.0

//! Shared, domain-agnostic plumbing for the configuration control plane:
//! the cancellation context every `Run(ctx)` takes, the table-driven
//! state-machine kernel shared by the lifecycle supervisor and the
//! transaction state machine, and process-wide logging setup.

pub mod context;
pub mod error;
pub mod logging;
pub mod state_machine;

pub use context::Context;
pub use error::IllegalTransition;
pub use state_machine::TransitionTable;
