// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Event-driven scheduling of dashboard reconciles.

pub mod queue;
pub mod watchers;

pub use queue::{Reconciler, WorkQueue, WorkQueueHandle};
pub use watchers::run_watchers;
