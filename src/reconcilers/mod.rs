// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Dashboard reconciliation and the write paths it relies on.

use std::time::Duration;

pub mod convergence;
pub mod dashboard;
pub mod retry;
pub mod status;

pub use dashboard::{reconcile, Context};
pub use retry::{read_modify_write, RetryPolicy, VersionedStore};

/// What the queue should do with a key after a successful reconcile
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Nothing to do until the next watch event
    AwaitChange,
    Requeue(Duration),
}
