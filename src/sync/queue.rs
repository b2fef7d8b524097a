// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Work queue serializing reconciles per dashboard.
//!
//! One dispatcher task owns all queue state. Watchers and timers push keys
//! through a [`WorkQueueHandle`]; up to `workers` reconciles run at once and
//! a key is never reconciled concurrently with itself. A key enqueued while
//! its reconcile is running is marked dirty and runs again afterwards.

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::reconcilers::{self, Context, ReconcileAction};
use crate::types::DashboardKey;

/// The unit of work the queue schedules
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    async fn reconcile(&self, key: &DashboardKey, cancel: &CancellationToken) -> Result<ReconcileAction>;
}

#[async_trait]
impl Reconciler for Context {
    async fn reconcile(&self, key: &DashboardKey, cancel: &CancellationToken) -> Result<ReconcileAction> {
        reconcilers::reconcile(key, self, cancel).await
    }
}

#[derive(Debug)]
enum QueueEvent {
    Enqueue(DashboardKey),
    Done {
        key: DashboardKey,
        result: Result<ReconcileAction>,
    },
}

/// Handle to push keys onto the queue
#[derive(Clone)]
pub struct WorkQueueHandle {
    event_tx: mpsc::UnboundedSender<QueueEvent>,
    cancel: CancellationToken,
}

impl WorkQueueHandle {
    pub fn enqueue(&self, key: DashboardKey) {
        if self.event_tx.send(QueueEvent::Enqueue(key)).is_err() {
            debug!("Work queue stopped, dropping key");
        }
    }

    pub fn enqueue_all(&self, keys: impl IntoIterator<Item = DashboardKey>) {
        for key in keys {
            self.enqueue(key);
        }
    }

    /// Enqueue after `delay`, unless the queue is shut down first
    pub fn enqueue_after(&self, key: DashboardKey, delay: Duration) {
        if delay.is_zero() {
            self.enqueue(key);
            return;
        }
        let handle = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = handle.cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => handle.enqueue(key),
            }
        });
    }
}

pub struct WorkQueue<R: Reconciler> {
    reconciler: Arc<R>,
    workers: usize,
    error_delay: Duration,
    event_rx: mpsc::UnboundedReceiver<QueueEvent>,
    handle: WorkQueueHandle,
    pending: VecDeque<DashboardKey>,
    queued: HashSet<DashboardKey>,
    active: HashSet<DashboardKey>,
    dirty: HashSet<DashboardKey>,
}

impl<R: Reconciler> WorkQueue<R> {
    pub fn new(
        reconciler: Arc<R>,
        workers: usize,
        error_delay: Duration,
        cancel: CancellationToken,
    ) -> (Self, WorkQueueHandle) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let handle = WorkQueueHandle { event_tx, cancel };

        let queue = Self {
            reconciler,
            workers: workers.max(1),
            error_delay,
            event_rx,
            handle: handle.clone(),
            pending: VecDeque::new(),
            queued: HashSet::new(),
            active: HashSet::new(),
            dirty: HashSet::new(),
        };
        (queue, handle)
    }

    /// Dispatch until cancelled, then wait for running reconciles to stop
    pub async fn run(mut self) -> anyhow::Result<()> {
        info!("Work queue started with {} workers", self.workers);
        let cancel = self.handle.cancel.clone();
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(event) = self.event_rx.recv() => self.handle_event(event),
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!("Reconcile task panicked: {}", e);
                    }
                }
            }
            self.dispatch(&mut tasks);
        }

        info!("Work queue stopping, waiting for {} reconciles", tasks.len());
        while tasks.join_next().await.is_some() {}
        Ok(())
    }

    fn handle_event(&mut self, event: QueueEvent) {
        match event {
            QueueEvent::Enqueue(key) => self.push(key),
            QueueEvent::Done { key, result } => {
                self.active.remove(&key);
                if self.dirty.remove(&key) {
                    self.push(key.clone());
                }
                self.schedule(key, result);
            }
        }
    }

    fn push(&mut self, key: DashboardKey) {
        if self.active.contains(&key) {
            self.dirty.insert(key);
        } else if self.queued.insert(key.clone()) {
            self.pending.push_back(key);
        }
    }

    fn schedule(&mut self, key: DashboardKey, result: Result<ReconcileAction>) {
        match result {
            Ok(ReconcileAction::AwaitChange) => debug!("Reconciled {}", key),
            Ok(ReconcileAction::Requeue(delay)) if delay.is_zero() => self.push(key),
            Ok(ReconcileAction::Requeue(delay)) => self.handle.enqueue_after(key, delay),
            Err(Error::Cancelled) => debug!("Reconcile of {} cancelled", key),
            Err(e) if e.is_retryable() => {
                warn!(
                    "Reconcile of {} failed, retrying in {:?}: {}",
                    key, self.error_delay, e
                );
                self.handle.enqueue_after(key, self.error_delay);
            }
            Err(e) => {
                // terminal until the dashboard or its dependencies change
                error!(
                    "Reconcile of {} failed, rechecking in {:?}: {}",
                    key, self.error_delay, e
                );
                self.handle.enqueue_after(key, self.error_delay);
            }
        }
    }

    fn dispatch(&mut self, tasks: &mut JoinSet<()>) {
        while self.active.len() < self.workers {
            let Some(key) = self.pending.pop_front() else {
                break;
            };
            self.queued.remove(&key);
            self.active.insert(key.clone());

            let reconciler = self.reconciler.clone();
            let event_tx = self.handle.event_tx.clone();
            let cancel = self.handle.cancel.clone();
            tasks.spawn(async move {
                let result = reconciler.reconcile(&key, &cancel).await;
                let _ = event_tx.send(QueueEvent::Done { key, result });
            });
        }
    }
}
