// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Optimistic-concurrency writes with bounded exponential backoff.
//!
//! Every write to an existing object goes through [`read_modify_write`]: the
//! latest version is fetched before each attempt, only controller-owned
//! fields are changed by the mutator, and a version conflict triggers another
//! attempt after a jittered delay.

use async_trait::async_trait;
use kube::api::PostParams;
use kube::{Api, Resource};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub factor: f64,
    /// Proportional jitter, e.g. 0.1 for +/-10%
    pub jitter: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            factor: 2.0,
            jitter: 0.1,
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the given (1-based) attempt, without jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay = self.initial_delay.as_secs_f64() * self.factor.powi(exponent);
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }

    /// Base delay with jitter applied, still capped at `max_delay`
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt).as_secs_f64();
        let spread = if self.jitter > 0.0 {
            rand::thread_rng().gen_range(-self.jitter..=self.jitter)
        } else {
            0.0
        };
        let jittered = (base * (1.0 + spread)).max(0.0);
        Duration::from_secs_f64(jittered.min(self.max_delay.as_secs_f64()))
    }
}

/// Storage with optimistic concurrency on writes
#[async_trait]
pub trait VersionedStore<K>: Send + Sync {
    async fn fetch(&self, name: &str) -> Result<Option<K>>;
    async fn create(&self, object: &K) -> Result<K>;
    /// Fails with a 409 when the object's version is stale
    async fn replace(&self, name: &str, object: &K) -> Result<K>;
}

#[async_trait]
impl<K> VersionedStore<K> for Api<K>
where
    K: Resource + Clone + DeserializeOwned + Serialize + Debug + Send + Sync + 'static,
{
    async fn fetch(&self, name: &str) -> Result<Option<K>> {
        Ok(self.get_opt(name).await?)
    }

    async fn create(&self, object: &K) -> Result<K> {
        Ok(Api::create(self, &PostParams::default(), object).await?)
    }

    async fn replace(&self, name: &str, object: &K) -> Result<K> {
        Ok(Api::replace(self, name, &PostParams::default(), object).await?)
    }
}

/// HTTP status of a failed API call, if that is what the error is
pub fn api_status(error: &Error) -> Option<u16> {
    match error {
        Error::KubeError(kube::Error::Api(response)) => Some(response.code),
        _ => None,
    }
}

pub fn is_conflict(error: &Error) -> bool {
    api_status(error) == Some(409)
}

pub fn is_not_found(error: &Error) -> bool {
    matches!(error, Error::NotFound(_)) || api_status(error) == Some(404)
}

/// Sleep unless cancelled first
pub async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Fetch `name`, let `mutate` apply owned fields, and write it back.
///
/// `mutate` returns whether it changed anything; when it does not, the
/// fetched object is returned without a write. A missing object is not
/// retried. Exhausting the policy on conflicts yields [`Error::ConflictError`].
pub async fn read_modify_write<K, S, F>(
    store: &S,
    name: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut mutate: F,
) -> Result<K>
where
    S: VersionedStore<K> + ?Sized,
    F: FnMut(&mut K) -> bool,
{
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut current = store
            .fetch(name)
            .await?
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        if !mutate(&mut current) {
            debug!("{} already up to date", name);
            return Ok(current);
        }

        match store.replace(name, &current).await {
            Ok(updated) => return Ok(updated),
            Err(e) if is_not_found(&e) => return Err(Error::NotFound(name.to_string())),
            Err(e) if is_conflict(&e) => {
                if attempt == attempts {
                    break;
                }
                let delay = policy.delay(attempt);
                warn!(
                    object = %name,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Write conflict, retrying"
                );
                sleep_or_cancel(delay, cancel).await?;
            }
            Err(e) => return Err(e),
        }
    }

    Err(Error::ConflictError {
        name: name.to_string(),
        attempts,
    })
}
