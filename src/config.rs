// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

use crate::constants::defaults;

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Interval at which every known dashboard is reconciled again
    pub resync_interval: Duration,
    /// Maximum number of dashboards reconciled concurrently
    pub workers: usize,
    /// DNS suffix used for service URLs
    pub cluster_domain: String,
    /// Restricts the dashboard watcher to a single namespace
    pub watch_namespace: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resync_interval: Duration::from_secs(defaults::RESYNC_INTERVAL_SECS),
            workers: defaults::WORKERS,
            cluster_domain: defaults::CLUSTER_DOMAIN.to_string(),
            watch_namespace: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Config::default();

        if let Some(secs) = lookup("WAYPOINT_RESYNC_INTERVAL_SECS") {
            let secs: u64 = secs
                .parse()
                .context("WAYPOINT_RESYNC_INTERVAL_SECS must be a number of seconds")?;
            config.resync_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(workers) = lookup("WAYPOINT_WORKERS") {
            let workers: usize = workers
                .parse()
                .context("WAYPOINT_WORKERS must be a positive integer")?;
            config.workers = workers.max(1);
        }
        if let Some(domain) = lookup("WAYPOINT_CLUSTER_DOMAIN").filter(|d| !d.is_empty()) {
            config.cluster_domain = domain;
        }
        config.watch_namespace = lookup("WAYPOINT_WATCH_NAMESPACE").filter(|n| !n.is_empty());

        Ok(config)
    }
}
