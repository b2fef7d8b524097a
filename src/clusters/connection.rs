// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Per-cluster connection state held by the registry.

use chrono::{DateTime, Utc};
use kube::Client;

use crate::constants::LOCAL_CLUSTER;
use crate::types::dashboard::{ClusterConnectionStatus, RemoteCluster};

#[derive(Clone)]
pub struct ClusterConnection {
    pub name: String,
    /// Absent only when the client could not be built
    pub client: Option<Client>,
    /// SHA-256 of the credential secret content and selected context
    pub fingerprint: Option<String>,
    pub connected: bool,
    pub last_error: Option<String>,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_connected: Option<DateTime<Utc>>,
    /// Declared cluster settings; `None` for the local cluster
    pub overrides: Option<RemoteCluster>,
}

impl ClusterConnection {
    pub fn local(client: Client) -> Self {
        let now = Utc::now();
        Self {
            name: LOCAL_CLUSTER.to_string(),
            client: Some(client),
            fingerprint: None,
            connected: true,
            last_error: None,
            last_checked: Some(now),
            last_connected: Some(now),
            overrides: None,
        }
    }

    /// A remote entry with no usable client yet
    pub fn pending(cluster: &RemoteCluster, fingerprint: Option<String>) -> Self {
        Self {
            name: cluster.name.clone(),
            client: None,
            fingerprint,
            connected: false,
            last_error: None,
            last_checked: None,
            last_connected: None,
            overrides: Some(cluster.clone()),
        }
    }

    pub fn is_local(&self) -> bool {
        self.overrides.is_none()
    }

    pub fn mark_connected(&mut self) {
        let now = Utc::now();
        self.connected = true;
        self.last_error = None;
        self.last_checked = Some(now);
        self.last_connected = Some(now);
    }

    /// Record a failure; any existing client is kept for a later reachability check
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.connected = false;
        self.last_error = Some(error.into());
        self.last_checked = Some(Utc::now());
    }

    pub fn status(&self) -> ClusterConnectionStatus {
        ClusterConnectionStatus {
            name: self.name.clone(),
            connected: self.connected,
            last_error: self.last_error.clone(),
            last_connection_time: self.last_connected,
        }
    }
}

/// What discovery needs from a live connection
#[derive(Clone)]
pub struct ClusterHandle {
    pub name: String,
    pub client: Client,
    pub overrides: Option<RemoteCluster>,
}

impl ClusterHandle {
    pub fn is_local(&self) -> bool {
        self.overrides.is_none()
    }
}
