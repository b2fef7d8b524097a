// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Registry of cluster connections shared by all reconciles.
//!
//! Remote connections are owned by the dashboard declaring them, so two
//! dashboards listing different clusters never evict each other. The local
//! connection is shared and can never be removed.

use kube::Client;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::clusters::connection::{ClusterConnection, ClusterHandle};
use crate::constants::LOCAL_CLUSTER;
use crate::kubernetes::client::{fingerprint, ConnectionFactory};
use crate::types::dashboard::{ClusterConnectionStatus, RemoteCluster};
use crate::types::DashboardKey;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum ConnectionKey {
    Local,
    Remote { owner: DashboardKey, cluster: String },
}

impl ConnectionKey {
    fn remote(owner: &DashboardKey, cluster: &str) -> Self {
        ConnectionKey::Remote {
            owner: owner.clone(),
            cluster: cluster.to_string(),
        }
    }

    fn owned_by(&self, owner: &DashboardKey) -> bool {
        matches!(self, ConnectionKey::Remote { owner: o, .. } if o == owner)
    }
}

pub struct ClusterRegistry {
    connections: RwLock<BTreeMap<ConnectionKey, ClusterConnection>>,
    factory: Arc<dyn ConnectionFactory>,
}

impl ClusterRegistry {
    pub fn new(local: Client, factory: Arc<dyn ConnectionFactory>) -> Self {
        let connections = BTreeMap::from([(ConnectionKey::Local, ClusterConnection::local(local))]);
        Self {
            connections: RwLock::new(connections),
            factory,
        }
    }

    /// Converge the owner's connections to the declared remote clusters.
    ///
    /// Network work happens outside the lock; reconciles of one owner are
    /// serialized by the work queue, so its entries cannot change underneath.
    #[instrument(skip(self, clusters), fields(dashboard = %owner))]
    pub async fn reconcile_connections(
        &self,
        owner: &DashboardKey,
        clusters: &[RemoteCluster],
        default_namespace: &str,
    ) {
        let existing: BTreeMap<String, ClusterConnection> = {
            let connections = self.connections.read().await;
            connections
                .iter()
                .filter(|(k, _)| k.owned_by(owner))
                .map(|(_, c)| (c.name.clone(), c.clone()))
                .collect()
        };

        let mut refreshed = BTreeMap::new();
        for cluster in clusters.iter().filter(|c| c.enabled) {
            let connection = if cluster.name == LOCAL_CLUSTER {
                let mut failed = ClusterConnection::pending(cluster, None);
                failed.mark_failed(format!("cluster name '{}' is reserved", LOCAL_CLUSTER));
                failed
            } else {
                self.refresh(cluster, existing.get(&cluster.name), default_namespace)
                    .await
            };
            refreshed.insert(cluster.name.clone(), connection);
        }

        let mut connections = self.connections.write().await;
        connections.retain(|key, conn| !key.owned_by(owner) || refreshed.contains_key(&conn.name));
        for (name, connection) in refreshed {
            connections.insert(ConnectionKey::remote(owner, &name), connection);
        }
    }

    async fn refresh(
        &self,
        cluster: &RemoteCluster,
        previous: Option<&ClusterConnection>,
        default_namespace: &str,
    ) -> ClusterConnection {
        let credentials = match self.factory.credentials(cluster, default_namespace).await {
            Ok(credentials) => credentials,
            Err(e) => {
                warn!("Failed to read credentials for cluster '{}': {}", cluster.name, e);
                let mut failed = previous
                    .cloned()
                    .unwrap_or_else(|| ClusterConnection::pending(cluster, None));
                failed.overrides = Some(cluster.clone());
                failed.mark_failed(e.to_string());
                return failed;
            }
        };
        let fingerprint = fingerprint(&credentials, cluster.context.as_deref());

        let unchanged = previous.filter(|p| p.fingerprint.as_deref() == Some(fingerprint.as_str()));
        if let Some(previous) = unchanged {
            if let Some(client) = previous.client.clone() {
                let mut connection = previous.clone();
                connection.overrides = Some(cluster.clone());
                if !connection.connected {
                    debug!("Rechecking disconnected cluster '{}'", cluster.name);
                    self.check(cluster, &mut connection, &client).await;
                }
                return connection;
            }
        }

        if previous.is_some() {
            info!("Credentials or context for cluster '{}' changed, rebuilding client", cluster.name);
        }

        let mut connection = ClusterConnection::pending(cluster, Some(fingerprint));
        match self.factory.build(cluster, &credentials).await {
            Ok(client) => {
                connection.client = Some(client.clone());
                self.check(cluster, &mut connection, &client).await;
            }
            Err(e) => {
                warn!("Failed to build client for cluster '{}': {}", cluster.name, e);
                connection.mark_failed(e.to_string());
            }
        }
        connection
    }

    async fn check(&self, cluster: &RemoteCluster, connection: &mut ClusterConnection, client: &Client) {
        match self.factory.check_reachable(cluster, client).await {
            Ok(()) => {
                info!("Cluster '{}' is reachable", connection.name);
                connection.mark_connected();
            }
            Err(e) => {
                warn!("Cluster '{}' is unreachable: {}", connection.name, e);
                connection.mark_failed(e.to_string());
            }
        }
    }

    /// Status of every remote connection owned by a dashboard
    pub async fn statuses(&self, owner: &DashboardKey) -> Vec<ClusterConnectionStatus> {
        self.connections
            .read()
            .await
            .iter()
            .filter(|(k, _)| k.owned_by(owner))
            .map(|(_, c)| c.status())
            .collect()
    }

    /// Connections discovery may use: local plus the owner's connected remotes
    pub async fn snapshot(&self, owner: &DashboardKey) -> Vec<ClusterHandle> {
        self.connections
            .read()
            .await
            .iter()
            .filter(|(k, c)| **k == ConnectionKey::Local || (k.owned_by(owner) && c.connected))
            .filter_map(|(_, c)| {
                c.client.clone().map(|client| ClusterHandle {
                    name: c.name.clone(),
                    client,
                    overrides: c.overrides.clone(),
                })
            })
            .collect()
    }

    /// Record a discovery failure; the stale client is kept for the next reachability check
    pub async fn mark_disconnected(&self, owner: &DashboardKey, cluster: &str, error: &str) {
        let key = if cluster == LOCAL_CLUSTER {
            ConnectionKey::Local
        } else {
            ConnectionKey::remote(owner, cluster)
        };
        if let Some(connection) = self.connections.write().await.get_mut(&key) {
            connection.mark_failed(error);
        }
    }

    /// Drop every connection owned by a dashboard
    pub async fn forget(&self, owner: &DashboardKey) {
        self.connections
            .write()
            .await
            .retain(|key, _| !key.owned_by(owner));
    }

    /// Names of every cluster the owner currently has an entry for, local included
    pub async fn cluster_names(&self, owner: &DashboardKey) -> BTreeSet<String> {
        self.connections
            .read()
            .await
            .iter()
            .filter(|(k, _)| **k == ConnectionKey::Local || k.owned_by(owner))
            .map(|(_, c)| c.name.clone())
            .collect()
    }
}
