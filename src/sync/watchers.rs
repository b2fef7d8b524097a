// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Watchers turning cluster events into queued dashboard keys.

use futures::StreamExt;
use k8s_openapi::api::core::v1::{Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::{Api, Client, Resource, ResourceExt};
use kube_runtime::reflector::Store;
use kube_runtime::watcher::Config as WatcherConfig;
use kube_runtime::{reflector, watcher, WatchStreamExt};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::discovery::{selector, ResourceKind};
use crate::sync::queue::WorkQueueHandle;
use crate::types::{Dashboard, DashboardKey, Gateway, HTTPRoute};

/// Dashboards whose discovery for `kind` would select an object with `labels`
pub fn affected_by_resource(
    dashboards: &[Arc<Dashboard>],
    kind: ResourceKind,
    labels: &BTreeMap<String, String>,
) -> Vec<DashboardKey> {
    dashboards
        .iter()
        .filter(|d| match d.selector_for(kind) {
            Some(s) => selector::matches(s, labels),
            None => kind.included_without_selector(),
        })
        .map(|d| d.key())
        .collect()
}

/// Gateway changes only matter to dashboards filtering routes by gateway
pub fn affected_by_gateway(dashboards: &[Arc<Dashboard>]) -> Vec<DashboardKey> {
    dashboards
        .iter()
        .filter(|d| d.spec.gateway_selector.is_some())
        .map(|d| d.key())
        .collect()
}

pub fn affected_by_secret(dashboards: &[Arc<Dashboard>], namespace: &str, name: &str) -> Vec<DashboardKey> {
    dashboards
        .iter()
        .filter(|d| {
            d.referenced_secrets()
                .iter()
                .any(|(ns, n)| ns == namespace && n == name)
        })
        .map(|d| d.key())
        .collect()
}

/// Watch the dashboards themselves, feeding the shared reflector store
async fn watch_dashboards(
    api: Api<Dashboard>,
    writer: reflector::store::Writer<Dashboard>,
    handle: WorkQueueHandle,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let stream = reflector(writer, watcher(api, WatcherConfig::default()))
        .default_backoff()
        .touched_objects();
    tokio::pin!(stream);

    info!("Watching dashboards");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = stream.next() => match event {
                Some(Ok(dashboard)) => {
                    debug!("Dashboard {} changed", dashboard.key());
                    handle.enqueue(dashboard.key());
                }
                Some(Err(e)) => warn!("Dashboard watch error: {}", e),
                None => break,
            }
        }
    }
    Ok(())
}

/// Watch `api` and enqueue whatever dashboards `affected` maps each change to
async fn watch_and_enqueue<K, F>(
    api: Api<K>,
    dashboards: Store<Dashboard>,
    handle: WorkQueueHandle,
    cancel: CancellationToken,
    affected: F,
) -> anyhow::Result<()>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Default,
    F: Fn(&[Arc<Dashboard>], &K) -> Vec<DashboardKey>,
{
    let kind = K::kind(&Default::default()).to_string();
    let stream = watcher(api, WatcherConfig::default())
        .default_backoff()
        .touched_objects();
    tokio::pin!(stream);

    info!("Watching {} objects", kind);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = stream.next() => match event {
                Some(Ok(object)) => {
                    let keys = affected(&dashboards.state(), &object);
                    if !keys.is_empty() {
                        debug!(
                            "{} {} changed, enqueuing {} dashboards",
                            kind,
                            object.name_any(),
                            keys.len()
                        );
                    }
                    handle.enqueue_all(keys);
                }
                Some(Err(e)) => warn!("{} watch error: {}", kind, e),
                None => break,
            }
        }
    }
    Ok(())
}

/// Enqueue every known dashboard once per `interval`
async fn resync(
    dashboards: Store<Dashboard>,
    handle: WorkQueueHandle,
    interval: Duration,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(interval);
    // the initial list already enqueues everything
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let keys: Vec<DashboardKey> = dashboards.state().iter().map(|d| d.key()).collect();
                debug!("Resyncing {} dashboards", keys.len());
                handle.enqueue_all(keys);
            }
        }
    }
    Ok(())
}

/// Run every watcher and the resync timer until cancelled
pub async fn run_watchers(
    client: Client,
    config: &Config,
    handle: WorkQueueHandle,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let dashboard_api: Api<Dashboard> = match &config.watch_namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };
    let (store, writer) = reflector::store();

    tokio::try_join!(
        watch_dashboards(dashboard_api, writer, handle.clone(), cancel.clone()),
        watch_and_enqueue(
            Api::<Ingress>::all(client.clone()),
            store.clone(),
            handle.clone(),
            cancel.clone(),
            |d, o: &Ingress| affected_by_resource(d, ResourceKind::Ingress, o.labels()),
        ),
        watch_and_enqueue(
            Api::<HTTPRoute>::all(client.clone()),
            store.clone(),
            handle.clone(),
            cancel.clone(),
            |d, o: &HTTPRoute| affected_by_resource(d, ResourceKind::HttpRoute, o.labels()),
        ),
        watch_and_enqueue(
            Api::<Service>::all(client.clone()),
            store.clone(),
            handle.clone(),
            cancel.clone(),
            |d, o: &Service| affected_by_resource(d, ResourceKind::Service, o.labels()),
        ),
        watch_and_enqueue(
            Api::<Gateway>::all(client.clone()),
            store.clone(),
            handle.clone(),
            cancel.clone(),
            |d, _: &Gateway| affected_by_gateway(d),
        ),
        watch_and_enqueue(
            Api::<Secret>::all(client),
            store.clone(),
            handle.clone(),
            cancel.clone(),
            |d, o: &Secret| affected_by_secret(d, &o.namespace().unwrap_or_default(), &o.name_any()),
        ),
        resync(store, handle, config.resync_interval, cancel),
    )?;

    info!("Watchers stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::dashboard::{ClusterSecretReference, ItemSecrets, RemoteCluster, SecretReference};
    use crate::types::DashboardSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
    use kube::api::ObjectMeta;

    fn dashboard(name: &str, spec: DashboardSpec) -> Arc<Dashboard> {
        Arc::new(Dashboard {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("dashboards".to_string()),
                ..Default::default()
            },
            spec,
            status: None,
        })
    }

    fn selector(key: &str, value: &str) -> LabelSelector {
        LabelSelector {
            match_labels: Some(BTreeMap::from([(key.to_string(), value.to_string())])),
            ..Default::default()
        }
    }

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn names(keys: Vec<DashboardKey>) -> Vec<String> {
        keys.into_iter().map(|k| k.name).collect()
    }

    #[test]
    fn test_ingress_without_selector_affects_all() {
        let dashboards = vec![
            dashboard("open", DashboardSpec::default()),
            dashboard(
                "public",
                DashboardSpec {
                    ingress_selector: Some(selector("expose", "public")),
                    ..Default::default()
                },
            ),
        ];

        let plain = affected_by_resource(&dashboards, ResourceKind::Ingress, &labels(&[]));
        assert_eq!(names(plain), vec!["open"]);

        let public = affected_by_resource(&dashboards, ResourceKind::Ingress, &labels(&[("expose", "public")]));
        assert_eq!(names(public), vec!["open", "public"]);
    }

    #[test]
    fn test_service_requires_matching_selector() {
        let dashboards = vec![
            dashboard("open", DashboardSpec::default()),
            dashboard(
                "services",
                DashboardSpec {
                    service_selector: Some(selector("dashboard", "yes")),
                    ..Default::default()
                },
            ),
        ];

        let affected = affected_by_resource(&dashboards, ResourceKind::Service, &labels(&[("dashboard", "yes")]));
        assert_eq!(names(affected), vec!["services"]);
        assert!(affected_by_resource(&dashboards, ResourceKind::Service, &labels(&[])).is_empty());
    }

    #[test]
    fn test_gateway_affects_gateway_filtered_dashboards() {
        let dashboards = vec![
            dashboard("open", DashboardSpec::default()),
            dashboard(
                "gated",
                DashboardSpec {
                    gateway_selector: Some(selector("gateway", "public")),
                    ..Default::default()
                },
            ),
        ];

        assert_eq!(names(affected_by_gateway(&dashboards)), vec!["gated"]);
    }

    #[test]
    fn test_secret_affects_referencing_dashboards() {
        let dashboards = vec![
            dashboard(
                "remote",
                DashboardSpec {
                    remote_clusters: vec![RemoteCluster {
                        name: "edge".to_string(),
                        enabled: true,
                        secret_ref: ClusterSecretReference {
                            name: "edge-kubeconfig".to_string(),
                            key: None,
                            namespace: Some("infra".to_string()),
                        },
                        context: None,
                        ingress_selector: None,
                        http_route_selector: None,
                        service_selector: None,
                        gateway_selector: None,
                        domain_filters: vec![],
                        namespaces: vec![],
                        cluster_labels: BTreeMap::new(),
                    }],
                    ..Default::default()
                },
            ),
            dashboard(
                "smart",
                DashboardSpec {
                    secrets: vec![ItemSecrets {
                        item: "Pi-hole".to_string(),
                        api_key: Some(SecretReference {
                            name: "pihole".to_string(),
                            key: "token".to_string(),
                            namespace: None,
                        }),
                        ..Default::default()
                    }],
                    ..Default::default()
                },
            ),
        ];

        assert_eq!(names(affected_by_secret(&dashboards, "infra", "edge-kubeconfig")), vec!["remote"]);
        assert_eq!(names(affected_by_secret(&dashboards, "dashboards", "pihole")), vec!["smart"]);
        assert!(affected_by_secret(&dashboards, "dashboards", "edge-kubeconfig").is_empty());
    }
}
