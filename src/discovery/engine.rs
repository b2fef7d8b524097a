// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Per-cluster listing and filtering of dashboard sources.

use futures::future::join_all;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::NamespaceResourceScope;
use kube::{api::ListParams, Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Debug;
use tracing::{debug, info, instrument, warn};

use crate::clusters::{ClusterHandle, ClusterRegistry};
use crate::discovery::resource::{DiscoveredResource, ResourceKind, ResourceObject};
use crate::discovery::selector;
use crate::error::Result;
use crate::kubernetes::namespaces::namespace_annotations;
use crate::types::dashboard::DiscoveredCounts;
use crate::types::{Dashboard, DashboardKey, Gateway, HTTPRoute};

/// Resources found per cluster, plus the clusters that failed
#[derive(Clone, Debug, Default)]
pub struct Discovery {
    pub resources: BTreeMap<String, Vec<DiscoveredResource>>,
    pub failures: BTreeMap<String, String>,
}

impl Discovery {
    pub fn iter(&self) -> impl Iterator<Item = &DiscoveredResource> {
        self.resources.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.resources.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn counts(&self) -> DiscoveredCounts {
        let mut counts = DiscoveredCounts::default();
        for resource in self.iter() {
            match resource.kind() {
                ResourceKind::Ingress => counts.ingresses += 1,
                ResourceKind::HttpRoute => counts.http_routes += 1,
                ResourceKind::Service => counts.services += 1,
            }
        }
        counts
    }

    fn merge(&mut self, other: Discovery) {
        for (cluster, resources) in other.resources {
            self.resources.entry(cluster).or_default().extend(resources);
        }
        for (cluster, error) in other.failures {
            self.failures.entry(cluster).or_insert(error);
        }
    }
}

/// Filters in effect for one resource kind in one cluster
#[derive(Clone, Debug, Default)]
pub struct ClusterFilters<'a> {
    pub selector: Option<&'a LabelSelector>,
    pub gateway_selector: Option<&'a LabelSelector>,
    pub domain_filters: &'a [String],
    pub namespaces: &'a [String],
    pub cluster_labels: Option<&'a BTreeMap<String, String>>,
}

impl<'a> ClusterFilters<'a> {
    /// Remote clusters only use what they declare; dashboard-level settings
    /// apply to the local cluster alone.
    pub fn resolve(kind: ResourceKind, handle: &'a ClusterHandle, dashboard: &'a Dashboard) -> Self {
        match &handle.overrides {
            Some(cluster) => ClusterFilters {
                selector: cluster.selector_for(kind),
                gateway_selector: cluster.gateway_selector.as_ref(),
                domain_filters: &cluster.domain_filters,
                namespaces: &cluster.namespaces,
                cluster_labels: Some(&cluster.cluster_labels),
            },
            None => ClusterFilters {
                selector: dashboard.selector_for(kind),
                gateway_selector: dashboard.spec.gateway_selector.as_ref(),
                domain_filters: &dashboard.spec.domain_filters,
                namespaces: &[],
                cluster_labels: None,
            },
        }
    }

    fn selects(&self, kind: ResourceKind, labels: &BTreeMap<String, String>) -> bool {
        match self.selector {
            Some(selector) => selector::matches(selector, labels),
            None => kind.included_without_selector(),
        }
    }
}

/// Every selector a dashboard declares, for up-front validation
fn declared_selectors(dashboard: &Dashboard, kind: ResourceKind) -> Vec<&LabelSelector> {
    let mut selectors: Vec<&LabelSelector> = dashboard.selector_for(kind).into_iter().collect();
    selectors.extend(dashboard.spec.gateway_selector.as_ref());
    for cluster in dashboard.spec.remote_clusters.iter().filter(|c| c.enabled) {
        selectors.extend(cluster.selector_for(kind));
        selectors.extend(cluster.gateway_selector.as_ref());
    }
    selectors
}

pub struct DiscoveryEngine<'a> {
    registry: &'a ClusterRegistry,
}

impl<'a> DiscoveryEngine<'a> {
    pub fn new(registry: &'a ClusterRegistry) -> Self {
        Self { registry }
    }

    /// Discover every supported kind for a dashboard
    pub async fn discover_all(&self, owner: &DashboardKey, dashboard: &Dashboard) -> Result<Discovery> {
        let mut discovery = Discovery::default();
        for kind in ResourceKind::ALL {
            discovery.merge(self.discover(kind, owner, dashboard).await?);
        }
        Ok(discovery)
    }

    /// List and filter one kind across the local cluster and every connected
    /// remote cluster. A failing cluster is recorded and marked disconnected
    /// without affecting the others.
    #[instrument(skip(self, dashboard), fields(dashboard = %owner))]
    pub async fn discover(
        &self,
        kind: ResourceKind,
        owner: &DashboardKey,
        dashboard: &Dashboard,
    ) -> Result<Discovery> {
        for selector in declared_selectors(dashboard, kind) {
            selector::validate(selector)?;
        }

        let handles = self.registry.snapshot(owner).await;
        let results = join_all(handles.iter().map(|handle| {
            let filters = ClusterFilters::resolve(kind, handle, dashboard);
            async move { (handle, discover_in_cluster(kind, handle, filters).await) }
        }))
        .await;

        let mut discovery = Discovery::default();
        for (handle, result) in results {
            match result {
                Ok(resources) => {
                    debug!("Discovered {} {} resources in cluster '{}'", resources.len(), kind, handle.name);
                    discovery.resources.insert(handle.name.clone(), resources);
                }
                Err(e) => {
                    warn!("Discovery of {} in cluster '{}' failed: {}", kind, handle.name, e);
                    self.registry
                        .mark_disconnected(owner, &handle.name, &e.to_string())
                        .await;
                    discovery.failures.insert(handle.name.clone(), e.to_string());
                }
            }
        }

        info!(
            "Discovered {} {} resources across {} clusters",
            discovery.len(),
            kind,
            discovery.resources.len()
        );
        Ok(discovery)
    }
}

async fn discover_in_cluster(
    kind: ResourceKind,
    handle: &ClusterHandle,
    filters: ClusterFilters<'_>,
) -> Result<Vec<DiscoveredResource>> {
    if filters.selector.is_none() && !kind.included_without_selector() {
        return Ok(Vec::new());
    }

    let client = &handle.client;
    let objects: Vec<ResourceObject> = match kind {
        ResourceKind::Ingress => list_objects::<Ingress>(client, filters.namespaces)
            .await?
            .into_iter()
            .map(Into::into)
            .collect(),
        ResourceKind::HttpRoute => list_objects::<HTTPRoute>(client, filters.namespaces)
            .await?
            .into_iter()
            .map(Into::into)
            .collect(),
        ResourceKind::Service => list_objects::<Service>(client, filters.namespaces)
            .await?
            .into_iter()
            .map(Into::into)
            .collect(),
    };

    let candidates: Vec<DiscoveredResource> = objects
        .into_iter()
        .map(|object| DiscoveredResource::new(handle.name.clone(), object))
        .filter(|resource| filters.selects(kind, resource.labels()))
        .filter(|resource| {
            kind == ResourceKind::Service
                || selector::any_domain_matches(&resource.hostnames(), filters.domain_filters)
        })
        .collect();

    let gateways = match (kind, filters.gateway_selector) {
        (ResourceKind::HttpRoute, Some(_)) => {
            Some(gateway_labels(client, filters.namespaces, &candidates).await?)
        }
        _ => None,
    };

    let mut retained: Vec<DiscoveredResource> = candidates
        .into_iter()
        .filter(|resource| match (&gateways, filters.gateway_selector) {
            (Some(gateways), Some(gateway_selector)) => {
                attached_to_selected_gateway(resource, gateways, gateway_selector)
            }
            _ => true,
        })
        .collect();

    if retained.is_empty() {
        return Ok(retained);
    }

    let inherited = match namespace_annotations(client, filters.namespaces).await {
        Ok(annotations) => annotations,
        Err(e) => {
            warn!(
                "Could not read namespace annotations in cluster '{}': {}",
                handle.name, e
            );
            BTreeMap::new()
        }
    };

    for resource in &mut retained {
        if let Some(labels) = filters.cluster_labels {
            resource.inject_labels(labels);
        }
        resource.stamp_cluster();
        if let Some(annotations) = inherited.get(resource.namespace()) {
            resource.inherit_annotations(annotations);
        }
    }

    Ok(retained)
}

/// List a namespaced kind cluster-wide, or once per allowed namespace.
///
/// A kind the cluster does not serve (e.g. Gateway API not installed) lists
/// as empty.
async fn list_objects<K>(client: &Client, namespaces: &[String]) -> Result<Vec<K>>
where
    K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
    <K as Resource>::DynamicType: Default,
{
    let apis: Vec<Api<K>> = if namespaces.is_empty() {
        vec![Api::all(client.clone())]
    } else {
        namespaces
            .iter()
            .map(|ns| Api::namespaced(client.clone(), ns))
            .collect()
    };

    let lp = ListParams::default();
    let mut items = Vec::new();
    for api in apis {
        match api.list(&lp).await {
            Ok(list) => items.extend(list.items),
            Err(kube::Error::Api(e)) if e.code == 404 => {
                debug!("{} is not served by this cluster", K::kind(&Default::default()));
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(items)
}

type GatewayLabels = HashMap<(String, String), BTreeMap<String, String>>;

/// Labels of the gateways routes may attach to.
///
/// With a namespace allow-list, gateways referenced from outside it are
/// fetched individually.
async fn gateway_labels(
    client: &Client,
    namespaces: &[String],
    routes: &[DiscoveredResource],
) -> Result<GatewayLabels> {
    let mut labels: GatewayLabels = list_objects::<Gateway>(client, namespaces)
        .await?
        .into_iter()
        .map(|g| {
            let key = (g.namespace().unwrap_or_default(), g.name_any());
            (key, g.labels().clone())
        })
        .collect();
    if namespaces.is_empty() {
        return Ok(labels);
    }

    let outside: BTreeSet<(String, String)> = routes
        .iter()
        .flat_map(parent_gateways)
        .filter(|(namespace, _)| !namespaces.contains(namespace))
        .collect();
    for (namespace, name) in outside {
        let api: Api<Gateway> = Api::namespaced(client.clone(), &namespace);
        match api.get_opt(&name).await {
            Ok(Some(gateway)) => {
                labels.insert((namespace, name), gateway.labels().clone());
            }
            Ok(None) => debug!("Gateway {}/{} does not exist", namespace, name),
            Err(kube::Error::Api(e)) if e.code == 403 => {
                warn!("Not allowed to read gateway {}/{}: {}", namespace, name, e.message);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(labels)
}

/// (namespace, name) of every gateway a route names as parent
fn parent_gateways(resource: &DiscoveredResource) -> Vec<(String, String)> {
    let ResourceObject::HttpRoute(route) = resource.object() else {
        return Vec::new();
    };
    route
        .spec
        .parent_refs
        .iter()
        .filter(|p| p.targets_gateway())
        .map(|p| {
            let namespace = p.namespace.as_deref().unwrap_or(resource.namespace());
            (namespace.to_string(), p.name.clone())
        })
        .collect()
}

/// A route passes when one of its parents is a known gateway with matching labels
fn attached_to_selected_gateway(
    resource: &DiscoveredResource,
    gateways: &GatewayLabels,
    gateway_selector: &LabelSelector,
) -> bool {
    if !matches!(resource.object(), ResourceObject::HttpRoute(_)) {
        return true;
    }
    parent_gateways(resource)
        .into_iter()
        .filter_map(|key| gateways.get(&key))
        .any(|labels| selector::matches(gateway_selector, labels))
}
