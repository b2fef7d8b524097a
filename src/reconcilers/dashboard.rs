// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Dashboard reconciler: discovery, projection and convergence of the
//! managed ConfigMap, bound to the dashboard's lifetime by a finalizer.

use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{DeleteParams, Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::clusters::ClusterRegistry;
use crate::config::Config;
use crate::constants::{managed, FINALIZER};
use crate::discovery::{DiscoveredResource, DiscoveryEngine};
use crate::error::{Error, Result};
use crate::kubernetes::secrets::SecretResolver;
use crate::projection::{ConfigDocument, ConfigProjector};
use crate::reconcilers::convergence::{converge_config_map, desired_config_map, Convergence};
use crate::reconcilers::retry::RetryPolicy;
use crate::reconcilers::status::{build_status, patch_status, StatusReport};
use crate::reconcilers::ReconcileAction;
use crate::types::dashboard::DiscoveredCounts;
use crate::types::{Dashboard, DashboardKey};

/// Shared state handed to every reconcile
pub struct Context {
    pub client: Client,
    pub registry: Arc<ClusterRegistry>,
    pub secrets: Arc<dyn SecretResolver>,
    pub config: Config,
    pub retry: RetryPolicy,
}

async fn cancellable<T>(cancel: &CancellationToken, work: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = work => result,
    }
}

#[instrument(skip(key, ctx, cancel), fields(dashboard = %key))]
pub async fn reconcile(key: &DashboardKey, ctx: &Context, cancel: &CancellationToken) -> Result<ReconcileAction> {
    let api: Api<Dashboard> = Api::namespaced(ctx.client.clone(), &key.namespace);

    let Some(dashboard) = api.get_opt(&key.name).await? else {
        debug!("Dashboard no longer exists");
        ctx.registry.forget(key).await;
        return Ok(ReconcileAction::AwaitChange);
    };

    if dashboard.is_being_deleted() {
        if dashboard.has_finalizer() {
            finalize(&api, &dashboard, ctx).await?;
        }
        return Ok(ReconcileAction::AwaitChange);
    }

    if !dashboard.has_finalizer() {
        info!("Adding finalizer");
        add_finalizer(&api, &dashboard).await?;
        return Ok(ReconcileAction::Requeue(Duration::ZERO));
    }

    let result = cancellable(cancel, converge(&dashboard, ctx, cancel)).await;
    if matches!(result, Err(Error::Cancelled)) {
        return Err(Error::Cancelled);
    }

    let report = StatusReport {
        clusters: ctx.registry.statuses(key).await,
        discovered: result.as_ref().ok().cloned(),
        error: result.as_ref().err().map(ToString::to_string),
    };
    let status = build_status(&dashboard, report);
    if let Err(e) = patch_status(&api, &dashboard, &status).await {
        warn!("Failed to update status: {}", e);
    }

    result?;
    // steady state is driven by watch events and the resync timer
    Ok(ReconcileAction::AwaitChange)
}

/// Discovery, projection and convergence for an active dashboard
async fn converge(dashboard: &Dashboard, ctx: &Context, cancel: &CancellationToken) -> Result<DiscoveredCounts> {
    let key = dashboard.key();

    ctx.registry
        .reconcile_connections(&key, &dashboard.spec.remote_clusters, &key.namespace)
        .await;

    let base = load_base_document(&ctx.client, dashboard).await?;

    let discovery = DiscoveryEngine::new(&ctx.registry)
        .discover_all(&key, dashboard)
        .await?;
    for (cluster, error) in &discovery.failures {
        warn!("Continuing without cluster '{}': {}", cluster, error);
    }

    let resources: Vec<&DiscoveredResource> = discovery.iter().collect();
    let document = ConfigProjector::new(ctx.secrets.as_ref(), &ctx.config.cluster_domain)
        .project(&resources, dashboard, base)
        .await?;

    let desired = desired_config_map(dashboard, document.to_yaml()?)?;
    let config_maps: Api<ConfigMap> = Api::namespaced(ctx.client.clone(), &key.namespace);
    match converge_config_map(&config_maps, &desired, &ctx.retry, cancel).await? {
        Convergence::Unchanged => debug!("Configuration unchanged"),
        outcome => info!(
            "Configuration {:?} with {} items",
            outcome,
            document.item_count()
        ),
    }

    Ok(discovery.counts())
}

/// Parse the externally managed base document, if the dashboard references one
async fn load_base_document(client: &Client, dashboard: &Dashboard) -> Result<ConfigDocument> {
    let Some(reference) = &dashboard.spec.config_map_ref else {
        return Ok(ConfigDocument::default());
    };
    let namespace = dashboard.namespace().unwrap_or_default();
    if reference.name == dashboard.config_map_name() {
        return Err(Error::MissingDependency(format!(
            "configMapRef cannot point at the managed ConfigMap {}",
            reference.name
        )));
    }

    let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), &namespace);
    let config_map = config_maps.get_opt(&reference.name).await?.ok_or_else(|| {
        Error::MissingDependency(format!("ConfigMap {}/{}", namespace, reference.name))
    })?;

    let key = reference.key.as_deref().unwrap_or(managed::CONFIG_KEY);
    let content = config_map
        .data
        .as_ref()
        .and_then(|d| d.get(key))
        .ok_or_else(|| {
            Error::MissingDependency(format!(
                "key '{}' in ConfigMap {}/{}",
                key, namespace, reference.name
            ))
        })?;

    ConfigDocument::from_yaml(content)
}

async fn add_finalizer(api: &Api<Dashboard>, dashboard: &Dashboard) -> Result<()> {
    let mut finalizers = dashboard.finalizers().to_vec();
    finalizers.push(FINALIZER.to_string());
    patch_finalizers(api, dashboard, finalizers).await
}

async fn remove_finalizer(api: &Api<Dashboard>, dashboard: &Dashboard) -> Result<()> {
    let finalizers: Vec<String> = dashboard
        .finalizers()
        .iter()
        .filter(|f| *f != FINALIZER)
        .cloned()
        .collect();
    patch_finalizers(api, dashboard, finalizers).await
}

async fn patch_finalizers(api: &Api<Dashboard>, dashboard: &Dashboard, finalizers: Vec<String>) -> Result<()> {
    // resourceVersion makes the merge patch fail on a concurrent finalizer change
    let patch = serde_json::json!({
        "metadata": {
            "finalizers": finalizers,
            "resourceVersion": dashboard.resource_version(),
        }
    });
    api.patch(&dashboard.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

/// Remove everything the dashboard owns, then release it
#[instrument(skip_all, fields(dashboard = %dashboard.key()))]
async fn finalize(api: &Api<Dashboard>, dashboard: &Dashboard, ctx: &Context) -> Result<()> {
    let namespace = dashboard.namespace().unwrap_or_default();
    let config_maps: Api<ConfigMap> = Api::namespaced(ctx.client.clone(), &namespace);
    let name = dashboard.config_map_name();

    match config_maps.delete(&name, &DeleteParams::default()).await {
        Ok(_) => info!("Deleted ConfigMap {}/{}", namespace, name),
        Err(kube::Error::Api(e)) if e.code == 404 => debug!("ConfigMap {}/{} already gone", namespace, name),
        Err(e) => return Err(e.into()),
    }

    ctx.registry.forget(&dashboard.key()).await;
    remove_finalizer(api, dashboard).await?;
    info!("Finalized dashboard");
    Ok(())
}
