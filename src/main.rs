// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use kube::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use waypoint::clusters::ClusterRegistry;
use waypoint::config::Config;
use waypoint::constants::defaults::ERROR_REQUEUE_SECS;
use waypoint::kubernetes::{wait_for_dashboard_crd, KubeConnectionFactory, KubeSecretResolver};
use waypoint::reconcilers::{Context, RetryPolicy};
use waypoint::sync::{run_watchers, WorkQueue};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Waypoint operator");

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: workers={}, resync_interval={:?}, cluster_domain={}",
        config.workers, config.resync_interval, config.cluster_domain
    );

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    info!("Waiting for Dashboard CRD to become available...");
    wait_for_dashboard_crd(&client).await?;

    let registry = ClusterRegistry::new(
        client.clone(),
        Arc::new(KubeConnectionFactory::new(client.clone())),
    );
    let context = Context {
        client: client.clone(),
        registry: Arc::new(registry),
        secrets: Arc::new(KubeSecretResolver::new(client.clone())),
        config: config.clone(),
        retry: RetryPolicy::default(),
    };

    let cancel = CancellationToken::new();
    let (queue, handle) = WorkQueue::new(
        Arc::new(context),
        config.workers,
        Duration::from_secs(ERROR_REQUEUE_SECS),
        cancel.clone(),
    );

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            warn!("Failed to listen for shutdown signals: {}", e);
            return;
        }
        info!("Shutdown requested");
        shutdown.cancel();
    });

    info!("Starting work queue and watchers...");
    tokio::try_join!(queue.run(), run_watchers(client, &config, handle, cancel))?;

    info!("Waypoint operator stopped");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM
async fn shutdown_signal() -> std::io::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}
