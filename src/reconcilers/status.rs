// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Dashboard status reporting.

use chrono::Utc;
use kube::api::{Patch, PatchParams};
use kube::{Api, ResourceExt};
use tracing::instrument;

use crate::error::Result;
use crate::types::dashboard::{ClusterConnectionStatus, Condition, DiscoveredCounts, DashboardStatus};
use crate::types::Dashboard;

pub const READY: &str = "Ready";

/// Outcome of a converging reconcile, as reported in status
#[derive(Clone, Debug, Default)]
pub struct StatusReport {
    pub clusters: Vec<ClusterConnectionStatus>,
    pub discovered: Option<DiscoveredCounts>,
    pub error: Option<String>,
}

fn ready_condition(previous: Option<&Condition>, error: Option<&str>) -> Condition {
    let (status, reason, message) = match error {
        None => ("True", "Reconciled", None),
        Some(e) => ("False", "ReconcileFailed", Some(e.to_string())),
    };
    // the transition time only moves when the status flips
    let last_transition_time = match previous {
        Some(p) if p.status == status => p.last_transition_time,
        _ => Some(Utc::now()),
    };
    Condition {
        condition_type: READY.to_string(),
        status: status.to_string(),
        reason: Some(reason.to_string()),
        message,
        last_transition_time,
    }
}

/// Build the next status from the previous one and this reconcile's results.
///
/// Discovered counts are kept from the previous status when the reconcile
/// did not get as far as discovery.
pub fn build_status(dashboard: &Dashboard, report: StatusReport) -> DashboardStatus {
    let previous = dashboard.status.clone().unwrap_or_default();
    let previous_ready = previous.conditions.iter().find(|c| c.condition_type == READY);

    let ready = ready_condition(previous_ready, report.error.as_deref());
    let mut conditions: Vec<Condition> = previous
        .conditions
        .iter()
        .filter(|c| c.condition_type != READY)
        .cloned()
        .collect();
    conditions.push(ready);

    DashboardStatus {
        observed_generation: dashboard.metadata.generation,
        clusters: report.clusters,
        discovered: report.discovered.unwrap_or(previous.discovered),
        conditions,
    }
}

#[instrument(skip_all, fields(dashboard = %dashboard.key()))]
pub async fn patch_status(api: &Api<Dashboard>, dashboard: &Dashboard, status: &DashboardStatus) -> Result<()> {
    let patch = serde_json::json!({ "status": status });
    api.patch_status(&dashboard.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    Ok(())
}
