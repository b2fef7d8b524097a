// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Rendering and converging the managed ConfigMap.

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::constants::{labels, managed, OPERATOR_NAME};
use crate::error::{Error, Result};
use crate::reconcilers::retry::{is_conflict, read_modify_write, RetryPolicy, VersionedStore};
use crate::types::Dashboard;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Convergence {
    Created,
    Updated,
    Unchanged,
}

/// The ConfigMap a dashboard should own, holding the rendered document
pub fn desired_config_map(dashboard: &Dashboard, document: String) -> Result<ConfigMap> {
    let owner = dashboard.controller_owner_ref(&()).ok_or_else(|| {
        Error::MissingDependency(format!("dashboard {} has no uid yet", dashboard.key()))
    })?;

    Ok(ConfigMap {
        metadata: ObjectMeta {
            name: Some(dashboard.config_map_name()),
            namespace: dashboard.namespace(),
            labels: Some(BTreeMap::from([
                (labels::MANAGED_BY.to_string(), OPERATOR_NAME.to_string()),
                (labels::DASHBOARD.to_string(), dashboard.name_any()),
            ])),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(managed::CONFIG_KEY.to_string(), document)])),
        ..Default::default()
    })
}

fn contains_all(observed: Option<&BTreeMap<String, String>>, wanted: Option<&BTreeMap<String, String>>) -> bool {
    let Some(wanted) = wanted else {
        return true;
    };
    wanted
        .iter()
        .all(|(k, v)| observed.and_then(|o| o.get(k)) == Some(v))
}

fn same_owner(a: &OwnerReference, b: &OwnerReference) -> bool {
    a.uid == b.uid && a.kind == b.kind && a.controller == b.controller
}

fn has_owner(observed: &ConfigMap, owner: &OwnerReference) -> bool {
    observed
        .owner_references()
        .iter()
        .any(|o| same_owner(o, owner))
}

/// Whether `observed` differs from `desired` in any field this controller owns.
///
/// Labels, annotations and owner references added by others are ignored, as
/// are server-populated metadata fields.
pub fn needs_update(desired: &ConfigMap, observed: &ConfigMap) -> bool {
    if desired.data != observed.data {
        return true;
    }
    if !contains_all(observed.metadata.labels.as_ref(), desired.metadata.labels.as_ref()) {
        return true;
    }
    if !contains_all(
        observed.metadata.annotations.as_ref(),
        desired.metadata.annotations.as_ref(),
    ) {
        return true;
    }
    desired
        .owner_references()
        .iter()
        .any(|owner| !has_owner(observed, owner))
}

/// Copy owned fields onto `target`, leaving everything else untouched
pub fn apply_owned_fields(desired: &ConfigMap, target: &mut ConfigMap) {
    target.data = desired.data.clone();
    if let Some(wanted) = &desired.metadata.labels {
        target.labels_mut().extend(wanted.clone());
    }
    if let Some(wanted) = &desired.metadata.annotations {
        target.annotations_mut().extend(wanted.clone());
    }
    for owner in desired.owner_references() {
        if !has_owner(target, owner) {
            target.owner_references_mut().push(owner.clone());
        }
    }
}

/// Create the ConfigMap, or update its owned fields when they differ
#[instrument(skip_all, fields(config_map = %desired.name_any()))]
pub async fn converge_config_map<S>(
    store: &S,
    desired: &ConfigMap,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<Convergence>
where
    S: VersionedStore<ConfigMap> + ?Sized,
{
    let name = desired.name_any();

    match store.fetch(&name).await? {
        Some(observed) if !needs_update(desired, &observed) => {
            debug!("ConfigMap {} is up to date", name);
            return Ok(Convergence::Unchanged);
        }
        Some(_) => {}
        None => match store.create(desired).await {
            Ok(_) => {
                info!("Created ConfigMap {}", name);
                return Ok(Convergence::Created);
            }
            // created concurrently; fall through to the update path
            Err(e) if is_conflict(&e) => debug!("ConfigMap {} appeared during create", name),
            Err(e) => return Err(e),
        },
    }

    let mut wrote = false;
    read_modify_write(store, &name, policy, cancel, |current: &mut ConfigMap| {
        if !needs_update(desired, current) {
            return false;
        }
        apply_owned_fields(desired, current);
        wrote = true;
        true
    })
    .await?;

    if wrote {
        info!("Updated ConfigMap {}", name);
        Ok(Convergence::Updated)
    } else {
        Ok(Convergence::Unchanged)
    }
}
