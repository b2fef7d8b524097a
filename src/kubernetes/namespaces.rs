// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Namespace metadata lookups

use k8s_openapi::api::core::v1::Namespace;
use kube::{api::ListParams, Api, Client, ResourceExt};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

use crate::error::Result;

pub type NamespaceAnnotations = BTreeMap<String, BTreeMap<String, String>>;

/// Collect annotations per namespace.
///
/// With an allow-list each namespace is fetched individually, so only `get`
/// on those namespaces is required; otherwise all namespaces are listed.
#[instrument(skip(client))]
pub async fn namespace_annotations(client: &Client, allowed: &[String]) -> Result<NamespaceAnnotations> {
    let namespaces: Api<Namespace> = Api::all(client.clone());
    let mut result = NamespaceAnnotations::new();

    if allowed.is_empty() {
        for ns in namespaces.list(&ListParams::default()).await? {
            result.insert(ns.name_any(), ns.annotations().clone());
        }
    } else {
        for name in allowed {
            match namespaces.get_opt(name).await? {
                Some(ns) => {
                    result.insert(ns.name_any(), ns.annotations().clone());
                }
                None => debug!("Namespace {} does not exist", name),
            }
        }
    }

    Ok(result)
}
