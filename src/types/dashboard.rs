// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::{CustomResource, ResourceExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::constants::{managed, FINALIZER};
use crate::discovery::ResourceKind;

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[kube(group = "waypoint.dev", version = "v1alpha1", kind = "Dashboard")]
#[kube(namespaced)]
#[kube(status = "DashboardStatus")]
#[kube(shortname = "wpd")]
#[serde(rename_all = "camelCase")]
pub struct DashboardSpec {
    /// Top-level settings written verbatim into the generated document
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, serde_json::Value>,
    /// Externally managed ConfigMap holding a base document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_map_ref: Option<ConfigMapKeyReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingress_selector: Option<LabelSelector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_route_selector: Option<LabelSelector>,
    /// Services are only discovered when a selector is set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_selector: Option<LabelSelector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_selector: Option<LabelSelector>,
    /// Hostname allow-list for the local cluster
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domain_filters: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remote_clusters: Vec<RemoteCluster>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grouping: Option<GroupingConfig>,
    /// Credentials for smart card items, matched by item name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<ItemSecrets>,
    /// Hard cap on items per group, 0 or unset means unlimited
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items_per_group: Option<u32>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapKeyReference {
    pub name: String,
    /// Defaults to `config.yml`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCluster {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Secret holding the kubeconfig for this cluster
    pub secret_ref: ClusterSecretReference,
    /// Kubeconfig context to use, defaults to the current context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingress_selector: Option<LabelSelector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_route_selector: Option<LabelSelector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_selector: Option<LabelSelector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_selector: Option<LabelSelector>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domain_filters: Vec<String>,
    /// Namespaces to list from; empty means cluster-wide
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<String>,
    /// Labels injected into every resource discovered in this cluster
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cluster_labels: BTreeMap<String, String>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSecretReference {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretReference {
    pub name: String,
    pub key: String,
    /// Defaults to the dashboard's namespace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl SecretReference {
    pub fn namespace_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.namespace.as_deref().unwrap_or(default)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum GroupingStrategy {
    #[default]
    Namespace,
    Label,
    Custom,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupingConfig {
    #[serde(default)]
    pub strategy: GroupingStrategy,
    /// Label whose value names the group when using the label strategy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_key: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<GroupingRule>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupingRule {
    /// Group name assigned when the rule matches
    pub name: String,
    /// Labels that must all be present with these values
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations that must all be present with these values
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Higher priorities are evaluated first
    #[serde(default)]
    pub priority: i32,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ItemSecrets {
    /// Name of the item these credentials belong to
    pub item: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<SecretReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<SecretReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<SecretReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<SecretReference>,
    /// Custom request headers, keyed by header name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, SecretReference>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default)]
    pub clusters: Vec<ClusterConnectionStatus>,
    #[serde(default)]
    pub discovered: DiscoveredCounts,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConnectionStatus {
    pub name: String,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_connection_time: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredCounts {
    pub ingresses: u32,
    pub http_routes: u32,
    pub services: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

/// Namespace and name identifying a dashboard
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DashboardKey {
    pub namespace: String,
    pub name: String,
}

impl DashboardKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for DashboardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl Dashboard {
    pub fn key(&self) -> DashboardKey {
        DashboardKey::new(self.namespace().unwrap_or_default(), self.name_any())
    }

    /// Name of the ConfigMap holding the rendered document
    pub fn config_map_name(&self) -> String {
        format!("{}{}", self.name_any(), managed::CONFIG_MAP_SUFFIX)
    }

    pub fn has_finalizer(&self) -> bool {
        self.finalizers().iter().any(|f| f == FINALIZER)
    }

    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Dashboard-level selector for a resource kind
    pub fn selector_for(&self, kind: ResourceKind) -> Option<&LabelSelector> {
        match kind {
            ResourceKind::Ingress => self.spec.ingress_selector.as_ref(),
            ResourceKind::HttpRoute => self.spec.http_route_selector.as_ref(),
            ResourceKind::Service => self.spec.service_selector.as_ref(),
        }
    }

    /// Every secret this dashboard reads, with namespaces resolved
    pub fn referenced_secrets(&self) -> Vec<(String, String)> {
        let own_namespace = self.namespace().unwrap_or_default();
        let mut refs: Vec<(String, String)> = self
            .spec
            .remote_clusters
            .iter()
            .map(|c| {
                let ns = c.secret_ref.namespace.as_deref().unwrap_or(&own_namespace);
                (ns.to_string(), c.secret_ref.name.clone())
            })
            .collect();

        for secrets in &self.spec.secrets {
            let fields = [
                &secrets.api_key,
                &secrets.token,
                &secrets.username,
                &secrets.password,
            ];
            let all = fields
                .into_iter()
                .flatten()
                .chain(secrets.headers.values());
            for reference in all {
                refs.push((
                    reference.namespace_or(&own_namespace).to_string(),
                    reference.name.clone(),
                ));
            }
        }

        refs.sort();
        refs.dedup();
        refs
    }
}

impl RemoteCluster {
    pub fn selector_for(&self, kind: ResourceKind) -> Option<&LabelSelector> {
        match kind {
            ResourceKind::Ingress => self.ingress_selector.as_ref(),
            ResourceKind::HttpRoute => self.http_route_selector.as_ref(),
            ResourceKind::Service => self.service_selector.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use kube::api::ObjectMeta;

    fn make_dashboard(name: &str, spec: DashboardSpec) -> Dashboard {
        Dashboard {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("dashboards".to_string()),
                ..Default::default()
            },
            spec,
            status: None,
        }
    }

    fn secret_ref(name: &str, namespace: Option<&str>) -> SecretReference {
        SecretReference {
            name: name.to_string(),
            key: "value".to_string(),
            namespace: namespace.map(str::to_string),
        }
    }

    #[test]
    fn test_remote_cluster_enabled_by_default() {
        let cluster: RemoteCluster = serde_json::from_value(serde_json::json!({
            "name": "edge",
            "secretRef": { "name": "edge-kubeconfig" }
        }))
        .unwrap();

        assert!(cluster.enabled);
        assert!(cluster.namespaces.is_empty());
    }

    #[test]
    fn test_grouping_strategy_defaults_to_namespace() {
        let grouping: GroupingConfig = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(grouping.strategy, GroupingStrategy::Namespace);
    }

    #[test]
    fn test_config_map_name() {
        let dashboard = make_dashboard("home", DashboardSpec::default());
        assert_eq!(dashboard.config_map_name(), "home-waypoint");
    }

    #[test]
    fn test_key_display() {
        let dashboard = make_dashboard("home", DashboardSpec::default());
        assert_eq!(dashboard.key().to_string(), "dashboards/home");
    }

    #[test]
    fn test_finalizer_and_deletion_flags() {
        let mut dashboard = make_dashboard("home", DashboardSpec::default());
        assert!(!dashboard.has_finalizer());
        assert!(!dashboard.is_being_deleted());

        dashboard.metadata.finalizers = Some(vec![FINALIZER.to_string()]);
        dashboard.metadata.deletion_timestamp = Some(Time(Utc::now()));

        assert!(dashboard.has_finalizer());
        assert!(dashboard.is_being_deleted());
    }

    #[test]
    fn test_selector_for_kind() {
        let selector = LabelSelector {
            match_labels: Some(BTreeMap::from([("expose".to_string(), "true".to_string())])),
            ..Default::default()
        };
        let dashboard = make_dashboard(
            "home",
            DashboardSpec {
                service_selector: Some(selector.clone()),
                ..Default::default()
            },
        );

        assert_eq!(dashboard.selector_for(ResourceKind::Service), Some(&selector));
        assert!(dashboard.selector_for(ResourceKind::Ingress).is_none());
    }

    #[test]
    fn test_referenced_secrets_resolves_namespaces() {
        let dashboard = make_dashboard(
            "home",
            DashboardSpec {
                remote_clusters: vec![RemoteCluster {
                    name: "edge".to_string(),
                    enabled: true,
                    secret_ref: ClusterSecretReference {
                        name: "edge-kubeconfig".to_string(),
                        key: None,
                        namespace: None,
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
                secrets: vec![ItemSecrets {
                    item: "Grafana".to_string(),
                    api_key: Some(secret_ref("grafana", Some("monitoring"))),
                    token: Some(secret_ref("grafana", Some("monitoring"))),
                    headers: BTreeMap::from([("X-Auth".to_string(), secret_ref("auth", None))]),
                    ..Default::default()
                }],
                ..Default::default()
            },
        );

        assert_eq!(
            dashboard.referenced_secrets(),
            vec![
                ("dashboards".to_string(), "auth".to_string()),
                ("dashboards".to_string(), "edge-kubeconfig".to_string()),
                ("monitoring".to_string(), "grafana".to_string()),
            ]
        );
    }
}
