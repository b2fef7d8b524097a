// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Uniform view over the resource kinds discovery understands.

use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::ObjectMeta;
use kube::Resource;
use std::collections::BTreeMap;
use std::fmt;

use crate::constants::{annotations, LOCAL_CLUSTER};
use crate::types::HTTPRoute;

static EMPTY: BTreeMap<String, String> = BTreeMap::new();

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Ingress,
    HttpRoute,
    Service,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [
        ResourceKind::Ingress,
        ResourceKind::HttpRoute,
        ResourceKind::Service,
    ];

    /// Services carry no hostname, so they are opt-in through a selector.
    pub fn included_without_selector(self) -> bool {
        !matches!(self, ResourceKind::Service)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Ingress => "Ingress",
            ResourceKind::HttpRoute => "HTTPRoute",
            ResourceKind::Service => "Service",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug)]
pub enum ResourceObject {
    Ingress(Ingress),
    HttpRoute(HTTPRoute),
    Service(Service),
}

impl From<Ingress> for ResourceObject {
    fn from(value: Ingress) -> Self {
        ResourceObject::Ingress(value)
    }
}

impl From<HTTPRoute> for ResourceObject {
    fn from(value: HTTPRoute) -> Self {
        ResourceObject::HttpRoute(value)
    }
}

impl From<Service> for ResourceObject {
    fn from(value: Service) -> Self {
        ResourceObject::Service(value)
    }
}

/// Where a resource can be reached, before any URL override
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub scheme: &'static str,
    pub host: String,
    pub port: Option<i32>,
}

impl Endpoint {
    pub fn url(&self) -> String {
        match self.port {
            Some(port) => format!("{}://{}:{}", self.scheme, self.host, port),
            None => format!("{}://{}", self.scheme, self.host),
        }
    }
}

/// A resource found in some cluster, tagged with where it came from
#[derive(Clone, Debug)]
pub struct DiscoveredResource {
    cluster: String,
    object: ResourceObject,
}

impl DiscoveredResource {
    pub fn new(cluster: impl Into<String>, object: impl Into<ResourceObject>) -> Self {
        Self {
            cluster: cluster.into(),
            object: object.into(),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match &self.object {
            ResourceObject::Ingress(_) => ResourceKind::Ingress,
            ResourceObject::HttpRoute(_) => ResourceKind::HttpRoute,
            ResourceObject::Service(_) => ResourceKind::Service,
        }
    }

    pub fn object(&self) -> &ResourceObject {
        &self.object
    }

    fn meta(&self) -> &ObjectMeta {
        match &self.object {
            ResourceObject::Ingress(o) => o.meta(),
            ResourceObject::HttpRoute(o) => o.meta(),
            ResourceObject::Service(o) => o.meta(),
        }
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        match &mut self.object {
            ResourceObject::Ingress(o) => o.meta_mut(),
            ResourceObject::HttpRoute(o) => o.meta_mut(),
            ResourceObject::Service(o) => o.meta_mut(),
        }
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn is_local(&self) -> bool {
        self.cluster == LOCAL_CLUSTER
    }

    pub fn name(&self) -> &str {
        self.meta().name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> &str {
        self.meta().namespace.as_deref().unwrap_or_default()
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        self.meta().labels.as_ref().unwrap_or(&EMPTY)
    }

    pub fn annotations(&self) -> &BTreeMap<String, String> {
        self.meta().annotations.as_ref().unwrap_or(&EMPTY)
    }

    /// Identity used to replace previously emitted items for this resource
    pub fn source_identity(&self) -> String {
        if self.is_local() {
            self.name().to_string()
        } else {
            format!("{}@{}", self.name(), self.cluster)
        }
    }

    /// Hostnames the resource serves, in declaration order without duplicates
    pub fn hostnames(&self) -> Vec<String> {
        let mut hosts: Vec<String> = match &self.object {
            ResourceObject::Ingress(ingress) => ingress
                .spec
                .iter()
                .flat_map(|s| s.rules.iter().flatten())
                .filter_map(|r| r.host.clone())
                .collect(),
            ResourceObject::HttpRoute(route) => route.spec.hostnames.clone(),
            ResourceObject::Service(_) => Vec::new(),
        };
        let mut seen = std::collections::HashSet::new();
        hosts.retain(|h| !h.is_empty() && seen.insert(h.clone()));
        hosts
    }

    /// Default endpoint inferred from hostnames, TLS settings and ports
    pub fn endpoint(&self, cluster_domain: &str) -> Option<Endpoint> {
        match &self.object {
            ResourceObject::Ingress(ingress) => {
                let host = self.hostnames().into_iter().next()?;
                let tls = ingress
                    .spec
                    .iter()
                    .flat_map(|s| s.tls.iter().flatten())
                    .any(|t| t.hosts.iter().flatten().any(|h| *h == host));
                Some(Endpoint {
                    scheme: if tls { "https" } else { "http" },
                    host,
                    port: None,
                })
            }
            ResourceObject::HttpRoute(route) => {
                let host = self.hostnames().into_iter().next()?;
                let tls = route.spec.parent_refs.iter().any(|p| {
                    p.port == Some(443)
                        || p.section_name
                            .as_deref()
                            .is_some_and(|s| s.contains("https"))
                });
                Some(Endpoint {
                    scheme: if tls { "https" } else { "http" },
                    host,
                    port: None,
                })
            }
            ResourceObject::Service(service) => {
                let port = service
                    .spec
                    .as_ref()
                    .and_then(|s| s.ports.as_ref())
                    .and_then(|ports| ports.first())?;
                let tls = port.port == 443 || port.name.as_deref() == Some("https");
                Some(Endpoint {
                    scheme: if tls { "https" } else { "http" },
                    host: format!("{}.{}.svc.{}", self.name(), self.namespace(), cluster_domain),
                    port: Some(port.port),
                })
            }
        }
    }

    /// Add static labels without replacing any the resource already has
    pub fn inject_labels(&mut self, labels: &BTreeMap<String, String>) {
        if labels.is_empty() {
            return;
        }
        let existing = self.meta_mut().labels.get_or_insert_with(BTreeMap::new);
        for (key, value) in labels {
            existing.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }

    /// Record the source cluster as an annotation
    pub fn stamp_cluster(&mut self) {
        let cluster = self.cluster.clone();
        self.meta_mut()
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(annotations::CLUSTER.to_string(), cluster);
    }

    /// Copy waypoint annotations from the namespace for keys not set on the resource
    pub fn inherit_annotations(&mut self, namespace_annotations: &BTreeMap<String, String>) {
        let inherited: Vec<(&String, &String)> = namespace_annotations
            .iter()
            .filter(|(k, _)| {
                annotations::INHERITED_PREFIXES
                    .iter()
                    .any(|prefix| k.starts_with(prefix))
            })
            .collect();
        if inherited.is_empty() {
            return;
        }
        let own = self.meta_mut().annotations.get_or_insert_with(BTreeMap::new);
        for (key, value) in inherited {
            own.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::gateway::{HTTPRouteSpec, ParentReference};
    use k8s_openapi::api::core::v1::{ServicePort, ServiceSpec};
    use k8s_openapi::api::networking::v1::{IngressRule, IngressSpec, IngressTLS};

    fn meta(name: &str, annotations: Option<BTreeMap<String, String>>) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            annotations,
            ..Default::default()
        }
    }

    fn ingress(name: &str, hosts: &[&str], tls_hosts: &[&str]) -> Ingress {
        Ingress {
            metadata: meta(name, None),
            spec: Some(IngressSpec {
                rules: Some(
                    hosts
                        .iter()
                        .map(|h| IngressRule {
                            host: Some(h.to_string()),
                            http: None,
                        })
                        .collect(),
                ),
                tls: (!tls_hosts.is_empty()).then(|| {
                    vec![IngressTLS {
                        hosts: Some(tls_hosts.iter().map(|h| h.to_string()).collect()),
                        secret_name: Some("tls".to_string()),
                    }]
                }),
                ..Default::default()
            }),
            status: None,
        }
    }

    fn service(name: &str, port: i32, port_name: Option<&str>) -> Service {
        Service {
            metadata: meta(name, None),
            spec: Some(ServiceSpec {
                ports: Some(vec![ServicePort {
                    port,
                    name: port_name.map(str::to_string),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            status: None,
        }
    }

    #[test]
    fn test_ingress_hostnames_deduplicated() {
        let resource = DiscoveredResource::new(
            LOCAL_CLUSTER,
            ingress("app", &["a.test.com", "b.test.com", "a.test.com"], &[]),
        );
        assert_eq!(resource.hostnames(), vec!["a.test.com", "b.test.com"]);
    }

    #[test]
    fn test_ingress_endpoint_plain_http() {
        let resource = DiscoveredResource::new(LOCAL_CLUSTER, ingress("app", &["app.test.com"], &[]));
        let endpoint = resource.endpoint("cluster.local").unwrap();
        assert_eq!(endpoint.url(), "http://app.test.com");
    }

    #[test]
    fn test_ingress_endpoint_https_when_tls_covers_host() {
        let resource = DiscoveredResource::new(
            LOCAL_CLUSTER,
            ingress("app", &["app.test.com"], &["app.test.com"]),
        );
        assert_eq!(resource.endpoint("cluster.local").unwrap().url(), "https://app.test.com");
    }

    #[test]
    fn test_ingress_without_hosts_has_no_endpoint() {
        let resource = DiscoveredResource::new(LOCAL_CLUSTER, ingress("app", &[], &[]));
        assert!(resource.endpoint("cluster.local").is_none());
    }

    #[test]
    fn test_service_endpoint_uses_cluster_dns() {
        let resource = DiscoveredResource::new(LOCAL_CLUSTER, service("my-app", 8080, None));
        assert_eq!(
            resource.endpoint("cluster.local").unwrap().url(),
            "http://my-app.default.svc.cluster.local:8080"
        );

        let resource = DiscoveredResource::new(LOCAL_CLUSTER, service("my-app", 443, None));
        assert_eq!(
            resource.endpoint("cluster.local").unwrap().url(),
            "https://my-app.default.svc.cluster.local:443"
        );
    }

    #[test]
    fn test_service_named_https_port() {
        let resource = DiscoveredResource::new(LOCAL_CLUSTER, service("api", 8443, Some("https")));
        assert_eq!(
            resource.endpoint("corp.internal").unwrap().url(),
            "https://api.default.svc.corp.internal:8443"
        );
    }

    #[test]
    fn test_route_endpoint_https_on_secure_parent() {
        let route = HTTPRoute {
            metadata: meta("web", None),
            spec: HTTPRouteSpec {
                hostnames: vec!["web.example.com".to_string()],
                parent_refs: vec![ParentReference {
                    name: "public".to_string(),
                    section_name: Some("https-listener".to_string()),
                    ..Default::default()
                }],
            },
        };
        let resource = DiscoveredResource::new(LOCAL_CLUSTER, route);
        assert_eq!(resource.kind(), ResourceKind::HttpRoute);
        assert_eq!(resource.endpoint("cluster.local").unwrap().url(), "https://web.example.com");
    }

    #[test]
    fn test_source_identity_suffixes_remote_cluster() {
        let local = DiscoveredResource::new(LOCAL_CLUSTER, service("api", 80, None));
        let remote = DiscoveredResource::new("edge", service("api", 80, None));
        assert_eq!(local.source_identity(), "api");
        assert_eq!(remote.source_identity(), "api@edge");
    }

    #[test]
    fn test_inject_labels_keeps_existing() {
        let mut svc = service("api", 80, None);
        svc.metadata.labels = Some(BTreeMap::from([("env".to_string(), "prod".to_string())]));
        let mut resource = DiscoveredResource::new("edge", svc);

        resource.inject_labels(&BTreeMap::from([
            ("env".to_string(), "staging".to_string()),
            ("region".to_string(), "eu".to_string()),
        ]));

        assert_eq!(resource.labels().get("env").unwrap(), "prod");
        assert_eq!(resource.labels().get("region").unwrap(), "eu");
    }

    #[test]
    fn test_inherit_annotations_resource_wins() {
        let mut ing = ingress("app", &["app.test.com"], &[]);
        ing.metadata.annotations = Some(BTreeMap::from([(
            "item.waypoint.dev/name".to_string(),
            "Own Name".to_string(),
        )]));
        let mut resource = DiscoveredResource::new(LOCAL_CLUSTER, ing);

        resource.inherit_annotations(&BTreeMap::from([
            ("item.waypoint.dev/name".to_string(), "Namespace Name".to_string()),
            ("group.waypoint.dev/icon".to_string(), "fas fa-cloud".to_string()),
            ("unrelated.io/owner".to_string(), "team".to_string()),
        ]));
        resource.stamp_cluster();

        let annotations = resource.annotations();
        assert_eq!(annotations.get("item.waypoint.dev/name").unwrap(), "Own Name");
        assert_eq!(annotations.get("group.waypoint.dev/icon").unwrap(), "fas fa-cloud");
        assert!(!annotations.contains_key("unrelated.io/owner"));
        assert_eq!(annotations.get(annotations::CLUSTER).unwrap(), LOCAL_CLUSTER);
    }
}
