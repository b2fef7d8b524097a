// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Remote cluster client creation and kubeconfig utilities

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{
    config::{KubeConfigOptions, Kubeconfig},
    Api, Client,
};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, info, instrument};

#[cfg(test)]
use mockall::automock;

use crate::constants::credentials::DEFAULT_KUBECONFIG_KEY;
use crate::error::{Error, Result};
use crate::types::dashboard::RemoteCluster;

/// Key used by Rancher-style kubeconfig secrets
const FALLBACK_KUBECONFIG_KEY: &str = "value";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds and checks clients for remote clusters
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Read the raw kubeconfig bytes declared for a remote cluster
    async fn credentials(&self, cluster: &RemoteCluster, default_namespace: &str)
        -> Result<Vec<u8>>;

    /// Construct a client from kubeconfig bytes, honoring the declared context
    async fn build(&self, cluster: &RemoteCluster, kubeconfig: &[u8]) -> Result<Client>;

    /// Cheap reachability check against an existing client.
    ///
    /// Must not need any RBAC beyond what discovery itself uses.
    async fn check_reachable(&self, cluster: &RemoteCluster, client: &Client) -> Result<()>;
}

/// Factory reading kubeconfig secrets from the local cluster
pub struct KubeConnectionFactory {
    client: Client,
}

impl KubeConnectionFactory {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ConnectionFactory for KubeConnectionFactory {
    #[instrument(skip(self, cluster), fields(cluster = %cluster.name))]
    async fn credentials(
        &self,
        cluster: &RemoteCluster,
        default_namespace: &str,
    ) -> Result<Vec<u8>> {
        let namespace = cluster
            .secret_ref
            .namespace
            .as_deref()
            .unwrap_or(default_namespace);
        let secret_name = &cluster.secret_ref.name;
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);

        debug!(
            "Getting kubeconfig secret '{}/{}' for cluster '{}'",
            namespace, secret_name, cluster.name
        );

        let secret = secrets.get_opt(secret_name).await?.ok_or_else(|| {
            Error::KubeconfigError(format!(
                "Kubeconfig secret {}/{} for cluster {} not found",
                namespace, secret_name, cluster.name
            ))
        })?;

        kubeconfig_bytes(&secret, cluster.secret_ref.key.as_deref()).ok_or_else(|| {
            Error::KubeconfigError(format!(
                "Kubeconfig secret {}/{} for cluster {} does not contain key '{}'",
                namespace,
                secret_name,
                cluster.name,
                cluster
                    .secret_ref
                    .key
                    .as_deref()
                    .unwrap_or(DEFAULT_KUBECONFIG_KEY)
            ))
        })
    }

    #[instrument(skip(self, cluster, kubeconfig), fields(cluster = %cluster.name))]
    async fn build(&self, cluster: &RemoteCluster, kubeconfig: &[u8]) -> Result<Client> {
        let client = create_client_from_kubeconfig(kubeconfig, cluster.context.as_deref()).await?;
        info!("Created client for cluster '{}'", cluster.name);
        Ok(client)
    }

    #[instrument(skip(self, cluster, client), fields(cluster = %cluster.name))]
    async fn check_reachable(&self, cluster: &RemoteCluster, client: &Client) -> Result<()> {
        let version = client
            .apiserver_version()
            .await
            .map_err(|e| Error::ConnectivityError {
                cluster: cluster.name.clone(),
                message: e.to_string(),
            })?;
        debug!("Cluster '{}' runs Kubernetes {}", cluster.name, version.git_version);
        Ok(())
    }
}

/// Extract kubeconfig bytes from a secret, falling back to well-known keys
pub fn kubeconfig_bytes(secret: &Secret, key: Option<&str>) -> Option<Vec<u8>> {
    let data = secret.data.as_ref()?;
    match key {
        Some(key) => data.get(key).map(|v| v.0.clone()),
        None => data
            .get(DEFAULT_KUBECONFIG_KEY)
            .or_else(|| data.get(FALLBACK_KUBECONFIG_KEY))
            .map(|v| v.0.clone()),
    }
}

/// Hex-encoded SHA-256 of credential material and the context selected from it
pub fn fingerprint(credentials: &[u8], context: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(credentials);
    if let Some(context) = context {
        hasher.update(b"\0context:");
        hasher.update(context.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Create a Kubernetes client from kubeconfig bytes
async fn create_client_from_kubeconfig(kubeconfig: &[u8], context: Option<&str>) -> Result<Client> {
    let kubeconfig = std::str::from_utf8(kubeconfig)
        .map_err(|e| Error::KubeconfigError(format!("Kubeconfig is not valid UTF-8: {}", e)))?;

    let kubeconfig_parsed: Kubeconfig = serde_yaml::from_str(kubeconfig)
        .map_err(|e| Error::KubeconfigError(format!("Failed to parse kubeconfig: {}", e)))?;

    if let Some(context) = context {
        if !kubeconfig_parsed.contexts.iter().any(|c| c.name == context) {
            return Err(Error::KubeconfigError(format!(
                "Context '{}' not found in kubeconfig",
                context
            )));
        }
    }

    let options = KubeConfigOptions {
        context: context.map(str::to_string),
        ..Default::default()
    };

    let mut client_config = kube::Config::from_custom_kubeconfig(kubeconfig_parsed, &options)
        .await
        .map_err(|e| Error::KubeconfigError(format!("Failed to create config: {}", e)))?;
    client_config.connect_timeout = Some(CONNECT_TIMEOUT);
    client_config.read_timeout = Some(READ_TIMEOUT);

    Client::try_from(client_config)
        .map_err(|e| Error::KubeconfigError(format!("Failed to create client: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockService;
    use k8s_openapi::ByteString;
    use std::collections::BTreeMap;

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
clusters:
- name: edge
  cluster:
    server: https://edge.example.com:6443
contexts:
- name: edge-admin
  context:
    cluster: edge
    user: admin
current-context: edge-admin
users:
- name: admin
  user:
    token: abc123
"#;

    fn make_secret(entries: &[(&str, &str)]) -> Secret {
        Secret {
            data: Some(
                entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..Default::default()
        }
    }

    #[test]
    fn test_kubeconfig_bytes_explicit_key() {
        let secret = make_secret(&[("config", "a"), ("kubeconfig", "b")]);
        assert_eq!(kubeconfig_bytes(&secret, Some("config")), Some(b"a".to_vec()));
        assert_eq!(kubeconfig_bytes(&secret, Some("missing")), None);
    }

    #[test]
    fn test_kubeconfig_bytes_falls_back_to_value() {
        let secret = make_secret(&[("value", "rancher")]);
        assert_eq!(kubeconfig_bytes(&secret, None), Some(b"rancher".to_vec()));
        assert_eq!(kubeconfig_bytes(&Secret::default(), None), None);
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        assert_eq!(fingerprint(b"one", None), fingerprint(b"one", None));
        assert_ne!(fingerprint(b"one", None), fingerprint(b"two", None));
        assert_eq!(fingerprint(b"", None).len(), 64);
    }

    #[test]
    fn test_fingerprint_changes_with_context() {
        assert_ne!(fingerprint(b"one", Some("staging")), fingerprint(b"one", Some("prod")));
        assert_ne!(fingerprint(b"one", None), fingerprint(b"one", Some("staging")));
    }

    fn remote(namespaces: &[&str]) -> RemoteCluster {
        RemoteCluster {
            name: "edge".to_string(),
            enabled: true,
            secret_ref: crate::types::dashboard::ClusterSecretReference {
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
            namespaces: namespaces.iter().map(|n| n.to_string()).collect(),
            cluster_labels: BTreeMap::new(),
        }
    }

    fn version_json() -> String {
        serde_json::json!({
            "major": "1",
            "minor": "30",
            "gitVersion": "v1.30.2",
            "gitCommit": "abc",
            "gitTreeState": "clean",
            "buildDate": "2026-01-01T00:00:00Z",
            "goVersion": "go1.22",
            "compiler": "gc",
            "platform": "linux/amd64"
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_reachability_needs_no_cluster_scoped_access() {
        let forbidden = serde_json::json!({
            "kind": "Status",
            "apiVersion": "v1",
            "status": "Failure",
            "message": "namespaces is forbidden",
            "reason": "Forbidden",
            "code": 403
        })
        .to_string();
        let remote_api = MockService::new()
            .on_get("/api/v1/namespaces", 403, &forbidden)
            .on_get("/version", 200, &version_json());
        let factory = KubeConnectionFactory::new(MockService::new().into_client());

        let result = factory.check_reachable(&remote(&["apps"]), &remote_api.into_client()).await;

        assert!(result.is_ok(), "{:?}", result);
    }

    #[tokio::test]
    async fn test_unreachable_cluster_is_connectivity_error() {
        let factory = KubeConnectionFactory::new(MockService::new().into_client());
        let unreachable = MockService::new().on_get("/version", 503, "{}");

        let result = factory.check_reachable(&remote(&[]), &unreachable.into_client()).await;

        match result {
            Err(e @ Error::ConnectivityError { .. }) => assert!(e.is_retryable()),
            other => panic!("expected connectivity error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_client_from_kubeconfig_with_context() {
        let client = create_client_from_kubeconfig(KUBECONFIG.as_bytes(), Some("edge-admin")).await;
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_client_from_kubeconfig_unknown_context() {
        let result = create_client_from_kubeconfig(KUBECONFIG.as_bytes(), Some("prod")).await;
        assert!(matches!(result, Err(Error::KubeconfigError(_))));
    }

    #[tokio::test]
    async fn test_client_from_invalid_kubeconfig() {
        let result = create_client_from_kubeconfig(b"not: [valid", None).await;
        assert!(matches!(result, Err(Error::KubeconfigError(_))));
    }
}
