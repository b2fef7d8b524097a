// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Secret key resolution for smart card credentials

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use tracing::{debug, instrument};

#[cfg(test)]
use mockall::automock;

use crate::error::{Error, Result};
use crate::types::dashboard::SecretReference;

/// Reads a single key from a Secret
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SecretResolver: Send + Sync {
    async fn resolve(&self, reference: &SecretReference, default_namespace: &str) -> Result<String>;
}

/// Resolver backed by the local cluster's API
pub struct KubeSecretResolver {
    client: Client,
}

impl KubeSecretResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretResolver for KubeSecretResolver {
    #[instrument(skip(self, reference), fields(secret = %reference.name, key = %reference.key))]
    async fn resolve(&self, reference: &SecretReference, default_namespace: &str) -> Result<String> {
        let namespace = reference.namespace_or(default_namespace);
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);

        let secret = secrets.get_opt(&reference.name).await?.ok_or_else(|| {
            Error::SecretResolutionError(format!(
                "secret {}/{} not found",
                namespace, reference.name
            ))
        })?;

        debug!("Resolving key from secret {}/{}", namespace, reference.name);
        secret_value(&secret, &reference.key).ok_or_else(|| {
            Error::SecretResolutionError(format!(
                "key '{}' not found in secret {}/{}",
                reference.key, namespace, reference.name
            ))
        })
    }
}

/// Look a key up in `data`, then in `stringData`
pub fn secret_value(secret: &Secret, key: &str) -> Option<String> {
    if let Some(bytes) = secret.data.as_ref().and_then(|d| d.get(key)) {
        return Some(String::from_utf8_lossy(&bytes.0).into_owned());
    }
    secret
        .string_data
        .as_ref()
        .and_then(|d| d.get(key))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{not_found_json, secret_json, MockService};

    fn reference(name: &str, key: &str, namespace: Option<&str>) -> SecretReference {
        SecretReference {
            name: name.to_string(),
            key: key.to_string(),
            namespace: namespace.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_resolve_from_default_namespace() {
        let client = MockService::new()
            .on_get(
                "/api/v1/namespaces/dashboards/secrets/grafana",
                200,
                &secret_json("grafana", "dashboards", &[("api-key", "s3cr3t")]),
            )
            .into_client();
        let resolver = KubeSecretResolver::new(client);

        let value = resolver
            .resolve(&reference("grafana", "api-key", None), "dashboards")
            .await
            .unwrap();
        assert_eq!(value, "s3cr3t");
    }

    #[tokio::test]
    async fn test_resolve_missing_key() {
        let client = MockService::new()
            .on_get(
                "/api/v1/namespaces/monitoring/secrets/grafana",
                200,
                &secret_json("grafana", "monitoring", &[("token", "t")]),
            )
            .into_client();
        let resolver = KubeSecretResolver::new(client);

        let result = resolver
            .resolve(&reference("grafana", "api-key", Some("monitoring")), "dashboards")
            .await;
        assert!(matches!(result, Err(Error::SecretResolutionError(_))));
    }

    #[tokio::test]
    async fn test_resolve_missing_secret() {
        let client = MockService::new()
            .on_get(
                "/api/v1/namespaces/dashboards/secrets/grafana",
                404,
                &not_found_json("secrets", "grafana"),
            )
            .into_client();
        let resolver = KubeSecretResolver::new(client);

        let result = resolver
            .resolve(&reference("grafana", "api-key", None), "dashboards")
            .await;
        assert!(matches!(result, Err(Error::SecretResolutionError(_))));
    }
}
