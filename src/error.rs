// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Failed to parse kubeconfig: {0}")]
    KubeconfigError(String),

    #[error("Cluster '{cluster}' unreachable: {message}")]
    ConnectivityError { cluster: String, message: String },

    #[error("Invalid selector: {0}")]
    SelectorError(String),

    #[error("Secret resolution failed: {0}")]
    SecretResolutionError(String),

    #[error("Write conflict on {name} persisted after {attempts} attempts")]
    ConflictError { name: String, attempts: u32 },

    #[error("{0} not found")]
    NotFound(String),

    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    #[error("Invalid grouping rule: {0}")]
    GroupingError(String),

    #[error("Failed to (de)serialize configuration document: {0}")]
    SerializationError(#[from] serde_yaml::Error),

    #[error("Reconcile cancelled")]
    Cancelled,
}

impl Error {
    /// Whether retrying without a configuration change can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::KubeError(_) | Error::ConnectivityError { .. } | Error::ConflictError { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
