// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes utilities for CRD discovery, remote clients, secrets and namespaces.

pub mod client;
pub mod crd;
pub mod namespaces;
pub mod secrets;

pub use client::{ConnectionFactory, KubeConnectionFactory};
pub use crd::wait_for_dashboard_crd;
pub use namespaces::namespace_annotations;
pub use secrets::{KubeSecretResolver, SecretResolver};
