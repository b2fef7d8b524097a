// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Listing and filtering Ingresses, HTTPRoutes and Services across clusters.

pub mod engine;
pub mod resource;
pub mod selector;

pub use engine::{ClusterFilters, Discovery, DiscoveryEngine};
pub use resource::{DiscoveredResource, Endpoint, ResourceKind, ResourceObject};
