// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Connections to the local cluster and declared remote clusters.

pub mod connection;
pub mod registry;

pub use connection::{ClusterConnection, ClusterHandle};
pub use registry::ClusterRegistry;
