// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Custom resource types read and written by the operator.

pub mod dashboard;
pub mod gateway;

pub use dashboard::{Dashboard, DashboardKey, DashboardSpec, DashboardStatus};
pub use gateway::{Gateway, HTTPRoute};
