// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Projection of discovered resources into the configuration document.

pub mod document;
pub mod grouping;
pub mod item;
pub mod projector;

pub use document::{ConfigDocument, Group, Item, ItemParam};
pub use projector::ConfigProjector;
