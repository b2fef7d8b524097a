// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Mapping discovered resources to dashboard items.

use serde_yaml::Value;
use std::collections::BTreeMap;
use tracing::debug;

use crate::constants::annotations::{GROUP_PREFIX, ITEM_PREFIX};
use crate::discovery::DiscoveredResource;
use crate::projection::document::{Item, ItemParam, HEADERS_KEY};

const HIDE: &str = "hide";

/// Waypoint annotations of one resource, parsed once
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ItemAnnotations {
    pub params: BTreeMap<ItemParam, String>,
    pub hidden: bool,
    pub group_icon: Option<String>,
    pub group_logo: Option<String>,
}

impl ItemAnnotations {
    pub fn parse(annotations: &BTreeMap<String, String>) -> Self {
        let mut parsed = Self::default();
        for (key, value) in annotations {
            if let Some(param) = key.strip_prefix(ITEM_PREFIX) {
                if param.is_empty() {
                    continue;
                }
                if param == HIDE {
                    parsed.hidden = value.trim().eq_ignore_ascii_case("true");
                } else if param == HEADERS_KEY {
                    debug!("Ignoring {}: headers only come from item secrets", key);
                } else {
                    parsed.params.insert(ItemParam::from_key(param), value.clone());
                }
            } else if let Some(param) = key.strip_prefix(GROUP_PREFIX) {
                match param {
                    "icon" => parsed.group_icon = Some(value.clone()),
                    "logo" => parsed.group_logo = Some(value.clone()),
                    _ => {}
                }
            }
        }
        parsed
    }
}

/// Build the item for a resource, filling the name and URL when not annotated
pub fn build_item(resource: &DiscoveredResource, parsed: &ItemAnnotations, cluster_domain: &str) -> Item {
    let mut item = Item {
        params: parsed
            .params
            .iter()
            .map(|(param, value)| (param.clone(), Value::String(value.clone())))
            .collect(),
        headers: BTreeMap::new(),
        source: Some(resource.source_identity()),
    };

    if !item.params.contains_key(&ItemParam::Name) {
        item.set(ItemParam::Name, resource.name());
    }
    if !item.params.contains_key(&ItemParam::Url) {
        if let Some(endpoint) = resource.endpoint(cluster_domain) {
            item.set(ItemParam::Url, endpoint.url());
        }
    }
    item
}
