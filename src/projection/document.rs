// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! The dashboard configuration document and its deterministic rendering.

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::Result;

/// Top-level key holding the groups
pub const GROUPS_KEY: &str = "services";

/// Item key holding resolved request headers
pub const HEADERS_KEY: &str = "headers";

/// Parameters an item can carry. Declaration order is the rendering order.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ItemParam {
    Name,
    Subtitle,
    Url,
    Logo,
    Icon,
    Tag,
    TagStyle,
    Keywords,
    Target,
    Type,
    ApiKey,
    Token,
    Username,
    Password,
    Extension(String),
}

impl ItemParam {
    pub fn from_key(key: &str) -> Self {
        match key {
            "name" => ItemParam::Name,
            "subtitle" => ItemParam::Subtitle,
            "url" => ItemParam::Url,
            "logo" => ItemParam::Logo,
            "icon" => ItemParam::Icon,
            "tag" => ItemParam::Tag,
            "tagstyle" => ItemParam::TagStyle,
            "keywords" => ItemParam::Keywords,
            "target" => ItemParam::Target,
            "type" => ItemParam::Type,
            "apikey" => ItemParam::ApiKey,
            "token" => ItemParam::Token,
            "username" => ItemParam::Username,
            "password" => ItemParam::Password,
            other => ItemParam::Extension(other.to_string()),
        }
    }

    pub fn as_key(&self) -> &str {
        match self {
            ItemParam::Name => "name",
            ItemParam::Subtitle => "subtitle",
            ItemParam::Url => "url",
            ItemParam::Logo => "logo",
            ItemParam::Icon => "icon",
            ItemParam::Tag => "tag",
            ItemParam::TagStyle => "tagstyle",
            ItemParam::Keywords => "keywords",
            ItemParam::Target => "target",
            ItemParam::Type => "type",
            ItemParam::ApiKey => "apikey",
            ItemParam::Token => "token",
            ItemParam::Username => "username",
            ItemParam::Password => "password",
            ItemParam::Extension(key) => key,
        }
    }
}

impl fmt::Display for ItemParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_key())
    }
}

/// A single dashboard entry
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Item {
    /// Values keep their YAML type so base documents render back unchanged
    pub params: BTreeMap<ItemParam, Value>,
    pub headers: BTreeMap<String, String>,
    /// Identity of the resource that produced this item; never rendered
    pub source: Option<String>,
}

impl Item {
    /// String value of a parameter; other value types yield `None`
    pub fn get(&self, param: &ItemParam) -> Option<&str> {
        self.params.get(param).and_then(Value::as_str)
    }

    pub fn set(&mut self, param: ItemParam, value: impl Into<String>) {
        self.params.insert(param, Value::String(value.into()));
    }

    pub fn name(&self) -> &str {
        self.get(&ItemParam::Name).unwrap_or_default()
    }

    /// A `headers` extension is shadowed by resolved secret headers
    fn renders(&self, param: &ItemParam) -> bool {
        self.headers.is_empty() || param.as_key() != HEADERS_KEY
    }
}

impl Serialize for Item {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let params: Vec<(&ItemParam, &Value)> = self.params.iter().filter(|(p, _)| self.renders(p)).collect();
        let extra = usize::from(!self.headers.is_empty());
        let mut map = serializer.serialize_map(Some(params.len() + extra))?;
        for (param, value) in params {
            map.serialize_entry(param.as_key(), value)?;
        }
        if !self.headers.is_empty() {
            map.serialize_entry(HEADERS_KEY, &self.headers)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Item {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;
        let mut item = Item::default();
        for (key, value) in raw {
            match value {
                Value::Null => {}
                Value::Mapping(_) if key == HEADERS_KEY => {
                    item.headers = serde_yaml::from_value(value).map_err(de::Error::custom)?;
                }
                value => {
                    item.params.insert(ItemParam::from_key(&key), value);
                }
            }
        }
        Ok(item)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    /// Group keys this operator does not interpret, passed through as-is
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
    #[serde(default)]
    pub items: Vec<Item>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(flatten)]
    pub settings: BTreeMap<String, serde_json::Value>,
    #[serde(rename = "services", default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<Group>,
}

impl ConfigDocument {
    /// Parse a YAML document; blank input yields an empty document
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Find a group by exact name, appending it when absent
    pub fn group_mut(&mut self, name: &str) -> &mut Group {
        let index = match self.groups.iter().position(|g| g.name == name) {
            Some(index) => index,
            None => {
                self.groups.push(Group::new(name));
                self.groups.len() - 1
            }
        };
        &mut self.groups[index]
    }

    /// Drop every item produced by the given source, and any group this
    /// leaves empty. Returns how many items were removed.
    pub fn remove_source(&mut self, source: &str) -> usize {
        let mut removed = 0;
        self.groups.retain_mut(|group| {
            let before = group.items.len();
            group.items.retain(|item| item.source.as_deref() != Some(source));
            let dropped = before - group.items.len();
            removed += dropped;
            dropped == 0 || !group.items.is_empty()
        });
        removed
    }

    /// Replace any item from the same source, then append to `group`
    pub fn upsert(&mut self, group: &str, item: Item) {
        if let Some(source) = item.source.as_deref() {
            self.remove_source(source);
        }
        self.group_mut(group).items.push(item);
    }

    /// Sort groups and items case-insensitively, then cap each group.
    ///
    /// Sorting is stable, so names equal after case folding keep the order
    /// in which they were added.
    pub fn normalize(&mut self, max_items_per_group: Option<u32>) {
        self.groups.sort_by_cached_key(|g| g.name.to_lowercase());
        for group in &mut self.groups {
            group.items.sort_by_cached_key(|i| i.name().to_lowercase());
            if let Some(max) = max_items_per_group.filter(|m| *m > 0) {
                group.items.truncate(max as usize);
            }
        }
    }

    pub fn item_count(&self) -> usize {
        self.groups.iter().map(|g| g.items.len()).sum()
    }
}
