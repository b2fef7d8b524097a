// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

use kube::ResourceExt;
use tracing::{debug, instrument, warn};

use crate::discovery::DiscoveredResource;
use crate::error::Result;
use crate::kubernetes::secrets::SecretResolver;
use crate::projection::document::{ConfigDocument, Item, ItemParam, GROUPS_KEY};
use crate::projection::grouping::Grouper;
use crate::projection::item::{build_item, ItemAnnotations};
use crate::types::Dashboard;

/// Turns discovered resources into the dashboard's configuration document
pub struct ConfigProjector<'a> {
    resolver: &'a dyn SecretResolver,
    cluster_domain: &'a str,
}

impl<'a> ConfigProjector<'a> {
    pub fn new(resolver: &'a dyn SecretResolver, cluster_domain: &'a str) -> Self {
        Self {
            resolver,
            cluster_domain,
        }
    }

    /// Project resources on top of `base`.
    ///
    /// Dashboard settings override base settings key by key. Any failure to
    /// resolve a smart card credential aborts the projection.
    #[instrument(skip_all, fields(dashboard = %dashboard.key(), resources = resources.len()))]
    pub async fn project(
        &self,
        resources: &[&DiscoveredResource],
        dashboard: &Dashboard,
        base: ConfigDocument,
    ) -> Result<ConfigDocument> {
        let grouper = Grouper::new(dashboard.spec.grouping.as_ref())?;
        let mut document = base;

        for (key, value) in &dashboard.spec.config {
            if key == GROUPS_KEY {
                warn!("Ignoring '{}' in dashboard config, groups are generated", GROUPS_KEY);
                continue;
            }
            document.settings.insert(key.clone(), value.clone());
        }

        for resource in resources {
            let parsed = ItemAnnotations::parse(resource.annotations());
            if parsed.hidden {
                debug!("Skipping hidden {} {}", resource.kind(), resource.source_identity());
                continue;
            }

            let mut item = build_item(resource, &parsed, self.cluster_domain);
            if item.params.contains_key(&ItemParam::Type) {
                self.resolve_credentials(&mut item, dashboard).await?;
            }

            let group_name = grouper.assign(resource);
            document.upsert(&group_name, item);

            let group = document.group_mut(&group_name);
            if group.icon.is_none() {
                group.icon = parsed.group_icon;
            }
            if group.logo.is_none() {
                group.logo = parsed.group_logo;
            }
        }

        document.normalize(dashboard.spec.max_items_per_group);
        Ok(document)
    }

    async fn resolve_credentials(&self, item: &mut Item, dashboard: &Dashboard) -> Result<()> {
        let Some(secrets) = dashboard.spec.secrets.iter().find(|s| s.item == item.name()) else {
            return Ok(());
        };
        let namespace = dashboard.namespace().unwrap_or_default();

        let fields = [
            (ItemParam::ApiKey, &secrets.api_key),
            (ItemParam::Token, &secrets.token),
            (ItemParam::Username, &secrets.username),
            (ItemParam::Password, &secrets.password),
        ];
        for (param, reference) in fields {
            if let Some(reference) = reference {
                let value = self.resolver.resolve(reference, &namespace).await?;
                item.set(param, value);
            }
        }
        for (header, reference) in &secrets.headers {
            let value = self.resolver.resolve(reference, &namespace).await?;
            item.headers.insert(header.clone(), value);
        }
        Ok(())
    }
}
