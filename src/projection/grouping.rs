// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Group assignment strategies.

use crate::discovery::DiscoveredResource;
use crate::error::{Error, Result};
use crate::types::dashboard::{GroupingConfig, GroupingRule, GroupingStrategy};

/// A validated grouping configuration
#[derive(Clone, Debug)]
pub enum Grouper {
    Namespace,
    Label(String),
    /// Rules ordered by descending priority
    Custom(Vec<GroupingRule>),
}

impl Grouper {
    pub fn new(config: Option<&GroupingConfig>) -> Result<Self> {
        let Some(config) = config else {
            return Ok(Grouper::Namespace);
        };
        match config.strategy {
            GroupingStrategy::Namespace => Ok(Grouper::Namespace),
            GroupingStrategy::Label => match config.label_key.as_deref().map(str::trim) {
                Some(key) if !key.is_empty() => Ok(Grouper::Label(key.to_string())),
                _ => Err(Error::GroupingError(
                    "label grouping requires labelKey".to_string(),
                )),
            },
            GroupingStrategy::Custom => {
                if let Some(rule) = config.rules.iter().find(|r| r.name.trim().is_empty()) {
                    return Err(Error::GroupingError(format!(
                        "rule with priority {} has no name",
                        rule.priority
                    )));
                }
                let mut rules = config.rules.clone();
                // stable, so equal priorities keep declaration order
                rules.sort_by(|a, b| b.priority.cmp(&a.priority));
                Ok(Grouper::Custom(rules))
            }
        }
    }

    pub fn assign(&self, resource: &DiscoveredResource) -> String {
        let assigned = match self {
            Grouper::Namespace => None,
            Grouper::Label(key) => resource.labels().get(key).filter(|v| !v.is_empty()).cloned(),
            Grouper::Custom(rules) => rules
                .iter()
                .find(|rule| rule_matches(rule, resource))
                .map(|rule| rule.name.clone()),
        };
        assigned.unwrap_or_else(|| resource.namespace().to_string())
    }
}

fn rule_matches(rule: &GroupingRule, resource: &DiscoveredResource) -> bool {
    let labels = resource.labels();
    let annotations = resource.annotations();
    rule.labels.iter().all(|(k, v)| labels.get(k) == Some(v))
        && rule.annotations.iter().all(|(k, v)| annotations.get(k) == Some(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Service;
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn resource(namespace: &str, labels: &[(&str, &str)], annotations: &[(&str, &str)]) -> DiscoveredResource {
        let service = Service {
            metadata: ObjectMeta {
                name: Some("svc".to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(map(labels)),
                annotations: Some(map(annotations)),
                ..Default::default()
            },
            ..Default::default()
        };
        DiscoveredResource::new("local", service)
    }

    fn rule(name: &str, priority: i32, labels: &[(&str, &str)]) -> GroupingRule {
        GroupingRule {
            name: name.to_string(),
            labels: map(labels),
            annotations: BTreeMap::new(),
            priority,
        }
    }

    fn custom(rules: Vec<GroupingRule>) -> GroupingConfig {
        GroupingConfig {
            strategy: GroupingStrategy::Custom,
            label_key: None,
            rules,
        }
    }

    #[test]
    fn test_namespace_is_default() {
        let grouper = Grouper::new(None).unwrap();
        assert_eq!(grouper.assign(&resource("media", &[], &[])), "media");
    }

    #[test]
    fn test_label_strategy_falls_back_to_namespace() {
        let config = GroupingConfig {
            strategy: GroupingStrategy::Label,
            label_key: Some("app.kubernetes.io/part-of".to_string()),
            rules: vec![],
        };
        let grouper = Grouper::new(Some(&config)).unwrap();

        let labelled = resource("media", &[("app.kubernetes.io/part-of", "Streaming")], &[]);
        assert_eq!(grouper.assign(&labelled), "Streaming");
        assert_eq!(grouper.assign(&resource("media", &[], &[])), "media");
    }

    #[test]
    fn test_label_strategy_requires_key() {
        let config = GroupingConfig {
            strategy: GroupingStrategy::Label,
            label_key: None,
            rules: vec![],
        };
        assert!(matches!(Grouper::new(Some(&config)), Err(Error::GroupingError(_))));
    }

    #[test]
    fn test_custom_rules_highest_priority_wins() {
        let config = custom(vec![
            rule("Everything Web", 1, &[("tier", "web")]),
            rule("Public Web", 10, &[("tier", "web"), ("exposure", "public")]),
        ]);
        let grouper = Grouper::new(Some(&config)).unwrap();

        let public = resource("apps", &[("tier", "web"), ("exposure", "public")], &[]);
        let internal = resource("apps", &[("tier", "web")], &[]);
        let other = resource("apps", &[("tier", "db")], &[]);

        assert_eq!(grouper.assign(&public), "Public Web");
        assert_eq!(grouper.assign(&internal), "Everything Web");
        assert_eq!(grouper.assign(&other), "apps");
    }

    #[test]
    fn test_custom_rules_equal_priority_keep_order() {
        let config = custom(vec![
            rule("First", 5, &[("tier", "web")]),
            rule("Second", 5, &[("tier", "web")]),
        ]);
        let grouper = Grouper::new(Some(&config)).unwrap();
        assert_eq!(grouper.assign(&resource("apps", &[("tier", "web")], &[])), "First");
    }

    #[test]
    fn test_custom_rule_matches_annotations() {
        let mut by_owner = rule("Platform", 0, &[]);
        by_owner.annotations = map(&[("team", "platform")]);
        let grouper = Grouper::new(Some(&custom(vec![by_owner]))).unwrap();

        assert_eq!(grouper.assign(&resource("ops", &[], &[("team", "platform")])), "Platform");
        assert_eq!(grouper.assign(&resource("ops", &[], &[("team", "apps")])), "ops");
    }

    #[test]
    fn test_unnamed_rule_rejected() {
        let config = custom(vec![rule(" ", 1, &[])]);
        assert!(matches!(Grouper::new(Some(&config)), Err(Error::GroupingError(_))));
    }
}
