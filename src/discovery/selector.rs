// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Label selector evaluation and domain filtering.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Reject selectors the API server would reject.
pub fn validate(selector: &LabelSelector) -> Result<()> {
    for requirement in selector.match_expressions.iter().flatten() {
        let values = requirement.values.as_deref().unwrap_or_default();
        match requirement.operator.as_str() {
            "In" | "NotIn" if values.is_empty() => {
                return Err(Error::SelectorError(format!(
                    "operator {} on key '{}' requires at least one value",
                    requirement.operator, requirement.key
                )));
            }
            "Exists" | "DoesNotExist" if !values.is_empty() => {
                return Err(Error::SelectorError(format!(
                    "operator {} on key '{}' takes no values",
                    requirement.operator, requirement.key
                )));
            }
            "In" | "NotIn" | "Exists" | "DoesNotExist" => {}
            other => {
                return Err(Error::SelectorError(format!(
                    "unknown operator '{}' on key '{}'",
                    other, requirement.key
                )));
            }
        }
    }
    Ok(())
}

/// Evaluate a selector against a label set. An empty selector matches everything.
pub fn matches(selector: &LabelSelector, labels: &BTreeMap<String, String>) -> bool {
    let labels_match = selector
        .match_labels
        .iter()
        .flatten()
        .all(|(k, v)| labels.get(k) == Some(v));

    labels_match
        && selector
            .match_expressions
            .iter()
            .flatten()
            .all(|r| requirement_matches(r, labels))
}

fn requirement_matches(
    requirement: &LabelSelectorRequirement,
    labels: &BTreeMap<String, String>,
) -> bool {
    let values = requirement.values.as_deref().unwrap_or_default();
    let value = labels.get(&requirement.key);
    match requirement.operator.as_str() {
        "In" => value.is_some_and(|v| values.contains(v)),
        "NotIn" => value.map_or(true, |v| !values.contains(v)),
        "Exists" => value.is_some(),
        "DoesNotExist" => value.is_none(),
        _ => false,
    }
}

/// A hostname matches a filter when equal to it or a subdomain of it.
/// No filters means everything matches.
pub fn domain_matches(hostname: &str, filters: &[String]) -> bool {
    if filters.is_empty() {
        return true;
    }
    filters.iter().any(|filter| {
        hostname == filter
            || hostname
                .strip_suffix(filter.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

/// Whether any of the hostnames passes the filters.
pub fn any_domain_matches(hostnames: &[String], filters: &[String]) -> bool {
    filters.is_empty() || hostnames.iter().any(|h| domain_matches(h, filters))
}
