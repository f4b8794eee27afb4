//! Per-tenant relabeling of domain nouns
//!
//! A brokerage may call its delegations "offices" or its companies
//! "insurers". Labels resolve as: tenant override, then built-in default,
//! then the key itself.

use crate::storage::BrokerageConfig;
use serde::Serialize;
use std::collections::BTreeMap;

/// Built-in labels
const DEFAULTS: &[(&str, &str)] = &[
    ("company", "Company"),
    ("companies", "Companies"),
    ("product", "Product"),
    ("products", "Products"),
    ("delegation", "Delegation"),
    ("delegations", "Delegations"),
    ("department", "Department"),
    ("departments", "Departments"),
    ("news", "News"),
    ("user", "User"),
    ("users", "Users"),
    ("category", "Category"),
    ("categories", "Categories"),
];

/// Resolved terminology for one tenant
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Terminology {
    labels: BTreeMap<String, String>,
}

impl Default for Terminology {
    fn default() -> Self {
        Self {
            labels: DEFAULTS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl Terminology {
    /// Defaults with the tenant's non-blank overrides applied
    pub fn from_config(config: &BrokerageConfig) -> Self {
        let mut terminology = Self::default();
        for (key, label) in &config.terminology {
            let label = label.trim();
            if !label.is_empty() {
                terminology.labels.insert(key.clone(), label.to_string());
            }
        }
        terminology
    }

    pub fn label<'a>(&'a self, key: &'a str) -> &'a str {
        self.labels.get(key).map(String::as_str).unwrap_or(key)
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let terms = Terminology::default();
        assert_eq!(terms.label("companies"), "Companies");
        assert_eq!(terms.label("widgets"), "widgets");
    }

    #[test]
    fn test_overrides_skip_blank_labels() {
        let mut config = BrokerageConfig::default();
        config
            .terminology
            .insert("delegations".to_string(), "Oficinas".to_string());
        config
            .terminology
            .insert("companies".to_string(), "   ".to_string());
        config
            .terminology
            .insert("brokers".to_string(), "Mediadores".to_string());

        let terms = Terminology::from_config(&config);
        assert_eq!(terms.label("delegations"), "Oficinas");
        assert_eq!(terms.label("companies"), "Companies");
        assert_eq!(terms.label("brokers"), "Mediadores");
    }
}
