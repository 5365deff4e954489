use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ScanError;

const BUNDLED_CATALOG: &str = include_str!("../data/cmp_signatures.json");

/// Vocabulary the classifier always knows, merged with the catalog's `require` list.
pub const BASE_CONSENT_KEYWORDS: &[&str] = &[
    "cookie", "consent", "privacy", "gdpr", "tracking", "partner", "vendor",
    "third party", "legitimate interest", "personali",
];

pub const DEFAULT_CLOSE_PATTERNS: &[&str] = &["close", "×", "✕", "x", "dismiss"];

pub const DEFAULT_REQUIRE_KEYWORDS: &[&str] = &["cookie", "consent", "gdpr", "tracking"];

pub const DEFAULT_EXCLUDE_KEYWORDS: &[&str] = &[
    "checkout", "login", "log in", "password", "sign in", "sign-in", "payment",
];

pub const DEFAULT_REJECT_PATTERNS: &[&str] = &[
    "reject", "decline", "deny", "refuse", "necessary only", "only necessary",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSelectors {
    #[serde(default)]
    pub container: Vec<String>,
    #[serde(default)]
    pub reject_buttons: Vec<String>,
}

/// A named consent-management platform and how to find and reject its banner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    pub name: String,
    pub selectors: ProviderSelectors,
    /// Force-hide the container in normal mode when no reject button worked
    #[serde(default = "default_true")]
    pub hide_on_failure: bool,
}

fn default_true() -> bool {
    true
}

impl Provider {
    pub fn container_selectors(&self) -> &[String] {
        &self.selectors.container
    }

    pub fn reject_button_selectors(&self) -> &[String] {
        &self.selectors.reject_buttons
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SafeguardKeywords {
    #[serde(default)]
    pub require: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureCatalog {
    #[serde(default)]
    pub cmp_providers: Vec<Provider>,
    /// locale -> button text fragments
    #[serde(default)]
    pub generic_reject_patterns: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub generic_close_patterns: Vec<String>,
    #[serde(default)]
    pub safeguard_keywords: SafeguardKeywords,
}

impl SignatureCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, ScanError> {
        serde_json::from_str(json)
            .map_err(|e| ScanError::catalog_error(format!("Malformed signature catalog: {}", e)))
    }

    /// Parses `json`, falling back to an empty catalog so scanning continues with
    /// generic heuristics only.
    pub fn load_or_empty(json: Option<&str>) -> Self {
        match json.map(Self::from_json) {
            Some(Ok(catalog)) => catalog,
            Some(Err(e)) => {
                warn!(error = %e, "signature catalog unusable, continuing with generic heuristics");
                Self::empty()
            }
            None => {
                warn!("signature catalog unavailable, continuing with generic heuristics");
                Self::empty()
            }
        }
    }

    /// The catalog shipped with the crate.
    pub fn bundled() -> Self {
        Self::load_or_empty(Some(BUNDLED_CATALOG))
    }

    /// All locales flattened, lowercased and de-duplicated in catalog order.
    pub fn reject_patterns(&self) -> Vec<String> {
        let flat = self.generic_reject_patterns.values().flatten().map(String::as_str);
        let patterns = dedup_lower(flat);
        if patterns.is_empty() {
            dedup_lower(DEFAULT_REJECT_PATTERNS.iter().copied())
        } else {
            patterns
        }
    }

    pub fn close_patterns(&self) -> Vec<String> {
        if self.generic_close_patterns.is_empty() {
            dedup_lower(DEFAULT_CLOSE_PATTERNS.iter().copied())
        } else {
            dedup_lower(self.generic_close_patterns.iter().map(String::as_str))
        }
    }

    /// Keywords that count as consent evidence in element text.
    pub fn consent_keywords(&self) -> Vec<String> {
        let base = BASE_CONSENT_KEYWORDS.iter().copied();
        dedup_lower(base.chain(self.safeguard_keywords.require.iter().map(String::as_str)))
    }

    /// Keywords whose presence lifts the safeguard veto.
    pub fn required_keywords(&self) -> Vec<String> {
        if self.safeguard_keywords.require.is_empty() {
            dedup_lower(DEFAULT_REQUIRE_KEYWORDS.iter().copied())
        } else {
            dedup_lower(self.safeguard_keywords.require.iter().map(String::as_str))
        }
    }

    /// Protected-context keywords (login, checkout...).
    pub fn excluded_keywords(&self) -> Vec<String> {
        if self.safeguard_keywords.exclude.is_empty() {
            dedup_lower(DEFAULT_EXCLUDE_KEYWORDS.iter().copied())
        } else {
            dedup_lower(self.safeguard_keywords.exclude.iter().map(String::as_str))
        }
    }
}

fn dedup_lower<'a>(items: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        let lowered = item.trim().to_lowercase();
        if !lowered.is_empty() && !out.contains(&lowered) {
            out.push(lowered);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_catalog_parses() {
        let catalog = SignatureCatalog::bundled();
        assert!(!catalog.cmp_providers.is_empty());
        assert!(catalog.cmp_providers.iter().any(|p| p.name == "OneTrust"));
        assert!(catalog.reject_patterns().contains(&"reject all".to_string()));
    }

    #[test]
    fn malformed_catalog_falls_back_to_empty() {
        let catalog = SignatureCatalog::load_or_empty(Some("{ not json"));
        assert_eq!(catalog, SignatureCatalog::empty());
        assert!(!catalog.reject_patterns().is_empty());
        assert!(catalog.excluded_keywords().contains(&"checkout".to_string()));
    }

    #[test]
    fn provider_flag_defaults_to_hiding() {
        let catalog = SignatureCatalog::from_json(
            r##"{ "cmpProviders": [ { "name": "X", "selectors": { "container": ["#x"] } } ] }"##,
        )
        .unwrap();
        let provider = &catalog.cmp_providers[0];
        assert!(provider.hide_on_failure);
        assert!(provider.reject_button_selectors().is_empty());
    }

    #[test]
    fn patterns_are_flattened_and_deduplicated() {
        let catalog = SignatureCatalog::from_json(
            r#"{ "genericRejectPatterns": { "en": ["Reject", "decline"], "fr": ["refuser", "reject"] } }"#,
        )
        .unwrap();
        assert_eq!(catalog.reject_patterns(), vec!["reject", "decline", "refuser"]);
    }

    #[test]
    fn consent_keywords_merge_required() {
        let catalog = SignatureCatalog::from_json(
            r#"{ "safeguardKeywords": { "require": ["Datenschutz", "cookie"] } }"#,
        )
        .unwrap();
        let keywords = catalog.consent_keywords();
        assert!(keywords.contains(&"datenschutz".to_string()));
        assert_eq!(keywords.iter().filter(|k| *k == "cookie").count(), 1);
    }
}
