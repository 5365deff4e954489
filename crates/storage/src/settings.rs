use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use unbanner_core::{Mode, ModeSelection};

/// Keys `import` accepts; anything else in an imported document is ignored.
pub const IMPORTABLE_KEYS: &[&str] =
    &["globalEnabled", "debugMode", "allowlist", "stats", "filterMode", "perDomainOverrides"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    #[serde(default)]
    pub banners_blocked: u64,
    #[serde(default)]
    pub sites_processed: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_mode: Option<Mode>,
}

impl DomainOverride {
    pub fn is_empty(&self) -> bool {
        self.filter_mode.is_none()
    }
}

/// The persisted user settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsDocument {
    pub global_enabled: bool,
    pub filter_mode: Mode,
    pub per_domain_overrides: BTreeMap<String, DomainOverride>,
    pub allowlist: Vec<String>,
    pub debug_mode: bool,
    pub stats: Stats,
}

impl Default for SettingsDocument {
    fn default() -> Self {
        Self {
            global_enabled: true,
            filter_mode: Mode::Normal,
            per_domain_overrides: BTreeMap::new(),
            allowlist: Vec::new(),
            debug_mode: false,
            stats: Stats::default(),
        }
    }
}

/// Lowercase host without scheme, leading `www.`, path or surrounding whitespace.
pub fn normalize_domain(domain: &str) -> String {
    let lower = domain.trim().to_lowercase();
    let without_scheme = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))
        .unwrap_or(&lower);
    let without_www = without_scheme.strip_prefix("www.").unwrap_or(without_scheme);
    let host = without_www.split('/').next().unwrap_or_default();
    host.trim().to_string()
}

impl SettingsDocument {
    /// `domain` equals an entry or is a subdomain of one.
    pub fn is_allowlisted(&self, domain: &str) -> bool {
        let domain = normalize_domain(domain);
        self.allowlist
            .iter()
            .any(|entry| domain == *entry || domain.strip_suffix(entry.as_str()).is_some_and(|rest| rest.ends_with('.')))
    }

    pub fn is_domain_allowed(&self, domain: &str) -> bool {
        self.global_enabled && !self.is_allowlisted(domain)
    }

    /// Disabled when protection is off or the domain is allowlisted, whatever
    /// override it carries. Otherwise the domain's override, else the global mode.
    pub fn resolve_mode(&self, domain: &str) -> ModeSelection {
        if !self.is_domain_allowed(domain) {
            return ModeSelection::Disabled;
        }
        let mode = self
            .per_domain_overrides
            .get(&normalize_domain(domain))
            .and_then(|o| o.filter_mode)
            .unwrap_or(self.filter_mode);
        mode.into()
    }

    /// `None` clears the override and drops the entry once it is empty.
    pub fn set_domain_mode(&mut self, domain: &str, mode: Option<Mode>) {
        let domain = normalize_domain(domain);
        match mode {
            Some(mode) => {
                self.per_domain_overrides.entry(domain).or_default().filter_mode = Some(mode);
            }
            None => {
                if let Some(entry) = self.per_domain_overrides.get_mut(&domain) {
                    entry.filter_mode = None;
                    if entry.is_empty() {
                        self.per_domain_overrides.remove(&domain);
                    }
                }
            }
        }
    }

    /// Returns false when the domain was already listed.
    pub fn add_to_allowlist(&mut self, domain: &str) -> bool {
        let domain = normalize_domain(domain);
        if domain.is_empty() || self.allowlist.contains(&domain) {
            return false;
        }
        self.allowlist.push(domain);
        true
    }

    pub fn remove_from_allowlist(&mut self, domain: &str) -> bool {
        let domain = normalize_domain(domain);
        let before = self.allowlist.len();
        self.allowlist.retain(|d| *d != domain);
        self.allowlist.len() != before
    }
}
