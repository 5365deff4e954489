use async_trait::async_trait;

use crate::policy::ModeSelection;
use crate::ScanError;

/// Settings collaborator consulted once per page load.
#[async_trait]
pub trait SettingsSource: Send + Sync {
    /// Effective mode for `domain`: per-domain override, then global setting.
    async fn resolve_mode(&self, domain: &str) -> Result<ModeSelection, ScanError>;

    /// False when the user allowlisted `domain`.
    async fn is_domain_allowed(&self, domain: &str) -> Result<bool, ScanError>;
}

/// Settings that never change, for embedding and tests.
#[derive(Debug, Clone)]
pub struct FixedSettings {
    pub selection: ModeSelection,
    pub allowed: bool,
}

impl FixedSettings {
    pub fn new(selection: ModeSelection) -> Self {
        Self { selection, allowed: true }
    }

    pub fn allowlisted(mut self) -> Self {
        self.allowed = false;
        self
    }
}

#[async_trait]
impl SettingsSource for FixedSettings {
    async fn resolve_mode(&self, _domain: &str) -> Result<ModeSelection, ScanError> {
        Ok(self.selection)
    }

    async fn is_domain_allowed(&self, _domain: &str) -> Result<bool, ScanError> {
        Ok(self.allowed)
    }
}
