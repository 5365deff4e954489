use std::collections::VecDeque;
use std::sync::{Mutex as StdMutex, PoisonError};

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use unbanner_core::{ActionReport, Mode, ModeSelection, Reporter, ScanError, SettingsSource};

use crate::Storage;
use crate::settings::{IMPORTABLE_KEYS, SettingsDocument};

pub const MAX_LOG_ENTRIES: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionLogEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub report: ActionReport,
}

fn parse_mode(mode: &str) -> Option<Mode> {
    match mode {
        "normal" => Some(Mode::Normal),
        "extreme" => Some(Mode::Extreme),
        _ => None,
    }
}

/// Settings, statistics and the recent-action log, persisted through a [`Storage`].
pub struct SettingsStore<S: Storage> {
    storage: S,
    settings: Mutex<SettingsDocument>,
    log: StdMutex<VecDeque<ActionLogEntry>>,
}

impl<S: Storage> SettingsStore<S> {
    /// Unreadable settings are replaced by defaults.
    pub async fn open(storage: S) -> Self {
        let settings = match storage.load().await {
            Ok(Some(settings)) => settings,
            Ok(None) => SettingsDocument::default(),
            Err(e) => {
                warn!(error = %e, "settings unreadable, using defaults");
                SettingsDocument::default()
            }
        };
        Self { storage, settings: Mutex::new(settings), log: StdMutex::new(VecDeque::new()) }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub async fn snapshot(&self) -> SettingsDocument {
        self.settings.lock().await.clone()
    }

    /// Applies `change` to a copy and keeps it only once it is saved.
    async fn update<R>(&self, change: impl FnOnce(&mut SettingsDocument) -> R) -> Result<R> {
        let mut settings = self.settings.lock().await;
        let mut updated = settings.clone();
        let result = change(&mut updated);
        self.storage.save(&updated).await?;
        *settings = updated;
        Ok(result)
    }

    pub async fn set_global_enabled(&self, enabled: bool) -> Result<()> {
        self.update(|s| s.global_enabled = enabled).await
    }

    /// Only `normal` and `extreme` are accepted; returns false for anything else.
    pub async fn set_global_mode(&self, mode: &str) -> Result<bool> {
        let Some(mode) = parse_mode(mode) else {
            return Ok(false);
        };
        self.update(|s| s.filter_mode = mode).await?;
        Ok(true)
    }

    /// `default` removes the domain's override.
    pub async fn set_domain_mode(&self, domain: &str, mode: &str) -> Result<()> {
        let mode = match mode {
            "default" => None,
            other => match parse_mode(other) {
                Some(mode) => Some(mode),
                None => bail!("unknown filter mode '{}'", other),
            },
        };
        self.update(|s| s.set_domain_mode(domain, mode)).await
    }

    pub async fn add_to_allowlist(&self, domain: &str) -> Result<Vec<String>> {
        self.update(|s| {
            s.add_to_allowlist(domain);
            s.allowlist.clone()
        })
        .await
    }

    pub async fn remove_from_allowlist(&self, domain: &str) -> Result<Vec<String>> {
        self.update(|s| {
            s.remove_from_allowlist(domain);
            s.allowlist.clone()
        })
        .await
    }

    pub async fn set_debug_mode(&self, enabled: bool) -> Result<()> {
        self.update(|s| s.debug_mode = enabled).await
    }

    /// Default `tracing` filter directive for the current debug flag.
    pub async fn log_filter(&self) -> &'static str {
        if self.settings.lock().await.debug_mode { "debug" } else { "info" }
    }

    /// Newest last.
    pub fn recent_actions(&self) -> Vec<ActionLogEntry> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).iter().cloned().collect()
    }

    pub async fn record_action(&self, report: ActionReport) -> Result<()> {
        let blocked = report.kind.is_banner_action();
        {
            let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
            log.push_back(ActionLogEntry { timestamp: Utc::now(), report });
            while log.len() > MAX_LOG_ENTRIES {
                log.pop_front();
            }
        }
        if blocked {
            self.update(|s| s.stats.banners_blocked += 1).await?;
        }
        Ok(())
    }

    pub async fn record_site_processed(&self) -> Result<()> {
        self.update(|s| s.stats.sites_processed += 1).await
    }

    pub async fn export(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&*self.settings.lock().await)?)
    }

    /// Merges the known keys of `json` into the current settings. Unknown keys
    /// are ignored; nothing changes if the result does not parse.
    pub async fn import(&self, json: &str) -> Result<()> {
        let Value::Object(incoming) = serde_json::from_str::<Value>(json)? else {
            bail!("Invalid settings format");
        };

        let mut settings = self.settings.lock().await;
        let Value::Object(mut merged) = serde_json::to_value(&*settings)? else {
            bail!("settings did not serialize to an object");
        };
        for key in IMPORTABLE_KEYS {
            if let Some(value) = incoming.get(*key) {
                merged.insert(key.to_string(), value.clone());
            }
        }
        let imported: SettingsDocument = serde_json::from_value(Value::Object(merged))?;
        self.storage.save(&imported).await?;
        *settings = imported;
        debug!("settings imported");
        Ok(())
    }
}

#[async_trait]
impl<S: Storage> SettingsSource for SettingsStore<S> {
    async fn resolve_mode(&self, domain: &str) -> Result<ModeSelection, ScanError> {
        Ok(self.settings.lock().await.resolve_mode(domain))
    }

    async fn is_domain_allowed(&self, domain: &str) -> Result<bool, ScanError> {
        Ok(self.settings.lock().await.is_domain_allowed(domain))
    }
}

#[async_trait]
impl<S: Storage> Reporter for SettingsStore<S> {
    async fn report(&self, report: ActionReport) {
        if let Err(e) = self.record_action(report).await {
            warn!(error = %e, "failed to persist action");
        }
    }

    async fn site_processed(&self, domain: &str) {
        if let Err(e) = self.record_site_processed().await {
            warn!(domain, error = %e, "failed to persist site count");
        }
    }
}
