pub mod settings;
pub mod store;

pub use settings::{DomainOverride, IMPORTABLE_KEYS, SettingsDocument, Stats, normalize_domain};
pub use store::{ActionLogEntry, MAX_LOG_ENTRIES, SettingsStore};

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[async_trait]
pub trait Storage: Send + Sync {
    /// `None` when nothing was saved yet.
    async fn load(&self) -> Result<Option<SettingsDocument>>;
    async fn save(&self, settings: &SettingsDocument) -> Result<()>;
}

pub struct JsonFileStorage {
    pub path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(folder: &str) -> Self {
        std::fs::create_dir_all(folder).ok(); // ensure folder exists
        Self { path: Path::new(folder).join("settings.json") }
    }
}

#[async_trait]
impl Storage for JsonFileStorage {
    async fn load(&self) -> Result<Option<SettingsDocument>> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("reading {}", self.path.display())),
        };
        let settings = serde_json::from_str(&data).with_context(|| format!("parsing {}", self.path.display()))?;
        Ok(Some(settings))
    }

    async fn save(&self, settings: &SettingsDocument) -> Result<()> {
        let data = serde_json::to_string_pretty(settings)?;
        tokio::fs::write(&self.path, data).await?;
        Ok(())
    }
}

/// Keeps settings in memory only.
#[derive(Default)]
pub struct MemoryStorage {
    saved: Mutex<Option<SettingsDocument>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(settings: SettingsDocument) -> Self {
        Self { saved: Mutex::new(Some(settings)) }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn load(&self) -> Result<Option<SettingsDocument>> {
        Ok(self.saved.lock().map_err(|_| anyhow::anyhow!("settings lock poisoned"))?.clone())
    }

    async fn save(&self, settings: &SettingsDocument) -> Result<()> {
        *self.saved.lock().map_err(|_| anyhow::anyhow!("settings lock poisoned"))? = Some(settings.clone());
        Ok(())
    }
}
