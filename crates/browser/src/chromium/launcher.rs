use std::path::PathBuf;
use std::sync::Arc;

use chromiumoxide::browser::{Browser, BrowserConfig as ChromeConfig, HeadlessMode};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use unbanner_core::ScanError;

use super::consent::ConsentOverride;
use super::document::ChromiumDocument;
use super::wait::WaitStrategy;
use crate::shared::{LaunchOptions, TimeoutConfig, to_scan_error};

/// A navigated page, with the consent override registered before its first script.
pub struct OpenedPage {
    pub document: Arc<ChromiumDocument>,
    pub consent: ConsentOverride,
}

pub struct ChromiumBrowser {
    browser: Browser,
    handler: JoinHandle<()>,
    user_data_dir: PathBuf,
    timeout_config: TimeoutConfig,
}

impl ChromiumBrowser {
    pub async fn launch(options: LaunchOptions, timeout_config: TimeoutConfig) -> Result<Self, ScanError> {
        let user_data_dir = std::env::temp_dir().join(format!("unbanner-chromium-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&user_data_dir)
            .await
            .map_err(|e| ScanError::browser_error(format!("Failed to create temp dir: {}", e)))?;

        let mut builder = ChromeConfig::builder()
            .headless_mode(if options.headless { HeadlessMode::True } else { HeadlessMode::False })
            .user_data_dir(&user_data_dir);
        if let Some((width, height)) = options.window_size {
            builder = builder.window_size(width, height);
        }

        let chrome_cfg = builder
            .build()
            .map_err(|e| ScanError::browser_error(format!("Config failed: {}", e)))?;

        let (browser, mut handler) = Browser::launch(chrome_cfg)
            .await
            .map_err(|e| to_scan_error(e, "Launch"))?;

        let handler = tokio::spawn(async move { while handler.next().await.is_some() {} });
        info!(headless = options.headless, "chromium launched");
        Ok(Self { browser, handler, user_data_dir, timeout_config })
    }

    /// Opens `url` in a new tab. The consent override is registered before
    /// navigation so it wins the race against the page's own CMP.
    pub async fn open(&self, url: &str) -> Result<OpenedPage, ScanError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| to_scan_error(e, "New page"))?;

        let consent = ConsentOverride::new(page.clone());
        consent.prepare().await?;

        debug!(url, "navigating");
        tokio::time::timeout(self.timeout_config.navigation, page.goto(url))
            .await
            .map_err(|e| to_scan_error(e, "Navigation"))?
            .map_err(|e| to_scan_error(e, "Navigation"))?;

        WaitStrategy::new(self.timeout_config.clone()).wait_for_ready(&page).await?;
        info!(url, "page loaded");

        Ok(OpenedPage { document: Arc::new(ChromiumDocument::new(page)), consent })
    }

    pub fn timeout_config(&self) -> &TimeoutConfig {
        &self.timeout_config
    }

    pub async fn close(mut self) -> Result<(), ScanError> {
        self.browser.close().await.map_err(|e| to_scan_error(e, "Close"))?;
        self.handler.abort();
        if let Err(e) = tokio::fs::remove_dir_all(&self.user_data_dir).await {
            warn!(path = %self.user_data_dir.display(), error = %e, "could not remove browser profile");
        }
        Ok(())
    }
}
