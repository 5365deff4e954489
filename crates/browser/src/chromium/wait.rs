use std::sync::Arc;

use chromiumoxide::page::Page;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant, sleep};
use tracing::{debug, warn};
use unbanner_core::ScanError;
use unbanner_dom::{DomError, MutationRecord};

use super::document::ChromiumDocument;
use crate::shared::{TimeoutConfig, is_context_lost, js, to_scan_error};

/// Consecutive failed drains before the watcher gives up on the page.
const MAX_DRAIN_FAILURES: u32 = 20;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadState {
    ready_state: String,
    loading: bool,
    has_body: bool,
}

pub struct WaitStrategy {
    config: TimeoutConfig,
}

impl WaitStrategy {
    pub fn new(config: TimeoutConfig) -> Self {
        Self { config }
    }

    /// Waits for the DOM to be parsed. Times out softly: the scan can still work
    /// on a partial page.
    pub async fn wait_for_ready(&self, page: &Page) -> Result<(), ScanError> {
        let start = Instant::now();
        loop {
            let js = js::build_js_call(js::wait::CHECK_LOADING, &[]);
            match page.evaluate(js).await {
                Ok(result) => {
                    let state = result.value().and_then(|v| serde_json::from_value::<LoadState>(v.clone()).ok());
                    if let Some(state) = state {
                        if !state.loading && state.has_body {
                            debug!(ready_state = %state.ready_state, elapsed_ms = start.elapsed().as_millis() as u64, "page ready");
                            return Ok(());
                        }
                    }
                }
                Err(e) if is_context_lost(&e.to_string()) => {
                    debug!("page context changed while waiting, retrying");
                }
                Err(e) => return Err(to_scan_error(e, "WaitForReady")),
            }

            if start.elapsed() > self.config.page_ready {
                warn!(timeout_ms = self.config.page_ready.as_millis() as u64, "page not ready in time, continuing anyway");
                return Ok(());
            }
            sleep(self.config.check_interval).await;
        }
    }
}

/// Starts a mutation observer in the page and forwards its records until the
/// receiver is dropped or the page stops answering.
pub async fn watch_mutations(
    doc: Arc<ChromiumDocument>,
    interval: Duration,
) -> Result<mpsc::UnboundedReceiver<MutationRecord>, DomError> {
    doc.call::<bool>(js::wait::OBSERVE_MUTATIONS, &[]).await?;
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut failures = 0;
        loop {
            sleep(interval).await;
            if tx.is_closed() {
                break;
            }
            match doc.call::<Option<Vec<MutationRecord>>>(js::wait::DRAIN_MUTATIONS, &[]).await {
                Ok(Some(records)) => {
                    failures = 0;
                    for record in records {
                        if tx.send(record).is_err() {
                            return;
                        }
                    }
                }
                Ok(None) => {
                    debug!("mutation observer gone, reinstalling");
                    if let Err(e) = doc.call::<bool>(js::wait::OBSERVE_MUTATIONS, &[]).await {
                        debug!(error = %e, "observer reinstall failed");
                    }
                }
                Err(e) => {
                    failures += 1;
                    debug!(error = %e, failures, "mutation drain failed");
                    if failures >= MAX_DRAIN_FAILURES {
                        warn!("page stopped answering, mutation watch ended");
                        break;
                    }
                }
            }
        }
    });

    Ok(rx)
}
