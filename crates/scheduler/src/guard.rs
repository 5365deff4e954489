use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use unbanner_core::{ActionKind, PolicyOverrides, Reporter, SettingsSource, SignatureCatalog};
use unbanner_dom::Document;
use unbanner_engine::ScanSession;
use unbanner_tcf::ShimTarget;

use crate::{Scheduler, Trigger};

const TRIGGER_CAPACITY: usize = 64;

/// Brings protection up on one page: resolves the policy, installs the consent
/// override, then hands back a scheduler ready to run.
pub struct PageGuard {
    settings: Arc<dyn SettingsSource>,
    catalog: Arc<SignatureCatalog>,
    reporter: Arc<dyn Reporter>,
    overrides: Option<PolicyOverrides>,
}

impl PageGuard {
    pub fn new(settings: Arc<dyn SettingsSource>, catalog: Arc<SignatureCatalog>, reporter: Arc<dyn Reporter>) -> Self {
        Self { settings, catalog, reporter, overrides: None }
    }

    /// Tuning applied on top of whichever mode the page resolves to.
    pub fn with_overrides(mut self, overrides: PolicyOverrides) -> Self {
        self.overrides = Some(overrides);
        self
    }

    /// `None` when the page must be left alone (allowlisted or disabled).
    pub async fn attach<D, T>(&self, doc: Arc<D>, shim: &T) -> Option<(Scheduler<D>, mpsc::Receiver<Trigger>)>
    where
        D: Document + ?Sized + 'static,
        T: ShimTarget + ?Sized,
    {
        let domain = doc.hostname().await.unwrap_or_else(|e| {
            warn!(error = %e, "hostname unavailable");
            String::new()
        });
        let mut session =
            ScanSession::resolve(self.settings.as_ref(), &domain, Arc::clone(&self.catalog), Arc::clone(&self.reporter))
                .await?;
        if let Some(overrides) = &self.overrides {
            session = session.with_overrides(overrides);
        }

        match shim.install_override().await {
            Ok(Some(outcome)) => {
                if outcome.marker.success {
                    session.report(ActionKind::TcfOverride, "consent API answers reject-all").await;
                } else {
                    warn!(%domain, "page kept its own consent API, falling back to banner removal");
                    session
                        .report(ActionKind::TcfOverride, "override refused by the page, falling back to banner removal")
                        .await;
                }
                if outcome.tcf_detected() {
                    session.report(ActionKind::TcfDetected, "page ships a TCF consent platform").await;
                }
            }
            Ok(None) => debug!(%domain, "consent override already installed"),
            Err(e) => {
                warn!(%domain, error = %e, "consent override failed, continuing with banner removal");
                session
                    .report(ActionKind::TcfOverride, format!("override failed ({}), falling back to banner removal", e))
                    .await;
            }
        }

        // late CMP scripts get a moment to hit the override before the first scan
        tokio::time::sleep(session.policy.timings.shim_grace).await;
        session.site_processed().await;
        info!(%domain, mode = session.policy.mode.as_str(), "page guard attached");

        Some(Scheduler::new(doc, Arc::new(session), TRIGGER_CAPACITY))
    }
}
