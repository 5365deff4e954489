use serde::Serialize;
use tracing::{debug, warn};
use unbanner_dom::{Document, has_scroll_lock, restore_scroll};

use crate::classifier::{ClassifierReport, classify};
use crate::resolver::{ResolverOutcome, resolve_known_provider};
use crate::session::ScanSession;

/// Result of one scan pass over a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ScanOutcome {
    /// Embedded frame too small to hold a banner
    Skipped,
    KnownProvider(ResolverOutcome),
    Heuristic(ClassifierReport),
}

impl ScanOutcome {
    /// Whether anything on the page was clicked or hidden.
    pub fn acted(&self) -> bool {
        match self {
            ScanOutcome::Skipped => false,
            ScanOutcome::KnownProvider(outcome) => outcome.is_handled(),
            ScanOutcome::Heuristic(report) => report.acted() > 0,
        }
    }
}

/// Frames below the minimum size are throttled; top-level documents never are.
pub async fn should_scan<D: Document + ?Sized>(doc: &D, session: &ScanSession) -> bool {
    match doc.frame().await {
        Ok(frame) => {
            let min = session.policy.timings.min_frame_size;
            frame.top_level || (frame.width >= min && frame.height >= min)
        }
        Err(e) => {
            warn!(error = %e, "frame context unavailable, scanning anyway");
            true
        }
    }
}

/// One pass: known providers first, the heuristic classifier only when none
/// matched. Any scroll lock left over afterwards is released.
pub async fn scan_page<D: Document + ?Sized>(doc: &D, session: &ScanSession) -> ScanOutcome {
    if !should_scan(doc, session).await {
        debug!(domain = %session.domain, "frame below minimum size, skipped");
        return ScanOutcome::Skipped;
    }

    let outcome = match resolve_known_provider(doc, session).await {
        ResolverOutcome::NotFound => ScanOutcome::Heuristic(classify(doc, session).await),
        handled => ScanOutcome::KnownProvider(handled),
    };

    if has_scroll_lock(doc).await {
        restore_scroll(doc).await;
    }
    outcome
}
