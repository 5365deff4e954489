use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::page::Page;
use serde::Deserialize;
use tracing::debug;
use unbanner_core::ScanError;
use unbanner_tcf::{FrameInfo, OverrideMarker, ShimOutcome, ShimTarget, TcfError, has_locator_frame};

use crate::shared::{js, to_scan_error};

#[derive(Debug, Deserialize)]
struct Claim {
    marker: OverrideMarker,
    #[serde(default)]
    frames: Vec<FrameInfo>,
}

impl Claim {
    fn into_outcome(self) -> ShimOutcome {
        let locator_detected = has_locator_frame(&self.frames);
        ShimOutcome { marker: self.marker, locator_detected }
    }
}

/// The `__tcfapi` override for a Chromium page.
pub struct ConsentOverride {
    page: Page,
    script: String,
}

impl ConsentOverride {
    pub fn new(page: Page) -> Self {
        Self { page, script: js::consent::override_script() }
    }

    /// Registers the override to run before any page script on every
    /// navigation. Call before `goto`.
    pub async fn prepare(&self) -> Result<(), ScanError> {
        self.page
            .evaluate_on_new_document(AddScriptToEvaluateOnNewDocumentParams::new(self.script.clone()))
            .await
            .map_err(|e| to_scan_error(e, "Register consent override"))?;
        debug!("consent override registered for new documents");
        Ok(())
    }
}

#[async_trait]
impl ShimTarget for ConsentOverride {
    /// Installs now if [`prepare`](Self::prepare) was skipped, then claims the
    /// page's install result. `None` once it has been claimed.
    async fn install_override(&self) -> Result<Option<ShimOutcome>, TcfError> {
        let installed_now = self
            .page
            .evaluate(self.script.clone())
            .await
            .map_err(|e| TcfError::Host(e.to_string()))?;
        if installed_now.value().and_then(|v| v.as_bool()) == Some(true) {
            debug!("consent override installed late, after page scripts");
        }

        let claimed = self
            .page
            .evaluate(js::build_js_call(&js::consent::claim_outcome_script(), &[]))
            .await
            .map_err(|e| TcfError::Host(e.to_string()))?;
        let claim: Option<Claim> = match claimed.value() {
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| TcfError::Host(e.to_string()))?,
            None => None,
        };
        Ok(claim.map(Claim::into_outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn claims_detect_locator_frames() {
        let claim: Claim = serde_json::from_value(json!({
            "marker": { "type": "UNBANNER_TCF_OVERRIDE", "success": true, "hadExistingImplementation": true },
            "frames": [{ "name": "__tcfapiLocator", "src": "" }]
        }))
        .unwrap();
        let outcome = claim.into_outcome();
        assert!(outcome.locator_detected);
        assert!(outcome.tcf_detected());

        let quiet: Claim = serde_json::from_value(json!({
            "marker": { "type": "UNBANNER_TCF_OVERRIDE", "success": true, "hadExistingImplementation": false },
            "frames": [{ "name": "video", "src": "https://player.example/embed" }]
        }))
        .unwrap();
        assert!(!quiet.into_outcome().tcf_detected());
    }
}
