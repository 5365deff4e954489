use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};
use unbanner_core::{
    ActionKind, ActionReport, ModeSelection, NullReporter, Policy, PolicyOverrides, Reporter, SettingsSource,
    SignatureCatalog,
};
use unbanner_dom::NodeId;

/// Accept/confirm wording, used to tell accept buttons from reject buttons.
pub const ACCEPT_PATTERNS: &[&str] = &[
    "accept", "agree", "allow", "akkoord", "accepteer", "toestaan", "akzeptieren", "accepter", "aceptar", "accetta",
    "ok", "got it",
];

/// Lowercased word lists derived from the catalog once per page.
#[derive(Debug, Clone)]
pub struct Lexicon {
    pub reject: Vec<String>,
    pub accept: Vec<String>,
    pub close: Vec<String>,
    pub consent_keywords: Vec<String>,
    pub required: Vec<String>,
    pub excluded: Vec<String>,
}

impl Lexicon {
    pub fn from_catalog(catalog: &SignatureCatalog) -> Self {
        let mut reject = catalog.reject_patterns();
        // longest first, so "reject all" is consumed before "reject"
        reject.sort_by_key(|p| std::cmp::Reverse(p.chars().count()));
        Self {
            reject,
            accept: ACCEPT_PATTERNS.iter().map(|s| s.to_string()).collect(),
            close: catalog.close_patterns(),
            consent_keywords: catalog.consent_keywords(),
            required: catalog.required_keywords(),
            excluded: catalog.excluded_keywords(),
        }
    }

    /// Reject wording with no accept wording left once the reject phrases are
    /// taken out ("disagree" and "do not accept" are rejections).
    pub fn is_reject(&self, text: &str) -> bool {
        let mut rest = text.to_string();
        let mut hit = false;
        for pattern in &self.reject {
            if matches_pattern(&rest, pattern) {
                hit = true;
                rest = if pattern.chars().count() <= 2 { String::new() } else { rest.replace(pattern.as_str(), " ") };
            }
        }
        hit && !self.is_accept(&rest)
    }

    pub fn is_accept(&self, text: &str) -> bool {
        self.accept.iter().any(|p| matches_pattern(text, p))
    }
}

/// Case-insensitive fragment match. Patterns of one or two characters ("x",
/// "ok") only match the whole text, so they do not fire inside longer words.
pub fn matches_pattern(text: &str, pattern: &str) -> bool {
    let text = text.trim();
    if pattern.chars().count() <= 2 {
        text.split_whitespace().eq(pattern.split_whitespace())
    } else {
        text.contains(pattern)
    }
}

/// Everything one page load scans with: the catalog, the resolved policy, and
/// the set of elements already acted upon.
pub struct ScanSession {
    pub domain: String,
    pub catalog: Arc<SignatureCatalog>,
    pub policy: Policy,
    pub lexicon: Lexicon,
    reporter: Arc<dyn Reporter>,
    processed: Mutex<HashSet<NodeId>>,
}

impl ScanSession {
    pub fn new(domain: impl Into<String>, catalog: Arc<SignatureCatalog>, policy: Policy, reporter: Arc<dyn Reporter>) -> Self {
        let lexicon = Lexicon::from_catalog(&catalog);
        Self { domain: domain.into(), catalog, policy, lexicon, reporter, processed: Mutex::new(HashSet::new()) }
    }

    /// Session with the bundled catalog and no reporting.
    pub fn with_policy(domain: impl Into<String>, policy: Policy) -> Self {
        Self::new(domain, Arc::new(SignatureCatalog::bundled()), policy, Arc::new(NullReporter))
    }

    /// Resolves the page's policy from settings. `None` means the page must be
    /// left alone: the domain is allowlisted or protection is disabled.
    ///
    /// Settings failures fail open: the domain is treated as allowed, in normal mode.
    pub async fn resolve(
        settings: &dyn SettingsSource,
        domain: &str,
        catalog: Arc<SignatureCatalog>,
        reporter: Arc<dyn Reporter>,
    ) -> Option<Self> {
        let allowed = settings.is_domain_allowed(domain).await.unwrap_or_else(|e| {
            warn!(domain, error = %e, "allowlist lookup failed, proceeding");
            true
        });
        if !allowed {
            info!(domain, "domain is allowlisted, skipping");
            return None;
        }

        let selection = settings.resolve_mode(domain).await.unwrap_or_else(|e| {
            warn!(domain, error = %e, "mode lookup failed, using normal mode");
            ModeSelection::Normal
        });
        let Some(mode) = selection.mode() else {
            info!(domain, "protection disabled for domain");
            return None;
        };

        debug!(domain, mode = mode.as_str(), "scan session resolved");
        Some(Self::new(domain, catalog, Policy::for_mode(mode), reporter))
    }

    /// Replaces the mode defaults with any tuning the overrides set.
    pub fn with_overrides(mut self, overrides: &PolicyOverrides) -> Self {
        self.policy = self.policy.apply(overrides);
        debug!(
            domain = %self.domain,
            action_threshold = self.policy.action_threshold,
            force_hide_threshold = self.policy.force_hide_threshold,
            "policy overrides applied"
        );
        self
    }

    pub fn is_processed(&self, node: NodeId) -> bool {
        self.processed.lock().unwrap_or_else(PoisonError::into_inner).contains(&node)
    }

    /// Records `node` as handled. False if it already was, in which case the
    /// caller must not act on it again.
    pub fn mark_processed(&self, node: NodeId) -> bool {
        self.processed.lock().unwrap_or_else(PoisonError::into_inner).insert(node)
    }

    pub fn processed_count(&self) -> usize {
        self.processed.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub async fn report(&self, kind: ActionKind, detail: impl Into<String>) {
        let report = ActionReport::new(kind, detail, self.domain.clone());
        info!(action = %report.kind, domain = %report.domain, detail = %report.detail, "action taken");
        self.reporter.report(report).await;
    }

    pub async fn site_processed(&self) {
        self.reporter.site_processed(&self.domain).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unbanner_core::{FixedSettings, Mode, ScanError};

    #[test]
    fn short_patterns_need_the_whole_text() {
        assert!(matches_pattern("x", "x"));
        assert!(matches_pattern(" ok ", "ok"));
        assert!(!matches_pattern("reject cookies", "ok"));
        assert!(!matches_pattern("next", "x"));
        assert!(matches_pattern("reject all", "reject"));
    }

    #[test]
    fn reject_requires_absence_of_accept_wording() {
        let lexicon = Lexicon::from_catalog(&SignatureCatalog::bundled());
        assert!(lexicon.is_reject("reject all"));
        assert!(lexicon.is_reject("reject cookies"));
        assert!(!lexicon.is_reject("accept or reject"));
        assert!(lexicon.is_reject("disagree"));
        assert!(lexicon.is_reject("do not accept"));
        assert!(lexicon.is_reject("niet akkoord"));
        assert!(lexicon.is_accept("accept all"));
    }

    #[test]
    fn processed_set_inserts_once() {
        let session = ScanSession::with_policy("example.com", Policy::normal());
        assert!(session.mark_processed(NodeId(4)));
        assert!(!session.mark_processed(NodeId(4)));
        assert!(session.is_processed(NodeId(4)));
        assert_eq!(session.processed_count(), 1);
    }

    struct BrokenSettings;

    #[async_trait::async_trait]
    impl SettingsSource for BrokenSettings {
        async fn resolve_mode(&self, _domain: &str) -> Result<ModeSelection, ScanError> {
            Err(ScanError::settings_error("channel closed"))
        }
        async fn is_domain_allowed(&self, _domain: &str) -> Result<bool, ScanError> {
            Err(ScanError::settings_error("channel closed"))
        }
    }

    #[tokio::test]
    async fn resolution_respects_allowlist_and_fails_open() {
        let catalog = Arc::new(SignatureCatalog::empty());
        let reporter: Arc<dyn Reporter> = Arc::new(NullReporter);

        let extreme_but_allowlisted = FixedSettings::new(ModeSelection::Extreme).allowlisted();
        assert!(ScanSession::resolve(&extreme_but_allowlisted, "a.com", catalog.clone(), reporter.clone()).await.is_none());

        let disabled = FixedSettings::new(ModeSelection::Disabled);
        assert!(ScanSession::resolve(&disabled, "a.com", catalog.clone(), reporter.clone()).await.is_none());

        let session = ScanSession::resolve(&BrokenSettings, "a.com", catalog, reporter).await.unwrap();
        assert_eq!(session.policy.mode, Mode::Normal);
    }
}
