use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    #[serde(rename = "known_cmp_reject")]
    KnownCmpReject,
    #[serde(rename = "known_cmp_hide")]
    KnownCmpHide,
    #[serde(rename = "Banner Rejected")]
    BannerRejected,
    #[serde(rename = "Banner Removed")]
    BannerRemoved,
    #[serde(rename = "Banner Closed")]
    BannerClosed,
    #[serde(rename = "TCF Override")]
    TcfOverride,
    #[serde(rename = "TCF Detected")]
    TcfDetected,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::KnownCmpReject => "known_cmp_reject",
            ActionKind::KnownCmpHide => "known_cmp_hide",
            ActionKind::BannerRejected => "Banner Rejected",
            ActionKind::BannerRemoved => "Banner Removed",
            ActionKind::BannerClosed => "Banner Closed",
            ActionKind::TcfOverride => "TCF Override",
            ActionKind::TcfDetected => "TCF Detected",
        }
    }

    /// Counts toward the "banners blocked" statistic.
    pub fn is_banner_action(&self) -> bool {
        !matches!(self, ActionKind::TcfOverride | ActionKind::TcfDetected)
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionReport {
    #[serde(rename = "action")]
    pub kind: ActionKind,
    pub detail: String,
    pub domain: String,
}

impl ActionReport {
    pub fn new(kind: ActionKind, detail: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            domain: domain.into(),
        }
    }
}

/// Receives a record of every action taken on a page.
///
/// Reporting is best effort: implementations swallow their own failures, the
/// host context may already be gone.
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn report(&self, report: ActionReport);

    /// A page finished its first scan with protection active.
    async fn site_processed(&self, _domain: &str) {}
}

pub struct NullReporter;

#[async_trait]
impl Reporter for NullReporter {
    async fn report(&self, _report: ActionReport) {}
}

/// Emits reports as log events.
pub struct TracingReporter;

#[async_trait]
impl Reporter for TracingReporter {
    async fn report(&self, report: ActionReport) {
        info!(action = %report.kind, domain = %report.domain, "{}", report.detail);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_serialize_with_their_wire_names() {
        let report = ActionReport::new(ActionKind::BannerRemoved, "hid #cookie-wall", "example.com");
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["action"], "Banner Removed");
        assert_eq!(serde_json::to_value(ActionKind::KnownCmpReject).unwrap(), "known_cmp_reject");
    }

    #[test]
    fn tcf_kinds_are_not_banner_actions() {
        assert!(ActionKind::KnownCmpHide.is_banner_action());
        assert!(!ActionKind::TcfDetected.is_banner_action());
    }
}
