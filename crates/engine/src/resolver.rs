//! Known consent-management platforms, handled through their catalog selectors.

use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, info};
use unbanner_core::{ActionKind, Provider};
use unbanner_dom::{Document, NodeId, QueryRoot, deep_query_all, hide_element, is_visible, restore_scroll, safe_click};

use crate::session::ScanSession;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ResolverOutcome {
    /// No provider's container is visible
    NotFound,
    /// A reject button made the banner go away
    Rejected(String),
    /// The reject buttons failed and the container was hidden
    Removed(String),
}

impl ResolverOutcome {
    pub fn is_handled(&self) -> bool {
        !matches!(self, ResolverOutcome::NotFound)
    }
}

async fn first_visible<D: Document + ?Sized>(doc: &D, selector: &str) -> Option<NodeId> {
    for node in deep_query_all(doc, selector, QueryRoot::Document).await {
        if is_visible(doc, node).await {
            return Some(node);
        }
    }
    None
}

/// First visible container of `provider`, trying its selectors in order.
pub async fn find_container<D: Document + ?Sized>(doc: &D, provider: &Provider) -> Option<NodeId> {
    for selector in provider.container_selectors() {
        if let Some(node) = first_visible(doc, selector).await {
            return Some(node);
        }
    }
    None
}

async fn try_reject<D: Document + ?Sized>(doc: &D, session: &ScanSession, provider: &Provider) -> bool {
    for selector in provider.reject_button_selectors() {
        let Some(button) = first_visible(doc, selector).await else {
            continue;
        };
        debug!(provider = %provider.name, selector = %selector, "clicking reject button");
        if !safe_click(doc, button).await {
            continue;
        }
        sleep(session.policy.timings.settle_delay).await;
        if find_container(doc, provider).await.is_none() {
            return true;
        }
    }
    false
}

/// Checks providers in catalog order and handles the first one whose banner
/// is on screen. Later providers are not considered once one matched.
pub async fn resolve_known_provider<D: Document + ?Sized>(doc: &D, session: &ScanSession) -> ResolverOutcome {
    for provider in &session.catalog.cmp_providers {
        let Some(container) = find_container(doc, provider).await else {
            continue;
        };
        info!(provider = %provider.name, %container, "known consent platform detected");

        if try_reject(doc, session, provider).await {
            restore_scroll(doc).await;
            session.report(ActionKind::KnownCmpReject, format!("{}: rejected", provider.name)).await;
            return ResolverOutcome::Rejected(provider.name.clone());
        }

        if session.policy.force_hide_known_cmp || provider.hide_on_failure {
            hide_element(doc, container).await;
            restore_scroll(doc).await;
            session.report(ActionKind::KnownCmpHide, format!("{}: hidden", provider.name)).await;
            return ResolverOutcome::Removed(provider.name.clone());
        }

        debug!(provider = %provider.name, "reject failed and provider is not force-hidden");
        return ResolverOutcome::NotFound;
    }
    ResolverOutcome::NotFound
}

#[cfg(test)]
mod tests {
    use super::*;
    use unbanner_core::Policy;
    use unbanner_dom::{ClickEffect, ElementSpec, MemoryDocument};

    #[tokio::test(start_paused = true)]
    async fn sourcepoint_is_left_alone_in_normal_mode_when_reject_fails() {
        let doc = MemoryDocument::new("news.example");
        let container = doc
            .append(doc.body_id(), ElementSpec::new("div").id("sp_message_container_123"))
            .unwrap();
        doc.append(container, ElementSpec::new("button").attr("title", "Reject All")).unwrap();

        let session = ScanSession::with_policy("news.example", Policy::normal());
        assert_eq!(resolve_known_provider(&doc, &session).await, ResolverOutcome::NotFound);
        assert!(is_visible(&doc, container).await);

        let session = ScanSession::with_policy("news.example", Policy::extreme());
        assert_eq!(resolve_known_provider(&doc, &session).await, ResolverOutcome::Removed("Sourcepoint".into()));
        assert!(!is_visible(&doc, container).await);
    }

    #[tokio::test(start_paused = true)]
    async fn hidden_containers_are_not_matched() {
        let doc = MemoryDocument::new("shop.example");
        let banner = doc
            .append(doc.body_id(), ElementSpec::new("div").id("onetrust-banner-sdk").style("display: none"))
            .unwrap();
        let button = doc.append(banner, ElementSpec::new("button").id("onetrust-reject-all-handler")).unwrap();
        doc.on_click(button, ClickEffect::Remove(banner)).unwrap();

        let session = ScanSession::with_policy("shop.example", Policy::normal());
        assert_eq!(resolve_known_provider(&doc, &session).await, ResolverOutcome::NotFound);
        assert_eq!(doc.click_count(button), 0);
    }
}
