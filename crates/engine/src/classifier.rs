//! Heuristic detection of consent banners no catalog entry knows about.
//!
//! Two phases per pass: every candidate is scored first (read-only), then the
//! ranked candidates above the action threshold are acted on.

use std::fmt;

use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, info};
use unbanner_core::ActionKind;
use unbanner_dom::{
    Document, NodeId, QueryRoot, deep_query_all, has_high_z_index, has_scroll_lock, hide_element, is_fixed,
    is_overlay, is_visible, restore_scroll, safe_click,
};

use crate::session::{ScanSession, matches_pattern};

pub const CANDIDATE_SELECTOR: &str = concat!(
    "[class*=\"cookie\" i], [class*=\"consent\" i], [class*=\"gdpr\" i], [class*=\"privacy\" i], ",
    "[class*=\"banner\" i], [class*=\"modal\" i], [class*=\"overlay\" i], [class*=\"popup\" i], ",
    "[class*=\"cmp\" i], [class*=\"notice\" i], ",
    "[id*=\"cookie\" i], [id*=\"consent\" i], [id*=\"gdpr\" i], [id*=\"privacy\" i], ",
    "[id*=\"banner\" i], [id*=\"modal\" i], [id*=\"overlay\" i], [id*=\"popup\" i], ",
    "[id*=\"cmp\" i], [id*=\"notice\" i], ",
    "[role=\"dialog\"], [role=\"alertdialog\"], [aria-modal=\"true\"]"
);

pub const BUTTON_SELECTOR: &str =
    "button, a, [role=\"button\"], input[type=\"button\"], input[type=\"submit\"], [class*=\"btn\" i]";

const MODAL_CLASS_PATTERNS: &[&str] = &["modal", "overlay", "popup", "dialog", "banner"];
const BACKDROP_PATTERNS: &[&str] = &["backdrop", "overlay", "dimmer", "shade"];

/// Why a candidate scored what it did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Signal {
    Fixed,
    HighZIndex,
    Overlay,
    ScrollLock,
    ModalClass(String),
    Keyword(String),
    RejectButton,
    AcceptButton,
    Safeguard(String),
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Fixed => f.write_str("fixed"),
            Signal::HighZIndex => f.write_str("high-z"),
            Signal::Overlay => f.write_str("overlay"),
            Signal::ScrollLock => f.write_str("scroll-lock"),
            Signal::ModalClass(p) => write!(f, "class:{}", p),
            Signal::Keyword(k) => write!(f, "keyword:{}", k),
            Signal::RejectButton => f.write_str("reject-button"),
            Signal::AcceptButton => f.write_str("accept-button"),
            Signal::Safeguard(k) => write!(f, "safeguard:{}", k),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub element: NodeId,
    /// Never negative
    pub score: i32,
    pub signals: Vec<Signal>,
}

impl Candidate {
    fn reasons(&self) -> String {
        self.signals.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CandidateAction {
    Rejected,
    Closed,
    Removed,
    /// Processed, but nothing fired
    Left,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClassifierReport {
    pub candidates: Vec<Candidate>,
    pub actions: Vec<(NodeId, CandidateAction)>,
}

impl ClassifierReport {
    pub fn acted(&self) -> usize {
        self.actions.iter().filter(|(_, a)| *a != CandidateAction::Left).count()
    }
}

async fn attr_lower<D: Document + ?Sized>(doc: &D, node: NodeId, name: &str) -> String {
    doc.attribute(node, name).await.ok().flatten().unwrap_or_default().to_lowercase()
}

async fn class_and_id<D: Document + ?Sized>(doc: &D, node: NodeId) -> String {
    format!("{} {}", attr_lower(doc, node, "class").await, attr_lower(doc, node, "id").await)
}

async fn text_lower<D: Document + ?Sized>(doc: &D, node: NodeId) -> String {
    doc.inner_text(node).await.unwrap_or_default().to_lowercase()
}

/// Visible label, value, aria-label and title of a button-like element.
async fn button_label<D: Document + ?Sized>(doc: &D, node: NodeId) -> String {
    let parts = [
        text_lower(doc, node).await,
        attr_lower(doc, node, "value").await,
        attr_lower(doc, node, "aria-label").await,
        attr_lower(doc, node, "title").await,
    ];
    parts.iter().map(|p| p.trim()).filter(|p| !p.is_empty()).collect::<Vec<_>>().join(" ")
}

/// `tag#id.class`, for logs and reports.
pub async fn describe<D: Document + ?Sized>(doc: &D, node: NodeId) -> String {
    let tag = doc.tag_name(node).await.unwrap_or_default().to_lowercase();
    let id = doc.attribute(node, "id").await.ok().flatten().filter(|s| !s.is_empty());
    let class = doc.attribute(node, "class").await.ok().flatten();
    let mut out = tag;
    if let Some(id) = id {
        out.push('#');
        out.push_str(&id);
    }
    if let Some(first) = class.as_deref().and_then(|c| c.split_whitespace().next()) {
        out.push('.');
        out.push_str(first);
    }
    out
}

/// Scores one element. `scroll_locked` is the page-wide lock state, read once
/// per pass.
pub async fn score_element<D: Document + ?Sized>(
    doc: &D,
    session: &ScanSession,
    node: NodeId,
    scroll_locked: bool,
) -> Candidate {
    let policy = &session.policy;
    let weights = &policy.weights;
    let lexicon = &session.lexicon;
    let mut score = 0;
    let mut signals = Vec::new();

    if is_fixed(doc, node).await {
        score += weights.fixed_position;
        signals.push(Signal::Fixed);
    }
    if has_high_z_index(doc, node, policy.high_z_index).await {
        score += weights.high_z_index;
        signals.push(Signal::HighZIndex);
    }
    if is_overlay(doc, node).await {
        score += weights.overlay;
        signals.push(Signal::Overlay);
    }
    if scroll_locked {
        score += weights.scroll_lock;
        signals.push(Signal::ScrollLock);
    }

    let names = class_and_id(doc, node).await;
    if let Some(pattern) = MODAL_CLASS_PATTERNS.iter().find(|p| names.contains(*p)) {
        score += weights.modal_class;
        signals.push(Signal::ModalClass(pattern.to_string()));
    }

    let text = text_lower(doc, node).await;
    for keyword in lexicon.consent_keywords.iter().filter(|k| text.contains(k.as_str())).take(policy.keyword_cap) {
        score += weights.consent_keyword;
        signals.push(Signal::Keyword(keyword.clone()));
    }

    let mut has_accept = false;
    let mut has_reject = false;
    for button in deep_query_all(doc, BUTTON_SELECTOR, QueryRoot::Element(node)).await {
        let label = button_label(doc, button).await;
        if lexicon.is_reject(&label) {
            has_reject = true;
            break;
        }
        has_accept |= lexicon.is_accept(&label);
    }
    if has_reject {
        score += weights.reject_button;
        signals.push(Signal::RejectButton);
    } else if has_accept {
        score += weights.accept_button;
        signals.push(Signal::AcceptButton);
    }

    if let Some(excluded) = lexicon.excluded.iter().find(|k| text.contains(k.as_str())) {
        if !lexicon.required.iter().any(|k| text.contains(k.as_str())) {
            score -= weights.safeguard_penalty;
            signals.push(Signal::Safeguard(excluded.clone()));
        }
    }

    Candidate { element: node, score: score.max(0), signals }
}

/// Visible, unprocessed candidates, scored and ranked. Equal scores keep
/// discovery order.
pub async fn collect_candidates<D: Document + ?Sized>(doc: &D, session: &ScanSession) -> Vec<Candidate> {
    let scroll_locked = has_scroll_lock(doc).await;
    let mut candidates = Vec::new();
    for node in deep_query_all(doc, CANDIDATE_SELECTOR, QueryRoot::Document).await {
        if session.is_processed(node) || !is_visible(doc, node).await {
            continue;
        }
        let candidate = score_element(doc, session, node, scroll_locked).await;
        if candidate.score > 0 {
            debug!(element = %describe(doc, node).await, score = candidate.score, reasons = %candidate.reasons(), "scored candidate");
            candidates.push(candidate);
        }
    }
    candidates.sort_by_key(|c| std::cmp::Reverse(c.score));
    candidates
}

async fn find_reject_button<D: Document + ?Sized>(doc: &D, session: &ScanSession, container: NodeId) -> Option<NodeId> {
    for button in deep_query_all(doc, BUTTON_SELECTOR, QueryRoot::Element(container)).await {
        if is_visible(doc, button).await && session.lexicon.is_reject(&button_label(doc, button).await) {
            return Some(button);
        }
    }
    None
}

async fn find_close_button<D: Document + ?Sized>(doc: &D, session: &ScanSession, container: NodeId) -> Option<NodeId> {
    let close = &session.lexicon.close;
    for button in deep_query_all(doc, "button, a, [role=\"button\"]", QueryRoot::Element(container)).await {
        if !is_visible(doc, button).await {
            continue;
        }
        let text = text_lower(doc, button).await;
        let text = text.trim();
        let aria = attr_lower(doc, button, "aria-label").await;
        let class = attr_lower(doc, button, "class").await;
        let is_close = close.iter().any(|p| text == p.as_str() || matches_pattern(&aria, p))
            || class.contains("close")
            || class.contains("dismiss")
            || attr_lower(doc, button, "data-dismiss").await == "modal";
        if is_close {
            return Some(button);
        }
    }
    None
}

/// Hides fixed, visible siblings that look like the dimmed layer behind a modal.
async fn hide_backdrops<D: Document + ?Sized>(doc: &D, element: NodeId) -> usize {
    let Ok(Some(parent)) = doc.parent(element).await else { return 0 };
    let mut hidden = 0;
    for sibling in doc.children(parent).await.unwrap_or_default() {
        if sibling == element {
            continue;
        }
        let names = class_and_id(doc, sibling).await;
        if BACKDROP_PATTERNS.iter().any(|p| names.contains(p))
            && is_visible(doc, sibling).await
            && is_fixed(doc, sibling).await
            && hide_element(doc, sibling).await
        {
            hidden += 1;
        }
    }
    hidden
}

async fn settled_away<D: Document + ?Sized>(doc: &D, session: &ScanSession, element: NodeId) -> bool {
    sleep(session.policy.timings.settle_delay).await;
    !is_visible(doc, element).await
}

async fn handle_candidate<D: Document + ?Sized>(doc: &D, session: &ScanSession, candidate: &Candidate) -> CandidateAction {
    let element = candidate.element;
    let label = describe(doc, element).await;

    if let Some(button) = find_reject_button(doc, session, element).await {
        debug!(element = %label, "clicking reject button");
        if safe_click(doc, button).await && settled_away(doc, session, element).await {
            restore_scroll(doc).await;
            session.report(ActionKind::BannerRejected, format!("clicked reject in {}", label)).await;
            return CandidateAction::Rejected;
        }
    }

    if let Some(button) = find_close_button(doc, session, element).await {
        debug!(element = %label, "clicking close button");
        if safe_click(doc, button).await && settled_away(doc, session, element).await {
            restore_scroll(doc).await;
            session.report(ActionKind::BannerClosed, format!("closed {}", label)).await;
            return CandidateAction::Closed;
        }
    }

    if session.policy.should_force_hide(candidate.score) {
        hide_element(doc, element).await;
        let backdrops = hide_backdrops(doc, element).await;
        restore_scroll(doc).await;
        session
            .report(ActionKind::BannerRemoved, format!("hid {} (score {}, {} backdrop)", label, candidate.score, backdrops))
            .await;
        return CandidateAction::Removed;
    }

    restore_scroll(doc).await;
    info!(element = %label, score = candidate.score, "candidate below force-hide threshold, left in place");
    CandidateAction::Left
}

async fn ancestors<D: Document + ?Sized>(doc: &D, node: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut current = node;
    while let Ok(Some(parent)) = doc.parent(current).await {
        out.push(parent);
        current = parent;
    }
    out
}

/// Actionable candidates with their ancestors, in score order except that a
/// candidate nested in another actionable one comes after it.
async fn action_order<'c, D: Document + ?Sized>(
    doc: &D,
    actionable: Vec<&'c Candidate>,
) -> Vec<(&'c Candidate, Vec<NodeId>)> {
    let mut lineage = Vec::with_capacity(actionable.len());
    for candidate in &actionable {
        lineage.push(ancestors(doc, candidate.element).await);
    }

    let mut ordered: Vec<(&Candidate, Vec<NodeId>)> = Vec::with_capacity(actionable.len());
    let mut placed = vec![false; actionable.len()];
    for i in 0..actionable.len() {
        // outermost enclosing candidate first
        for ancestor in lineage[i].iter().rev() {
            if let Some(j) = actionable.iter().position(|c| c.element == *ancestor) {
                if !placed[j] {
                    placed[j] = true;
                    ordered.push((actionable[j], lineage[j].clone()));
                }
            }
        }
        if !placed[i] {
            placed[i] = true;
            ordered.push((actionable[i], lineage[i].clone()));
        }
    }
    ordered
}

/// One classifier pass: score everything, then act on candidates at or above
/// the action threshold. Each element is acted on at most once per page, and a
/// candidate inside one already handled this pass is not acted on again.
pub async fn classify<D: Document + ?Sized>(doc: &D, session: &ScanSession) -> ClassifierReport {
    let candidates = collect_candidates(doc, session).await;
    let actionable = candidates
        .iter()
        .filter(|c| c.score >= session.policy.action_threshold)
        .collect();
    let mut actions = Vec::new();
    let mut handled = Vec::new();

    for (candidate, lineage) in action_order(doc, actionable).await {
        if !session.mark_processed(candidate.element) {
            continue;
        }
        if lineage.iter().any(|a| handled.contains(a)) || !is_visible(doc, candidate.element).await {
            debug!(element = %candidate.element, "nested in a handled banner, skipped");
            continue;
        }
        let action = handle_candidate(doc, session, candidate).await;
        if action != CandidateAction::Left {
            handled.push(candidate.element);
        }
        actions.push((candidate.element, action));
    }

    ClassifierReport { candidates, actions }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unbanner_core::Policy;
    use unbanner_dom::{ElementSpec, MemoryDocument};

    fn session() -> ScanSession {
        ScanSession::with_policy("shop.example", Policy::normal())
    }

    #[tokio::test]
    async fn keyword_contribution_is_capped() {
        let doc = MemoryDocument::new("shop.example");
        let node = doc
            .append(
                doc.body_id(),
                ElementSpec::new("div").class("notice").text("cookie consent privacy gdpr tracking vendor partner"),
            )
            .unwrap();
        let candidate = score_element(&doc, &session(), node, false).await;
        assert_eq!(candidate.score, 3 * 8);
        assert_eq!(candidate.signals.len(), 3);
    }

    #[tokio::test]
    async fn safeguard_only_candidate_scores_zero() {
        let doc = MemoryDocument::new("shop.example");
        let modal = doc
            .append(
                doc.body_id(),
                ElementSpec::new("div")
                    .class("modal login-overlay")
                    .style("position: fixed; z-index: 5000; width: 100%; height: 100%")
                    .text("Sign in to continue"),
            )
            .unwrap();
        doc.append(modal, ElementSpec::new("button").text("Sign in")).unwrap();
        let candidate = score_element(&doc, &session(), modal, true).await;
        assert_eq!(candidate.score, 0);
        assert!(candidate.signals.contains(&Signal::Safeguard("sign in".into())));
    }

    #[tokio::test]
    async fn reject_boost_replaces_accept_boost() {
        let doc = MemoryDocument::new("shop.example");
        let banner = doc.append(doc.body_id(), ElementSpec::new("div").class("cookie-bar")).unwrap();
        doc.append(banner, ElementSpec::new("button").text("Accept all")).unwrap();
        doc.append(banner, ElementSpec::new("button").text("Reject all")).unwrap();
        let candidate = score_element(&doc, &session(), banner, false).await;
        assert!(candidate.signals.contains(&Signal::RejectButton));
        assert!(!candidate.signals.contains(&Signal::AcceptButton));
        assert_eq!(candidate.score, 25);
    }

    #[tokio::test]
    async fn backdrop_sibling_is_hidden_with_the_banner() {
        let doc = MemoryDocument::new("shop.example");
        let body = doc.body_id();
        let backdrop = doc
            .append(body, ElementSpec::new("div").class("modal-backdrop").style("position: fixed"))
            .unwrap();
        let banner = doc.append(body, ElementSpec::new("div").id("consent")).unwrap();
        assert_eq!(hide_backdrops(&doc, banner).await, 1);
        assert!(!is_visible(&doc, backdrop).await);
    }

    #[tokio::test]
    async fn nested_banner_is_handled_once_with_its_wall() {
        let doc = MemoryDocument::new("shop.example");
        let wall = doc
            .append(
                doc.body_id(),
                ElementSpec::new("div")
                    .id("cookie-wall")
                    .style("position: fixed; z-index: 3000; width: 100%; height: 100%"),
            )
            .unwrap();
        let banner = doc
            .append(
                wall,
                ElementSpec::new("div")
                    .class("cookie-banner")
                    .style("position: fixed; z-index: 3001; width: 100%; height: 100%")
                    .text("We use cookies and tracking with our partners to personalise consent."),
            )
            .unwrap();
        doc.append(banner, ElementSpec::new("button").text("Accept")).unwrap();

        let session = ScanSession::with_policy("shop.example", Policy::extreme());
        let report = classify(&doc, &session).await;
        assert_eq!(report.actions, vec![(wall, CandidateAction::Removed)]);
        assert!(!is_visible(&doc, banner).await);
        assert!(!session.mark_processed(banner));
    }

    #[tokio::test]
    async fn describe_uses_tag_id_and_first_class() {
        let doc = MemoryDocument::new("shop.example");
        let node = doc.append(doc.body_id(), ElementSpec::new("DIV").id("cw").class("a b")).unwrap();
        assert_eq!(describe(&doc, node).await, "div#cw.a");
    }
}
