//! CSS selector matching for the in-memory page, on the same `selectors`
//! engine `scraper` uses for parsed HTML.

use std::fmt;

use scraper::error::SelectorErrorKind;
use scraper::selector::{CssLocalName, CssString, NonTSPseudoClass, Parser, PseudoElement, Simple};
use selectors::attr::{AttrSelectorOperation, CaseSensitivity, NamespaceConstraint};
use selectors::bloom::BloomFilter;
use selectors::matching::{
    self, ElementSelectorFlags, MatchingContext, MatchingForInvalidation, MatchingMode, NeedsSelectorFlags, QuirksMode,
    SelectorCaches,
};
use selectors::parser::ParseRelative;
use selectors::{Element, OpaqueElement, SelectorImpl, SelectorList};

use super::{NodeData, PageState};
use crate::document::{DomError, NodeId};

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// A parsed selector group.
pub(super) struct CompiledSelector(SelectorList<Simple>);

impl CompiledSelector {
    pub(super) fn parse(selector: &str) -> Result<Self, DomError> {
        let mut input = cssparser::ParserInput::new(selector);
        let mut parser = cssparser::Parser::new(&mut input);
        SelectorList::parse(&Parser, &mut parser, ParseRelative::No)
            .map(Self)
            .map_err(|e| DomError::InvalidSelector {
                selector: selector.to_string(),
                reason: SelectorErrorKind::from(e).to_string(),
            })
    }

    /// Elements of `candidates` that match, in order. `:scope` is `scope` when
    /// given, the root element otherwise.
    pub(super) fn filter(&self, state: &PageState, candidates: Vec<NodeId>, scope: Option<NodeId>) -> Vec<NodeId> {
        let mut caches = SelectorCaches::default();
        let mut context = MatchingContext::new(
            MatchingMode::Normal,
            None,
            &mut caches,
            QuirksMode::NoQuirks,
            NeedsSelectorFlags::No,
            MatchingForInvalidation::No,
        );
        context.scope_element = scope.map(|id| NodeRef { state, id }.opaque());

        candidates
            .into_iter()
            .filter(|id| {
                let element = NodeRef { state, id: *id };
                self.0
                    .slice()
                    .iter()
                    .any(|s| matching::matches_selector(s, 0, None, &element, &mut context))
            })
            .collect()
    }
}

#[derive(Clone, Copy)]
pub(super) struct NodeRef<'a> {
    pub(super) state: &'a PageState,
    pub(super) id: NodeId,
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} {}>", self.data().tag, self.id)
    }
}

impl<'a> NodeRef<'a> {
    fn data(&self) -> &'a NodeData {
        &self.state.nodes[self.id.0 as usize]
    }

    fn at(&self, id: NodeId) -> Self {
        NodeRef { state: self.state, id }
    }

    /// The list this node sits in: its parent's children, or its host's shadow root.
    fn siblings(&self) -> &'a [NodeId] {
        let data = self.data();
        if let Some(parent) = data.parent {
            return &self.state.nodes[parent.0 as usize].children;
        }
        if let Some(host) = data.host {
            return self.state.nodes[host.0 as usize].shadow.as_deref().unwrap_or_default();
        }
        &[]
    }

    fn position(&self) -> Option<(&'a [NodeId], usize)> {
        let siblings = self.siblings();
        siblings.iter().position(|s| *s == self.id).map(|i| (siblings, i))
    }

    fn element_at(&self, id: &NodeId) -> Option<Self> {
        (!self.state.nodes[id.0 as usize].is_text()).then(|| self.at(*id))
    }
}

impl Element for NodeRef<'_> {
    type Impl = Simple;

    fn opaque(&self) -> OpaqueElement {
        OpaqueElement::new(self.data())
    }

    fn parent_element(&self) -> Option<Self> {
        self.data().parent.map(|id| self.at(id))
    }

    fn parent_node_is_shadow_root(&self) -> bool {
        self.data().host.is_some()
    }

    fn containing_shadow_host(&self) -> Option<Self> {
        None
    }

    fn is_pseudo_element(&self) -> bool {
        false
    }

    fn prev_sibling_element(&self) -> Option<Self> {
        let (siblings, index) = self.position()?;
        siblings[..index].iter().rev().find_map(|id| self.element_at(id))
    }

    fn next_sibling_element(&self) -> Option<Self> {
        let (siblings, index) = self.position()?;
        siblings[index + 1..].iter().find_map(|id| self.element_at(id))
    }

    fn first_element_child(&self) -> Option<Self> {
        self.data().children.iter().find_map(|id| self.element_at(id))
    }

    fn is_html_element_in_html_document(&self) -> bool {
        true
    }

    fn has_local_name(&self, local_name: &CssLocalName) -> bool {
        *local_name.0 == *self.data().tag
    }

    fn has_namespace(&self, ns: &<Simple as SelectorImpl>::BorrowedNamespaceUrl) -> bool {
        **ns == *HTML_NAMESPACE
    }

    fn is_same_type(&self, other: &Self) -> bool {
        self.data().tag == other.data().tag
    }

    fn attr_matches(
        &self,
        ns: &NamespaceConstraint<&<Simple as SelectorImpl>::NamespaceUrl>,
        local_name: &CssLocalName,
        operation: &AttrSelectorOperation<&CssString>,
    ) -> bool {
        if let NamespaceConstraint::Specific(url) = ns {
            if !url.is_empty() {
                return false;
            }
        }
        let data = self.data();
        if *local_name.0 == *"style" {
            return !data.inline.is_empty() && operation.eval_str(&data.inline.to_css_text());
        }
        data.attrs
            .iter()
            .any(|(name, value)| *local_name.0 == **name && operation.eval_str(value))
    }

    fn match_non_ts_pseudo_class(&self, _pc: &NonTSPseudoClass, _context: &mut MatchingContext<'_, Simple>) -> bool {
        false
    }

    fn match_pseudo_element(&self, _pe: &PseudoElement, _context: &mut MatchingContext<'_, Simple>) -> bool {
        false
    }

    fn apply_selector_flags(&self, _flags: ElementSelectorFlags) {}

    fn is_link(&self) -> bool {
        let data = self.data();
        matches!(data.tag.as_str(), "a" | "area") && data.attr("href").is_some()
    }

    fn is_html_slot_element(&self) -> bool {
        self.data().tag == "slot"
    }

    fn has_id(&self, id: &CssLocalName, case_sensitivity: CaseSensitivity) -> bool {
        self.data()
            .attr("id")
            .is_some_and(|value| case_sensitivity.eq(id.0.as_bytes(), value.as_bytes()))
    }

    fn has_class(&self, name: &CssLocalName, case_sensitivity: CaseSensitivity) -> bool {
        self.data().attr("class").is_some_and(|value| {
            value
                .split_ascii_whitespace()
                .any(|class| case_sensitivity.eq(name.0.as_bytes(), class.as_bytes()))
        })
    }

    fn has_custom_state(&self, _name: &CssLocalName) -> bool {
        false
    }

    fn imported_part(&self, _name: &CssLocalName) -> Option<CssLocalName> {
        None
    }

    fn is_part(&self, _name: &CssLocalName) -> bool {
        false
    }

    fn is_empty(&self) -> bool {
        let data = self.data();
        data.text.is_empty()
            && data.children.iter().all(|id| {
                let child = &self.state.nodes[id.0 as usize];
                child.is_text() && child.text.is_empty()
            })
    }

    fn is_root(&self) -> bool {
        self.id == self.state.root
    }

    fn add_element_unique_hashes(&self, _filter: &mut BloomFilter) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use crate::document::{Document, DomError, QueryRoot};
    use crate::memory::{ElementSpec, MemoryDocument};

    fn consent_dialog() -> MemoryDocument {
        let doc = MemoryDocument::new("example.com");
        let container = doc
            .append(doc.body_id(), ElementSpec::new("div").id("sp_message_container_123").class("qc-cmp2-summary-buttons wide"))
            .unwrap();
        doc.append(container, ElementSpec::new("button").class("btn primary").text("Accept")).unwrap();
        doc.append(
            container,
            ElementSpec::new("button").attr("mode", "secondary").attr("aria-label", "Disagree and close").class("btn"),
        )
        .unwrap();
        doc
    }

    async fn count(doc: &MemoryDocument, selector: &str) -> usize {
        doc.query_selector_all(QueryRoot::Document, selector).await.unwrap().len()
    }

    #[tokio::test]
    async fn attribute_operators() {
        let doc = consent_dialog();
        assert_eq!(count(&doc, "[mode]").await, 1);
        assert_eq!(count(&doc, "button[mode='secondary']").await, 1);
        assert_eq!(count(&doc, "[aria-label*='Disagree']").await, 1);
        assert_eq!(count(&doc, "[aria-label^=\"disagree\" i]").await, 1);
        assert_eq!(count(&doc, "[aria-label^=\"disagree\"]").await, 0);
        assert_eq!(count(&doc, "[class~=btn]").await, 2);
        assert_eq!(count(&doc, "div[id^='sp_message_container_'] > button").await, 2);
    }

    #[tokio::test]
    async fn structural_selectors_match() {
        let doc = consent_dialog();
        assert_eq!(count(&doc, ".qc-cmp2-summary-buttons button:last-child").await, 1);
        assert_eq!(count(&doc, "button + button").await, 1);
        assert_eq!(count(&doc, "button:nth-of-type(2)").await, 1);
        assert_eq!(count(&doc, "div:is(.wide) button").await, 2);
        assert_eq!(count(&doc, ":where(button)").await, 2);
        assert_eq!(count(&doc, "div:has(> button[mode])").await, 1);
        assert_eq!(count(&doc, "button:not(.primary)").await, 1);
        assert_eq!(count(&doc, "body > button").await, 0);
    }

    #[tokio::test]
    async fn text_nodes_are_not_elements() {
        let doc = MemoryDocument::new("example.com");
        let p = doc.append(doc.body_id(), ElementSpec::new("p")).unwrap();
        doc.append_text(p, "We use cookies").unwrap();
        let first = doc.append(p, ElementSpec::new("b")).unwrap();
        assert_eq!(doc.query_selector_all(QueryRoot::Document, "p > :first-child").await.unwrap(), vec![first]);
        assert_eq!(count(&doc, "p:empty").await, 0);
        assert_eq!(count(&doc, "b:empty").await, 1);
    }

    #[tokio::test]
    async fn unsupported_syntax_is_invalid() {
        let doc = consent_dialog();
        for bad in ["[class*=", "div:hover", "", "#", "div >", "a ~ ~ b"] {
            assert!(
                matches!(
                    doc.query_selector_all(QueryRoot::Document, bad).await,
                    Err(DomError::InvalidSelector { .. })
                ),
                "{bad} should be rejected"
            );
        }
    }
}
