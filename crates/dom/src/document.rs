use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use unbanner_core::ScanError;

/// Opaque, non-owning handle to an element. The page owns the node; holding an id
/// never keeps it alive, and a stale id simply stops resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a selector query starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryRoot {
    Document,
    /// Descendants of an element
    Element(NodeId),
    /// The shadow tree hosted by an element
    Shadow(NodeId),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Zero-area boxes render nothing.
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

/// The frame a document is rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameContext {
    pub top_level: bool,
    pub width: f64,
    pub height: f64,
}

/// The handful of computed properties the probes read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputedStyle {
    pub display: String,
    pub visibility: String,
    pub opacity: String,
    pub position: String,
    pub z_index: String,
    pub overflow: String,
    pub background_color: String,
    pub backdrop_filter: String,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: "block".into(),
            visibility: "visible".into(),
            opacity: "1".into(),
            position: "static".into(),
            z_index: "auto".into(),
            overflow: "visible".into(),
            background_color: "rgba(0, 0, 0, 0)".into(),
            backdrop_filter: "none".into(),
        }
    }
}

impl ComputedStyle {
    /// Unparseable opacity renders as fully opaque.
    pub fn opacity_value(&self) -> f64 {
        self.opacity.trim().parse().unwrap_or(1.0)
    }

    /// Leading integer of `z-index`, 0 for `auto` and garbage.
    pub fn z_index_value(&self) -> i64 {
        let trimmed = self.z_index.trim();
        let end = trimmed
            .char_indices()
            .find(|(i, c)| !(c.is_ascii_digit() || (*i == 0 && (*c == '-' || *c == '+'))))
            .map(|(i, _)| i)
            .unwrap_or(trimmed.len());
        trimmed[..end].parse().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationKind {
    ChildList { added: usize, removed: usize },
    Attributes { name: String },
    CharacterData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationRecord {
    pub target: NodeId,
    pub kind: MutationKind,
}

impl MutationRecord {
    /// Structural or presentational changes; pure text edits are not worth a re-scan.
    pub fn is_significant(&self) -> bool {
        match &self.kind {
            MutationKind::ChildList { added, removed } => added + removed > 0,
            MutationKind::Attributes { name } => matches!(name.as_str(), "class" | "style" | "hidden"),
            MutationKind::CharacterData => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum DomError {
    #[error("invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },
    #[error("node {0} is detached or unknown")]
    UnknownNode(NodeId),
    #[error("click failed: {0}")]
    Click(String),
    #[error("document backend failure: {0}")]
    Backend(String),
}

impl From<DomError> for ScanError {
    fn from(e: DomError) -> Self {
        match e {
            DomError::InvalidSelector { selector, reason } => ScanError::invalid_selector(selector, reason),
            other => ScanError::dom_error(other.to_string()),
        }
    }
}

/// A live page as seen by the scan engine.
///
/// Implementations: [`crate::MemoryDocument`] in memory, and the CDP-backed page in
/// the `browser` crate.
#[async_trait]
pub trait Document: Send + Sync {
    async fn document_element(&self) -> Result<NodeId, DomError>;
    async fn body(&self) -> Result<Option<NodeId>, DomError>;

    /// Matches within one tree scope, in document order. Does not pierce shadow roots.
    async fn query_selector_all(&self, root: QueryRoot, selector: &str) -> Result<Vec<NodeId>, DomError>;

    /// Elements in `root`'s tree scope that host a shadow root. For an element root
    /// this includes the element itself.
    async fn shadow_hosts(&self, root: QueryRoot) -> Result<Vec<NodeId>, DomError>;

    async fn parent(&self, node: NodeId) -> Result<Option<NodeId>, DomError>;
    async fn children(&self, node: NodeId) -> Result<Vec<NodeId>, DomError>;
    async fn tag_name(&self, node: NodeId) -> Result<String, DomError>;
    async fn attribute(&self, node: NodeId, name: &str) -> Result<Option<String>, DomError>;
    /// Rendered text of the element and its descendants.
    async fn inner_text(&self, node: NodeId) -> Result<String, DomError>;

    async fn bounding_rect(&self, node: NodeId) -> Result<Rect, DomError>;
    async fn computed_style(&self, node: NodeId) -> Result<ComputedStyle, DomError>;
    async fn viewport(&self) -> Result<Viewport, DomError>;
    async fn frame(&self) -> Result<FrameContext, DomError>;
    async fn hostname(&self) -> Result<String, DomError>;

    /// Native activation (`element.click()`).
    async fn click(&self, node: NodeId) -> Result<(), DomError>;
    /// Synthetic bubbling, cancelable click event.
    async fn dispatch_click(&self, node: NodeId) -> Result<(), DomError>;

    async fn set_style_property(&self, node: NodeId, name: &str, value: &str, important: bool) -> Result<(), DomError>;
    /// Returns whether the inline property was present.
    async fn remove_style_property(&self, node: NodeId, name: &str) -> Result<bool, DomError>;
    /// Returns whether the class was present.
    async fn remove_class(&self, node: NodeId, class: &str) -> Result<bool, DomError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn z_index_parsing_treats_garbage_as_zero() {
        let mut style = ComputedStyle::default();
        assert_eq!(style.z_index_value(), 0);
        style.z_index = "2147483647".into();
        assert_eq!(style.z_index_value(), 2147483647);
        style.z_index = "-5".into();
        assert_eq!(style.z_index_value(), -5);
        style.z_index = "12px".into();
        assert_eq!(style.z_index_value(), 12);
        style.z_index = "abc".into();
        assert_eq!(style.z_index_value(), 0);
    }

    #[test]
    fn text_mutations_are_not_significant() {
        let target = NodeId(1);
        assert!(!MutationRecord { target, kind: MutationKind::CharacterData }.is_significant());
        assert!(!MutationRecord { target, kind: MutationKind::Attributes { name: "title".into() } }.is_significant());
        assert!(MutationRecord { target, kind: MutationKind::Attributes { name: "hidden".into() } }.is_significant());
        assert!(MutationRecord { target, kind: MutationKind::ChildList { added: 1, removed: 0 } }.is_significant());
    }
}
