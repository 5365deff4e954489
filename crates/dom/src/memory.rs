//! An in-memory page: element tree, shadow roots, author and inline styles,
//! geometry and scripted click behaviour. Used for offline classification of
//! fetched HTML and as the page fake in tests.

use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::document::{
    ComputedStyle, Document, DomError, FrameContext, MutationKind, MutationRecord, NodeId, QueryRoot, Rect,
    Viewport,
};
use crate::style::{StyleDeclarations, cascade};

mod element;

use element::CompiledSelector;

const DEFAULT_VIEWPORT: Viewport = Viewport { width: 1280.0, height: 800.0 };
const DEFAULT_BOX: (f64, f64) = (300.0, 40.0);
const TEXT_TAG: &str = "#text";

/// How an element reacts to activation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClickSupport {
    #[default]
    Native,
    /// `click()` throws, a dispatched event still works
    SyntheticOnly,
    Broken,
}

/// What a page script does when an element is clicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickEffect {
    Remove(NodeId),
    Hide(NodeId),
    RemoveClass(NodeId, String),
    RemoveInlineStyle(NodeId, String),
}

/// Declarative description of an element to insert.
#[derive(Debug, Clone, Default)]
pub struct ElementSpec {
    tag: String,
    attrs: Vec<(String, String)>,
    text: String,
    inline: String,
    author: String,
    rect: Option<Rect>,
}

impl ElementSpec {
    pub fn new(tag: &str) -> Self {
        Self { tag: tag.to_ascii_lowercase(), ..Self::default() }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.push((name.to_ascii_lowercase(), value.to_string()));
        self
    }

    pub fn id(self, id: &str) -> Self {
        self.attr("id", id)
    }

    pub fn class(self, class: &str) -> Self {
        self.attr("class", class)
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    /// Inline `style` attribute.
    pub fn style(mut self, css: &str) -> Self {
        self.inline = css.to_string();
        self
    }

    /// Declarations coming from the page's stylesheets.
    pub fn css(mut self, css: &str) -> Self {
        self.author = css.to_string();
        self
    }

    pub fn rect(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.rect = Some(Rect::new(x, y, width, height));
        self
    }
}

#[derive(Debug, Clone)]
struct NodeData {
    tag: String,
    attrs: Vec<(String, String)>,
    /// Leading text for elements, the data for text nodes
    text: String,
    parent: Option<NodeId>,
    /// Set on the top-level children of a shadow root
    host: Option<NodeId>,
    children: Vec<NodeId>,
    shadow: Option<Vec<NodeId>>,
    author: StyleDeclarations,
    inline: StyleDeclarations,
    rect: Option<Rect>,
    click: ClickSupport,
    effects: Vec<ClickEffect>,
    clicks: u32,
}

impl NodeData {
    fn from_spec(spec: ElementSpec) -> Self {
        let mut inline = StyleDeclarations::parse(&spec.inline);
        let mut attrs = Vec::new();
        for (name, value) in spec.attrs {
            if name == "style" {
                inline = StyleDeclarations::parse(&value);
            } else {
                attrs.push((name, value));
            }
        }
        Self {
            tag: spec.tag,
            attrs,
            text: spec.text,
            parent: None,
            host: None,
            children: Vec::new(),
            shadow: None,
            author: StyleDeclarations::parse(&spec.author),
            inline,
            rect: spec.rect,
            click: ClickSupport::default(),
            effects: Vec::new(),
            clicks: 0,
        }
    }

    fn text_node(text: &str) -> Self {
        let mut data = Self::from_spec(ElementSpec { tag: TEXT_TAG.to_string(), ..ElementSpec::default() });
        data.text = text.to_string();
        data
    }

    fn is_text(&self) -> bool {
        self.tag == TEXT_TAG
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    fn style_value(&self, name: &str) -> Option<&str> {
        cascade(&self.author, &self.inline, name)
    }
}

struct PageState {
    nodes: Vec<NodeData>,
    root: NodeId,
    body: NodeId,
    viewport: Viewport,
    frame: FrameContext,
    hostname: String,
}

impl PageState {
    fn node(&self, id: NodeId) -> Result<&NodeData, DomError> {
        self.nodes.get(id.0 as usize).ok_or(DomError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut NodeData, DomError> {
        self.nodes.get_mut(id.0 as usize).ok_or(DomError::UnknownNode(id))
    }

    fn insert(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len() as u64);
        self.nodes.push(data);
        id
    }

    /// Parent in the flat tree: the light parent, or the host for shadow children.
    fn flat_parent(&self, id: NodeId) -> Option<NodeId> {
        let node = self.nodes.get(id.0 as usize)?;
        node.parent.or(node.host)
    }

    fn is_connected(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == self.root {
                return true;
            }
            current = self.flat_parent(node);
        }
        false
    }

    fn is_display_none(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if self.nodes[node.0 as usize].style_value("display") == Some("none") {
                return true;
            }
            current = self.flat_parent(node);
        }
        false
    }

    /// Element preorder over one tree scope, not crossing into shadow roots.
    fn scope_preorder(&self, starts: &[NodeId], include_starts: bool) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<(NodeId, bool)> = starts.iter().rev().map(|id| (*id, include_starts)).collect();
        while let Some((id, include)) = stack.pop() {
            if include && !self.nodes[id.0 as usize].is_text() {
                out.push(id);
            }
            if let Some(node) = self.nodes.get(id.0 as usize) {
                for child in node.children.iter().rev() {
                    stack.push((*child, true));
                }
            }
        }
        out
    }

    fn scope(&self, root: QueryRoot, include_element_root: bool) -> Result<Vec<NodeId>, DomError> {
        match root {
            QueryRoot::Document => Ok(self.scope_preorder(&[self.root], true)),
            QueryRoot::Element(id) => {
                self.node(id)?;
                Ok(self.scope_preorder(&[id], include_element_root))
            }
            QueryRoot::Shadow(host) => {
                let shadow = self.node(host)?.shadow.clone().unwrap_or_default();
                Ok(self.scope_preorder(&shadow, true))
            }
        }
    }

    fn layout_rect(&self, id: NodeId) -> Result<Rect, DomError> {
        let node = self.node(id)?;
        if !self.is_connected(id) || self.is_display_none(id) {
            return Ok(Rect::default());
        }
        if let Some(rect) = node.rect {
            return Ok(rect);
        }
        if id == self.root || id == self.body {
            return Ok(Rect::new(0.0, 0.0, self.viewport.width, self.viewport.height));
        }
        let width = node
            .style_value("width")
            .and_then(|v| resolve_length(v, self.viewport.width))
            .unwrap_or(DEFAULT_BOX.0);
        let height = node
            .style_value("height")
            .and_then(|v| resolve_length(v, self.viewport.height))
            .unwrap_or(DEFAULT_BOX.1);
        Ok(Rect::new(0.0, 0.0, width, height))
    }

    fn computed(&self, id: NodeId) -> Result<ComputedStyle, DomError> {
        let node = self.node(id)?;
        let defaults = ComputedStyle::default();
        let get = |name: &str, fallback: &str| node.style_value(name).unwrap_or(fallback).to_string();

        // visibility inherits
        let mut visibility = defaults.visibility.clone();
        let mut current = Some(id);
        while let Some(n) = current {
            if let Some(v) = self.nodes[n.0 as usize].style_value("visibility") {
                visibility = v.to_string();
                break;
            }
            current = self.flat_parent(n);
        }

        Ok(ComputedStyle {
            display: get("display", &defaults.display),
            visibility,
            opacity: get("opacity", &defaults.opacity),
            position: get("position", &defaults.position),
            z_index: get("z-index", &defaults.z_index),
            overflow: get("overflow", &defaults.overflow),
            background_color: node
                .style_value("background-color")
                .or_else(|| node.style_value("background"))
                .unwrap_or(&defaults.background_color)
                .to_string(),
            backdrop_filter: get("backdrop-filter", &defaults.backdrop_filter),
        })
    }

    fn collect_text(&self, id: NodeId, out: &mut Vec<String>) {
        let node = &self.nodes[id.0 as usize];
        if node.style_value("display") == Some("none") {
            return;
        }
        if !node.text.trim().is_empty() {
            out.push(node.text.trim().to_string());
        }
        if let Some(shadow) = &node.shadow {
            for child in shadow {
                self.collect_text(*child, out);
            }
        }
        for child in &node.children {
            self.collect_text(*child, out);
        }
    }

    fn detach(&mut self, id: NodeId) -> Result<Option<NodeId>, DomError> {
        let (parent, host) = {
            let node = self.node(id)?;
            (node.parent, node.host)
        };
        if let Some(parent) = parent {
            self.node_mut(parent)?.children.retain(|c| *c != id);
        }
        if let Some(host) = host {
            if let Some(shadow) = self.node_mut(host)?.shadow.as_mut() {
                shadow.retain(|c| *c != id);
            }
        }
        let node = self.node_mut(id)?;
        node.parent = None;
        node.host = None;
        Ok(parent.or(host))
    }
}

fn resolve_length(value: &str, viewport_axis: f64) -> Option<f64> {
    let value = value.trim();
    if let Some(px) = value.strip_suffix("px") {
        return px.trim().parse().ok();
    }
    if let Some(pct) = value.strip_suffix('%').or_else(|| value.strip_suffix("vw")).or_else(|| value.strip_suffix("vh")) {
        return pct.trim().parse::<f64>().ok().map(|p| p / 100.0 * viewport_axis);
    }
    value.parse().ok()
}

pub struct MemoryDocument {
    state: RwLock<PageState>,
    observers: Mutex<Vec<mpsc::UnboundedSender<MutationRecord>>>,
}

impl MemoryDocument {
    /// An empty `<html><body></body></html>` page for `hostname`.
    pub fn new(hostname: &str) -> Self {
        let mut state = PageState {
            nodes: Vec::new(),
            root: NodeId(0),
            body: NodeId(0),
            viewport: DEFAULT_VIEWPORT,
            frame: FrameContext { top_level: true, width: DEFAULT_VIEWPORT.width, height: DEFAULT_VIEWPORT.height },
            hostname: hostname.to_string(),
        };
        let root = state.insert(NodeData::from_spec(ElementSpec::new("html")));
        let mut body_data = NodeData::from_spec(ElementSpec::new("body"));
        body_data.parent = Some(root);
        let body = state.insert(body_data);
        state.nodes[root.0 as usize].children.push(body);
        state.root = root;
        state.body = body;

        Self { state: RwLock::new(state), observers: Mutex::new(Vec::new()) }
    }

    fn read(&self) -> RwLockReadGuard<'_, PageState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, PageState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, records: Vec<MutationRecord>) {
        if records.is_empty() {
            return;
        }
        let mut observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        observers.retain(|tx| records.iter().all(|r| tx.send(r.clone()).is_ok()));
    }

    /// Mutation feed, like a `MutationObserver` on the whole document.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<MutationRecord> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.lock().unwrap_or_else(PoisonError::into_inner).push(tx);
        rx
    }

    pub fn root_id(&self) -> NodeId {
        self.read().root
    }

    pub fn body_id(&self) -> NodeId {
        self.read().body
    }

    pub fn set_viewport(&self, width: f64, height: f64) {
        self.write().viewport = Viewport { width, height };
    }

    pub fn set_frame(&self, frame: FrameContext) {
        self.write().frame = frame;
    }

    pub fn append(&self, parent: NodeId, spec: ElementSpec) -> Result<NodeId, DomError> {
        let id = {
            let mut state = self.write();
            state.node(parent)?;
            let mut data = NodeData::from_spec(spec);
            data.parent = Some(parent);
            let id = state.insert(data);
            state.node_mut(parent)?.children.push(id);
            id
        };
        self.notify(vec![MutationRecord { target: parent, kind: MutationKind::ChildList { added: 1, removed: 0 } }]);
        Ok(id)
    }

    /// Appends a text node after `parent`'s current children.
    pub fn append_text(&self, parent: NodeId, text: &str) -> Result<NodeId, DomError> {
        let id = {
            let mut state = self.write();
            state.node(parent)?;
            let mut data = NodeData::text_node(text);
            data.parent = Some(parent);
            let id = state.insert(data);
            state.node_mut(parent)?.children.push(id);
            id
        };
        self.notify(vec![MutationRecord { target: parent, kind: MutationKind::ChildList { added: 1, removed: 0 } }]);
        Ok(id)
    }

    /// Appends to `host`'s open shadow root, attaching one if needed.
    pub fn append_to_shadow(&self, host: NodeId, spec: ElementSpec) -> Result<NodeId, DomError> {
        self.insert_in_shadow(host, NodeData::from_spec(spec))
    }

    /// Appends a text node to `host`'s open shadow root.
    pub fn append_shadow_text(&self, host: NodeId, text: &str) -> Result<NodeId, DomError> {
        self.insert_in_shadow(host, NodeData::text_node(text))
    }

    fn insert_in_shadow(&self, host: NodeId, mut data: NodeData) -> Result<NodeId, DomError> {
        let id = {
            let mut state = self.write();
            state.node(host)?;
            data.host = Some(host);
            let id = state.insert(data);
            state.node_mut(host)?.shadow.get_or_insert_with(Vec::new).push(id);
            id
        };
        self.notify(vec![MutationRecord { target: host, kind: MutationKind::ChildList { added: 1, removed: 0 } }]);
        Ok(id)
    }

    pub fn attach_shadow(&self, host: NodeId) -> Result<(), DomError> {
        self.write().node_mut(host)?.shadow.get_or_insert_with(Vec::new);
        Ok(())
    }

    pub fn remove(&self, node: NodeId) -> Result<(), DomError> {
        let parent = self.write().detach(node)?;
        if let Some(parent) = parent {
            self.notify(vec![MutationRecord { target: parent, kind: MutationKind::ChildList { added: 0, removed: 1 } }]);
        }
        Ok(())
    }

    pub fn set_text(&self, node: NodeId, text: &str) -> Result<(), DomError> {
        self.write().node_mut(node)?.text = text.to_string();
        self.notify(vec![MutationRecord { target: node, kind: MutationKind::CharacterData }]);
        Ok(())
    }

    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        let name = name.to_ascii_lowercase();
        {
            let mut state = self.write();
            let data = state.node_mut(node)?;
            if name == "style" {
                data.inline = StyleDeclarations::parse(value);
            } else {
                match data.attrs.iter_mut().find(|(k, _)| *k == name) {
                    Some((_, v)) => *v = value.to_string(),
                    None => data.attrs.push((name.clone(), value.to_string())),
                }
            }
        }
        self.notify(vec![MutationRecord { target: node, kind: MutationKind::Attributes { name } }]);
        Ok(())
    }

    /// A stylesheet rule targeting this element.
    pub fn set_author_style(&self, node: NodeId, name: &str, value: &str, important: bool) -> Result<(), DomError> {
        self.write().node_mut(node)?.author.set(name, value, important);
        Ok(())
    }

    pub fn set_rect(&self, node: NodeId, rect: Rect) -> Result<(), DomError> {
        self.write().node_mut(node)?.rect = Some(rect);
        Ok(())
    }

    pub fn set_click_support(&self, node: NodeId, support: ClickSupport) -> Result<(), DomError> {
        self.write().node_mut(node)?.click = support;
        Ok(())
    }

    pub fn on_click(&self, node: NodeId, effect: ClickEffect) -> Result<(), DomError> {
        self.write().node_mut(node)?.effects.push(effect);
        Ok(())
    }

    pub fn click_count(&self, node: NodeId) -> u32 {
        self.read().nodes.get(node.0 as usize).map(|n| n.clicks).unwrap_or(0)
    }

    pub fn is_connected(&self, node: NodeId) -> bool {
        self.read().is_connected(node)
    }

    /// Inline declaration as `(value, important)`.
    pub fn inline_style(&self, node: NodeId, name: &str) -> Option<(String, bool)> {
        let state = self.read();
        let decl = state.nodes.get(node.0 as usize)?.inline.get(name)?;
        Some((decl.value.clone(), decl.important))
    }

    pub fn inline_css_text(&self, node: NodeId) -> String {
        self.read().nodes.get(node.0 as usize).map(|n| n.inline.to_css_text()).unwrap_or_default()
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.read()
            .nodes
            .get(node.0 as usize)
            .and_then(|n| n.attr("class"))
            .is_some_and(|value| value.split_ascii_whitespace().any(|c| c == class))
    }

    /// First connected element with this `id` attribute, shadow trees included.
    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        let state = self.read();
        (0..state.nodes.len())
            .map(|i| NodeId(i as u64))
            .find(|n| state.nodes[n.0 as usize].attr("id") == Some(id) && state.is_connected(*n))
    }

    fn activate(&self, node: NodeId, synthetic: bool) -> Result<(), DomError> {
        let records = {
            let mut state = self.write();
            let data = state.node_mut(node)?;
            let allowed = match data.click {
                ClickSupport::Native => true,
                ClickSupport::SyntheticOnly => synthetic,
                ClickSupport::Broken => false,
            };
            if !allowed {
                let how = if synthetic { "dispatchEvent" } else { "click()" };
                return Err(DomError::Click(format!("{} threw on {}", how, node)));
            }
            data.clicks += 1;
            let effects = data.effects.clone();
            let mut records = Vec::new();
            for effect in &effects {
                match effect {
                    ClickEffect::Remove(target) => {
                        if let Some(parent) = state.detach(*target)? {
                            records.push(MutationRecord {
                                target: parent,
                                kind: MutationKind::ChildList { added: 0, removed: 1 },
                            });
                        }
                    }
                    ClickEffect::Hide(target) => {
                        state.node_mut(*target)?.inline.set("display", "none", false);
                        records.push(MutationRecord { target: *target, kind: MutationKind::Attributes { name: "style".into() } });
                    }
                    ClickEffect::RemoveClass(target, class) => {
                        remove_class_in(state.node_mut(*target)?, class);
                        records.push(MutationRecord { target: *target, kind: MutationKind::Attributes { name: "class".into() } });
                    }
                    ClickEffect::RemoveInlineStyle(target, name) => {
                        state.node_mut(*target)?.inline.remove(name);
                        records.push(MutationRecord { target: *target, kind: MutationKind::Attributes { name: "style".into() } });
                    }
                }
            }
            records
        };
        self.notify(records);
        Ok(())
    }
}

fn remove_class_in(node: &mut NodeData, class: &str) -> bool {
    let Some((_, value)) = node.attrs.iter_mut().find(|(k, _)| k == "class") else {
        return false;
    };
    let classes: Vec<&str> = value.split_ascii_whitespace().collect();
    if !classes.contains(&class) {
        return false;
    }
    *value = classes.into_iter().filter(|c| *c != class).collect::<Vec<_>>().join(" ");
    true
}

#[async_trait]
impl Document for MemoryDocument {
    async fn document_element(&self) -> Result<NodeId, DomError> {
        Ok(self.read().root)
    }

    async fn body(&self) -> Result<Option<NodeId>, DomError> {
        Ok(Some(self.read().body))
    }

    async fn query_selector_all(&self, root: QueryRoot, selector: &str) -> Result<Vec<NodeId>, DomError> {
        let compiled = CompiledSelector::parse(selector)?;
        let state = self.read();
        let candidates = state.scope(root, false)?;
        let scope = match root {
            QueryRoot::Element(id) => Some(id),
            _ => None,
        };
        Ok(compiled.filter(&state, candidates, scope))
    }

    async fn shadow_hosts(&self, root: QueryRoot) -> Result<Vec<NodeId>, DomError> {
        let state = self.read();
        let scope = state.scope(root, true)?;
        Ok(scope
            .into_iter()
            .filter(|id| state.nodes[id.0 as usize].shadow.is_some())
            .collect())
    }

    async fn parent(&self, node: NodeId) -> Result<Option<NodeId>, DomError> {
        Ok(self.read().node(node)?.parent)
    }

    async fn children(&self, node: NodeId) -> Result<Vec<NodeId>, DomError> {
        let state = self.read();
        Ok(state
            .node(node)?
            .children
            .iter()
            .copied()
            .filter(|child| !state.nodes[child.0 as usize].is_text())
            .collect())
    }

    async fn tag_name(&self, node: NodeId) -> Result<String, DomError> {
        Ok(self.read().node(node)?.tag.to_ascii_uppercase())
    }

    async fn attribute(&self, node: NodeId, name: &str) -> Result<Option<String>, DomError> {
        let state = self.read();
        let data = state.node(node)?;
        if name.eq_ignore_ascii_case("style") {
            return Ok((!data.inline.is_empty()).then(|| data.inline.to_css_text()));
        }
        Ok(data.attr(&name.to_ascii_lowercase()).map(str::to_string))
    }

    async fn inner_text(&self, node: NodeId) -> Result<String, DomError> {
        let state = self.read();
        state.node(node)?;
        let mut parts = Vec::new();
        state.collect_text(node, &mut parts);
        Ok(parts.join(" "))
    }

    async fn bounding_rect(&self, node: NodeId) -> Result<Rect, DomError> {
        self.read().layout_rect(node)
    }

    async fn computed_style(&self, node: NodeId) -> Result<ComputedStyle, DomError> {
        self.read().computed(node)
    }

    async fn viewport(&self) -> Result<Viewport, DomError> {
        Ok(self.read().viewport)
    }

    async fn frame(&self) -> Result<FrameContext, DomError> {
        Ok(self.read().frame)
    }

    async fn hostname(&self) -> Result<String, DomError> {
        Ok(self.read().hostname.clone())
    }

    async fn click(&self, node: NodeId) -> Result<(), DomError> {
        self.activate(node, false)
    }

    async fn dispatch_click(&self, node: NodeId) -> Result<(), DomError> {
        self.activate(node, true)
    }

    async fn set_style_property(&self, node: NodeId, name: &str, value: &str, important: bool) -> Result<(), DomError> {
        self.write().node_mut(node)?.inline.set(name, value, important);
        self.notify(vec![MutationRecord { target: node, kind: MutationKind::Attributes { name: "style".into() } }]);
        Ok(())
    }

    async fn remove_style_property(&self, node: NodeId, name: &str) -> Result<bool, DomError> {
        let removed = self.write().node_mut(node)?.inline.remove(name);
        if removed {
            self.notify(vec![MutationRecord { target: node, kind: MutationKind::Attributes { name: "style".into() } }]);
        }
        Ok(removed)
    }

    async fn remove_class(&self, node: NodeId, class: &str) -> Result<bool, DomError> {
        let removed = remove_class_in(self.write().node_mut(node)?, class);
        if removed {
            self.notify(vec![MutationRecord { target: node, kind: MutationKind::Attributes { name: "class".into() } }]);
        }
        Ok(removed)
    }
}
