use async_trait::async_trait;
use chromiumoxide::page::Page;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use unbanner_dom::{ComputedStyle, Document, DomError, FrameContext, NodeId, QueryRoot, Rect, Viewport};

use crate::shared::{js, to_dom_error};

/// Answer envelope shared by every element script.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
enum Reply<T> {
    Ok(T),
    Missing(NodeId),
    InvalidSelector(String),
    ClickFailed(String),
}

impl<T> Reply<T> {
    fn into_result(self) -> Result<T, DomError> {
        match self {
            Reply::Ok(value) => Ok(value),
            Reply::Missing(id) => Err(DomError::UnknownNode(id)),
            Reply::InvalidSelector(reason) => Err(DomError::InvalidSelector { selector: String::new(), reason }),
            Reply::ClickFailed(reason) => Err(DomError::Click(reason)),
        }
    }
}

fn root_arg(root: QueryRoot) -> Value {
    match root {
        QueryRoot::Document => json!({ "kind": "document" }),
        QueryRoot::Element(id) => json!({ "kind": "element", "id": id.0 }),
        QueryRoot::Shadow(id) => json!({ "kind": "shadow", "id": id.0 }),
    }
}

fn parse_reply<T: DeserializeOwned>(value: Option<&Value>) -> Result<T, DomError> {
    let value = value.cloned().unwrap_or(Value::Null);
    let reply: Reply<T> =
        serde_json::from_value(value).map_err(|e| DomError::Backend(format!("unexpected script result: {}", e)))?;
    reply.into_result()
}

/// A live Chromium page. Elements are addressed through a registry injected
/// into the page, so a [`NodeId`] stays valid for as long as the element exists.
#[derive(Clone)]
pub struct ChromiumDocument {
    page: Page,
}

impl ChromiumDocument {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub(crate) async fn call<T: DeserializeOwned>(&self, func: &str, args: &[Value]) -> Result<T, DomError> {
        let script = js::build_registry_call(func, args);
        let result = self.page.evaluate(script).await.map_err(|e| to_dom_error(e, "evaluate"))?;
        parse_reply(result.value())
    }

    async fn on_node<T: DeserializeOwned>(&self, func: &str, node: NodeId, args: &[Value]) -> Result<T, DomError> {
        let mut all = Vec::with_capacity(args.len() + 1);
        all.push(json!(node.0));
        all.extend_from_slice(args);
        self.call(func, &all).await
    }
}

#[async_trait]
impl Document for ChromiumDocument {
    async fn document_element(&self) -> Result<NodeId, DomError> {
        self.call(js::element::DOCUMENT_ELEMENT, &[]).await
    }

    async fn body(&self) -> Result<Option<NodeId>, DomError> {
        self.call(js::element::BODY, &[]).await
    }

    async fn query_selector_all(&self, root: QueryRoot, selector: &str) -> Result<Vec<NodeId>, DomError> {
        self.call(js::element::QUERY_ALL, &[root_arg(root), json!(selector)])
            .await
            .map_err(|e| match e {
                DomError::InvalidSelector { reason, .. } => {
                    DomError::InvalidSelector { selector: selector.to_string(), reason }
                }
                other => other,
            })
    }

    async fn shadow_hosts(&self, root: QueryRoot) -> Result<Vec<NodeId>, DomError> {
        self.call(js::element::SHADOW_HOSTS, &[root_arg(root)]).await
    }

    async fn parent(&self, node: NodeId) -> Result<Option<NodeId>, DomError> {
        self.on_node(js::element::PARENT, node, &[]).await
    }

    async fn children(&self, node: NodeId) -> Result<Vec<NodeId>, DomError> {
        self.on_node(js::element::CHILDREN, node, &[]).await
    }

    async fn tag_name(&self, node: NodeId) -> Result<String, DomError> {
        self.on_node(js::element::TAG_NAME, node, &[]).await
    }

    async fn attribute(&self, node: NodeId, name: &str) -> Result<Option<String>, DomError> {
        self.on_node(js::element::ATTRIBUTE, node, &[json!(name)]).await
    }

    async fn inner_text(&self, node: NodeId) -> Result<String, DomError> {
        self.on_node(js::element::INNER_TEXT, node, &[]).await
    }

    async fn bounding_rect(&self, node: NodeId) -> Result<Rect, DomError> {
        self.on_node(js::element::BOUNDING_RECT, node, &[]).await
    }

    async fn computed_style(&self, node: NodeId) -> Result<ComputedStyle, DomError> {
        self.on_node(js::element::COMPUTED_STYLE, node, &[]).await
    }

    async fn viewport(&self) -> Result<Viewport, DomError> {
        self.call(js::element::VIEWPORT, &[]).await
    }

    async fn frame(&self) -> Result<FrameContext, DomError> {
        self.call(js::element::FRAME, &[]).await
    }

    async fn hostname(&self) -> Result<String, DomError> {
        self.call(js::element::HOSTNAME, &[]).await
    }

    async fn click(&self, node: NodeId) -> Result<(), DomError> {
        self.on_node(js::element::CLICK, node, &[]).await
    }

    async fn dispatch_click(&self, node: NodeId) -> Result<(), DomError> {
        self.on_node(js::element::DISPATCH_CLICK, node, &[]).await
    }

    async fn set_style_property(&self, node: NodeId, name: &str, value: &str, important: bool) -> Result<(), DomError> {
        self.on_node(js::element::SET_STYLE_PROPERTY, node, &[json!(name), json!(value), json!(important)])
            .await
    }

    async fn remove_style_property(&self, node: NodeId, name: &str) -> Result<bool, DomError> {
        self.on_node(js::element::REMOVE_STYLE_PROPERTY, node, &[json!(name)]).await
    }

    async fn remove_class(&self, node: NodeId, class: &str) -> Result<bool, DomError> {
        self.on_node(js::element::REMOVE_CLASS, node, &[json!(class)]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replies_map_onto_dom_errors() {
        let ids: Vec<NodeId> = parse_reply(Some(&json!({ "ok": [3, 4] }))).unwrap();
        assert_eq!(ids, vec![NodeId(3), NodeId(4)]);

        let body: Option<NodeId> = parse_reply(Some(&json!({ "ok": null }))).unwrap();
        assert_eq!(body, None);

        let missing = parse_reply::<String>(Some(&json!({ "missing": 9 }))).unwrap_err();
        assert!(matches!(missing, DomError::UnknownNode(NodeId(9))));

        let click = parse_reply::<()>(Some(&json!({ "clickFailed": "detached" }))).unwrap_err();
        assert!(matches!(click, DomError::Click(reason) if reason == "detached"));

        assert!(matches!(parse_reply::<()>(None), Err(DomError::Backend(_))));
    }

    #[test]
    fn page_styles_deserialize() {
        let style: ComputedStyle = parse_reply(Some(&json!({
            "ok": {
                "display": "flex",
                "visibility": "visible",
                "opacity": "0.9",
                "position": "fixed",
                "zIndex": "2147483647",
                "overflow": "hidden",
                "backgroundColor": "rgba(0, 0, 0, 0.5)",
                "backdropFilter": "blur(4px)"
            }
        })))
        .unwrap();
        assert_eq!(style.z_index_value(), 2147483647);
        assert_eq!(style.backdrop_filter, "blur(4px)");

        let frame: FrameContext =
            parse_reply(Some(&json!({ "ok": { "top_level": false, "width": 120.0, "height": 60.0 } }))).unwrap();
        assert!(!frame.top_level);
    }

    #[test]
    fn roots_are_tagged() {
        assert_eq!(root_arg(QueryRoot::Document), json!({ "kind": "document" }));
        assert_eq!(root_arg(QueryRoot::Shadow(NodeId(5))), json!({ "kind": "shadow", "id": 5 }));
    }
}
