//! Signs that a consent-management platform is talking over frames.

use serde::{Deserialize, Serialize};
use tracing::debug;
use unbanner_dom::{Document, QueryRoot, deep_query_all};

pub const LOCATOR_FRAME_NAME: &str = "__tcfapiLocator";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameInfo {
    pub name: String,
    pub src: String,
}

impl FrameInfo {
    pub fn new(name: &str, src: &str) -> Self {
        Self { name: name.to_string(), src: src.to_string() }
    }

    /// The TCF locator frame, or a frame whose name or source names a CMP.
    pub fn is_cmp_frame(&self) -> bool {
        self.name == LOCATOR_FRAME_NAME
            || self.name.contains("cmp")
            || self.src.contains("consent")
            || self.src.contains("cmp")
    }
}

pub fn has_locator_frame(frames: &[FrameInfo]) -> bool {
    match frames.iter().find(|f| f.is_cmp_frame()) {
        Some(frame) => {
            debug!(name = %frame.name, src = %frame.src, "CMP frame detected");
            true
        }
        None => false,
    }
}

/// Every `<iframe>` in the document, shadow trees included.
pub async fn frames_in<D: Document + ?Sized>(doc: &D) -> Vec<FrameInfo> {
    let mut frames = Vec::new();
    for node in deep_query_all(doc, "iframe", QueryRoot::Document).await {
        let name = doc.attribute(node, "name").await.ok().flatten().unwrap_or_default();
        let src = doc.attribute(node, "src").await.ok().flatten().unwrap_or_default();
        frames.push(FrameInfo { name, src });
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use unbanner_dom::{ElementSpec, MemoryDocument};

    #[test]
    fn recognises_cmp_frames() {
        assert!(FrameInfo::new("__tcfapiLocator", "").is_cmp_frame());
        assert!(FrameInfo::new("sp_cmp_frame", "").is_cmp_frame());
        assert!(FrameInfo::new("", "https://consent.example/frame.html").is_cmp_frame());
        assert!(!FrameInfo::new("player", "https://video.example/embed").is_cmp_frame());
    }

    #[tokio::test]
    async fn collects_frames_from_document() {
        let doc = MemoryDocument::new("example.com");
        let host = doc.append(doc.body_id(), ElementSpec::new("div")).unwrap();
        doc.append(doc.body_id(), ElementSpec::new("iframe").attr("name", "ad")).unwrap();
        doc.append_to_shadow(host, ElementSpec::new("iframe").attr("src", "https://cdn.cmp.example/ui")).unwrap();

        let frames = frames_in(&doc).await;
        assert_eq!(frames.len(), 2);
        assert!(has_locator_frame(&frames));
    }
}
