//! Predicates and mutations over page elements.
//!
//! Every probe is infallible from the caller's point of view: a backend error
//! reads as "not visible", "not fixed", `0`, or "nothing done".

use tracing::debug;

use crate::document::{Document, NodeId};

pub const HIGH_Z_INDEX: i64 = 1000;

const SCROLL_LOCK_PROPERTIES: &[&str] = &[
    "overflow",
    "overflow-x",
    "overflow-y",
    "position",
    "height",
    "max-height",
    "padding-right",
    "margin-right",
];

const SCROLL_LOCK_CLASSES: &[&str] = &[
    "modal-open",
    "no-scroll",
    "scroll-lock",
    "overflow-hidden",
    "cookie-consent-open",
    "cmp-open",
    "has-overlay",
];

const HIDE_DECLARATIONS: &[(&str, &str)] = &[
    ("display", "none"),
    ("visibility", "hidden"),
    ("opacity", "0"),
    ("pointer-events", "none"),
];

pub async fn is_visible<D: Document + ?Sized>(doc: &D, node: NodeId) -> bool {
    let Ok(rect) = doc.bounding_rect(node).await else { return false };
    if rect.is_empty() {
        return false;
    }
    let Ok(style) = doc.computed_style(node).await else { return false };
    style.display != "none" && style.visibility != "hidden" && style.opacity_value() > 0.0
}

pub async fn is_fixed<D: Document + ?Sized>(doc: &D, node: NodeId) -> bool {
    doc.computed_style(node)
        .await
        .map(|s| s.position == "fixed" || s.position == "sticky")
        .unwrap_or(false)
}

pub async fn z_index<D: Document + ?Sized>(doc: &D, node: NodeId) -> i64 {
    doc.computed_style(node).await.map(|s| s.z_index_value()).unwrap_or(0)
}

pub async fn has_high_z_index<D: Document + ?Sized>(doc: &D, node: NodeId, threshold: i64) -> bool {
    z_index(doc, node).await >= threshold
}

/// Alpha channel of an `rgba(...)`/`hsla(...)` color, if it has one.
fn color_alpha(color: &str) -> Option<f64> {
    let color = color.trim().to_ascii_lowercase();
    let args = color
        .strip_prefix("rgba(")
        .or_else(|| color.strip_prefix("hsla("))?
        .strip_suffix(')')?;
    let alpha = args.rsplit([',', '/']).next()?.trim();
    match alpha.strip_suffix('%') {
        Some(pct) => pct.trim().parse::<f64>().ok().map(|p| p / 100.0),
        None => alpha.parse().ok(),
    }
}

/// Positioned (`fixed`/`absolute`) and at least one of: high z-index, covers half
/// the viewport on either axis, translucent, or blurs what is behind it.
pub async fn is_overlay<D: Document + ?Sized>(doc: &D, node: NodeId) -> bool {
    let Ok(style) = doc.computed_style(node).await else { return false };
    if style.position != "fixed" && style.position != "absolute" {
        return false;
    }
    if style.z_index_value() >= HIGH_Z_INDEX {
        return true;
    }
    if let (Ok(rect), Ok(viewport)) = (doc.bounding_rect(node).await, doc.viewport().await) {
        if rect.width >= viewport.width * 0.5 || rect.height >= viewport.height * 0.5 {
            return true;
        }
    }
    let translucent = color_alpha(&style.background_color).is_some_and(|a| a < 1.0) || style.opacity_value() < 1.0;
    translucent || style.backdrop_filter.trim() != "none"
}

pub async fn has_scroll_lock<D: Document + ?Sized>(doc: &D) -> bool {
    if let Ok(root) = doc.document_element().await {
        if doc.computed_style(root).await.is_ok_and(|s| s.overflow == "hidden") {
            return true;
        }
    }
    if let Ok(Some(body)) = doc.body().await {
        if let Ok(style) = doc.computed_style(body).await {
            return style.overflow == "hidden" || style.position == "fixed";
        }
    }
    false
}

/// Strips scroll-locking inline styles and classes from the root and body.
/// Returns how many properties and classes were actually removed.
pub async fn restore_scroll<D: Document + ?Sized>(doc: &D) -> usize {
    let mut targets = Vec::with_capacity(2);
    if let Ok(Some(body)) = doc.body().await {
        targets.push(body);
    }
    if let Ok(root) = doc.document_element().await {
        targets.push(root);
    }

    let mut removed = 0;
    for target in targets {
        for property in SCROLL_LOCK_PROPERTIES {
            if doc.remove_style_property(target, property).await.unwrap_or(false) {
                removed += 1;
            }
        }
        for class in SCROLL_LOCK_CLASSES {
            if doc.remove_class(target, class).await.unwrap_or(false) {
                removed += 1;
            }
        }
    }
    if removed > 0 {
        debug!(removed, "restored page scroll");
    }
    removed
}

/// Hides with `!important` declarations so page CSS cannot bring it back.
pub async fn hide_element<D: Document + ?Sized>(doc: &D, node: NodeId) -> bool {
    for (name, value) in HIDE_DECLARATIONS {
        if let Err(e) = doc.set_style_property(node, name, value, true).await {
            debug!(%node, error = %e, "hide failed");
            return false;
        }
    }
    true
}

/// Native click, then a synthetic click event. False only if both fail.
pub async fn safe_click<D: Document + ?Sized>(doc: &D, node: NodeId) -> bool {
    match doc.click(node).await {
        Ok(()) => true,
        Err(native) => match doc.dispatch_click(node).await {
            Ok(()) => true,
            Err(synthetic) => {
                debug!(%node, native = %native, synthetic = %synthetic, "click failed");
                false
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Rect;
    use crate::memory::{ClickSupport, ElementSpec, MemoryDocument};

    #[test]
    fn alpha_parsing() {
        assert_eq!(color_alpha("rgba(0, 0, 0, 0.5)"), Some(0.5));
        assert_eq!(color_alpha("hsla(0 0% 0% / 40%)"), Some(0.4));
        assert_eq!(color_alpha("rgb(0, 0, 0)"), None);
        assert_eq!(color_alpha("white"), None);
    }

    #[tokio::test]
    async fn visibility_checks() {
        let doc = MemoryDocument::new("example.com");
        let body = doc.body_id();
        let shown = doc.append(body, ElementSpec::new("div")).unwrap();
        let transparent = doc.append(body, ElementSpec::new("div").style("opacity: 0")).unwrap();
        let invisible = doc.append(body, ElementSpec::new("div").css("visibility: hidden")).unwrap();
        let flat = doc.append(body, ElementSpec::new("div").rect(0.0, 0.0, 100.0, 0.0)).unwrap();

        assert!(is_visible(&doc, shown).await);
        assert!(!is_visible(&doc, transparent).await);
        assert!(!is_visible(&doc, invisible).await);
        assert!(!is_visible(&doc, flat).await);
        assert!(!is_visible(&doc, NodeId(9999)).await);
    }

    #[tokio::test]
    async fn overlay_requires_positioning() {
        let doc = MemoryDocument::new("example.com");
        let body = doc.body_id();
        let static_big = doc.append(body, ElementSpec::new("div").style("width: 100%; height: 100%")).unwrap();
        let fixed_small = doc
            .append(body, ElementSpec::new("div").style("position: fixed; z-index: 5; background-color: rgb(255, 255, 255)"))
            .unwrap();
        let fixed_high = doc.append(body, ElementSpec::new("div").style("position: fixed; z-index: 99999")).unwrap();
        let absolute_wide = doc
            .append(body, ElementSpec::new("div").style("position: absolute; background-color: white"))
            .unwrap();
        doc.set_rect(absolute_wide, Rect::new(0.0, 0.0, 1280.0, 40.0)).unwrap();

        assert!(!is_overlay(&doc, static_big).await);
        assert!(!is_overlay(&doc, fixed_small).await);
        assert!(is_overlay(&doc, fixed_high).await);
        assert!(is_overlay(&doc, absolute_wide).await);
        assert!(is_fixed(&doc, fixed_high).await);
        assert!(has_high_z_index(&doc, fixed_high, HIGH_Z_INDEX).await);
        assert_eq!(z_index(&doc, static_big).await, 0);
    }

    #[tokio::test]
    async fn scroll_lock_detection_and_restore() {
        let doc = MemoryDocument::new("example.com");
        let body = doc.body_id();
        assert!(!has_scroll_lock(&doc).await);

        doc.set_attribute(body, "style", "overflow: hidden; padding-right: 15px").unwrap();
        doc.set_attribute(body, "class", "page modal-open").unwrap();
        assert!(has_scroll_lock(&doc).await);

        assert_eq!(restore_scroll(&doc).await, 3);
        assert!(!has_scroll_lock(&doc).await);
        assert!(doc.has_class(body, "page"));
        assert!(!doc.has_class(body, "modal-open"));
    }

    #[tokio::test]
    async fn fixed_body_counts_as_scroll_lock() {
        let doc = MemoryDocument::new("example.com");
        doc.set_attribute(doc.body_id(), "style", "position: fixed").unwrap();
        assert!(has_scroll_lock(&doc).await);
    }

    #[tokio::test]
    async fn hide_beats_important_author_rule() {
        let doc = MemoryDocument::new("example.com");
        let banner = doc.append(doc.body_id(), ElementSpec::new("div").css("display: block !important")).unwrap();
        assert!(hide_element(&doc, banner).await);
        assert!(!is_visible(&doc, banner).await);
        assert_eq!(doc.inline_style(banner, "pointer-events"), Some(("none".to_string(), true)));
    }

    #[tokio::test]
    async fn safe_click_falls_back_to_dispatch() {
        let doc = MemoryDocument::new("example.com");
        let body = doc.body_id();
        let synthetic = doc.append(body, ElementSpec::new("button")).unwrap();
        let broken = doc.append(body, ElementSpec::new("button")).unwrap();
        doc.set_click_support(synthetic, ClickSupport::SyntheticOnly).unwrap();
        doc.set_click_support(broken, ClickSupport::Broken).unwrap();

        assert!(safe_click(&doc, synthetic).await);
        assert_eq!(doc.click_count(synthetic), 1);
        assert!(!safe_click(&doc, broken).await);
        assert_eq!(doc.click_count(broken), 0);
    }
}
