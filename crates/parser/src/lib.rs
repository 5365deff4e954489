use anyhow::{Context, Result};
use reqwest::Client;
use scraper::{ElementRef, Html};
use tracing::debug;
use unbanner_core::{Policy, ScanError};
use unbanner_dom::style::StyleDeclarations;
use unbanner_dom::{Document, ElementSpec, MemoryDocument, NodeId, QueryRoot};
use unbanner_engine::{ScanOutcome, ScanSession, scan_page};

/// Where parsed children go.
#[derive(Clone, Copy)]
enum Target {
    Light(NodeId),
    Shadow(NodeId),
}

impl Target {
    fn scope(self) -> QueryRoot {
        match self {
            Target::Light(_) => QueryRoot::Document,
            Target::Shadow(host) => QueryRoot::Shadow(host),
        }
    }
}

/// `<style>` contents and the tree scope they apply to.
struct Sheet {
    scope: QueryRoot,
    css: String,
}

fn spec_for(element: ElementRef<'_>) -> ElementSpec {
    let value = element.value();
    let mut spec = ElementSpec::new(value.name());
    for (name, attr) in value.attrs() {
        spec = spec.attr(name, attr);
    }
    if value.attr("hidden").is_some() {
        spec = spec.css("display: none");
    }
    spec
}

fn copy_attributes(doc: &MemoryDocument, node: NodeId, element: ElementRef<'_>) -> Result<(), ScanError> {
    for (name, value) in element.value().attrs() {
        doc.set_attribute(node, name, value)?;
    }
    Ok(())
}

fn build_children(
    doc: &MemoryDocument,
    target: Target,
    parent: ElementRef<'_>,
    sheets: &mut Vec<Sheet>,
) -> Result<(), ScanError> {
    for child in parent.children() {
        if let Some(text) = child.value().as_text() {
            let text = text.trim();
            if !text.is_empty() {
                match target {
                    Target::Light(node) => doc.append_text(node, text)?,
                    Target::Shadow(host) => doc.append_shadow_text(host, text)?,
                };
            }
            continue;
        }
        let Some(element) = ElementRef::wrap(child) else {
            continue;
        };
        match element.value().name() {
            "script" | "noscript" | "head" => continue,
            "style" => {
                sheets.push(Sheet { scope: target.scope(), css: element.text().collect() });
                continue;
            }
            "template" => {
                // declarative shadow root: contents belong to the enclosing element
                if let (Some(_), Target::Light(host)) = (element.value().attr("shadowrootmode"), target) {
                    doc.attach_shadow(host)?;
                    build_children(doc, Target::Shadow(host), element, sheets)?;
                }
                continue;
            }
            _ => {}
        }

        let node = match target {
            Target::Light(parent) => doc.append(parent, spec_for(element))?,
            Target::Shadow(host) => doc.append_to_shadow(host, spec_for(element))?,
        };
        build_children(doc, Target::Light(node), element, sheets)?;
    }
    Ok(())
}

fn strip_comments(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        rest = match rest[start + 2..].find("*/") {
            Some(end) => &rest[start + 2 + end + 2..],
            None => "",
        };
    }
    out.push_str(rest);
    out
}

/// Applies flat `selector { declarations }` rules. At-rules and selectors the
/// engine cannot match are skipped.
async fn apply_sheet(doc: &MemoryDocument, sheet: &Sheet) -> usize {
    let mut applied = 0;
    for rule in strip_comments(&sheet.css).split('}') {
        let Some((selector, body)) = rule.split_once('{') else {
            continue;
        };
        let selector = selector.trim();
        if selector.is_empty() || selector.starts_with('@') {
            continue;
        }
        let declarations = StyleDeclarations::parse(body);
        let nodes = match doc.query_selector_all(sheet.scope, selector).await {
            Ok(nodes) => nodes,
            Err(e) => {
                debug!(selector, error = %e, "stylesheet rule skipped");
                continue;
            }
        };
        for node in nodes {
            for decl in declarations.iter() {
                doc.set_author_style(node, &decl.name, &decl.value, decl.important).ok();
            }
            applied += 1;
        }
    }
    applied
}

fn build_tree(html: &str, hostname: &str) -> Result<(MemoryDocument, Vec<Sheet>), ScanError> {
    let parsed = Html::parse_document(html);
    let doc = MemoryDocument::new(hostname);
    let root = parsed.root_element();
    copy_attributes(&doc, doc.root_id(), root)?;

    let mut sheets = Vec::new();
    for child in root.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "head" => {
                for style in child.children().filter_map(ElementRef::wrap).filter(|e| e.value().name() == "style") {
                    sheets.push(Sheet { scope: QueryRoot::Document, css: style.text().collect() });
                }
            }
            "body" => {
                let body = doc.body_id();
                copy_attributes(&doc, body, child)?;
                build_children(&doc, Target::Light(body), child, &mut sheets)?;
            }
            _ => {}
        }
    }
    Ok((doc, sheets))
}

/// Builds an in-memory page from HTML. Declarative shadow roots
/// (`<template shadowrootmode>`) become real shadow trees, and flat
/// stylesheet rules are applied as author styles.
pub async fn build_document(html: &str, hostname: &str) -> Result<MemoryDocument, ScanError> {
    let (doc, sheets) = build_tree(html, hostname)?;
    for sheet in &sheets {
        let applied = apply_sheet(&doc, sheet).await;
        debug!(applied, "stylesheet applied");
    }
    Ok(doc)
}

/// One scan pass over static HTML.
pub async fn scan_html(html: &str, hostname: &str, policy: Policy) -> Result<ScanOutcome, ScanError> {
    let doc = build_document(html, hostname).await?;
    let session = ScanSession::with_policy(hostname, policy);
    Ok(scan_page(&doc, &session).await)
}

/// Fetches pages over HTTP for offline classification. Scripts do not run, so
/// only server-rendered banners are visible this way.
pub struct PageLoader {
    client: Client,
}

impl Default for PageLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl PageLoader {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }

    pub async fn fetch(&self, url: &str) -> Result<MemoryDocument> {
        let response = self.client.get(url).send().await.with_context(|| format!("fetching {}", url))?;
        let hostname = response.url().host_str().unwrap_or_default().to_string();
        let html = response.text().await.with_context(|| format!("reading body of {}", url))?;
        debug!(url, hostname, bytes = html.len(), "page fetched");
        Ok(build_document(&html, &hostname).await?)
    }
}
