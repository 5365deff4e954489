use std::collections::HashSet;

use tracing::debug;

use crate::document::{Document, DomError, NodeId, QueryRoot};

/// `querySelectorAll` across `root` and every shadow root reachable from it,
/// however deeply nested.
///
/// Results are de-duplicated and ordered by discovery: a scope's own matches come
/// before those of the shadow trees it hosts. An invalid selector yields nothing;
/// a scope that cannot be read is skipped.
pub async fn deep_query_all<D: Document + ?Sized>(doc: &D, selector: &str, root: QueryRoot) -> Vec<NodeId> {
    let mut results = Vec::new();
    let mut seen = HashSet::new();
    let mut visited = HashSet::new();
    let mut worklist = vec![root];

    while let Some(scope) = worklist.pop() {
        if !visited.insert(scope) {
            continue;
        }

        match doc.query_selector_all(scope, selector).await {
            Ok(found) => {
                for node in found {
                    if seen.insert(node) {
                        results.push(node);
                    }
                }
            }
            Err(DomError::InvalidSelector { reason, .. }) => {
                debug!(selector, %reason, "invalid selector, no matches");
                return Vec::new();
            }
            Err(e) => {
                debug!(?scope, error = %e, "skipping unreadable scope");
                continue;
            }
        }

        match doc.shadow_hosts(scope).await {
            Ok(hosts) => worklist.extend(hosts.into_iter().rev().map(QueryRoot::Shadow)),
            Err(e) => debug!(?scope, error = %e, "shadow traversal failed"),
        }
    }

    results
}
