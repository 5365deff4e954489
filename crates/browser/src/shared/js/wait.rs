pub const CHECK_LOADING: &str = r#"
() => ({
    readyState: document.readyState,
    loading: document.readyState === 'loading',
    hasBody: !!document.body
})
"#;

/// Starts queueing structural and presentational mutations on the whole
/// document. Records are shaped like `MutationRecord` so they deserialize as-is.
pub const OBSERVE_MUTATIONS: &str = r#"
(nodes) => {
    if (window.__unbannerObserver) return { ok: false };
    const pending = window.__unbannerMutations = [];
    const observer = new MutationObserver(records => {
        for (const r of records) {
            let kind;
            if (r.type === 'childList') {
                kind = { ChildList: { added: r.addedNodes.length, removed: r.removedNodes.length } };
            } else if (r.type === 'attributes') {
                kind = { Attributes: { name: r.attributeName || '' } };
            } else {
                kind = 'CharacterData';
            }
            pending.push({ target: nodes.id(r.target), kind });
        }
        if (pending.length > 1000) pending.splice(0, pending.length - 1000);
    });
    observer.observe(document.documentElement, {
        childList: true,
        subtree: true,
        attributes: true,
        attributeFilter: ['class', 'style', 'hidden']
    });
    window.__unbannerObserver = observer;
    return { ok: true };
}
"#;

/// `{ ok: null }` when the observer is gone, e.g. after a navigation.
pub const DRAIN_MUTATIONS: &str = r#"
(nodes) => {
    if (!window.__unbannerObserver) return { ok: null };
    return { ok: window.__unbannerMutations.splice(0) };
}
"#;
