//! Element scripts. Each takes the node registry first and answers with one of
//! `{ ok }`, `{ missing: id }`, `{ invalidSelector }` or `{ clickFailed }`.

pub const DOCUMENT_ELEMENT: &str = r#"
(nodes) => ({ ok: nodes.id(document.documentElement) })
"#;

pub const BODY: &str = r#"
(nodes) => ({ ok: document.body ? nodes.id(document.body) : null })
"#;

pub const QUERY_ALL: &str = r#"
(nodes, root, selector) => {
    let scope = document;
    if (root.kind !== 'document') {
        const host = nodes.get(root.id);
        if (!host) return { missing: root.id };
        scope = root.kind === 'shadow' ? host.shadowRoot : host;
        if (!scope) return { ok: [] };
    }
    try {
        return { ok: Array.from(scope.querySelectorAll(selector), el => nodes.id(el)) };
    } catch (e) {
        return { invalidSelector: String((e && e.message) || e) };
    }
}
"#;

pub const SHADOW_HOSTS: &str = r#"
(nodes, root) => {
    let scope = document;
    const found = [];
    if (root.kind !== 'document') {
        const host = nodes.get(root.id);
        if (!host) return { missing: root.id };
        scope = root.kind === 'shadow' ? host.shadowRoot : host;
        if (!scope) return { ok: [] };
        if (root.kind === 'element' && host.shadowRoot) found.push(nodes.id(host));
    }
    for (const el of scope.querySelectorAll('*')) {
        if (el.shadowRoot) found.push(nodes.id(el));
    }
    return { ok: found };
}
"#;

pub const PARENT: &str = r#"
(nodes, id) => {
    const el = nodes.get(id);
    if (!el) return { missing: id };
    return { ok: el.parentElement ? nodes.id(el.parentElement) : null };
}
"#;

pub const CHILDREN: &str = r#"
(nodes, id) => {
    const el = nodes.get(id);
    if (!el) return { missing: id };
    return { ok: Array.from(el.children, child => nodes.id(child)) };
}
"#;

pub const TAG_NAME: &str = r#"
(nodes, id) => {
    const el = nodes.get(id);
    if (!el) return { missing: id };
    return { ok: el.tagName.toUpperCase() };
}
"#;

pub const ATTRIBUTE: &str = r#"
(nodes, id, name) => {
    const el = nodes.get(id);
    if (!el) return { missing: id };
    return { ok: el.getAttribute(name) };
}
"#;

pub const INNER_TEXT: &str = r#"
(nodes, id) => {
    const el = nodes.get(id);
    if (!el) return { missing: id };
    return { ok: typeof el.innerText === 'string' ? el.innerText : (el.textContent || '') };
}
"#;

pub const BOUNDING_RECT: &str = r#"
(nodes, id) => {
    const el = nodes.get(id);
    if (!el) return { missing: id };
    const r = el.getBoundingClientRect();
    return { ok: { x: r.x, y: r.y, width: r.width, height: r.height } };
}
"#;

pub const COMPUTED_STYLE: &str = r#"
(nodes, id) => {
    const el = nodes.get(id);
    if (!el) return { missing: id };
    const s = window.getComputedStyle(el);
    return {
        ok: {
            display: s.display,
            visibility: s.visibility,
            opacity: s.opacity,
            position: s.position,
            zIndex: s.zIndex,
            overflow: s.overflow,
            backgroundColor: s.backgroundColor,
            backdropFilter: s.backdropFilter || s.webkitBackdropFilter || 'none'
        }
    };
}
"#;

pub const VIEWPORT: &str = r#"
() => ({ ok: { width: window.innerWidth, height: window.innerHeight } })
"#;

pub const FRAME: &str = r#"
() => ({ ok: { top_level: window === window.top, width: window.innerWidth, height: window.innerHeight } })
"#;

pub const HOSTNAME: &str = r#"
() => ({ ok: window.location.hostname })
"#;

pub const CLICK: &str = r#"
(nodes, id) => {
    const el = nodes.get(id);
    if (!el) return { missing: id };
    try {
        el.click();
        return { ok: null };
    } catch (e) {
        return { clickFailed: String((e && e.message) || e) };
    }
}
"#;

pub const DISPATCH_CLICK: &str = r#"
(nodes, id) => {
    const el = nodes.get(id);
    if (!el) return { missing: id };
    try {
        el.dispatchEvent(new MouseEvent('click', { bubbles: true, cancelable: true, view: window }));
        return { ok: null };
    } catch (e) {
        return { clickFailed: String((e && e.message) || e) };
    }
}
"#;

pub const SET_STYLE_PROPERTY: &str = r#"
(nodes, id, name, value, important) => {
    const el = nodes.get(id);
    if (!el) return { missing: id };
    el.style.setProperty(name, value, important ? 'important' : '');
    return { ok: null };
}
"#;

pub const REMOVE_STYLE_PROPERTY: &str = r#"
(nodes, id, name) => {
    const el = nodes.get(id);
    if (!el) return { missing: id };
    const had = el.style.getPropertyValue(name) !== '';
    el.style.removeProperty(name);
    return { ok: had };
}
"#;

pub const REMOVE_CLASS: &str = r#"
(nodes, id, name) => {
    const el = nodes.get(id);
    if (!el) return { missing: id };
    const had = el.classList.contains(name);
    el.classList.remove(name);
    return { ok: had };
}
"#;
