pub mod consent;
pub mod element;
pub mod wait;

use serde_json::Value;

/// Page-side table mapping elements to stable numeric ids. Entries hold weak
/// references, so an id never keeps a removed element alive.
pub const NODE_REGISTRY: &str = r#"
(window.__unbannerNodes || (window.__unbannerNodes = (() => {
    const ids = new WeakMap();
    const refs = new Map();
    let next = 1;
    return {
        id(node) {
            let id = ids.get(node);
            if (id === undefined) {
                id = next++;
                ids.set(node, id);
                refs.set(id, new WeakRef(node));
            }
            return id;
        },
        get(id) {
            const ref = refs.get(id);
            const node = ref ? ref.deref() : undefined;
            if (!node) {
                refs.delete(id);
                return null;
            }
            return node;
        }
    };
})()))
"#;

pub fn build_js_call(func: &str, args: &[Value]) -> String {
    let args_str = args.iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!("({})({})", func, args_str)
}

/// Like [`build_js_call`], with the node registry passed as the first argument.
pub fn build_registry_call(func: &str, args: &[Value]) -> String {
    let args_str = std::iter::once(NODE_REGISTRY.trim().to_string())
        .chain(args.iter().map(|v| v.to_string()))
        .collect::<Vec<_>>()
        .join(", ");
    format!("({})({})", func, args_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn arguments_are_json_encoded() {
        let call = build_js_call("(a, b) => a + b", &[json!("x'y"), json!(2)]);
        assert_eq!(call, r#"((a, b) => a + b)("x'y", 2)"#);
    }

    #[test]
    fn registry_goes_first() {
        let call = build_registry_call("(nodes, id) => id", &[json!(7)]);
        assert!(call.starts_with("((nodes, id) => id)((window.__unbannerNodes"));
        assert!(call.ends_with(", 7)"));
    }
}
