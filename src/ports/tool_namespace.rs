//! Dotted-name tool function registry (§9 "dynamic dispatch and namespace
//! traversal"): a tree of mappings whose leaves are functions, modeled as a
//! nested mapping rather than dynamically-typed property lookup.

use std::collections::HashMap;
use std::sync::Arc;

use crate::ports::tool_function::ToolFunction;

/// One level of the namespace tree: either a leaf function or a nested
/// namespace. Hosts build this up with [`ToolNamespace::leaf`] /
/// [`ToolNamespace::insert`]; `schedule()` (§4.2.2 step 5) looks a dotted
/// name up with [`ToolNamespace::lookup`], then falls back to a flat-key
/// lookup, then to the `std` namespace -- both fallbacks are explicit
/// branches the caller drives, not hidden inside this type.
#[derive(Clone, Default)]
pub struct ToolNamespace {
    leaf: Option<Arc<dyn ToolFunction>>,
    children: HashMap<String, ToolNamespace>,
}

impl ToolNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn leaf(func: Arc<dyn ToolFunction>) -> Self {
        Self { leaf: Some(func), children: HashMap::new() }
    }

    /// Registers `func` at `dotted_name` (e.g. `"http.get"`), creating
    /// intermediate namespace nodes as needed.
    pub fn insert(&mut self, dotted_name: &str, func: Arc<dyn ToolFunction>) {
        let mut segments = dotted_name.split('.');
        let Some(first) = segments.next() else { return };
        let mut node = self.children.entry(first.to_string()).or_default();
        for seg in segments {
            node = node.children.entry(seg.to_string()).or_default();
        }
        node.leaf = Some(func);
    }

    /// Merges `other` into `self`, `self`'s entries winning on collision --
    /// used to let host-registered namespaces take priority over the `std`
    /// fallback namespace (§4.4) without either side mutating the other.
    pub fn merge_under(&self, fallback: &ToolNamespace) -> ToolNamespace {
        let mut merged = fallback.clone();
        merged.overlay(self);
        merged
    }

    fn overlay(&mut self, other: &ToolNamespace) {
        if other.leaf.is_some() {
            self.leaf = other.leaf.clone();
        }
        for (key, child) in &other.children {
            self.children.entry(key.clone()).or_default().overlay(child);
        }
    }

    /// Exact dotted-path lookup, e.g. `lookup("http.get")`.
    pub fn lookup(&self, dotted_name: &str) -> Option<Arc<dyn ToolFunction>> {
        let mut node = self;
        for seg in dotted_name.split('.') {
            node = node.children.get(seg)?;
        }
        node.leaf.clone()
    }

    /// Flat-key lookup: treats the whole dotted name as one literal key at
    /// the root, the fallback `schedule()` tries before giving up on a
    /// dotted lookup miss (§4.2.2 step 5).
    pub fn lookup_flat(&self, name: &str) -> Option<Arc<dyn ToolFunction>> {
        self.children.get(name).and_then(|n| n.leaf.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::error::ToolFailure;
    use crate::engine::value::Value;

    fn identity_fn() -> Arc<dyn ToolFunction> {
        Arc::new(|v: Value| async move { Ok::<Value, ToolFailure>(v) })
    }

    #[test]
    fn dotted_lookup_finds_nested_leaf() {
        let mut ns = ToolNamespace::new();
        ns.insert("http.get", identity_fn());
        assert!(ns.lookup("http.get").is_some());
        assert!(ns.lookup("http.post").is_none());
    }

    #[test]
    fn flat_lookup_finds_literal_root_key() {
        let mut ns = ToolNamespace::new();
        ns.insert("pickFirst", identity_fn());
        assert!(ns.lookup_flat("pickFirst").is_some());
        assert!(ns.lookup("pickFirst").is_some());
    }

    #[test]
    fn merge_under_prefers_host_namespace_over_fallback() {
        let mut std_ns = ToolNamespace::new();
        std_ns.insert("std.identity", identity_fn());
        let mut host_ns = ToolNamespace::new();
        host_ns.insert("std.identity", identity_fn());
        host_ns.insert("http.get", identity_fn());

        let merged = host_ns.merge_under(&std_ns);
        assert!(merged.lookup("std.identity").is_some());
        assert!(merged.lookup("http.get").is_some());
    }
}
