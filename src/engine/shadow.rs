//! Array-mapped shadow tree construction (§4.2.5, §3.2's "shadow
//! ExecutionTree").
//!
//! A shadow tree is just an [`ExecutionTree`] in
//! [`crate::engine::tree::Scope::Element`] scope: it shares the parent's
//! `RootState` (so scheduling and the tool-level memoization table are
//! identical across every element) and owns one array item as its element
//! payload. Nesting falls out for free — wrapping a shadow tree's own
//! child list just calls [`wrap`] again with the same root.

use std::sync::Arc;

use crate::compiler::instruction::Trunk;
use crate::engine::tree::{ExecutionTree, RootState, Scope};
use crate::engine::value::Value;

/// Wraps each item of `items` in its own shadow [`ExecutionTree`], all
/// sharing `root`'s state and matching element-tagged wires declared
/// against `trunk` (the trunk the enclosing array wire itself targeted).
pub fn wrap(root: Arc<RootState>, trunk: Trunk, items: Vec<Value>) -> Vec<Arc<ExecutionTree>> {
    items
        .into_iter()
        .map(|payload| Arc::new(ExecutionTree::from_parts(root.clone(), Scope::Element { trunk: trunk.clone(), payload })))
        .collect()
}
