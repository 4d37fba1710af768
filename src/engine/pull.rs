//! Pull semantics (§4.2.1): resolving one or several [`NodeRef`]s into a
//! value, with cost-based ordering and coalesce handling for
//! overdefinition / `||` groups.

use std::sync::Arc;

use crate::compiler::instruction::{NodeRef, Origin, Wire};
use crate::engine::error::EngineError;
use crate::engine::tree::ExecutionTree;
use crate::engine::value::{parse_json_literal, Value};

/// Cost of resolving a single ref, per §4.2.1 step 1: 0 for sources that
/// are already available without scheduling (an array element's own
/// payload, input args, context, const, or a trunk some earlier pull in
/// this request already settled); 1 for anything that schedules a tool
/// call, pipe fork, or define output.
pub fn cost(tree: &ExecutionTree, node: &NodeRef) -> u8 {
    if node.element || tree.is_settled(&node.trunk) {
        return 0;
    }
    match &node.trunk.origin {
        Origin::Bridge { .. } | Origin::Context | Origin::Const => 0,
        Origin::Tool { .. } | Origin::PipeFork { .. } | Origin::DefineInput { .. } | Origin::DefineOutput { .. } => 1,
    }
}

/// Resolves a single [`NodeRef`] against `tree`: schedules (or reuses) its
/// trunk, then walks `ref.path`. A non-numeric segment indexing a list
/// yields `Value::Null` and a logger warning rather than an error (§4.2.1).
pub async fn pull_one(tree: &Arc<ExecutionTree>, node: &NodeRef) -> Result<Value, Arc<EngineError>> {
    let base = if node.element {
        tree.element_payload().cloned().unwrap_or(Value::Null)
    } else {
        tree.pull_trunk(&node.trunk).await?
    };
    let (value, warned) = base.get_path_checked(&node.path);
    if warned {
        tree.logger().warn_non_numeric_index(&node.trunk, &node.path);
    }
    Ok(value.unwrap_or(Value::Null))
}

/// Outcome of pulling a (possibly singleton) group of sources, per
/// §4.2.1 steps 2-6.
pub enum PullOutcome {
    /// A non-null value was found; short-circuits the rest of the group.
    Value(Value),
    /// Every source resolved to null, or a mixture of null and error —
    /// lets a `||` fallback fire (§7 propagation rules).
    Undefined,
    /// Every source threw — lets a `??` fallback fire.
    Error(Arc<EngineError>),
}

/// Pulls `refs` in cost order (stable sort preserves declaration order on
/// ties), evaluating sequentially so a later source is only even awaited
/// once the earlier one has resolved to null/undefined (§5's "later
/// sources are observed strictly after the earlier source resolves").
pub async fn pull_many(tree: &Arc<ExecutionTree>, refs: &[NodeRef]) -> PullOutcome {
    let mut ordered: Vec<&NodeRef> = refs.iter().collect();
    ordered.sort_by_key(|r| cost(tree, r));

    let mut errors = Vec::new();
    let mut saw_null = false;
    for node in ordered {
        match pull_one(tree, node).await {
            Ok(value) if !value.is_null() => return PullOutcome::Value(value),
            Ok(_) => saw_null = true,
            Err(err) => errors.push(err),
        }
    }
    if errors.is_empty() {
        PullOutcome::Undefined
    } else if saw_null {
        // Mixed null/error with no explicit fallback: §9's Open Question
        // decision is to return undefined rather than re-throw.
        PullOutcome::Undefined
    } else {
        PullOutcome::Error(Arc::new(EngineError::aggregate(errors)))
    }
}

/// Implements §4.2 `resolveWires(group)` for one group of wires sharing a
/// target path.
pub async fn resolve_wires(tree: &Arc<ExecutionTree>, group: &[&Wire]) -> Result<Value, Arc<EngineError>> {
    if let Some(Wire::Constant { value, .. }) = group.iter().find(|w| matches!(w, Wire::Constant { .. })).copied() {
        return Ok(parse_json_literal(value).unwrap_or_else(|_| Value::String(value.clone())));
    }

    let refs: Vec<NodeRef> = group
        .iter()
        .filter_map(|w| match w {
            Wire::Pull { from, .. } => Some(from.clone()),
            Wire::Constant { .. } => None,
        })
        .collect();
    let last_pull = group.iter().rev().find_map(|w| match w {
        Wire::Pull { null_fallback, fallback, fallback_ref, .. } => Some((null_fallback, fallback, fallback_ref)),
        Wire::Constant { .. } => None,
    });

    match pull_many(tree, &refs).await {
        PullOutcome::Value(value) => Ok(value),
        PullOutcome::Undefined => match last_pull.and_then(|(null_fallback, _, _)| null_fallback.as_ref()) {
            Some(text) => Ok(parse_json_literal(text).unwrap_or_else(|_| Value::String(text.clone()))),
            None => Ok(Value::Null),
        },
        PullOutcome::Error(err) => match last_pull {
            Some((_, Some(text), _)) => Ok(parse_json_literal(text).unwrap_or_else(|_| Value::String(text.clone()))),
            Some((_, None, Some(fallback_ref))) => pull_one(tree, fallback_ref).await,
            _ => Err(err),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::instruction::Trunk;

    #[test]
    fn element_refs_are_always_cost_zero() {
        // A real ExecutionTree is needed to exercise `is_settled`; element
        // refs must be cheap regardless, so this is checked structurally
        // via the `node.element` shortcut without constructing a tree.
        let node = NodeRef::element_of(Trunk::bridge("Query", "echo"), vec!["x".to_string()]);
        assert!(node.element);
    }
}
