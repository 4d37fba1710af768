//! `schedule(trunk)` (§4.2.2): the per-trunk tool invocation pipeline, and
//! the at-most-once memoization wrapper around it (§5.1).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;

use crate::compiler::instruction::{OnError, Origin, ToolDef, ToolDepBinding, ToolWireKind, Trunk, Wire};
use crate::engine::error::EngineError;
use crate::engine::pull::resolve_wires;
use crate::engine::trace::now_ms;
use crate::engine::tree::{ExecutionTree, RootState, Scope};
use crate::engine::trunk::new_slot;
use crate::engine::value::{parse_json_literal, Value};
use crate::ports::ToolFunction;

impl RootState {
    /// Returns the (cached or freshly settled) value for `trunk`, per the
    /// §5.1 `OnceCell`-backed memoization: the first caller to reach this
    /// trunk's slot runs [`RootState::run`]; every other concurrent caller
    /// awaits that same future.
    pub(crate) async fn schedule(self: &Arc<Self>, trunk: Trunk) -> Result<Value, Arc<EngineError>> {
        let slot = {
            let mut guard = self.state.write().await;
            guard.entry(trunk.clone()).or_insert_with(new_slot).clone()
        };
        let cache_hit = slot.get().is_some();
        self.engine.logger.trace_schedule(&trunk, cache_hit);
        slot.get_or_try_init(|| self.run(trunk.clone())).await.clone()
    }

    /// A throwaway tree anchored on `trunk`, used only to satisfy the
    /// `&Arc<ExecutionTree>` parameter of [`resolve_wires`]/`pull_one` for
    /// pulls issued from inside `run` itself — these never touch
    /// element-scoped refs (§4.2.2's groups are built by excluding
    /// element-tagged wires), so the scope's exact shape is immaterial.
    fn as_tree(self: &Arc<Self>, trunk: Trunk) -> Arc<ExecutionTree> {
        Arc::new(ExecutionTree::from_parts(self.clone(), Scope::Dataflow { current_trunk: trunk }))
    }

    async fn resolve_tool_deps(self: &Arc<Self>, deps: &[ToolDepBinding]) -> Result<HashMap<String, Value>, Arc<EngineError>> {
        let mut out = HashMap::new();
        for dep in deps {
            let value = match &dep.dep {
                crate::compiler::instruction::ToolDep::Context => self.schedule(Trunk::context()).await?,
                crate::compiler::instruction::ToolDep::Const => self.schedule(Trunk::const_()).await?,
                crate::compiler::instruction::ToolDep::Tool(name) => self.schedule(Trunk::tool(name.clone(), 1)).await?,
            };
            out.insert(dep.handle.clone(), value);
        }
        Ok(out)
    }

    fn lookup_function(&self, name: &str) -> Option<Arc<dyn ToolFunction>> {
        self.engine.tool_namespace.lookup(name).or_else(|| self.engine.tool_namespace.lookup_flat(name))
    }

    pub(crate) async fn run(self: &Arc<Self>, trunk: Trunk) -> Result<Value, Arc<EngineError>> {
        let base_trunk = self.pipe_bases.get(&trunk).cloned();
        let tool_name = match &trunk.origin {
            Origin::Tool { name } => Some(name.clone()),
            Origin::PipeFork { tool } => Some(tool.clone()),
            _ => None,
        };

        let mut input = Value::object();

        // Steps 1-2: base wires (pipe forks only), then wires targeting
        // this exact trunk, grouped by target path.
        let mut groups: HashMap<Vec<String>, Vec<&Wire>> = HashMap::new();
        if let Some(base) = &base_trunk {
            for w in self.bridge.wires.iter().filter(|w| w.to().trunk == *base && !w.to().element) {
                groups.entry(w.to().path.clone()).or_default().push(w);
            }
        }
        for w in self.bridge.wires.iter().filter(|w| w.to().trunk == trunk && !w.to().element) {
            groups.entry(w.to().path.clone()).or_default().push(w);
        }

        let tool_def: Option<&ToolDef> = tool_name.as_deref().and_then(|name| self.engine.tools.get(name));

        // Step 3: tool wires (dep resolution runs concurrently with no
        // ordering requirement between deps; the dep map is built first so
        // tool-wire pulls can read from it).
        if let Some(def) = tool_def {
            let deps = self.resolve_tool_deps(&def.deps).await?;
            for wire in &def.wires {
                let segs: Vec<String> = if wire.target.is_empty() {
                    Vec::new()
                } else {
                    wire.target.split('.').map(str::to_string).collect()
                };
                let value = match &wire.kind {
                    ToolWireKind::Constant { value } => {
                        parse_json_literal(value).unwrap_or_else(|_| Value::String(value.clone()))
                    }
                    ToolWireKind::Pull { source } => resolve_dep_source(&deps, source),
                };
                apply_into(&mut input, &segs, value);
            }
        }

        // Step 4: bridge wires over tool wires; independent target groups
        // resolve concurrently (§5's "each target group is resolved in
        // parallel").
        let resolved = join_all(groups.into_iter().map(|(path, wires)| {
            let tree = self.as_tree(trunk.clone());
            async move {
                let value = resolve_wires(&tree, &wires).await;
                (path, value)
            }
        }))
        .await;
        for (path, value) in resolved {
            apply_into(&mut input, &path, value?);
        }

        // Step 5: invocation.
        let started = Instant::now();
        let started_at_ms = now_ms();
        let label = tool_name.clone().unwrap_or_else(|| format!("{:?}", trunk.origin));

        let outcome: Result<Value, EngineError> = if let Some(def) = tool_def {
            match resolve_fn_chain(&self.engine.tools, &def.name).and_then(|n| self.lookup_function(&n)) {
                Some(func) => match func.call(input.clone()).await {
                    Ok(value) => Ok(value),
                    Err(failure) => match &def.on_error {
                        Some(OnError::Literal(text)) => {
                            Ok(parse_json_literal(text).unwrap_or_else(|_| Value::String(text.clone())))
                        }
                        Some(OnError::Source(source)) => {
                            let deps = self.resolve_tool_deps(&def.deps).await.unwrap_or_default();
                            Ok(resolve_dep_source(&deps, source))
                        }
                        None => Err(EngineError::tool_failure(def.name.clone(), failure.message)),
                    },
                },
                None => Err(EngineError::MissingToolFunction { name: def.name.clone() }),
            }
        } else if let Some(name) = &tool_name {
            match self.lookup_function(name) {
                Some(func) => func.call(input.clone()).await.map_err(|f| EngineError::tool_failure(name.clone(), f.message)),
                None => Err(EngineError::ToolNotFound { name: name.clone() }),
            }
        } else if trunk.is_define_boundary() {
            Ok(input.clone())
        } else {
            Err(EngineError::ScheduleFailed { trunk: trunk.clone(), reason: "no tool, pipe, or define boundary matched this trunk".to_string() })
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        self.engine.logger.debug_tool_completed(&label, duration_ms);
        if self.tracer.enabled() {
            let (trace_input, trace_output, trace_error) = match &outcome {
                Ok(v) => (Some(input.clone()), Some(v.clone()), None),
                Err(e) => (Some(input.clone()), None, Some(e.to_string())),
            };
            self.tracer.record(&label, &label, trace_input, trace_output, trace_error, started, started_at_ms);
        }

        outcome.map_err(Arc::new)
    }
}

fn resolve_dep_source(deps: &HashMap<String, Value>, source: &str) -> Value {
    let mut parts = source.split('.');
    let Some(handle) = parts.next() else { return Value::Null };
    let rest: Vec<String> = parts.map(str::to_string).collect();
    match deps.get(handle) {
        Some(value) if rest.is_empty() => value.clone(),
        Some(value) => value.get_path(&rest).cloned().unwrap_or(Value::Null),
        None => Value::Null,
    }
}

/// Walks a tool's `extends` chain to the primitive function name (§4.1
/// rule 1: exactly one of `fn`/`extends` is set per tool). Bounded so a
/// (compiler-rejected, but defensively handled) circular chain can't hang
/// the engine.
fn resolve_fn_chain(tools: &HashMap<String, ToolDef>, name: &str) -> Option<String> {
    let mut current_name = name.to_string();
    for _ in 0..64 {
        let def = tools.get(&current_name)?;
        if let Some(fn_name) = &def.fn_name {
            return Some(fn_name.clone());
        }
        current_name = def.extends.clone()?;
    }
    None
}

/// Applies one resolved target-path value into the assembled input
/// mapping (§4.2.2 step 4): a group at the empty path whose value is a
/// mapping spreads into the root; a non-mapping value at the empty path
/// (the common shape for a define/pipe boundary's sole source) replaces
/// the input outright only while nothing else has populated it yet.
fn apply_into(input: &mut Value, path: &[String], value: Value) {
    if path.is_empty() {
        match &value {
            Value::Map(_) => input.merge_from(&value),
            other => {
                if matches!(input, Value::Map(m) if m.is_empty()) {
                    *input = other.clone();
                }
            }
        }
    } else {
        input.set_path(path, value);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::compiler::compile;
    use crate::engine::error::ToolFailure;
    use crate::engine::{BuildEngineOptions, Engine, FieldValue, Value};
    use crate::ports::ToolNamespace;

    /// §9's onError-vs-`??` Open Question: `onError` is applied inside
    /// `schedule()`, so a tool def that fails but recovers via `on error`
    /// should never expose the failure to a wire-level `??` at all -- the
    /// bridge's `??` fallback must not fire.
    #[tokio::test]
    async fn on_error_wins_over_wire_level_fallback() {
        let source = r#"
            version 1.4
            tool flaky from boom {
                on error = "recovered-by-tool"
            }
            bridge Query.echo {
                with input as i
                with output as o
                o.label <- flaky.label ?? "recovered-by-wire"
            }
        "#;
        let instructions = compile(source).unwrap();

        let mut tools = ToolNamespace::new();
        tools.insert(
            "boom",
            Arc::new(|_: Value| async move { Err::<Value, _>(ToolFailure::new("boom")) }),
        );

        let engine = Arc::new(Engine::build(&instructions, BuildEngineOptions { tools, ..BuildEngineOptions::default() }).unwrap());
        let tree = engine.start("Query", "echo", Value::object(), None).await.unwrap();

        let label = tree.resolve_field(&["label".to_string()], false).await.unwrap();
        match label {
            FieldValue::Value(Value::String(s)) => assert_eq!(s, "recovered-by-tool"),
            FieldValue::Value(other) => panic!("expected a string, got {other:?}"),
            _ => panic!("expected a resolved scalar field value"),
        }
    }
}
