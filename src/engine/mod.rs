//! The execution engine (§4.2): turns a compiled [`Bridge`] and a request's
//! input into a lazily-resolved [`ExecutionTree`], invoking tools at most
//! once per trunk as the host descends response fields.
//!
//! [`Engine`] is the long-lived, instructions-are-immutable half (§3.3);
//! [`Engine::start`] is the per-request entry point a host calls once per
//! top-level bridge field, handing back the root [`ExecutionTree`] it then
//! drives field by field through [`resolve_field`].

pub mod error;
pub mod pull;
pub mod schedule;
mod shadow;
pub mod trace;
pub mod tree;
pub mod trunk;
pub mod value;
mod wires;

use std::collections::HashMap;
use std::sync::Arc;

use crate::compiler::instruction::{Bridge, ConstDef, Instruction, ToolDef, Trunk};
use crate::config::TraceLevel;
use crate::ports::{CacheStore, ContextFactory, Logger, ToolNamespace};

pub use error::EngineError;
pub use trace::ToolTrace;
pub use tree::{ExecutionTree, FieldValue};
pub use value::Value;

use tree::{new_root_state, preset_slot, RootState};

/// Everything a host supplies when attaching the engine to its schema
/// (§6.2's `options`). `tools` is merged on top of the built-in `std`
/// namespace (§4.4) unless `std_namespace_enabled` is turned off in
/// [`crate::config::EngineSettings`].
pub struct BuildEngineOptions {
    pub tools: ToolNamespace,
    pub context_factory: Arc<dyn ContextFactory>,
    pub cache: Option<Arc<dyn CacheStore>>,
    pub trace: TraceLevel,
    pub logger: Arc<dyn Logger>,
    /// Mirrors [`crate::config::EngineSettings::std_namespace_enabled`];
    /// set to `false` to make a dotted-lookup miss against the host
    /// namespace a hard `ToolNotFound` instead of falling through to the
    /// built-in `std` namespace (§4.4, §4.6).
    pub std_namespace_enabled: bool,
}

impl Default for BuildEngineOptions {
    fn default() -> Self {
        Self {
            tools: ToolNamespace::new(),
            context_factory: Arc::new(crate::ports::EmptyContext),
            cache: None,
            trace: TraceLevel::Off,
            logger: Arc::new(crate::adapters::TracingLogger),
            std_namespace_enabled: true,
        }
    }
}

impl BuildEngineOptions {
    /// Seeds `trace` and `std_namespace_enabled` from process-wide
    /// [`crate::config::EngineSettings`], leaving everything else at its
    /// default -- a host still supplies `tools`/`context_factory`/`cache`/
    /// `logger` explicitly.
    pub fn from_settings(settings: &crate::config::EngineSettings) -> Self {
        Self {
            trace: settings.trace,
            std_namespace_enabled: settings.std_namespace_enabled,
            ..Self::default()
        }
    }
}

/// The process-wide, request-independent half of the engine (§3.3): every
/// field shared by every [`RootState`] a request creates.
pub(crate) struct EngineInner {
    pub(crate) tool_namespace: ToolNamespace,
    pub(crate) tools: HashMap<String, ToolDef>,
    pub(crate) context_factory: Arc<dyn ContextFactory>,
    pub(crate) cache: Option<Arc<dyn CacheStore>>,
    pub(crate) logger: Arc<dyn Logger>,
    pub(crate) default_trace: TraceLevel,
}

/// The compiled, host-attached engine: one per loaded `.bridge` file,
/// reused across every request (§3.3 "Instructions are built once ...
/// they are immutable").
pub struct Engine {
    inner: Arc<EngineInner>,
    bridges: HashMap<(String, String), Arc<Bridge>>,
    consts: Vec<ConstDef>,
}

/// Fluent alternative to [`Engine::build`] (§6.2: "`Engine::builder(instructions)
/// .tools(...).context_factory(...).cache(...).trace(...).logger(...).build()`"),
/// for hosts that would rather set only the options they care about than
/// construct a [`BuildEngineOptions`] literal.
pub struct EngineBuilder<'a> {
    instructions: &'a [Instruction],
    options: BuildEngineOptions,
}

impl<'a> EngineBuilder<'a> {
    fn new(instructions: &'a [Instruction]) -> Self {
        Self { instructions, options: BuildEngineOptions::default() }
    }

    pub fn tools(mut self, tools: ToolNamespace) -> Self {
        self.options.tools = tools;
        self
    }

    pub fn context_factory(mut self, context_factory: Arc<dyn ContextFactory>) -> Self {
        self.options.context_factory = context_factory;
        self
    }

    pub fn cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.options.cache = Some(cache);
        self
    }

    pub fn trace(mut self, trace: TraceLevel) -> Self {
        self.options.trace = trace;
        self
    }

    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.options.logger = logger;
        self
    }

    pub fn std_namespace_enabled(mut self, enabled: bool) -> Self {
        self.options.std_namespace_enabled = enabled;
        self
    }

    pub fn build(self) -> Result<Engine, EngineError> {
        Engine::build(self.instructions, self.options)
    }
}

impl Engine {
    /// Entry point for [`EngineBuilder`]'s fluent construction (§6.2).
    pub fn builder(instructions: &[Instruction]) -> EngineBuilder<'_> {
        EngineBuilder::new(instructions)
    }

    /// `build_engine(schema, instructions, options) -> HostSchema` (§6.2),
    /// minus the host-schema attachment itself -- the host framework that
    /// walks response fields is out of scope (§1) -- so this returns the
    /// engine a host embeds into its own schema plumbing.
    pub fn build(instructions: &[Instruction], options: BuildEngineOptions) -> Result<Self, EngineError> {
        let mut tools = HashMap::new();
        let mut bridges = HashMap::new();
        let mut consts = Vec::new();

        for instr in instructions {
            match instr {
                Instruction::Const(c) => consts.push(c.clone()),
                Instruction::Tool(t) => {
                    tools.insert(t.name.clone(), t.clone());
                }
                Instruction::Define(_) => {
                    // Defines are inlined into every bridge that uses them
                    // at compile time (§4.1 rule 7); the standalone
                    // `DefineDef` instruction is kept around for
                    // `serialize`'s round-trip, not for the engine.
                }
                Instruction::Bridge(b) => {
                    bridges.insert((b.bridge_type.clone(), b.field.clone()), Arc::new(b.clone()));
                }
            }
        }

        let tool_namespace = if options.std_namespace_enabled {
            options.tools.merge_under(&crate::adapters::std_tools::std_namespace())
        } else {
            options.tools
        };

        Ok(Self {
            inner: Arc::new(EngineInner {
                tool_namespace,
                tools,
                context_factory: options.context_factory,
                cache: options.cache,
                logger: options.logger,
                default_trace: options.trace,
            }),
            bridges,
            consts,
        })
    }

    pub fn cache(&self) -> Option<&Arc<dyn CacheStore>> {
        self.inner.cache.as_ref()
    }

    /// Evaluates every `const` declaration once into a single mapping
    /// addressed by name (§3.1 "ConstDef ... evaluated once per request
    /// into a structured value"; §3.2 fixes its trunk at `(SELF, "Const",
    /// "const")`).
    fn build_const_value(&self) -> Value {
        let mut map = Value::object();
        for c in &self.consts {
            let parsed = value::parse_json_literal(&c.json_text).unwrap_or(Value::Null);
            map.set_path(&[c.name.clone()], parsed);
        }
        map
    }

    /// Per-request entry point (§4.2's field resolution contract, request
    /// start). Presets the bridge's own trunk to `input`, the context trunk
    /// via [`ContextFactory`], and the const trunk to the evaluated
    /// constants, then fires every `force=true` wire eagerly (§4.2.4)
    /// before handing back the root [`ExecutionTree`] for the host to pull
    /// fields out of via [`resolve_field`].
    pub async fn start(
        self: &Arc<Self>,
        bridge_type: &str,
        bridge_field: &str,
        input: Value,
        trace: Option<TraceLevel>,
    ) -> Result<Arc<ExecutionTree>, EngineError> {
        let bridge = self
            .bridges
            .get(&(bridge_type.to_string(), bridge_field.to_string()))
            .cloned()
            .ok_or_else(|| EngineError::BridgeNotFound {
                bridge_type: bridge_type.to_string(),
                bridge_field: bridge_field.to_string(),
            })?;

        let root = Arc::new(new_root_state(self.inner.clone(), bridge.clone(), trace.unwrap_or(self.inner.default_trace)));

        preset_slot(&root, bridge.own_trunk(), input).await;
        preset_slot(&root, Trunk::context(), self.inner.context_factory.build()).await;
        preset_slot(&root, Trunk::const_(), self.build_const_value()).await;

        run_forced_wires(&root, &bridge);

        Ok(ExecutionTree::new_root(root))
    }

    /// Traces accumulated on `tree`'s request so far (§6.5), for a host to
    /// surface in its own extensions payload.
    pub fn traces(tree: &ExecutionTree) -> Vec<ToolTrace> {
        tree.root().tracer.traces()
    }
}

/// §4.2.4 "Forced execution": schedules every `force=true` wire's target
/// trunk at request start, detached from the caller and swallowing errors
/// (§5 "forced wires' futures are detached and swallow unhandled errors").
fn run_forced_wires(root: &Arc<RootState>, bridge: &Bridge) {
    for wire in &bridge.wires {
        if wire.is_force() {
            let trunk = wire.to().trunk.clone();
            let root = root.clone();
            tokio::spawn(async move {
                if let Err(err) = root.schedule(trunk).await {
                    root.engine.logger.warn_forced_wire_failed("forced-wire", &err.to_string());
                }
            });
        }
    }
}

/// `resolve_field(tree, path, is_array)` (§6.2): the per-field callback a
/// host drives the engine with, named as its own free function to match
/// the external-interfaces shape of §6.2 exactly.
pub async fn resolve_field(tree: &Arc<ExecutionTree>, path: &[String], is_array: bool) -> Result<FieldValue, EngineError> {
    tree.resolve_field(path, is_array).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;

    fn options() -> BuildEngineOptions {
        BuildEngineOptions::default()
    }

    #[tokio::test]
    async fn passthrough_bridge_resolves_without_any_tool_call() {
        let source = r#"
            version 1.4
            bridge Query.echo {
                with input as i
                with output as o
                o.text <- i.text
                o.count <- i.count
            }
        "#;
        let instructions = compile(source).unwrap();
        let engine = Arc::new(Engine::build(&instructions, options()).unwrap());
        let input = Value::from(serde_json::json!({"text": "Hi", "count": 3}));
        let tree = engine.start("Query", "echo", input, None).await.unwrap();

        let text = tree.resolve_field(&["text".to_string()], false).await.unwrap();
        let count = tree.resolve_field(&["count".to_string()], false).await.unwrap();
        match (text, count) {
            (FieldValue::Value(Value::String(s)), FieldValue::Value(Value::Number(n))) => {
                assert_eq!(s, "Hi");
                assert_eq!(n.as_i64(), Some(3));
            }
            _ => panic!("expected scalar field values"),
        }
    }

    #[tokio::test]
    async fn unknown_bridge_field_is_reported() {
        let instructions = compile("version 1.4").unwrap();
        let engine = Arc::new(Engine::build(&instructions, options()).unwrap());
        let err = engine.start("Query", "missing", Value::object(), None).await.unwrap_err();
        assert!(matches!(err, EngineError::BridgeNotFound { .. }));
    }
}
