//! The compiler's output: an ordered, immutable instruction list plus the
//! value types that make up each instruction (§3.1 of the design).
//!
//! Every address the compiler emits is a [`NodeRef`]: a [`Trunk`] (the call
//! site identity a tool or handle lives at) plus a drilldown `path` into the
//! value that trunk produces. Trunks are tagged by [`Origin`] rather than by
//! matching on loose module/type strings — the engine's matching logic is a
//! set of `match` arms over this enum, never string comparisons against a
//! "module" namespace.

use serde::{Deserialize, Serialize};

/// Instance number at which pipe-fork trunks begin, keeping them disjoint
/// from ordinary tool-handle instances (which start at 1).
pub const PIPE_FORK_BASE: u32 = 100_000;

/// Identifies the call site of a tool invocation or a fixed per-request
/// handle (input, output, context, const, a define boundary, a pipe fork).
///
/// Two trunks are equal exactly when `origin` and `instance` both match —
/// this is the equality spec/3.2 calls "two trunks are equal when these four
/// fields match" (module/type/field collapse into `origin`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Trunk {
    pub origin: Origin,
    pub instance: Option<u32>,
}

impl Trunk {
    pub fn new(origin: Origin, instance: Option<u32>) -> Self {
        Self { origin, instance }
    }

    /// The bridge's own trunk, shared by its `input` and `output` handles.
    pub fn bridge(bridge_type: impl Into<String>, bridge_field: impl Into<String>) -> Self {
        Self::new(
            Origin::Bridge {
                bridge_type: bridge_type.into(),
                bridge_field: bridge_field.into(),
            },
            None,
        )
    }

    pub fn context() -> Self {
        Self::new(Origin::Context, None)
    }

    pub fn const_() -> Self {
        Self::new(Origin::Const, None)
    }

    pub fn tool(name: impl Into<String>, instance: u32) -> Self {
        Self::new(Origin::Tool { name: name.into() }, Some(instance))
    }

    pub fn pipe_fork(tool: impl Into<String>, instance: u32) -> Self {
        debug_assert!(instance >= PIPE_FORK_BASE);
        Self::new(Origin::PipeFork { tool: tool.into() }, Some(instance))
    }

    pub fn define_in(handle: impl Into<String>) -> Self {
        Self::new(Origin::DefineInput { handle: handle.into() }, None)
    }

    pub fn define_out(handle: impl Into<String>) -> Self {
        Self::new(Origin::DefineOutput { handle: handle.into() }, None)
    }

    pub fn is_pipe_fork(&self) -> bool {
        matches!(self.origin, Origin::PipeFork { .. })
    }

    pub fn is_define_boundary(&self) -> bool {
        matches!(self.origin, Origin::DefineInput { .. } | Origin::DefineOutput { .. })
    }
}

/// What kind of location a [`Trunk`] names.
///
/// `Bridge` is shared by the bridge's `input` and `output` handles per
/// §4.1's lowering rule 2 ("input/output map to the bridge's own trunk") —
/// the engine tells them apart by which *role* a wire references it with
/// (`from` vs `to`), not by trunk identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    Bridge { bridge_type: String, bridge_field: String },
    Context,
    Const,
    Tool { name: String },
    DefineInput { handle: String },
    DefineOutput { handle: String },
    PipeFork { tool: String },
}

/// The canonical address of a value location: a trunk plus a drilldown path.
///
/// `path` segments are plain strings; a segment that parses as an unsigned
/// integer addresses a list index. `element` is true when this ref reads
/// the per-element slot of an array shadow tree (only meaningful inside a
/// shadow [`crate::engine::tree::ExecutionTree`]).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    pub trunk: Trunk,
    pub element: bool,
    pub path: Vec<String>,
}

impl NodeRef {
    pub fn new(trunk: Trunk, path: Vec<String>) -> Self {
        Self { trunk, element: false, path }
    }

    pub fn element_of(trunk: Trunk, path: Vec<String>) -> Self {
        Self { trunk, element: true, path }
    }

    pub fn with_path(mut self, path: Vec<String>) -> Self {
        self.path = path;
        self
    }
}

/// A constant, evaluated once per request from its JSON text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstDef {
    pub name: String,
    pub json_text: String,
}

/// One of the dependencies a [`ToolDef`] binds a local handle to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolDep {
    Context,
    Const,
    Tool(String),
}

/// A tool dependency bound to a local handle name inside a `tool` block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDepBinding {
    pub handle: String,
    pub dep: ToolDep,
}

/// How a [`ToolWire`] supplies its target.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ToolWireKind {
    Constant { value: String },
    Pull { source: String },
}

/// A wire inside a `tool` block, written against dep handles rather than
/// resolved [`NodeRef`]s — tool deps are local to the tool and resolved at
/// schedule time (§4.2.2 step 3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolWire {
    pub target: String,
    pub kind: ToolWireKind,
}

/// `on error` recovery attached to a [`ToolDef`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum OnError {
    Literal(String),
    Source(String),
}

/// Either a primitive tool function (`fn`) or an extension of another tool
/// (`extends`) — exactly one of the two is set, enforced by the lowering
/// pass rather than by a runtime check.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    pub fn_name: Option<String>,
    pub extends: Option<String>,
    pub deps: Vec<ToolDepBinding>,
    pub wires: Vec<ToolWire>,
    pub on_error: Option<OnError>,
}

impl ToolDef {
    pub fn dep(&self, handle: &str) -> Option<&ToolDep> {
        self.deps.iter().find(|d| d.handle == handle).map(|d| &d.dep)
    }
}

/// A local alias scoped to one bridge or define body, bound to a resolved
/// trunk by the handle-resolution pass (§4.1 lowering rule 2).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleBinding {
    pub alias: String,
    pub trunk: Trunk,
}

/// A directed edge in the dataflow graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Wire {
    Constant {
        to: NodeRef,
        value: String,
    },
    Pull {
        from: NodeRef,
        to: NodeRef,
        pipe: bool,
        force: bool,
        null_fallback: Option<String>,
        fallback: Option<String>,
        fallback_ref: Option<NodeRef>,
    },
}

impl Wire {
    pub fn to(&self) -> &NodeRef {
        match self {
            Wire::Constant { to, .. } => to,
            Wire::Pull { to, .. } => to,
        }
    }

    pub fn is_force(&self) -> bool {
        matches!(self, Wire::Pull { force: true, .. })
    }
}

/// Metadata for one pipe-fork occurrence (`a:b:c.x`), recorded so bridge
/// wires targeting the pipe's base handle also apply to it as defaults
/// (§4.1 lowering rule 4).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipeFork {
    pub trunk: Trunk,
    pub base_trunk: Trunk,
}

/// A reusable bridge body, inlined at each `with <define> as h` site.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DefineDef {
    pub name: String,
    pub handles: Vec<HandleBinding>,
    pub wires: Vec<Wire>,
    pub array_iterators: Vec<(Vec<String>, String)>,
    pub pipe_handles: Vec<PipeFork>,
}

/// A per-field binding: request arguments in, tool outputs projected back
/// onto response fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bridge {
    pub bridge_type: String,
    pub field: String,
    pub handles: Vec<HandleBinding>,
    pub wires: Vec<Wire>,
    /// path -> iterator handle name, for `[] as iter { ... }` blocks.
    pub array_iterators: Vec<(Vec<String>, String)>,
    pub pipe_handles: Vec<PipeFork>,
    /// Set when lowered from the `bridge T.f with X` passthrough shorthand.
    pub passthrough: bool,
}

impl Bridge {
    pub fn own_trunk(&self) -> Trunk {
        Trunk::bridge(self.bridge_type.clone(), self.field.clone())
    }
}

/// One compiled unit. The instruction list is ordered; later instructions
/// may reference earlier ones by name (tool `extends`, define `with`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    Const(ConstDef),
    Tool(ToolDef),
    Define(DefineDef),
    Bridge(Bridge),
}

impl Instruction {
    pub fn name(&self) -> Option<&str> {
        match self {
            Instruction::Const(c) => Some(&c.name),
            Instruction::Tool(t) => Some(&t.name),
            Instruction::Define(d) => Some(&d.name),
            Instruction::Bridge(_) => None,
        }
    }
}
