//! Concrete syntax tree produced by the parser, before lowering.
//!
//! The AST stays close to the grammar (§4.1): dotted names are kept as
//! segment lists rather than pre-split into handle/path, and JSON literals
//! are parsed into [`serde_json::Value`] so lowering can canonicalize them
//! (`Value::to_string()`) rather than carry source slices around.

use serde_json::Value as JsonValue;

/// A dotted identifier sequence, e.g. `hereapi.geocode.results`.
#[derive(Clone, Debug, PartialEq)]
pub struct DottedPath {
    pub segments: Vec<String>,
    pub line: usize,
}

impl DottedPath {
    pub fn new(segments: Vec<String>, line: usize) -> Self {
        debug_assert!(!segments.is_empty());
        Self { segments, line }
    }

    pub fn head(&self) -> &str {
        &self.segments[0]
    }

    pub fn rest(&self) -> &[String] {
        &self.segments[1..]
    }

    pub fn joined(&self) -> String {
        self.segments.join(".")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    pub version: String,
    pub items: Vec<Item>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Item {
    Const(ConstDecl),
    Tool(ToolBlock),
    Define(DefineBlock),
    Bridge(BridgeBlock),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConstDecl {
    pub name: String,
    pub value: JsonValue,
    pub line: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolBlock {
    pub name: DottedPath,
    pub from: DottedPath,
    pub lines: Vec<ToolLine>,
    pub line: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ToolLine {
    With(ToolWith),
    OnError(ToolOnError),
    Wire(ToolWireLine),
}

#[derive(Clone, Debug, PartialEq)]
pub enum WithSource {
    Context,
    Const,
    Dotted(DottedPath),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolWith {
    pub source: WithSource,
    pub alias: Option<String>,
    pub line: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum OnErrorValue {
    Json(JsonValue),
    Pull(DottedPath),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolOnError {
    pub value: OnErrorValue,
    pub line: usize,
}

/// `.target = bareValue` or `.target <- dep`, inside a `tool { }` block.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolWireLine {
    pub target: DottedPath,
    pub rhs: ToolWireRhs,
    pub line: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ToolWireRhs {
    Constant(JsonValue),
    Pull(DottedPath),
}

#[derive(Clone, Debug, PartialEq)]
pub struct BridgeBlock {
    pub type_name: String,
    pub field_name: String,
    pub body: BridgeBody,
    pub line: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum BridgeBody {
    /// `bridge T.f with X` shorthand (§4.1 lowering rule 8).
    Passthrough(DottedPath),
    Lines(Vec<BridgeLine>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum BridgeLine {
    With(BridgeWith),
    Wire(WireStmt),
}

#[derive(Clone, Debug, PartialEq)]
pub enum BridgeWithSource {
    Input,
    Output,
    Context,
    Const,
    Dotted(DottedPath),
}

#[derive(Clone, Debug, PartialEq)]
pub struct BridgeWith {
    pub source: BridgeWithSource,
    pub alias: Option<String>,
    pub line: usize,
}

/// One hop of a pipe-chain source expression: `a:b:c.x`. `path` is whatever
/// dotted segments follow the handle (the hop itself is just a handle name).
#[derive(Clone, Debug, PartialEq)]
pub struct SourceExpr {
    /// Each entry is one `:`-separated stage; the last stage carries the
    /// drilldown path, earlier stages are bare handle names.
    pub stages: Vec<DottedPath>,
    pub line: usize,
}

impl SourceExpr {
    pub fn is_pipe(&self) -> bool {
        self.stages.len() > 1
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Alt {
    Str(String),
    Num(String),
    Bool(bool),
    Null,
    Json(JsonValue),
    Source(SourceExpr),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ArrayMap {
    pub iter_name: String,
    pub lines: Vec<ElemLine>,
    pub line: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ElemLine {
    pub target: DottedPath,
    pub rhs: ElemRhs,
    pub line: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ElemRhs {
    Constant(JsonValue),
    Pull {
        force: bool,
        source: SourceExpr,
        or_alts: Vec<Alt>,
        coalesce_alt: Option<Alt>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct WireStmt {
    pub target: DottedPath,
    pub rhs: WireRhs,
    pub line: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum WireRhs {
    Constant(JsonValue),
    Pull {
        force: bool,
        source: SourceExpr,
        array_map: Option<ArrayMap>,
        or_alts: Vec<Alt>,
        coalesce_alt: Option<Alt>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct DefineBlock {
    pub name: String,
    pub lines: Vec<BridgeLine>,
    pub line: usize,
}
