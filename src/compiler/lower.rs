//! AST -> [`Instruction`] lowering (§4.1 "AST lowering").
//!
//! This pass resolves every handle (`with ... as alias`) to a concrete
//! [`Trunk`], expands pipe chains (`a:b:c.x`) into pipe-fork wires, expands
//! coalesce chains (`||`/`??`) into fallback metadata on the last wire of a
//! group, and inlines `define` bodies at each use site. The result is an
//! ordered, fully-resolved [`Instruction`] list with no remaining handle
//! aliases — only [`Trunk`]s and [`NodeRef`]s.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::compiler::ast::*;
use crate::compiler::error::CompileError;
use crate::compiler::instruction::*;

/// The only bridge version this compiler accepts (§6.1).
pub const SUPPORTED_VERSION: &str = "1.4";

/// Bounds nested define-inside-define inlining depth (§4.6's
/// `BRIDGE__MAX_DEFINE_INLINE_DEPTH`), so a self-referential or deeply
/// nested define chain fails with a clear error during lowering instead of
/// blowing the stack.
#[derive(Clone, Copy, Debug)]
pub struct LowerSettings {
    pub max_define_inline_depth: usize,
}

impl Default for LowerSettings {
    fn default() -> Self {
        Self { max_define_inline_depth: 64 }
    }
}

pub fn lower(program: &Program, settings: &LowerSettings) -> Result<Vec<Instruction>, CompileError> {
    if program.version != SUPPORTED_VERSION {
        return Err(CompileError::VersionMismatch {
            line: 1,
            found: program.version.clone(),
            supported: SUPPORTED_VERSION.to_string(),
        });
    }

    let mut ctx = LowerCtx {
        settings: *settings,
        tools: IndexMap::new(),
        defines: IndexMap::new(),
    };

    let mut instructions = Vec::with_capacity(program.items.len());
    for item in &program.items {
        match item {
            Item::Const(c) => {
                let json_text = serde_json::to_string(&c.value).map_err(|e| CompileError::InvalidJsonLiteral {
                    line: c.line,
                    message: e.to_string(),
                })?;
                instructions.push(Instruction::Const(ConstDef {
                    name: c.name.clone(),
                    json_text,
                }));
            }
            Item::Tool(t) => {
                let def = ctx.lower_tool(t)?;
                ctx.tools.insert(def.name.clone(), def.clone());
                instructions.push(Instruction::Tool(def));
            }
            Item::Define(d) => {
                let def = ctx.lower_define(d)?;
                ctx.defines.insert(def.name.clone(), def.clone());
                instructions.push(Instruction::Define(def));
            }
            Item::Bridge(b) => {
                let bridge = ctx.lower_bridge(b)?;
                instructions.push(Instruction::Bridge(bridge));
            }
        }
    }
    Ok(instructions)
}

fn is_array_index(segment: &str) -> bool {
    !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit())
}

/// Structural equality for [`HandleTarget`] used by `declare_handle`'s
/// idempotent-rebind check. `Element` targets never reach `declare_handle`
/// (array-iterator aliases are bound directly, not through a `with` line),
/// so they're compared by trunk too rather than treated as always-distinct.
fn handle_targets_equal(a: &HandleTarget, b: &HandleTarget) -> bool {
    match (a, b) {
        (HandleTarget::Single(x), HandleTarget::Single(y)) => x == y,
        (HandleTarget::Element(x), HandleTarget::Element(y)) => x == y,
        (HandleTarget::Define { in_trunk: ai, out_trunk: ao }, HandleTarget::Define { in_trunk: bi, out_trunk: bo }) => {
            ai == bi && ao == bo
        }
        _ => false,
    }
}

fn json_text(value: &JsonValue) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

fn alt_json_text(alt: &Alt) -> Option<String> {
    match alt {
        Alt::Str(s) => Some(json_text(&JsonValue::String(s.clone()))),
        Alt::Num(n) => Some(n.clone()),
        Alt::Bool(b) => Some(json_text(&JsonValue::Bool(*b))),
        Alt::Null => Some("null".to_string()),
        Alt::Json(v) => Some(json_text(v)),
        Alt::Source(_) => None,
    }
}

struct LowerCtx {
    settings: LowerSettings,
    /// Tool defs lowered so far, keyed by name — only earlier-declared tools
    /// are visible (`extends`/tool-deps reference by source order).
    tools: IndexMap<String, ToolDef>,
    /// Define bodies lowered so far, keyed by name.
    defines: IndexMap<String, DefineDef>,
}

/// Whether a dotted address is being resolved as a wire's `to` (target) or
/// as a data source. Target resolution rejects array-index path segments
/// (§9 Open Question: explicit indices on targets are a compile error) and,
/// for a handle bound to a `define`, addresses the define's *input* trunk
/// rather than its output.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Role {
    Target,
    Source,
}

/// What a local handle alias resolves to.
#[derive(Clone)]
enum HandleTarget {
    /// An ordinary handle: input/output/context/const/a tool instance.
    Single(Trunk),
    /// An array-map iterator alias: reads the current shadow tree's
    /// element slot rather than a scheduled trunk.
    Element(Trunk),
    /// A `with <define> as h` binding: wire targets addressing `h` feed the
    /// define's assembled input; wire sources addressing `h` read its
    /// (lazily-resolved) output.
    Define { in_trunk: Trunk, out_trunk: Trunk },
}

/// Lowers one `tool`/`bridge`/`define` body. Tool blocks use a restricted
/// subset (no pipe/array/coalesce machinery); bridge and define bodies
/// share the rest of this machinery.
/// Per-use-site renumbering state for [`BodyLowerer::inline_define`], so a
/// define referenced more than once in the same body gets independent
/// tool/pipe instances each time while staying internally consistent
/// within one inlining.
struct DefineRemap {
    tool_remap: HashMap<(String, u32), Trunk>,
    pipe_remap: HashMap<u32, u32>,
    in_trunk: Trunk,
    out_trunk: Trunk,
}

struct BodyLowerer<'a> {
    ctx: &'a LowerCtx,
    handles: HashMap<String, HandleTarget>,
    tool_instances: HashMap<String, u32>,
    pipe_instance: u32,
    wires: Vec<Wire>,
    array_iterators: Vec<(Vec<String>, String)>,
    pipe_handles: Vec<PipeFork>,
    handle_bindings: Vec<HandleBinding>,
}

impl<'a> BodyLowerer<'a> {
    fn new(ctx: &'a LowerCtx) -> Self {
        Self {
            ctx,
            handles: HashMap::new(),
            tool_instances: HashMap::new(),
            pipe_instance: PIPE_FORK_BASE,
            wires: Vec::new(),
            array_iterators: Vec::new(),
            pipe_handles: Vec::new(),
            handle_bindings: Vec::new(),
        }
    }

    fn next_tool_instance(&mut self, name: &str) -> u32 {
        let counter = self.tool_instances.entry(name.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    fn bind_handle(&mut self, alias: String, target: HandleTarget) {
        if let HandleTarget::Single(trunk) = &target {
            self.handle_bindings.push(HandleBinding { alias: alias.clone(), trunk: trunk.clone() });
        }
        self.handles.insert(alias, target);
    }

    /// Like [`BodyLowerer::bind_handle`], but for a user-written `with ...
    /// as alias` line: rejects reusing an alias already bound to a
    /// *different* target with `CompileError::DuplicateHandle` (§4.1
    /// "Reserved keywords ... cannot name user entities" generalizes to any
    /// alias collision). Rebinding an alias to the exact trunk it already
    /// names is a no-op, not a conflict -- this is what lets the bootstrap
    /// `input`/`output` bindings coexist with a bare `with input`/`with
    /// output` line that doesn't change the alias.
    fn declare_handle(&mut self, alias: String, target: HandleTarget, line: usize) -> Result<(), CompileError> {
        if let Some(existing) = self.handles.get(&alias) {
            if !handle_targets_equal(existing, &target) {
                return Err(CompileError::DuplicateHandle { line, name: alias });
            }
        }
        self.bind_handle(alias, target);
        Ok(())
    }

    /// Resolves a `with` source (tool name or define name) to its handle
    /// target, allocating a fresh tool instance or inlining a define.
    fn resolve_with_source(&mut self, dotted: &DottedPath) -> Result<HandleTarget, CompileError> {
        let name = dotted.joined();
        if self.ctx.defines.contains_key(&name) {
            return Ok(self.inline_define(&name, dotted.line, 0)?);
        }
        if self.ctx.tools.contains_key(&name) {
            let instance = self.next_tool_instance(&name);
            return Ok(HandleTarget::Single(Trunk::tool(name, instance)));
        }
        Err(CompileError::UnknownTool { line: dotted.line, name })
    }

    /// Inlines a define body at a `with <define> as h` use site: every
    /// internal tool/pipe trunk is renumbered against this body's own
    /// counters (so a define used twice in one bridge, or a tool also used
    /// directly, never collides), and the define's own input/output
    /// boundary becomes a pair of synthetic trunks private to this use.
    fn inline_define(&mut self, name: &str, line: usize, depth: usize) -> Result<HandleTarget, CompileError> {
        if depth >= self.ctx.settings.max_define_inline_depth {
            return Err(CompileError::SemanticError {
                line,
                message: format!("define `{name}` exceeds max inline depth"),
            });
        }
        let template = self
            .ctx
            .defines
            .get(name)
            .ok_or_else(|| CompileError::UnknownTool { line, name: name.to_string() })?
            .clone();

        // Synthetic use-site handle name: unique per inlining occurrence so
        // nested/repeated uses of the same define never share a boundary.
        let use_id = format!("{name}${}", self.pipe_instance);
        let in_trunk = Trunk::define_in(use_id.clone());
        let out_trunk = Trunk::define_out(use_id.clone());

        let mut remap = DefineRemap {
            tool_remap: HashMap::new(),
            pipe_remap: HashMap::new(),
            in_trunk: in_trunk.clone(),
            out_trunk: out_trunk.clone(),
        };

        for wire in &template.wires {
            let new_wire = match wire {
                Wire::Constant { to, value } => Wire::Constant {
                    to: self.remap_noderef(&mut remap, to),
                    value: value.clone(),
                },
                Wire::Pull {
                    from,
                    to,
                    pipe,
                    force,
                    null_fallback,
                    fallback,
                    fallback_ref,
                } => Wire::Pull {
                    from: self.remap_noderef(&mut remap, from),
                    to: self.remap_noderef(&mut remap, to),
                    pipe: *pipe,
                    force: *force,
                    null_fallback: null_fallback.clone(),
                    fallback: fallback.clone(),
                    fallback_ref: fallback_ref.as_ref().map(|r| self.remap_noderef(&mut remap, r)),
                },
            };
            self.wires.push(new_wire);
        }
        for (path, iter_name) in &template.array_iterators {
            self.array_iterators.push((path.clone(), iter_name.clone()));
        }
        for fork in &template.pipe_handles {
            self.pipe_handles.push(PipeFork {
                trunk: self.remap_trunk(&mut remap, &fork.trunk),
                base_trunk: self.remap_trunk(&mut remap, &fork.base_trunk),
            });
        }

        Ok(HandleTarget::Define { in_trunk, out_trunk })
    }

    /// Renumbers one trunk copied out of a define template: tool instances
    /// and pipe-fork instances are drawn fresh from this body's own
    /// counters (first occurrence wins and is cached in `remap` so repeated
    /// references inside the same template stay consistent), and the
    /// template's placeholder input/output boundary resolves to this
    /// use site's private pair.
    fn remap_trunk(&mut self, remap: &mut DefineRemap, trunk: &Trunk) -> Trunk {
        match &trunk.origin {
            Origin::Tool { name } => {
                let key = (name.clone(), trunk.instance.unwrap_or(1));
                if let Some(existing) = remap.tool_remap.get(&key) {
                    return existing.clone();
                }
                let fresh = Trunk::tool(name.clone(), self.next_tool_instance(name));
                remap.tool_remap.insert(key, fresh.clone());
                fresh
            }
            Origin::PipeFork { tool } => {
                let local = trunk.instance.unwrap_or(PIPE_FORK_BASE);
                if let Some(existing) = remap.pipe_remap.get(&local) {
                    return Trunk::pipe_fork(tool.clone(), *existing);
                }
                self.pipe_instance += 1;
                remap.pipe_remap.insert(local, self.pipe_instance);
                Trunk::pipe_fork(tool.clone(), self.pipe_instance)
            }
            Origin::DefineInput { handle } if handle == "__template__" => remap.in_trunk.clone(),
            Origin::DefineOutput { handle } if handle == "__template__" => remap.out_trunk.clone(),
            _ => trunk.clone(),
        }
    }

    fn remap_noderef(&mut self, remap: &mut DefineRemap, r: &NodeRef) -> NodeRef {
        NodeRef {
            trunk: self.remap_trunk(remap, &r.trunk),
            element: r.element,
            path: r.path.clone(),
        }
    }

    fn resolve_handle(&self, name: &str, line: usize, role: Role) -> Result<Trunk, CompileError> {
        match self.handles.get(name) {
            Some(HandleTarget::Single(t)) => Ok(t.clone()),
            Some(HandleTarget::Define { in_trunk, out_trunk }) => {
                Ok(if role == Role::Target { in_trunk.clone() } else { out_trunk.clone() })
            }
            Some(HandleTarget::Element(_)) => Err(CompileError::SemanticError {
                line,
                message: format!("`{name}` is an array iterator and cannot be addressed directly"),
            }),
            None => Err(CompileError::UndeclaredHandle { line, handle: name.to_string() }),
        }
    }

    fn resolve_addr(&self, path: &DottedPath, role: Role) -> Result<NodeRef, CompileError> {
        let head = path.head();
        let rest = path.rest().to_vec();
        if role == Role::Target {
            for seg in &rest {
                if is_array_index(seg) {
                    return Err(CompileError::ArrayIndexOnTarget { line: path.line, target: path.joined() });
                }
            }
        }
        if let Some(HandleTarget::Element(trunk)) = self.handles.get(head) {
            return Ok(NodeRef::element_of(trunk.clone(), rest));
        }
        let trunk = self.resolve_handle(head, path.line, role)?;
        Ok(NodeRef::new(trunk, rest))
    }

    fn resolve_target(&self, path: &DottedPath) -> Result<NodeRef, CompileError> {
        self.resolve_addr(path, Role::Target)
    }

    /// Lowers a pipe-chain source `a:b:c.x` (or a bare `addr` when there is
    /// only one stage) to the [`NodeRef`] a consumer should read from
    /// (§4.1 rule 4). Earlier stages become pipe-fork wires, chained
    /// right-to-left; the returned ref is the *outermost* (leftmost) fork's
    /// own result, or the bare address if there is no pipe at all.
    fn lower_source_expr(&mut self, src: &SourceExpr) -> Result<NodeRef, CompileError> {
        let n = src.stages.len();
        let mut current = self.resolve_addr(&src.stages[n - 1], Role::Source)?;
        for stage in src.stages[..n - 1].iter().rev() {
            let tool_name = stage.joined();
            if !self.ctx.tools.contains_key(&tool_name) {
                return Err(CompileError::UnknownTool { line: stage.line, name: tool_name });
            }
            self.pipe_instance += 1;
            let instance = self.pipe_instance;
            let fork_trunk = Trunk::pipe_fork(tool_name.clone(), instance);
            let base_instance = self.tool_instances.get(&tool_name).copied().unwrap_or(1).max(1);
            let base_trunk = Trunk::tool(tool_name, base_instance);
            self.pipe_handles.push(PipeFork { trunk: fork_trunk.clone(), base_trunk });
            self.wires.push(Wire::Pull {
                from: current,
                to: NodeRef::new(fork_trunk.clone(), Vec::new()),
                pipe: true,
                force: false,
                null_fallback: None,
                fallback: None,
                fallback_ref: None,
            });
            current = NodeRef::new(fork_trunk, Vec::new());
        }
        Ok(current)
    }

    fn lower_alt_source(&mut self, alt: &Alt) -> Result<Option<NodeRef>, CompileError> {
        match alt {
            Alt::Source(src) => Ok(Some(self.lower_source_expr(src)?)),
            _ => Ok(None),
        }
    }

    /// Lowers one `target <- source [|| alt]* [?? alt]?` group (shared by
    /// top-level bridge wires and array-element wires) into one or more
    /// [`Wire`]s sharing `target`. §4.1 rules 5-6.
    #[allow(clippy::too_many_arguments)]
    fn lower_pull_group(
        &mut self,
        to: NodeRef,
        force: bool,
        source: &SourceExpr,
        or_alts: &[Alt],
        coalesce_alt: Option<&Alt>,
    ) -> Result<(), CompileError> {
        let from = self.lower_source_expr(source)?;
        let mut sources = vec![from];
        for alt in or_alts {
            if let Some(r) = self.lower_alt_source(alt)? {
                sources.push(r);
            } else {
                // A literal `|| value` terminates the pull chain: it becomes
                // the null_fallback of the last emitted wire rather than a
                // NodeRef pulled in its own right.
            }
        }

        let null_fallback = or_alts.iter().rev().find_map(alt_json_text);
        let (fallback, fallback_ref) = match coalesce_alt {
            Some(Alt::Source(src)) => (None, Some(self.lower_source_expr(src)?)),
            Some(other) => (alt_json_text(other), None),
            None => (None, None),
        };

        for (i, from) in sources.into_iter().enumerate() {
            let is_last = i == or_alts.iter().filter(|a| matches!(a, Alt::Source(_))).count();
            self.wires.push(Wire::Pull {
                from,
                to: to.clone(),
                pipe: false,
                force: force && i == 0,
                null_fallback: if is_last { null_fallback.clone() } else { None },
                fallback: if is_last { fallback.clone() } else { None },
                fallback_ref: if is_last { fallback_ref.clone() } else { None },
            });
        }
        Ok(())
    }

    fn lower_bridge_line(&mut self, line: &BridgeLine) -> Result<(), CompileError> {
        match line {
            BridgeLine::With(with) => self.lower_bridge_with(with),
            BridgeLine::Wire(wire) => self.lower_wire_stmt(wire),
        }
    }

    fn lower_bridge_with(&mut self, with: &BridgeWith) -> Result<(), CompileError> {
        match &with.source {
            BridgeWithSource::Input => {
                let alias = with.alias.clone().unwrap_or_else(|| "input".to_string());
                let trunk = self
                    .handles
                    .get("__bridge_own__")
                    .and_then(|t| if let HandleTarget::Single(t) = t { Some(t.clone()) } else { None })
                    .expect("bridge own trunk registered before lowering lines");
                self.declare_handle(alias, HandleTarget::Single(trunk), with.line)?;
            }
            BridgeWithSource::Output => {
                let alias = with.alias.clone().unwrap_or_else(|| "output".to_string());
                let trunk = self
                    .handles
                    .get("__bridge_own__")
                    .and_then(|t| if let HandleTarget::Single(t) = t { Some(t.clone()) } else { None })
                    .expect("bridge own trunk registered before lowering lines");
                self.declare_handle(alias, HandleTarget::Single(trunk), with.line)?;
            }
            BridgeWithSource::Context => {
                let alias = with.alias.clone().unwrap_or_else(|| "context".to_string());
                self.declare_handle(alias, HandleTarget::Single(Trunk::context()), with.line)?;
            }
            BridgeWithSource::Const => {
                let alias = with.alias.clone().unwrap_or_else(|| "const".to_string());
                self.declare_handle(alias, HandleTarget::Single(Trunk::const_()), with.line)?;
            }
            BridgeWithSource::Dotted(path) => {
                let default_alias = path.segments.last().cloned().unwrap_or_default();
                let alias = with.alias.clone().unwrap_or(default_alias);
                let target = self.resolve_with_source(path)?;
                self.declare_handle(alias, target, with.line)?;
            }
        }
        Ok(())
    }

    fn lower_wire_stmt(&mut self, wire: &WireStmt) -> Result<(), CompileError> {
        let to = self.resolve_target(&wire.target)?;
        match &wire.rhs {
            WireRhs::Constant(v) => {
                self.wires.push(Wire::Constant { to, value: json_text(v) });
            }
            WireRhs::Pull {
                force,
                source,
                array_map,
                or_alts,
                coalesce_alt,
            } => {
                if let Some(am) = array_map {
                    self.array_iterators.push((to.path.clone(), am.iter_name.clone()));
                    self.lower_pull_group(to.clone(), *force, source, or_alts, coalesce_alt.as_ref())?;
                    self.lower_array_map(&to, am)?;
                } else {
                    self.lower_pull_group(to, *force, source, or_alts, coalesce_alt.as_ref())?;
                }
            }
        }
        Ok(())
    }

    fn lower_array_map(&mut self, outer_to: &NodeRef, am: &ArrayMap) -> Result<(), CompileError> {
        // The element slot lives on whichever trunk the outer array wire
        // itself targets (the bridge's own trunk at top level, or a
        // define's output trunk when this array-map sits inside a define
        // body) — not unconditionally `__bridge_own__`, which for a define
        // template names its *input* trunk and would otherwise point
        // element-tagged wires at the wrong side of the define boundary.
        let own_trunk = outer_to.trunk.clone();
        let previous = self.handles.insert(am.iter_name.clone(), HandleTarget::Element(own_trunk.clone()));
        for elem in &am.lines {
            for seg in &elem.target.segments {
                if is_array_index(seg) {
                    return Err(CompileError::ArrayIndexOnTarget {
                        line: elem.target.line,
                        target: elem.target.joined(),
                    });
                }
            }
            let to = NodeRef::element_of(own_trunk.clone(), elem.target.segments.clone());
            match &elem.rhs {
                ElemRhs::Constant(v) => {
                    self.wires.push(Wire::Constant { to, value: json_text(v) });
                }
                ElemRhs::Pull {
                    force,
                    source,
                    or_alts,
                    coalesce_alt,
                } => {
                    self.lower_pull_group(to, *force, source, or_alts, coalesce_alt.as_ref())?;
                }
            }
        }
        match previous {
            Some(prev) => {
                self.handles.insert(am.iter_name.clone(), prev);
            }
            None => {
                self.handles.remove(&am.iter_name);
            }
        }
        Ok(())
    }
}

impl LowerCtx {
    fn lower_tool(&self, block: &ToolBlock) -> Result<ToolDef, CompileError> {
        let name = block.name.joined();
        let from = block.from.joined();
        let (fn_name, extends) = if self.tools.contains_key(&from) {
            (None, Some(from))
        } else {
            (Some(from), None)
        };

        let mut deps = Vec::new();
        let mut wires = Vec::new();
        let mut on_error = None;

        for line in &block.lines {
            match line {
                ToolLine::With(with) => {
                    let (handle, dep) = match &with.source {
                        WithSource::Context => ("context".to_string(), ToolDep::Context),
                        WithSource::Const => ("const".to_string(), ToolDep::Const),
                        WithSource::Dotted(path) => {
                            let dep_name = path.joined();
                            if !self.tools.contains_key(&dep_name) {
                                return Err(CompileError::UnknownTool { line: path.line, name: dep_name });
                            }
                            let default_alias = path.segments.last().cloned().unwrap_or_default();
                            (default_alias, ToolDep::Tool(dep_name))
                        }
                    };
                    let alias = with.alias.clone().unwrap_or(handle);
                    deps.push(ToolDepBinding { handle: alias, dep });
                }
                ToolLine::OnError(oe) => {
                    on_error = Some(match &oe.value {
                        OnErrorValue::Json(v) => OnError::Literal(json_text(v)),
                        OnErrorValue::Pull(path) => OnError::Source(path.joined()),
                    });
                }
                ToolLine::Wire(w) => {
                    for seg in w.target.rest() {
                        if is_array_index(seg) {
                            return Err(CompileError::ArrayIndexOnTarget {
                                line: w.target.line,
                                target: w.target.joined(),
                            });
                        }
                    }
                    let kind = match &w.rhs {
                        ToolWireRhs::Constant(v) => ToolWireKind::Constant { value: json_text(v) },
                        ToolWireRhs::Pull(path) => ToolWireKind::Pull { source: path.joined() },
                    };
                    wires.push(ToolWire { target: w.target.joined(), kind });
                }
            }
        }

        Ok(ToolDef { name, fn_name, extends, deps, wires, on_error })
    }

    fn lower_define(&self, block: &DefineBlock) -> Result<DefineDef, CompileError> {
        let mut body = BodyLowerer::new(self);
        body.bind_handle(
            "__bridge_own__".to_string(),
            HandleTarget::Single(Trunk::define_in("__template__")),
        );
        // `input` and `output` are distinct trunks inside a define template
        // (unlike a bridge, where they share one trunk) — bound directly
        // rather than through `__bridge_own__`.
        body.bind_handle("input".to_string(), HandleTarget::Single(Trunk::define_in("__template__")));
        body.bind_handle("output".to_string(), HandleTarget::Single(Trunk::define_out("__template__")));

        for line in &block.lines {
            match line {
                BridgeLine::With(with) if matches!(with.source, BridgeWithSource::Input | BridgeWithSource::Output) => {
                    // Aliased input/output inside a define: re-bind under the alias too.
                    let trunk = match with.source {
                        BridgeWithSource::Input => Trunk::define_in("__template__"),
                        BridgeWithSource::Output => Trunk::define_out("__template__"),
                        _ => unreachable!(),
                    };
                    if let Some(alias) = &with.alias {
                        body.declare_handle(alias.clone(), HandleTarget::Single(trunk), with.line)?;
                    }
                }
                other => body.lower_bridge_line(other)?,
            }
        }

        Ok(DefineDef {
            name: block.name.clone(),
            handles: body.handle_bindings,
            wires: body.wires,
            array_iterators: body.array_iterators,
            pipe_handles: body.pipe_handles,
        })
    }

    fn lower_bridge(&self, block: &BridgeBlock) -> Result<Bridge, CompileError> {
        let own_trunk = Trunk::bridge(block.type_name.clone(), block.field_name.clone());
        let mut body = BodyLowerer::new(self);
        body.bind_handle("__bridge_own__".to_string(), HandleTarget::Single(own_trunk.clone()));
        body.bind_handle("input".to_string(), HandleTarget::Single(own_trunk.clone()));
        body.bind_handle("output".to_string(), HandleTarget::Single(own_trunk.clone()));

        let passthrough = match &block.body {
            BridgeBody::Passthrough(dotted) => {
                let alias = dotted.segments.last().cloned().unwrap_or_default();
                let target = body.resolve_with_source(dotted)?;
                let (in_trunk, out_trunk) = match &target {
                    HandleTarget::Single(t) => (t.clone(), t.clone()),
                    HandleTarget::Define { in_trunk, out_trunk } => (in_trunk.clone(), out_trunk.clone()),
                    HandleTarget::Element(_) => unreachable!("with-source never resolves to an iterator"),
                };
                body.bind_handle(alias, target);
                // "wires input into it": the bridge's own input spreads into
                // the tool/define's assembled input at the empty path.
                body.wires.push(Wire::Pull {
                    from: NodeRef::new(own_trunk.clone(), Vec::new()),
                    to: NodeRef::new(in_trunk, Vec::new()),
                    pipe: false,
                    force: false,
                    null_fallback: None,
                    fallback: None,
                    fallback_ref: None,
                });
                // "wires its output out": the tool/define's result becomes
                // this bridge's whole output.
                body.wires.push(Wire::Pull {
                    from: NodeRef::new(out_trunk, Vec::new()),
                    to: NodeRef::new(own_trunk.clone(), Vec::new()),
                    pipe: false,
                    force: false,
                    null_fallback: None,
                    fallback: None,
                    fallback_ref: None,
                });
                true
            }
            BridgeBody::Lines(lines) => {
                for line in lines {
                    body.lower_bridge_line(line)?;
                }
                false
            }
        };

        Ok(Bridge {
            bridge_type: block.type_name.clone(),
            field: block.field_name.clone(),
            handles: body.handle_bindings,
            wires: body.wires,
            array_iterators: body.array_iterators,
            pipe_handles: body.pipe_handles,
            passthrough,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::lexer::Lexer;
    use crate::compiler::parser::parse;

    fn lower_src(src: &str) -> Vec<Instruction> {
        let tokens = Lexer::new(src).tokenize().unwrap();
        let program = parse(tokens).unwrap();
        lower(&program, &LowerSettings::default()).unwrap()
    }

    #[test]
    fn rejects_wrong_version() {
        let tokens = Lexer::new("version 1.0").tokenize().unwrap();
        let program = parse(tokens).unwrap();
        let err = lower(&program, &LowerSettings::default()).unwrap_err();
        assert!(matches!(err, CompileError::VersionMismatch { .. }));
    }

    #[test]
    fn lowers_passthrough_wires() {
        let src = r#"
            version 1.4
            bridge Query.echo {
                with input as i
                with output as o
                o.text <- i.text
                o.count <- i.count
            }
        "#;
        let instrs = lower_src(src);
        let Instruction::Bridge(bridge) = &instrs[0] else { panic!() };
        assert_eq!(bridge.wires.len(), 2);
        for w in &bridge.wires {
            let Wire::Pull { from, to, .. } = w else { panic!() };
            assert_eq!(from.trunk, bridge.own_trunk());
            assert_eq!(to.trunk, bridge.own_trunk());
        }
    }

    #[test]
    fn rejects_array_index_on_target() {
        let src = r#"
            version 1.4
            bridge Query.x {
                with input as i
                output.items.0.name <- i.name
            }
        "#;
        let tokens = Lexer::new(src).tokenize().unwrap();
        let program = parse(tokens).unwrap();
        let err = lower(&program, &LowerSettings::default()).unwrap_err();
        assert!(matches!(err, CompileError::ArrayIndexOnTarget { .. }));
    }

    #[test]
    fn duplicate_handle_alias_for_different_targets_is_rejected() {
        let src = r#"
            version 1.4
            tool api.get from http.get
            tool api.post from http.post
            bridge Query.x {
                with input as i
                with api.get as h
                with api.post as h
                output.x <- h.value
            }
        "#;
        let tokens = Lexer::new(src).tokenize().unwrap();
        let program = parse(tokens).unwrap();
        let err = lower(&program, &LowerSettings::default()).unwrap_err();
        assert!(matches!(err, CompileError::DuplicateHandle { name, .. } if name == "h"));
    }

    #[test]
    fn rebinding_an_alias_to_the_same_target_is_not_a_duplicate() {
        let src = r#"
            version 1.4
            bridge Query.x {
                with input as i
                with input as i
                output.x <- i.x
            }
        "#;
        lower_src(src);
    }

    #[test]
    fn two_with_uses_of_same_tool_get_distinct_instances() {
        let src = r#"
            version 1.4
            tool api.get from http.get
            bridge Query.x {
                with input as i
                with api.get as a
                with api.get as b
                output.a <- a.value
                output.b <- b.value
            }
        "#;
        let instrs = lower_src(src);
        let Instruction::Bridge(bridge) = &instrs[1] else { panic!() };
        let instances: Vec<u32> = bridge
            .wires
            .iter()
            .filter_map(|w| match w {
                Wire::Pull { from, .. } => from.trunk.instance,
                _ => None,
            })
            .collect();
        assert_eq!(instances.len(), 2);
        assert_ne!(instances[0], instances[1]);
    }

    #[test]
    fn pipe_chain_emits_chained_fork_wires() {
        let src = r#"
            version 1.4
            tool pickFirst from std.pick
            tool toArray from std.identity
            bridge Query.label {
                with input as i
                output.value <- pickFirst:toArray:i.value
            }
        "#;
        let instrs = lower_src(src);
        let Instruction::Bridge(bridge) = &instrs[2] else { panic!() };
        let pipe_wires: Vec<_> = bridge.wires.iter().filter(|w| matches!(w, Wire::Pull { pipe: true, .. })).collect();
        assert_eq!(pipe_wires.len(), 2);
        assert_eq!(bridge.pipe_handles.len(), 2);
    }

    #[test]
    fn coalesce_chain_attaches_fallback_to_last_wire() {
        let src = r#"
            version 1.4
            tool p from http.get
            tool b from http.get
            bridge Query.label {
                with input as i
                with p as p
                with b as b
                output.label <- p.label || b.label || "default"
            }
        "#;
        let instrs = lower_src(src);
        let Instruction::Bridge(bridge) = &instrs[2] else { panic!() };
        let group: Vec<_> = bridge
            .wires
            .iter()
            .filter(|w| w.to().path == vec!["label".to_string()])
            .collect();
        assert_eq!(group.len(), 2);
        let Wire::Pull { null_fallback, .. } = group[1] else { panic!() };
        assert_eq!(null_fallback.as_deref(), Some("\"default\""));
    }

    #[test]
    fn define_is_inlined_with_fresh_instances() {
        let src = r#"
            version 1.4
            tool weatherApi from http.get
            define getWeather {
                with input as args
                with weatherApi as w
                output.temp <- w.temp
            }
            bridge Query.one {
                with input as i
                with getWeather as g1
                output.a <- g1.temp
            }
            bridge Query.two {
                with input as i
                with getWeather as g2
                output.b <- g2.temp
            }
        "#;
        let instrs = lower_src(src);
        let Instruction::Bridge(b1) = &instrs[2] else { panic!() };
        let Instruction::Bridge(b2) = &instrs[3] else { panic!() };
        assert!(!b1.wires.is_empty());
        assert!(!b2.wires.is_empty());
        // Each inlining gets its own define boundary and tool instance.
        assert_ne!(b1.wires, b2.wires);
    }
}
