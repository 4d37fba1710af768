//! `Instruction` list -> `.bridge` source text (§6.2 `serialize`).
//!
//! This is a disassembler, not a pretty-printer over the original AST: by
//! the time lowering has run, handle aliases are gone (everything is a
//! resolved [`Trunk`]/[`NodeRef`]), so this module re-synthesizes fresh
//! handle names (`with <source> as h0`, `h1`, ...) in the order trunks are
//! first referenced. The contract is §8's round-trip invariant --
//! `compile(serialize(compile(src))) == compile(src)` -- not byte-for-byte
//! fidelity to whatever the operator originally typed.

use std::collections::HashMap;

use crate::compiler::instruction::{
    Bridge, ConstDef, DefineDef, Instruction, NodeRef, OnError, Origin, ToolDef, ToolDepBinding, ToolWireKind, Trunk, Wire,
};
use crate::compiler::lower::SUPPORTED_VERSION;

/// Renders a compiled instruction list back to `.bridge` source.
pub fn serialize(instructions: &[Instruction]) -> String {
    let mut out = String::new();
    out.push_str(&format!("version {SUPPORTED_VERSION}\n\n"));

    for instr in instructions {
        match instr {
            Instruction::Const(c) => out.push_str(&serialize_const(c)),
            Instruction::Tool(t) => out.push_str(&serialize_tool(t)),
            Instruction::Define(d) => out.push_str(&serialize_define(d)),
            Instruction::Bridge(b) => out.push_str(&serialize_bridge(b)),
        }
        out.push('\n');
    }

    out
}

fn serialize_const(c: &ConstDef) -> String {
    format!("const {} = {}\n", c.name, c.json_text)
}

fn serialize_tool(t: &ToolDef) -> String {
    let from = t.extends.as_deref().or(t.fn_name.as_deref()).unwrap_or("std.identity");
    let mut lines = Vec::new();

    for dep in &t.deps {
        lines.push(serialize_tool_dep(dep));
    }
    if let Some(on_error) = &t.on_error {
        lines.push(match on_error {
            OnError::Literal(text) => format!("on error = {text}"),
            OnError::Source(src) => format!("on error <- {src}"),
        });
    }
    for wire in &t.wires {
        let rhs = match &wire.kind {
            ToolWireKind::Constant { value } => format!("= {value}"),
            ToolWireKind::Pull { source } => format!("<- {source}"),
        };
        lines.push(format!(".{} {rhs}", wire.target));
    }

    if lines.is_empty() {
        format!("tool {} from {from}\n", t.name)
    } else {
        format!("tool {} from {from} {{\n{}\n}}\n", t.name, indent(&lines))
    }
}

fn serialize_tool_dep(dep: &ToolDepBinding) -> String {
    match &dep.dep {
        crate::compiler::instruction::ToolDep::Context => with_line("context", &dep.handle),
        crate::compiler::instruction::ToolDep::Const => with_line("const", &dep.handle),
        crate::compiler::instruction::ToolDep::Tool(name) => with_line(name, &dep.handle),
    }
}

fn with_line(source: &str, alias: &str) -> String {
    format!("with {source} as {alias}")
}

fn indent(lines: &[String]) -> String {
    lines.iter().map(|l| format!("    {l}")).collect::<Vec<_>>().join("\n")
}

/// Shared renderer for a [`Bridge`]/[`DefineDef`] body: both are "a set of
/// wires plus array-iterator/pipe-fork metadata anchored on an input trunk
/// and an output trunk" (identical trunk for a bridge, distinct synthetic
/// trunks for a define template, §4.1 rules 2 & 7).
struct BodyWriter<'a> {
    input_trunk: &'a Trunk,
    output_trunk: &'a Trunk,
    array_iterators: &'a [(Vec<String>, String)],
    pipe_sources: HashMap<Trunk, NodeRef>,
    aliases: HashMap<Trunk, String>,
    next_alias: usize,
    lines: Vec<String>,
}

impl<'a> BodyWriter<'a> {
    fn new(input_trunk: &'a Trunk, output_trunk: &'a Trunk, wires: &'a [Wire], array_iterators: &'a [(Vec<String>, String)]) -> Self {
        let mut pipe_sources = HashMap::new();
        for wire in wires {
            if let Wire::Pull { pipe: true, from, to, .. } = wire {
                pipe_sources.insert(to.trunk.clone(), from.clone());
            }
        }
        Self {
            input_trunk,
            output_trunk,
            array_iterators,
            pipe_sources,
            aliases: HashMap::new(),
            next_alias: 0,
            lines: Vec::new(),
        }
    }

    fn fresh_alias(&mut self, prefix: &str) -> String {
        let alias = format!("{prefix}{}", self.next_alias);
        self.next_alias += 1;
        alias
    }

    /// Emits the `with` header for `trunk` the first time it is seen as a
    /// plain (non-pipe-fork, non-own) trunk, returning the alias to use at
    /// every reference site.
    fn alias_for(&mut self, trunk: &Trunk) -> String {
        if let Some(existing) = self.aliases.get(trunk) {
            return existing.clone();
        }
        let alias = match &trunk.origin {
            Origin::Context => {
                self.lines.push("with context".to_string());
                "context".to_string()
            }
            Origin::Const => {
                self.lines.push("with const".to_string());
                "const".to_string()
            }
            Origin::Tool { name } => {
                let alias = self.fresh_alias("h");
                self.lines.push(with_line(name, &alias));
                alias
            }
            Origin::DefineInput { handle } | Origin::DefineOutput { handle } => {
                let define_name = handle.split('$').next().unwrap_or(handle).to_string();
                let alias = self.fresh_alias("d");
                self.lines.push(with_line(&define_name, &alias));
                // Both halves of the define boundary (its input used as a
                // target, its output used as a source) share one alias.
                let (in_trunk, out_trunk) = match &trunk.origin {
                    Origin::DefineInput { .. } => (trunk.clone(), Trunk::define_out(handle.clone())),
                    _ => (Trunk::define_in(handle.clone()), trunk.clone()),
                };
                self.aliases.insert(in_trunk, alias.clone());
                self.aliases.insert(out_trunk, alias.clone());
                alias
            }
            Origin::Bridge { .. } | Origin::PipeFork { .. } => {
                // Not reachable here: bridge-origin trunks are handled by
                // the input/output shortcuts above, and pipe forks are
                // never aliased -- they are reconstructed inline.
                self.fresh_alias("x")
            }
        };
        self.aliases.insert(trunk.clone(), alias.clone());
        alias
    }

    /// Renders a data source: a bare `handle.path` address, or -- when
    /// `node` is a pipe-fork trunk -- the reconstructed `a:b:c.x` chain
    /// (§4.1 rule 4; pipe forks are chained `from=prev` right to left, so
    /// walking `pipe_sources` from the outermost fork inward recovers the
    /// stages in their original left-to-right order).
    fn render_source(&mut self, node: &NodeRef) -> String {
        if let Origin::PipeFork { .. } = &node.trunk.origin {
            let mut stages = Vec::new();
            let mut current = node.trunk.clone();
            loop {
                match &current.origin {
                    Origin::PipeFork { tool } => {
                        stages.push(tool.clone());
                        let prev = self.pipe_sources.get(&current).cloned();
                        match prev {
                            Some(prev_ref) if matches!(prev_ref.trunk.origin, Origin::PipeFork { .. }) => {
                                current = prev_ref.trunk;
                            }
                            Some(prev_ref) => {
                                stages.push(self.render_address(&prev_ref));
                                break;
                            }
                            None => break,
                        }
                    }
                    _ => break,
                }
            }
            return stages.join(":");
        }
        self.render_address(node)
    }

    /// Renders a source-side address: this body's own input trunk is always
    /// addressed as `input` (matching the implicit `with input as input`
    /// every body gets, §4.1 rule 2), everything else goes through the
    /// alias table.
    fn render_address(&mut self, node: &NodeRef) -> String {
        let alias = if node.trunk == *self.input_trunk {
            "input".to_string()
        } else {
            self.alias_for(&node.trunk)
        };
        if node.path.is_empty() {
            alias
        } else {
            format!("{alias}.{}", node.path.join("."))
        }
    }

    /// Renders the target side of a wire (`to`): this body's own output
    /// trunk is always addressed as `output`. For a bridge, `input` and
    /// `output` are literally the same [`Trunk`] (§4.1 rule 2), so this
    /// takes priority over [`Self::render_address`]'s `input` shortcut --
    /// either name recompiles to the identical wire, but `output` reads
    /// naturally as a write target.
    fn render_target(&mut self, node: &NodeRef) -> String {
        let alias = if node.trunk == *self.output_trunk {
            "output".to_string()
        } else if node.trunk == *self.input_trunk {
            "input".to_string()
        } else {
            self.alias_for(&node.trunk)
        };
        if node.path.is_empty() {
            alias
        } else {
            format!("{alias}.{}", node.path.join("."))
        }
    }

    /// Renders the right-hand side of one run of [`Wire`]s that share a
    /// target (an overdefinition group, or a `||`/`??` coalesce chain -- the
    /// two are indistinguishable once lowered, §4.2.1, and recompiling
    /// either shape back to a single chained statement reproduces the same
    /// per-wire fallback placement): `<-[!] src1 [[] as iter {...}] || src2
    /// || null_fallback ?? fallback`. The grammar places an array-map block
    /// right after the primary source and before any `||`/`??` chain, so
    /// `array_map` is spliced in at that exact point rather than appended.
    fn render_pull_rhs(&mut self, group: &[&Wire], array_map: Option<&str>) -> String {
        let mut sources = Vec::new();
        let mut force = false;
        let mut null_fallback = None;
        let mut fallback = None;
        let mut fallback_ref = None;
        for (i, wire) in group.iter().enumerate() {
            let Wire::Pull { from, force: f, null_fallback: nf, fallback: fb, fallback_ref: fr, .. } = wire else {
                continue;
            };
            if i == 0 {
                force = *f;
            }
            sources.push(self.render_source(from));
            if nf.is_some() {
                null_fallback = nf.clone();
            }
            if fb.is_some() {
                fallback = fb.clone();
            }
            if fr.is_some() {
                fallback_ref = fr.clone();
            }
        }

        let arrow = if force { "<-!" } else { "<-" };
        let mut rhs = format!("{arrow} {}", sources.first().cloned().unwrap_or_default());
        if let Some(am) = array_map {
            rhs.push(' ');
            rhs.push_str(am);
        }
        for extra in sources.iter().skip(1) {
            rhs.push_str(&format!(" || {extra}"));
        }
        if let Some(nf) = null_fallback {
            rhs.push_str(&format!(" || {nf}"));
        }
        if let Some(fb) = fallback {
            rhs.push_str(&format!(" ?? {fb}"));
        } else if let Some(fr) = fallback_ref {
            let rendered = self.render_source(&fr);
            rhs.push_str(&format!(" ?? {rendered}"));
        }
        rhs
    }

    /// Renders one statement addressed at `target` (either `output.path...`
    /// or, inside an array-map block, the bare `.path...`), grouping runs of
    /// `Constant`/`Pull` wires that share a target into one line.
    fn render_group(&mut self, target: &str, wires: &[&Wire], array_map: Option<&str>) -> String {
        match wires.first() {
            Some(Wire::Constant { value, .. }) => format!("{target} = {value}"),
            Some(Wire::Pull { .. }) => format!("{target} {}", self.render_pull_rhs(wires, array_map)),
            None => target.to_string(),
        }
    }

    /// Renders the full body: groups consecutive same-target wires into
    /// one statement, attaches array-map blocks to the outer wire whose
    /// target path matches an `array_iterators` entry, and skips wires
    /// that are pure plumbing (`pipe=true` forks, already folded into
    /// `render_source`; `element=true` wires, folded into their owning
    /// array-map block).
    fn render_wires(&mut self, wires: &[Wire]) {
        let mut i = 0;
        while i < wires.len() {
            let wire = &wires[i];
            let to = wire.to();
            if matches!(wire, Wire::Pull { pipe: true, .. }) || to.element {
                i += 1;
                continue;
            }

            let run_target = to.clone();
            let mut group = Vec::new();
            while i < wires.len() && *wires[i].to() == run_target {
                group.push(&wires[i]);
                i += 1;
            }

            let array_map_block = self
                .array_iterators
                .iter()
                .find(|(path, _)| *path == run_target.path)
                .cloned()
                .map(|(_, iter_name)| {
                    let elem_wires: Vec<&Wire> = wires
                        .iter()
                        .filter(|w| w.to().trunk == run_target.trunk && w.to().element)
                        .collect();
                    let mut elem_lines = Vec::new();
                    let mut j = 0;
                    while j < elem_wires.len() {
                        let elem_to = elem_wires[j].to().clone();
                        let mut elem_group = Vec::new();
                        while j < elem_wires.len() && *elem_wires[j].to() == elem_to {
                            elem_group.push(elem_wires[j]);
                            j += 1;
                        }
                        let field_addr = format!(".{}", elem_to.path.join("."));
                        elem_lines.push(self.render_group(&field_addr, &elem_group, None));
                    }
                    format!("[] as {iter_name} {{\n{}\n}}", indent(&elem_lines))
                });

            let target_addr = self.render_target(&run_target);
            let line = self.render_group(&target_addr, &group, array_map_block.as_deref());

            self.lines.push(line);
        }
    }
}

fn serialize_define(d: &DefineDef) -> String {
    let input_trunk = Trunk::define_in("__template__");
    let output_trunk = Trunk::define_out("__template__");
    let mut writer = BodyWriter::new(&input_trunk, &output_trunk, &d.wires, &d.array_iterators);
    writer.render_wires(&d.wires);
    if writer.lines.is_empty() {
        format!("define {} {{\n}}\n", d.name)
    } else {
        format!("define {} {{\n{}\n}}\n", d.name, indent(&writer.lines))
    }
}

fn serialize_bridge(b: &Bridge) -> String {
    let own_trunk = b.own_trunk();
    let mut writer = BodyWriter::new(&own_trunk, &own_trunk, &b.wires, &b.array_iterators);
    writer.render_wires(&b.wires);
    if writer.lines.is_empty() {
        format!("bridge {}.{} {{\n}}\n", b.bridge_type, b.field)
    } else {
        format!("bridge {}.{} {{\n{}\n}}\n", b.bridge_type, b.field, indent(&writer.lines))
    }
}
