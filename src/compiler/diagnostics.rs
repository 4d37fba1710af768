//! Recovery-mode compiler entry point for IDE/editor tooling (§6.2):
//! unlike [`crate::compiler::compile`], this never aborts on the first
//! error — it keeps parsing past a bad token and returns everything it
//! managed to recover alongside the full diagnostic list.

use crate::compiler::ast::Item;
use crate::compiler::error::CompileError;
use crate::compiler::instruction::Instruction;
use crate::compiler::lexer::Lexer;
use crate::compiler::lower::{lower, LowerSettings};
use crate::compiler::parser::parse_with_recovery;

/// Result of a recovery-mode compile (§6.2's `diagnostics(source)`).
pub struct Diagnostics {
    /// The lowered instruction list, if lowering got far enough to run at
    /// all — `None` when the lexer or parser failed to produce any AST.
    pub instructions: Option<Vec<Instruction>>,
    pub diagnostics: Vec<CompileError>,
    /// The 1-based source line each top-level item starts at, in
    /// declaration order, for a gutter/outline view.
    pub start_lines: Vec<usize>,
}

/// Runs the lexer, parser (in recovery mode), and lowering pass, collecting
/// every error along the way instead of stopping at the first one. Lowering
/// itself has no recovery mode of its own (§4.3: lowering only ever runs
/// over a valid AST) — a lowering failure is appended to `diagnostics` and
/// `instructions` is left `None`.
pub fn diagnostics(source: &str) -> Diagnostics {
    let tokens = match Lexer::new(source).tokenize() {
        Ok(tokens) => tokens,
        Err(err) => {
            return Diagnostics { instructions: None, diagnostics: vec![err], start_lines: Vec::new() };
        }
    };

    let (program, mut errors) = parse_with_recovery(tokens);

    let start_lines = program.as_ref().map(|p| p.items.iter().map(item_line).collect()).unwrap_or_default();

    let instructions = match &program {
        Some(program) if errors.is_empty() => match lower(program, &LowerSettings::default()) {
            Ok(instructions) => Some(instructions),
            Err(err) => {
                errors.push(err);
                None
            }
        },
        _ => None,
    };

    Diagnostics { instructions, diagnostics: errors, start_lines }
}

fn item_line(item: &Item) -> usize {
    match item {
        Item::Const(c) => c.line,
        Item::Tool(t) => t.line,
        Item::Define(d) => d.line,
        Item::Bridge(b) => b.line,
    }
}
