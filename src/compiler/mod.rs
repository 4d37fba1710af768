//! The `.bridge` DSL compiler: lexer → parser → AST → lowering to a flat
//! [`Instruction`](instruction::Instruction) list (§4.1-§4.3).
//!
//! [`compile`] is the strict, single-shot entry point a build step uses;
//! [`diagnostics`] drives the same pipeline in recovery mode for editor
//! tooling (§6.2).

pub mod ast;
pub mod diagnostics;
pub mod error;
pub mod instruction;
mod lexer;
mod lower;
mod parser;
pub mod serialize;
mod token;

use error::CompileError;
use instruction::Instruction;
use lower::LowerSettings;

/// Compiles one `.bridge` source file to its instruction list, failing on
/// the first error encountered (§4.3 strict mode).
pub fn compile(source: &str) -> Result<Vec<Instruction>, CompileError> {
    compile_with_settings(source, &LowerSettings::default())
}

/// Like [`compile`], but with an explicit [`LowerSettings`] (used to thread
/// [`crate::config::EngineSettings::max_define_inline_depth`] through).
pub fn compile_with_settings(source: &str, settings: &LowerSettings) -> Result<Vec<Instruction>, CompileError> {
    let tokens = lexer::Lexer::new(source).tokenize()?;
    let program = parser::parse(tokens)?;
    lower::lower(&program, settings)
}

pub use lower::LowerSettings;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_a_trivial_passthrough_bridge() {
        let source = r#"
            version 1.4
            bridge Query.echo {
                with input as i
                with output as o
                o.text <- i.text
            }
        "#;
        let instructions = compile(source).unwrap();
        assert!(instructions.iter().any(|i| matches!(i, Instruction::Bridge(_))));
    }

    #[test]
    fn rejects_an_unsupported_version() {
        let source = "version 99.0";
        let err = compile(source).unwrap_err();
        assert!(matches!(err, CompileError::VersionMismatch { .. }));
    }
}
