//! Compile-time errors. Every variant carries the 1-based source line it
//! points at, so a host can render a squiggly or a diagnostics list without
//! re-parsing (§4.3, §7.1).

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("line {line}: version mismatch: source declares {found}, compiler supports {supported}")]
    VersionMismatch {
        line: usize,
        found: String,
        supported: String,
    },

    #[error("line {line}: syntax error: {message}")]
    SyntaxError { line: usize, message: String },

    #[error("line {line}: {message}")]
    SemanticError { line: usize, message: String },

    #[error("line {line}: undeclared handle `{handle}`")]
    UndeclaredHandle { line: usize, handle: String },

    #[error("line {line}: unknown tool `{name}`")]
    UnknownTool { line: usize, name: String },

    #[error("line {line}: `{name}` is already declared")]
    DuplicateHandle { line: usize, name: String },

    #[error("line {line}: invalid JSON literal: {message}")]
    InvalidJsonLiteral { line: usize, message: String },

    #[error("line {line}: wire target `{target}` may not carry an explicit array index")]
    ArrayIndexOnTarget { line: usize, target: String },
}

impl CompileError {
    pub fn line(&self) -> usize {
        match self {
            CompileError::VersionMismatch { line, .. }
            | CompileError::SyntaxError { line, .. }
            | CompileError::SemanticError { line, .. }
            | CompileError::UndeclaredHandle { line, .. }
            | CompileError::UnknownTool { line, .. }
            | CompileError::DuplicateHandle { line, .. }
            | CompileError::InvalidJsonLiteral { line, .. }
            | CompileError::ArrayIndexOnTarget { line, .. } => *line,
        }
    }
}
