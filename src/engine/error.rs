//! Runtime (schedule-time and pull-time) error taxonomy (§7).
//!
//! `CompileError` (§4.3) is the compile-time half of the taxonomy;
//! `EngineError` covers everything that can go wrong once an
//! [`Instruction`](crate::compiler::instruction::Instruction) list is
//! actually executed against a request.

use std::sync::Arc;

use thiserror::Error;

use crate::compiler::instruction::Trunk;

#[derive(Error, Debug, Clone)]
pub enum EngineError {
    #[error("no bridge declared for `{bridge_type}.{bridge_field}`")]
    BridgeNotFound { bridge_type: String, bridge_field: String },

    #[error("no tool named `{name}` is registered")]
    ToolNotFound { name: String },

    #[error("tool `{name}` has no backing function in any registered namespace")]
    MissingToolFunction { name: String },

    #[error("tool `{tool}` failed: {message}")]
    ToolFailure { tool: String, message: String },

    #[error("all {0} sources in an overdefinition group failed")]
    AggregateFailure(Vec<Arc<EngineError>>),

    #[error("trunk {trunk:?} could not be scheduled: {reason}")]
    ScheduleFailed { trunk: Trunk, reason: String },
}

impl EngineError {
    pub fn tool_failure(tool: impl Into<String>, message: impl std::fmt::Display) -> Self {
        EngineError::ToolFailure {
            tool: tool.into(),
            message: message.to_string(),
        }
    }

    pub fn aggregate(errors: Vec<Arc<EngineError>>) -> Self {
        EngineError::AggregateFailure(errors)
    }
}

/// A tool function's own failure, kept distinct from [`EngineError`] at the
/// trait boundary (§6.3) so a tool implementation never needs to know the
/// engine's internal error shape; [`EngineError::ToolFailure`] wraps it when
/// it crosses back into the engine.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct ToolFailure {
    pub message: String,
}

impl ToolFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}
