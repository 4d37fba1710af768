//! Bridge: a declarative gateway engine that maps an API schema to a set of
//! external data-source invocations ("tools") via a dedicated DSL.
//!
//! A gateway operator writes a `.bridge` file declaring tools and per-field
//! bindings ("bridges") describing how a request is transformed into tool
//! inputs and how tool outputs project back onto response fields. This
//! crate [`compiler::compile`]s that source into an [`compiler::instruction`]
//! list, then [`engine::Engine::start`]s a lazy, per-request pull over it:
//! each response field the host resolves walks the dataflow graph on
//! demand, invoking a tool at most once no matter how many fields end up
//! depending on it.
//!
//! ```text
//! .bridge source -> compile -> [Instruction] -> Engine::build -> Engine
//!                                                                   |
//!                          host resolves fields  <-  Engine::start (per request)
//! ```
//!
//! The host query framework that walks a schema's response fields, and the
//! concrete tool transports (HTTP callers, string ops) themselves, are both
//! out of scope -- this crate exposes [`ports`] traits for them and ships
//! minimal [`adapters`] so the engine is usable and testable on its own.

pub mod adapters;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod ports;

pub use compiler::diagnostics::{diagnostics, Diagnostics};
pub use compiler::error::CompileError;
pub use compiler::instruction::Instruction;
pub use compiler::serialize::serialize;
pub use compiler::{compile, compile_with_settings, LowerSettings};
pub use config::{ConfigError, EngineSettings, TraceLevel};
pub use engine::{
    resolve_field, BuildEngineOptions, Engine, EngineBuilder, EngineError, ExecutionTree, FieldValue, ToolTrace, Value,
};
