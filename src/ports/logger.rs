//! The `Logger` port (§4.5): the engine's only window onto the outside
//! world for diagnostics that are not themselves errors -- non-numeric list
//! indexing during a pull, the at-most-once memoization decision point, and
//! forced-wire failures that are swallowed from the caller's perspective but
//! must never silently vanish.

use crate::compiler::instruction::Trunk;

pub trait Logger: Send + Sync {
    fn warn_non_numeric_index(&self, trunk: &Trunk, path: &[String]);
    fn debug_tool_completed(&self, tool: &str, duration_ms: u64);
    fn trace_schedule(&self, trunk: &Trunk, cache_hit: bool);
    fn warn_forced_wire_failed(&self, tool: &str, error: &str);
}
