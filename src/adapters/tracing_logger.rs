//! [`Logger`] adapter over the `tracing` crate (§4.5): structured,
//! key=value log fields for each engine event.

use tracing::{debug, trace, warn};

use crate::compiler::instruction::Trunk;
use crate::ports::Logger;

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn warn_non_numeric_index(&self, trunk: &Trunk, path: &[String]) {
        warn!(trunk = ?trunk, path = ?path, "non-numeric segment while indexing list");
    }

    fn debug_tool_completed(&self, tool: &str, duration_ms: u64) {
        debug!(tool = %tool, duration_ms, "tool invocation completed");
    }

    fn trace_schedule(&self, trunk: &Trunk, cache_hit: bool) {
        if cache_hit {
            trace!(trunk = ?trunk, "schedule: cache hit");
        } else {
            trace!(trunk = ?trunk, "schedule: first scheduling");
        }
    }

    fn warn_forced_wire_failed(&self, tool: &str, error: &str) {
        warn!(tool = %tool, error = %error, "forced wire tool failed (suppressed)");
    }
}
