//! Per-request tool traces (§6.5). Every tool invocation is logged through
//! the `Logger` port regardless of trace level (§4.5); `Tracer` additionally
//! accumulates a structured record per invocation when a request opted
//! into `trace=basic|full`, for a host to surface in its own extensions
//! payload.

use std::sync::Mutex;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::config::TraceLevel;
use crate::engine::value::Value;

#[derive(Debug, Clone)]
pub struct ToolTrace {
    pub tool: String,
    pub function: String,
    pub input: Option<Value>,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub started_at_ms: u64,
}

pub struct Tracer {
    level: TraceLevel,
    traces: Mutex<Vec<ToolTrace>>,
}

impl Tracer {
    pub fn new(level: TraceLevel) -> Self {
        Self { level, traces: Mutex::new(Vec::new()) }
    }

    pub fn enabled(&self) -> bool {
        !matches!(self.level, TraceLevel::Off)
    }

    /// Records one tool invocation. `basic` omits `input`/`output` (§6.5);
    /// `full` keeps them.
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &self,
        tool: &str,
        function: &str,
        input: Option<Value>,
        output: Option<Value>,
        error: Option<String>,
        started: Instant,
        started_at_ms: u64,
    ) {
        if !self.enabled() {
            return;
        }
        let duration_ms = started.elapsed().as_millis() as u64;
        let (input, output) = if matches!(self.level, TraceLevel::Full) {
            (input, output)
        } else {
            (None, None)
        };
        self.traces.lock().unwrap().push(ToolTrace {
            tool: tool.to_string(),
            function: function.to_string(),
            input,
            output,
            error,
            duration_ms,
            started_at_ms,
        });
    }

    pub fn traces(&self) -> Vec<ToolTrace> {
        self.traces.lock().unwrap().clone()
    }
}

pub fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_tracer_records_nothing() {
        let tracer = Tracer::new(TraceLevel::Off);
        tracer.record("t", "f", None, None, None, Instant::now(), now_ms());
        assert!(tracer.traces().is_empty());
    }

    #[test]
    fn basic_tracer_omits_input_and_output() {
        let tracer = Tracer::new(TraceLevel::Basic);
        tracer.record("t", "f", Some(Value::Bool(true)), Some(Value::Bool(false)), None, Instant::now(), now_ms());
        let traces = tracer.traces();
        assert_eq!(traces.len(), 1);
        assert!(traces[0].input.is_none());
        assert!(traces[0].output.is_none());
    }

    #[test]
    fn full_tracer_keeps_input_and_output() {
        let tracer = Tracer::new(TraceLevel::Full);
        tracer.record("t", "f", Some(Value::Bool(true)), Some(Value::Bool(false)), None, Instant::now(), now_ms());
        let traces = tracer.traces();
        assert_eq!(traces[0].input, Some(Value::Bool(true)));
        assert_eq!(traces[0].output, Some(Value::Bool(false)));
    }
}
