//! Per-iteration observability.
//!
//! The orchestrator reports every iteration to a `TraceSink` collaborator.
//! The final run result never carries the trace; front ends that want it
//! subscribe here.

use std::sync::Mutex;

use serde::Serialize;
use serde_json::Value;

/// What one iteration did, for front-end observability.
#[derive(Debug, Clone, Serialize)]
pub struct IterationTrace {
    pub iteration: u64,
    /// Action name, including synthetic error actions.
    pub action: String,
    pub parameters: Value,
    /// Bounded excerpt of the result.
    pub result_excerpt: String,
    /// Kinds of the signals fired after this iteration.
    pub signals: Vec<String>,
}

/// Receives iteration traces as they happen.
pub trait TraceSink: Send + Sync {
    fn on_iteration(&self, trace: &IterationTrace);
}

/// Sink that drops everything.
pub struct NullTraceSink;

impl TraceSink for NullTraceSink {
    fn on_iteration(&self, _trace: &IterationTrace) {}
}

/// Sink that logs each iteration.
pub struct LogTraceSink;

impl TraceSink for LogTraceSink {
    fn on_iteration(&self, trace: &IterationTrace) {
        log::info!(
            "iteration {}: {} {} {}",
            trace.iteration,
            trace.action,
            trace.result_excerpt,
            if trace.signals.is_empty() {
                String::new()
            } else {
                format!("[signals: {}]", trace.signals.join(", "))
            }
        );
    }
}

/// Sink that stores traces in memory, for tests and simple hosts.
#[derive(Default)]
pub struct CollectingTraceSink {
    traces: Mutex<Vec<IterationTrace>>,
}

impl CollectingTraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything collected so far.
    pub fn traces(&self) -> Vec<IterationTrace> {
        self.traces.lock().expect("trace sink lock").clone()
    }
}

impl TraceSink for CollectingTraceSink {
    fn on_iteration(&self, trace: &IterationTrace) {
        self.traces.lock().expect("trace sink lock").push(trace.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn trace() -> IterationTrace {
        IterationTrace {
            iteration: 1,
            action: "read_file".to_string(),
            parameters: json!({"path": "a.txt"}),
            result_excerpt: "contents".to_string(),
            signals: vec![],
        }
    }

    #[test]
    fn test_collecting_sink_stores_traces() {
        let sink = CollectingTraceSink::new();
        sink.on_iteration(&trace());
        sink.on_iteration(&trace());

        let traces = sink.traces();
        assert_eq!(traces.len(), 2);
        assert_eq!(traces[0].action, "read_file");
    }

    #[test]
    fn test_null_sink_accepts_traces() {
        NullTraceSink.on_iteration(&trace());
    }

    #[test]
    fn test_trace_serializes() {
        let json = serde_json::to_value(trace()).unwrap();
        assert_eq!(json["action"], "read_file");
        assert_eq!(json["iteration"], 1);
    }
}
