//! Client-side trace log.
//!
//! When tracing is enabled, every significant client event is appended with
//! a timestamp and a small payload. The log is bounded so a long session
//! cannot grow it without limit; `snapshot()` returns a copy for
//! diagnostics.

use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::Value;

/// Hard bound on retained trace events (oldest dropped first).
const MAX_TRACE_EVENTS: usize = 1000;

/// One trace event: name, epoch-seconds timestamp, payload.
#[derive(Debug, Clone, Serialize)]
pub struct TraceEvent {
    pub timestamp: f64,
    pub event: String,
    pub payload: Value,
}

/// Append-only bounded event log.
///
/// **Interaction**: Private to `McpClient`. Event names: `client_connected`,
/// `read_resource`, `call_tool`, `resource_error`, `tool_error`,
/// `cache_hit`, `cache_set`, `circuit_opened`, `context_added`,
/// `context_evicted`.
pub struct TraceLog {
    events: VecDeque<TraceEvent>,
    enabled: bool,
}

impl TraceLog {
    pub fn new(enabled: bool) -> Self {
        Self {
            events: VecDeque::new(),
            enabled,
        }
    }

    /// Appends one event. No-op when tracing is disabled.
    pub fn record(&mut self, event: &str, payload: Value) {
        if !self.enabled {
            return;
        }
        if self.events.len() >= MAX_TRACE_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(TraceEvent {
            timestamp: epoch_seconds(),
            event: event.to_string(),
            payload,
        });
    }

    /// Read-only snapshot of the retained events.
    pub fn snapshot(&self) -> Vec<TraceEvent> {
        self.events.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Wall-clock seconds since the Unix epoch.
pub fn epoch_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// **Scenario**: Events append in order with timestamps.
    #[test]
    fn records_in_order() {
        let mut log = TraceLog::new(true);
        log.record("client_connected", json!({"tools": 3}));
        log.record("call_tool", json!({"name": "read_file"}));
        let events = log.snapshot();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, "client_connected");
        assert_eq!(events[1].event, "call_tool");
        assert!(events[0].timestamp > 0.0);
    }

    /// **Scenario**: A disabled log records nothing.
    #[test]
    fn disabled_log_is_inert() {
        let mut log = TraceLog::new(false);
        log.record("call_tool", json!({}));
        assert!(log.is_empty());
    }

    /// **Scenario**: The log stays within its bound, dropping the oldest.
    #[test]
    fn bounded_drops_oldest() {
        let mut log = TraceLog::new(true);
        for i in 0..(MAX_TRACE_EVENTS + 10) {
            log.record("call_tool", json!({"i": i}));
        }
        assert_eq!(log.len(), MAX_TRACE_EVENTS);
        assert_eq!(log.snapshot()[0].payload["i"], 10);
    }
}
