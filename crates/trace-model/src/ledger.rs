//! Span-usage ledger: at-most-once consumption bookkeeping per trace.
//!
//! Kept deliberately separate from `Span` (see module docs on `span.rs`):
//! the same span value is referenced from several index slices, so mutating
//! a `used` flag embedded in the span would alias across them. A
//! `trace_id -> span_id -> bool` ledger sidesteps that entirely.
//!
//! This type is not thread-safe by itself; callers (the IPC server) hold it
//! behind their own lock and are responsible for the read-then-write
//! handoff described in ("concurrent mock searches under a single
//! RWMutex").

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct SpanUsageLedger {
    traces: HashMap<String, HashMap<String, bool>>,
}

impl SpanUsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a trace's spans as unused. Idempotent: spans already tracked
    /// keep their current state, newly-seen span ids start unused.
    pub fn register_trace<'a>(&mut self, trace_id: &str, span_ids: impl Iterator<Item = &'a str>) {
        let entry = self.traces.entry(trace_id.to_string()).or_default();
        for span_id in span_ids {
            entry.entry(span_id.to_string()).or_insert(false);
        }
    }

    pub fn is_used(&self, trace_id: &str, span_id: &str) -> bool {
        self.traces
            .get(trace_id)
            .and_then(|spans| spans.get(span_id))
            .copied()
            .unwrap_or(false)
    }

    /// Mark a span used. Monotonic: once true, stays true for the trace's
    /// lifetime.
    pub fn mark_used(&mut self, trace_id: &str, span_id: &str) {
        self.traces
            .entry(trace_id.to_string())
            .or_default()
            .insert(span_id.to_string(), true);
    }

    /// Drop all bookkeeping for a trace (called on `CleanupTraceSpans`).
    pub fn clear_trace(&mut self, trace_id: &str) {
        self.traces.remove(trace_id);
    }

    pub fn has_trace(&self, trace_id: &str) -> bool {
        self.traces.contains_key(trace_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_spans_start_unused() {
        let mut ledger = SpanUsageLedger::new();
        ledger.register_trace("t1", ["s1", "s2"].into_iter());
        assert!(!ledger.is_used("t1", "s1"));
        assert!(!ledger.is_used("t1", "s2"));
    }

    #[test]
    fn mark_used_is_monotonic() {
        let mut ledger = SpanUsageLedger::new();
        ledger.register_trace("t1", ["s1"].into_iter());
        ledger.mark_used("t1", "s1");
        assert!(ledger.is_used("t1", "s1"));
        // re-registering must not reset a span back to unused
        ledger.register_trace("t1", ["s1"].into_iter());
        assert!(ledger.is_used("t1", "s1"));
    }

    #[test]
    fn clear_trace_removes_all_state() {
        let mut ledger = SpanUsageLedger::new();
        ledger.register_trace("t1", ["s1"].into_iter());
        ledger.mark_used("t1", "s1");
        ledger.clear_trace("t1");
        assert!(!ledger.has_trace("t1"));
        assert!(!ledger.is_used("t1", "s1"));
    }

    #[test]
    fn unknown_trace_or_span_reports_unused() {
        let ledger = SpanUsageLedger::new();
        assert!(!ledger.is_used("missing", "s1"));
    }
}
