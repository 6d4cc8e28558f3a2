//! Server state: everything the accept loop's
//! connection handlers touch lives behind one `parking_lot::RwLock`.
//! Readers serve mock lookups; the writer path is reserved for
//! `LoadSpansForTrace`/`CleanupTraceSpans` and marking a span used.
//!
//! Lock discipline: never held across an `.await` point, and never
//! acquired while holding another component's lock.

use parking_lot::RwLock;
use replay_common::Value;
use replay_trace_model::{MatchEvent, MockNotFoundEvent, Span, SpanIndex, SpanUsageLedger};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Default)]
struct TraceState {
    index: SpanIndex,
    ledger: SpanUsageLedger,
    inbound_spans: Vec<Value>,
}

#[derive(Default)]
struct Inner {
    traces: HashMap<String, TraceState>,
    suite_index: SpanIndex,
    match_events: Vec<MatchEvent>,
    mock_not_found_events: Vec<MockNotFoundEvent>,
    sdk_version: Option<String>,
    current_test_id: Option<String>,
}

pub struct ServerState {
    inner: RwLock<Inner>,
    sdk_connected_tx: watch::Sender<bool>,
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerState {
    pub fn new() -> Self {
        let (sdk_connected_tx, _rx) = watch::channel(false);
        Self {
            inner: RwLock::new(Inner::default()),
            sdk_connected_tx,
        }
    }

    pub fn load_spans_for_trace<F>(&self, trace_id: &str, spans: Vec<Span>, reduced_hash_of: F)
    where
        F: Fn(&Span) -> Option<String>,
    {
        let mut inner = self.inner.write();
        let mut ledger = SpanUsageLedger::new();
        ledger.register_trace(trace_id, spans.iter().map(|s| s.span_id.as_str()));
        let index = SpanIndex::build(spans, reduced_hash_of);
        inner.traces.insert(
            trace_id.to_string(),
            TraceState {
                index,
                ledger,
                inbound_spans: Vec::new(),
            },
        );
    }

    /// Append this trace's spans into the suite-wide pool (spec's priority
    /// 10-11 fallback), keyed separately so trace-local cleanup never
    /// touches it.
    pub fn add_to_suite_index<F>(&self, spans: Vec<Span>, reduced_hash_of: F)
    where
        F: Fn(&Span) -> Option<String>,
    {
        let mut inner = self.inner.write();
        let merged = SpanIndex::build(spans, &reduced_hash_of);
        for (package, mut arcs) in merged.by_package {
            inner.suite_index.by_package.entry(package).or_default().append(&mut arcs);
        }
        for (hash, mut arcs) in merged.by_value_hash {
            inner.suite_index.by_value_hash.entry(hash).or_default().append(&mut arcs);
        }
        for (hash, mut arcs) in merged.by_reduced_value_hash {
            inner.suite_index.by_reduced_value_hash.entry(hash).or_default().append(&mut arcs);
        }
    }

    pub fn cleanup_trace_spans(&self, trace_id: &str) {
        let mut inner = self.inner.write();
        inner.traces.remove(trace_id);
    }

    pub fn set_current_test_id(&self, test_id: Option<String>) {
        self.inner.write().current_test_id = test_id;
    }

    pub fn current_test_id(&self) -> Option<String> {
        self.inner.read().current_test_id.clone()
    }

    pub fn set_sdk_version(&self, version: String) {
        self.inner.write().sdk_version = Some(version);
    }

    pub fn record_match_event(&self, event: MatchEvent) {
        self.inner.write().match_events.push(event);
    }

    pub fn record_mock_not_found(&self, event: MockNotFoundEvent) {
        self.inner.write().mock_not_found_events.push(event);
    }

    pub fn stash_inbound_span(&self, trace_id: &str, span: Value) {
        let mut inner = self.inner.write();
        inner.traces.entry(trace_id.to_string()).or_default().inbound_spans.push(span);
    }

    pub fn match_events(&self) -> Vec<MatchEvent> {
        self.inner.read().match_events.clone()
    }

    pub fn mock_not_found_events(&self) -> Vec<MockNotFoundEvent> {
        self.inner.read().mock_not_found_events.clone()
    }

    /// Snapshot the trace-local candidate slice for one package, whether the
    /// span is used, and a closure to mark a span used — without holding the
    /// lock across the caller's scoring work.
    pub fn candidates_for_trace(&self, trace_id: &str, package_name: &str) -> Vec<Arc<Span>> {
        let inner = self.inner.read();
        inner
            .traces
            .get(trace_id)
            .map(|t| t.index.candidates_for_package(package_name).to_vec())
            .unwrap_or_default()
    }

    pub fn candidates_suite_wide(&self, package_name: &str) -> Vec<Arc<Span>> {
        self.inner.read().suite_index.candidates_for_package(package_name).to_vec()
    }

    pub fn is_used(&self, trace_id: &str, span_id: &str) -> bool {
        self.inner
            .read()
            .traces
            .get(trace_id)
            .map(|t| t.ledger.is_used(trace_id, span_id))
            .unwrap_or(false)
    }

    pub fn mark_used(&self, trace_id: &str, span_id: &str) {
        if let Some(trace) = self.inner.write().traces.get_mut(trace_id) {
            trace.ledger.mark_used(trace_id, span_id);
        }
    }

    pub fn reduced_value_hash_in_trace(&self, trace_id: &str, target_hash: &str) -> Option<Vec<Arc<Span>>> {
        let inner = self.inner.read();
        inner
            .traces
            .get(trace_id)
            .map(|t| t.index.by_reduced_value_hash.get(target_hash).cloned().unwrap_or_default())
    }

    pub fn mark_sdk_connected(&self) {
        // `send` is a no-op-equivalent idempotent set: later handshakes on an
        // already-connected server are rejected upstream before reaching here.
        let _ = self.sdk_connected_tx.send(true);
    }

    pub fn is_sdk_connected(&self) -> bool {
        *self.sdk_connected_tx.subscribe().borrow()
    }

    pub async fn wait_for_sdk_connection(&self, timeout: std::time::Duration) -> Result<(), SdkConnectWaitError> {
        let mut rx = self.sdk_connected_tx.subscribe();
        if *rx.borrow() {
            return Ok(());
        }
        let wait = async {
            loop {
                if rx.changed().await.is_err() {
                    return Err(SdkConnectWaitError::Cancelled);
                }
                if *rx.borrow() {
                    return Ok(());
                }
            }
        };
        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(SdkConnectWaitError::Timeout),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SdkConnectWaitError {
    #[error("timed out waiting for SDK connection")]
    Timeout,
    #[error("server shut down before the SDK connected")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_for_sdk_connection_times_out() {
        let state = ServerState::new();
        let result = state.wait_for_sdk_connection(std::time::Duration::from_millis(20)).await;
        assert!(matches!(result, Err(SdkConnectWaitError::Timeout)));
    }

    #[tokio::test]
    async fn wait_for_sdk_connection_resolves_on_mark() {
        let state = Arc::new(ServerState::new());
        let waiter_state = state.clone();
        let waiter = tokio::spawn(async move { waiter_state.wait_for_sdk_connection(std::time::Duration::from_secs(5)).await });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        state.mark_sdk_connected();
        assert!(waiter.await.unwrap().is_ok());
    }

    #[test]
    fn current_test_id_round_trips() {
        let state = ServerState::new();
        assert!(state.current_test_id().is_none());
        state.set_current_test_id(Some("t1".to_string()));
        assert_eq!(state.current_test_id().as_deref(), Some("t1"));
    }
}
