//! Span indexes built at load time.
//!
//! The same `Span` values are referenced from multiple index slices, hence
//! `Arc<Span>` rather than cloning: avoids aliasing issues while still
//! letting each slice be mutated independently of the others.

use crate::span::Span;
use replay_common::deterministic_hash;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct SpanIndex {
    pub by_package: HashMap<String, Vec<Arc<Span>>>,
    pub by_value_hash: HashMap<String, Vec<Arc<Span>>>,
    pub by_reduced_value_hash: HashMap<String, Vec<Arc<Span>>>,
}

impl SpanIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build (or extend) the index from a set of spans, assumed to belong to
    /// one index scope (one trace, or the suite-wide pool).
    ///
    /// `reduced_hash_of` lets callers compute `reducedInputValueHash` using
    /// the matching schema (component C1); spans without a computable
    /// reduced hash are only indexed by package and raw value hash.
    pub fn build<F>(spans: Vec<Span>, reduced_hash_of: F) -> Self
    where
        F: Fn(&Span) -> Option<String>,
    {
        let mut index = Self::new();
        let mut ordered = spans;
        ordered.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.span_id.cmp(&b.span_id)));

        for span in ordered {
            let reduced_hash = reduced_hash_of(&span);
            let arc = Arc::new(span);
            index
                .by_package
                .entry(arc.package_name.clone())
                .or_default()
                .push(arc.clone());
            index
                .by_value_hash
                .entry(arc.input_value_hash.clone())
                .or_default()
                .push(arc.clone());
            if let Some(reduced_hash) = reduced_hash {
                index.by_reduced_value_hash.entry(reduced_hash).or_default().push(arc);
            }
        }
        index
    }

    pub fn candidates_for_package(&self, package_name: &str) -> &[Arc<Span>] {
        self.by_package
            .get(package_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.by_package.is_empty()
    }
}

/// Trivial reduced-hash helper for callers that have already reduced the
/// value themselves (kept here so `deterministic_hash` doesn't need to be
/// re-imported at every call site).
pub fn hash_reduced(reduced_value: &replay_common::Value) -> String {
    deterministic_hash(reduced_value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::SpanKind;
    use chrono::{TimeZone, Utc};
    use replay_common::Schema;
    use serde_json::json;
    use std::collections::HashMap;

    fn span(id: &str, ts_secs: i64) -> Span {
        Span {
            trace_id: "t1".to_string(),
            span_id: id.to_string(),
            package_name: "pg".to_string(),
            submodule_name: None,
            kind: SpanKind::Client,
            is_root_span: false,
            is_pre_app_start: false,
            timestamp: Utc.timestamp_opt(ts_secs, 0).unwrap(),
            duration_ms: None,
            input_value: json!({"q": "select 1"}),
            input_schema: Schema::default(),
            input_value_hash: "h".to_string(),
            input_schema_hash: "sh".to_string(),
            output_value: Value::Null,
            output_schema: Schema::default(),
            status: None,
            metadata: HashMap::new(),
            environment: None,
        }
    }

    use replay_common::Value;

    #[test]
    fn index_is_timestamp_ascending() {
        let spans = vec![span("later", 2000), span("earlier", 1000)];
        let index = SpanIndex::build(spans, |_| None);
        let candidates = index.candidates_for_package("pg");
        assert_eq!(candidates[0].span_id, "earlier");
        assert_eq!(candidates[1].span_id, "later");
    }

    #[test]
    fn index_groups_by_value_hash() {
        let spans = vec![span("a", 1), span("b", 2)];
        let index = SpanIndex::build(spans, |_| None);
        assert_eq!(index.by_value_hash.get("h").unwrap().len(), 2);
    }
}
