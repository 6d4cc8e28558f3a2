//! Suite-span loader: aggregates pre-app-start, global, and per-test spans
//! into the matcher's suite-wide pool, deduping by `(traceId, spanId)` and
//! preserving first occurrence.
//!
//! `SuiteSpanSource` is the seam for cloud-backed or file-backed span
//! sources; `JsonlSpanSource` is the one in-tree adapter, reading the same
//! newline-delimited JSON framing `substrate-replay`'s trace loader uses.

use anyhow::Context;
use async_trait::async_trait;
use replay_trace_model::Span;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Abstract source of the three span categories the suite pool is built
/// from. A cloud-backed implementation (fetch by run id) lives outside
/// this crate; this trait is the seam it plugs into.
#[async_trait]
pub trait SuiteSpanSource: Send + Sync {
    async fn pre_app_start_spans(&self) -> anyhow::Result<Vec<Span>>;
    async fn global_spans(&self) -> anyhow::Result<Vec<Span>>;
    async fn spans_for_selected_tests(&self) -> anyhow::Result<Vec<Span>>;
}

#[derive(Debug, Clone, Default)]
pub struct SuiteLoadReport {
    pub unique_traces: usize,
    pub pre_app_start_count: usize,
}

/// Aggregates `source`'s three span categories in priority order
/// (pre-app-start first, so they're considered first at equal priority,
/// then global, then per-test), dedupes by `(traceId, spanId)` keeping the
/// first occurrence, and reports counts.
pub async fn load_suite_pool(source: &dyn SuiteSpanSource) -> anyhow::Result<(Vec<Span>, SuiteLoadReport)> {
    let pre_app_start = source.pre_app_start_spans().await?;
    let pre_app_start_count = pre_app_start.len();
    let global = source.global_spans().await?;
    let per_test = source.spans_for_selected_tests().await?;

    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut traces: HashSet<String> = HashSet::new();
    let mut pool = Vec::new();

    for span in pre_app_start.into_iter().chain(global).chain(per_test) {
        let key = (span.trace_id.clone(), span.span_id.clone());
        if seen.insert(key) {
            traces.insert(span.trace_id.clone());
            pool.push(span);
        }
    }

    let report = SuiteLoadReport {
        unique_traces: traces.len(),
        pre_app_start_count,
    };
    Ok((pool, report))
}

/// Newline-delimited JSON span records read from three on-disk files, one
/// per category, for tests and local (non-cloud) runs.
pub struct JsonlSpanSource {
    pre_app_start_path: PathBuf,
    global_path: PathBuf,
    per_test_path: PathBuf,
}

impl JsonlSpanSource {
    pub fn new(pre_app_start_path: impl Into<PathBuf>, global_path: impl Into<PathBuf>, per_test_path: impl Into<PathBuf>) -> Self {
        Self {
            pre_app_start_path: pre_app_start_path.into(),
            global_path: global_path.into(),
            per_test_path: per_test_path.into(),
        }
    }

    async fn read_jsonl(path: &Path) -> anyhow::Result<Vec<Span>> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read span file {}", path.display()))?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str::<Span>(line).with_context(|| format!("malformed span record in {}", path.display())))
            .collect()
    }
}

#[async_trait]
impl SuiteSpanSource for JsonlSpanSource {
    async fn pre_app_start_spans(&self) -> anyhow::Result<Vec<Span>> {
        Self::read_jsonl(&self.pre_app_start_path).await
    }

    async fn global_spans(&self) -> anyhow::Result<Vec<Span>> {
        Self::read_jsonl(&self.global_path).await
    }

    async fn spans_for_selected_tests(&self) -> anyhow::Result<Vec<Span>> {
        Self::read_jsonl(&self.per_test_path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use replay_common::{Schema, Value};
    use replay_trace_model::SpanKind;
    use std::collections::HashMap;

    fn span(trace_id: &str, span_id: &str) -> Span {
        Span {
            trace_id: trace_id.to_string(),
            span_id: span_id.to_string(),
            package_name: "http".to_string(),
            submodule_name: None,
            kind: SpanKind::Client,
            is_root_span: false,
            is_pre_app_start: false,
            timestamp: Utc::now(),
            duration_ms: None,
            input_value: Value::Null,
            input_schema: Schema::default(),
            input_value_hash: String::new(),
            input_schema_hash: String::new(),
            output_value: Value::Null,
            output_schema: Schema::default(),
            status: None,
            metadata: HashMap::new(),
            environment: None,
        }
    }

    struct FixedSource {
        pre_app_start: Vec<Span>,
        global: Vec<Span>,
        per_test: Vec<Span>,
    }

    #[async_trait]
    impl SuiteSpanSource for FixedSource {
        async fn pre_app_start_spans(&self) -> anyhow::Result<Vec<Span>> {
            Ok(self.pre_app_start.clone())
        }
        async fn global_spans(&self) -> anyhow::Result<Vec<Span>> {
            Ok(self.global.clone())
        }
        async fn spans_for_selected_tests(&self) -> anyhow::Result<Vec<Span>> {
            Ok(self.per_test.clone())
        }
    }

    #[tokio::test]
    async fn dedupes_by_trace_and_span_id_keeping_first_occurrence() {
        let source = FixedSource {
            pre_app_start: vec![span("t1", "s1")],
            global: vec![span("t1", "s1"), span("t1", "s2")],
            per_test: vec![span("t2", "s1")],
        };
        let (pool, report) = load_suite_pool(&source).await.unwrap();
        assert_eq!(pool.len(), 3);
        assert_eq!(report.unique_traces, 2);
        assert_eq!(report.pre_app_start_count, 1);
    }

    #[tokio::test]
    async fn jsonl_source_handles_missing_files_as_empty() {
        let source = JsonlSpanSource::new("/nonexistent/a.jsonl", "/nonexistent/b.jsonl", "/nonexistent/c.jsonl");
        let (pool, report) = load_suite_pool(&source).await.unwrap();
        assert!(pool.is_empty());
        assert_eq!(report.unique_traces, 0);
    }

    #[tokio::test]
    async fn jsonl_source_reads_newline_delimited_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pre_app_start.jsonl");
        let record = serde_json::to_string(&span("t1", "s1")).unwrap();
        tokio::fs::write(&path, format!("{record}\n")).await.unwrap();

        let source = JsonlSpanSource::new(&path, dir.path().join("missing.jsonl"), dir.path().join("missing2.jsonl"));
        let spans = source.pre_app_start_spans().await.unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].trace_id, "t1");
    }
}
