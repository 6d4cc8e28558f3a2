//! Recorded span and trace types.

use chrono::{DateTime, Utc};
use replay_common::{Schema, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpanKind {
    Server,
    Client,
    Internal,
    Producer,
    Consumer,
}

/// A single recorded event: one inbound or outbound call.
///
/// Spans are immutable post-load; usage tracking lives in a separate
/// per-trace ledger (see `ledger.rs`) rather than a `used` flag on the span
/// itself, since the same `Span` value is shared across multiple index
/// slices (package-name index, value-hash index, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    pub trace_id: String,
    pub span_id: String,
    pub package_name: String,
    pub submodule_name: Option<String>,
    pub kind: SpanKind,
    pub is_root_span: bool,
    pub is_pre_app_start: bool,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: Option<u64>,
    pub input_value: Value,
    pub input_schema: Schema,
    pub input_value_hash: String,
    pub input_schema_hash: String,
    pub output_value: Value,
    pub output_schema: Schema,
    pub status: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    pub environment: Option<String>,
}

impl Span {
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    pub fn has_env_vars_metadata(&self) -> bool {
        self.metadata.contains_key("ENV_VARS")
    }
}

/// The full set of spans sharing one `trace_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    pub trace_id: String,
    pub spans: Vec<Span>,
}

impl Trace {
    pub fn from_spans(trace_id: impl Into<String>, spans: Vec<Span>) -> Self {
        Self {
            trace_id: trace_id.into(),
            spans,
        }
    }

    pub fn root_span(&self) -> Option<&Span> {
        self.spans
            .iter()
            .find(|s| s.is_root_span && s.kind == SpanKind::Server)
    }

    pub fn client_spans(&self) -> impl Iterator<Item = &Span> {
        self.spans.iter().filter(|s| s.kind == SpanKind::Client)
    }
}

/// A trace plus the server-assigned id used when reporting results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceTest {
    pub trace_test_id: String,
    pub trace: Trace,
}

/// Derived runtime projection of a trace's root SERVER span: the inbound
/// request to replay and the response expected back.
#[derive(Debug, Clone)]
pub struct Test {
    pub trace_test_id: String,
    pub method: String,
    /// Path including query string, verbatim as recorded.
    pub path: String,
    pub headers: HashMap<String, String>,
    pub request_body: Option<Vec<u8>>,
    pub expected_status: i64,
    pub expected_headers: HashMap<String, String>,
    pub expected_body: Value,
    pub display_name: Option<String>,
    pub metadata: HashMap<String, Value>,
    pub spans: Vec<Span>,
}

impl Test {
    /// Derive a runtime `Test` from a trace's root SERVER span.
    ///
    /// `decode_request`/`decode_response` let callers plug in the body codec
    /// (component C4) without this crate depending on it directly.
    pub fn from_trace<F>(trace_test: &TraceTest, decode_body: F) -> anyhow::Result<Test>
    where
        F: Fn(&Value, &Schema) -> anyhow::Result<(Vec<u8>, Value)>,
    {
        let root = trace_test
            .trace
            .root_span()
            .ok_or_else(|| anyhow::anyhow!("trace {} has no root SERVER span", trace_test.trace.trace_id))?;

        let method = root
            .input_value
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("GET")
            .to_string();
        let path = root
            .input_value
            .get("path")
            .and_then(Value::as_str)
            .unwrap_or("/")
            .to_string();
        let headers = extract_string_map(root.input_value.get("headers"));
        let expected_headers = extract_string_map(root.output_value.get("headers"));

        let body_value = root.input_value.get("body").cloned().unwrap_or(Value::Null);
        let request_body = if body_value.is_null() {
            None
        } else {
            let (bytes, _) = decode_body(&body_value, &root.input_schema)?;
            Some(bytes)
        };

        let expected_status = root
            .output_value
            .get("status")
            .and_then(Value::as_i64)
            .or(root.status)
            .unwrap_or(0);
        let expected_body_value = root.output_value.get("body").cloned().unwrap_or(Value::Null);
        let (_, expected_body) = if expected_body_value.is_null() {
            (Vec::new(), Value::Null)
        } else {
            decode_body(&expected_body_value, &root.output_schema)?
        };

        Ok(Test {
            trace_test_id: trace_test.trace_test_id.clone(),
            method,
            path,
            headers,
            request_body,
            expected_status,
            expected_headers,
            expected_body,
            display_name: root.submodule_name.clone(),
            metadata: root.metadata.clone(),
            spans: trace_test.trace.spans.clone(),
        })
    }
}

fn extract_string_map(value: Option<&Value>) -> HashMap<String, String> {
    let mut out = HashMap::new();
    if let Some(Value::Object(map)) = value {
        for (k, v) in map {
            if let Some(s) = v.as_str() {
                out.insert(k.clone(), s.to_string());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_span(trace_id: &str, span_id: &str, kind: SpanKind, is_root: bool) -> Span {
        Span {
            trace_id: trace_id.to_string(),
            span_id: span_id.to_string(),
            package_name: "http".to_string(),
            submodule_name: Some("GET".to_string()),
            kind,
            is_root_span: is_root,
            is_pre_app_start: false,
            timestamp: Utc::now(),
            duration_ms: Some(5),
            input_value: json!({"method": "GET", "path": "/users/1", "headers": {"accept": "application/json"}}),
            input_schema: Schema::default(),
            input_value_hash: "h1".to_string(),
            input_schema_hash: "sh1".to_string(),
            output_value: json!({"status": 200, "headers": {}, "body": {"ok": true}}),
            output_schema: Schema::default(),
            status: Some(200),
            metadata: HashMap::new(),
            environment: None,
        }
    }

    #[test]
    fn trace_finds_root_server_span() {
        let root = make_span("t1", "s1", SpanKind::Server, true);
        let client = make_span("t1", "s2", SpanKind::Client, false);
        let trace = Trace::from_spans("t1", vec![root, client]);
        assert_eq!(trace.root_span().unwrap().span_id, "s1");
        assert_eq!(trace.client_spans().count(), 1);
    }

    #[test]
    fn test_projection_derives_from_root_span() {
        let root = make_span("t1", "s1", SpanKind::Server, true);
        let trace_test = TraceTest {
            trace_test_id: "tt-1".to_string(),
            trace: Trace::from_spans("t1", vec![root]),
        };
        let test = Test::from_trace(&trace_test, |v, _s| Ok((v.to_string().into_bytes(), v.clone())))
            .unwrap();
        assert_eq!(test.method, "GET");
        assert_eq!(test.path, "/users/1");
        assert_eq!(test.expected_status, 200);
    }
}
