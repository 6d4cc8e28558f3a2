//! Structured log field names, shared so every crate's `tracing` events use
//! the same vocabulary. Mirrors `substrate_common::log_schema`.

pub const TRACE_ID: &str = "trace_id";
pub const SPAN_ID: &str = "span_id";
pub const TEST_ID: &str = "test_id";
pub const PACKAGE_NAME: &str = "package_name";
pub const MATCH_TYPE: &str = "match_type";
pub const DURATION_MS: &str = "duration_ms";
pub const ENVIRONMENT: &str = "environment";
