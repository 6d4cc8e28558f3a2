//! Result and deviation types.

use crate::events::MatchLevel;
use replay_common::Value;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deviation {
    pub field_path: String,
    pub expected: Value,
    pub actual: Value,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub test_id: String,
    pub passed: bool,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub crashed_server: bool,
    #[serde(default)]
    pub retried_after_crash: bool,
    pub duration_ms: u64,
    #[serde(default)]
    pub deviations: Vec<Deviation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TestResult {
    pub fn passed(test_id: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            test_id: test_id.into(),
            passed: true,
            cancelled: false,
            crashed_server: false,
            retried_after_crash: false,
            duration_ms,
            deviations: Vec::new(),
            error: None,
        }
    }

    pub fn cancelled(test_id: impl Into<String>) -> Self {
        Self {
            test_id: test_id.into(),
            passed: false,
            cancelled: true,
            crashed_server: false,
            retried_after_crash: false,
            duration_ms: 0,
            deviations: Vec::new(),
            error: None,
        }
    }

    pub fn errored(test_id: impl Into<String>, duration_ms: u64, error: impl Into<String>) -> Self {
        Self {
            test_id: test_id.into(),
            passed: false,
            cancelled: false,
            crashed_server: false,
            retried_after_crash: false,
            duration_ms,
            deviations: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Per-test failure-reason classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestFailureReason {
    NoResponse,
    ResponseMismatch,
    MockNotFound,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_span_recording_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_level: Option<MatchLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replay_span: Option<replay_common::Value>,
    #[serde(default)]
    pub deviations: Vec<Deviation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceTestReport {
    pub trace_test_id: String,
    pub test_success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_failure_reason: Option<TestFailureReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_failure_message: Option<String>,
    #[serde(default)]
    pub span_results: Vec<SpanResult>,
}

/// Apply the precedence rule: any `MockNotFoundEvent` for the
/// trace wins, then a non-empty transport `error`, then any deviations.
pub fn classify_failure(
    had_mock_not_found: bool,
    error: Option<&str>,
    deviations: &[Deviation],
) -> Option<(TestFailureReason, Option<String>)> {
    if had_mock_not_found {
        return Some((TestFailureReason::MockNotFound, None));
    }
    if let Some(err) = error {
        if !err.is_empty() {
            return Some((TestFailureReason::NoResponse, Some(err.to_string())));
        }
    }
    if !deviations.is_empty() {
        return Some((TestFailureReason::ResponseMismatch, None));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_not_found_takes_precedence_over_error() {
        let (reason, _) = classify_failure(true, Some("connection refused"), &[]).unwrap();
        assert_eq!(reason, TestFailureReason::MockNotFound);
    }

    #[test]
    fn error_takes_precedence_over_deviations() {
        let dev = Deviation {
            field_path: "response.status".to_string(),
            expected: Value::from(200),
            actual: Value::from(500),
            description: "status mismatch".to_string(),
        };
        let (reason, msg) = classify_failure(false, Some("timeout"), &[dev]).unwrap();
        assert_eq!(reason, TestFailureReason::NoResponse);
        assert_eq!(msg.unwrap(), "timeout");
    }

    #[test]
    fn deviations_alone_classify_as_mismatch() {
        let dev = Deviation {
            field_path: "response.status".to_string(),
            expected: Value::from(200),
            actual: Value::from(500),
            description: "status mismatch".to_string(),
        };
        let (reason, _) = classify_failure(false, None, &[dev]).unwrap();
        assert_eq!(reason, TestFailureReason::ResponseMismatch);
    }

    #[test]
    fn no_failures_classifies_as_none() {
        assert!(classify_failure(false, None, &[]).is_none());
    }
}
