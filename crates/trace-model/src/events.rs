//! Match reporting types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MatchType {
    ExactValueHash,
    ReducedValueHash,
    SchemaHash,
    ReducedSchemaHash,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MatchScope {
    TraceLocal,
    SuiteGlobal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerUp {
    pub span_id: String,
    pub score: f64,
}

/// Structured description of how a mock was matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchLevel {
    pub match_type: MatchType,
    pub match_scope: MatchScope,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub top_candidates: Vec<RunnerUp>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchEvent {
    pub trace_id: String,
    pub matched_span_id: String,
    pub match_level: MatchLevel,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockNotFoundEvent {
    pub trace_id: String,
    pub package_name: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}
