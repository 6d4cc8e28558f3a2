//! Outbound mock request shape.

use replay_common::{Schema, Value};

/// An outbound call the SUT is about to make, as reported by the in-process
/// instrumentation.
#[derive(Debug, Clone)]
pub struct MatchRequest {
    pub package_name: String,
    pub input_value: Value,
    pub input_schema: Schema,
    pub input_value_hash: String,
    pub input_schema_hash: String,
    /// Schema hash computed over the match-importance-reduced schema.
    /// `None` when the schema has no zero-importance fields to drop, in
    /// which case it's identical to `input_schema_hash` and priority 8
    /// degenerates to a repeat of priority 5/6.
    pub input_reduced_schema_hash: Option<String>,
    pub operation: Option<String>,
}
