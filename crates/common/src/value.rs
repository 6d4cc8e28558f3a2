//! Dynamic value type for recorded span payloads.
//!
//! Recorded inputs/outputs arrive as untyped trees. Rather than reify them
//! into language-native structs we dispatch on a tagged sum, same as every
//! recorded-span shape in this workspace already does via `serde_json`.

/// A recorded value: `Null | Bool | Number | String | Array | Object`.
pub type Value = serde_json::Value;

/// Type tag used by the body diff algorithm and similarity scoring to decide
/// whether two values are even comparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

pub fn kind_of(value: &Value) -> ValueKind {
    match value {
        Value::Null => ValueKind::Null,
        Value::Bool(_) => ValueKind::Bool,
        Value::Number(_) => ValueKind::Number,
        Value::String(_) => ValueKind::String,
        Value::Array(_) => ValueKind::Array,
        Value::Object(_) => ValueKind::Object,
    }
}

/// Render a value the way a diff/log message should: strings unquoted,
/// everything else as compact JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
