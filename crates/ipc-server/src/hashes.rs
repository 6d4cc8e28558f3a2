//! Reduced-hash helpers bridging the schema reducer (component C1) to the
//! span index and match ladder, which only see hashes and closures.

use replay_common::{deterministic_hash, reduce_schema, reduce_value, Schema, Value};
use replay_trace_model::Span;

pub fn reduced_value_hash(value: &Value, schema: &Schema) -> Option<String> {
    let reduced = reduce_value(value, schema);
    if &reduced == value {
        None
    } else {
        Some(deterministic_hash(&reduced))
    }
}

pub fn reduced_schema_hash(schema: &Schema) -> Option<String> {
    let reduced = reduce_schema(schema);
    let reduced_json = serde_json::to_value(&reduced).ok()?;
    let original_json = serde_json::to_value(schema).ok()?;
    if reduced_json == original_json {
        None
    } else {
        Some(deterministic_hash(&reduced_json))
    }
}

pub fn reduced_value_hash_of(span: &Span) -> Option<String> {
    reduced_value_hash(&span.input_value, &span.input_schema)
}

pub fn reduced_schema_hash_of(span: &Span) -> Option<String> {
    reduced_schema_hash(&span.input_schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use replay_common::Schema;
    use replay_trace_model::SpanKind;
    use serde_json::json;
    use std::collections::{BTreeMap, HashMap};

    fn span_with_schema(schema: Schema, value: replay_common::Value) -> Span {
        Span {
            trace_id: "t".to_string(),
            span_id: "s".to_string(),
            package_name: "pg".to_string(),
            submodule_name: None,
            kind: SpanKind::Client,
            is_root_span: false,
            is_pre_app_start: false,
            timestamp: Utc::now(),
            duration_ms: None,
            input_value: value,
            input_schema: schema,
            input_value_hash: String::new(),
            input_schema_hash: String::new(),
            output_value: replay_common::Value::Null,
            output_schema: Schema::default(),
            status: None,
            metadata: HashMap::new(),
            environment: None,
        }
    }

    #[test]
    fn no_reduction_yields_none() {
        let span = span_with_schema(Schema::default(), json!({"a": 1}));
        assert!(reduced_value_hash_of(&span).is_none());
        assert!(reduced_schema_hash_of(&span).is_none());
    }

    #[test]
    fn zero_importance_field_yields_some_reduced_hash() {
        let schema = Schema {
            type_: "object".into(),
            properties: Some(BTreeMap::from([(
                "secret".to_string(),
                Schema {
                    type_: "string".into(),
                    match_importance: Some(0.0),
                    ..Default::default()
                },
            )])),
            ..Default::default()
        };
        let span = span_with_schema(schema, json!({"secret": "x"}));
        assert!(reduced_value_hash_of(&span).is_some());
        assert!(reduced_schema_hash_of(&span).is_some());
    }
}
