//! Response comparator (component C3).

use replay_common::Value;
use replay_dynamic_match::{should_ignore, DynamicMatchConfig};
use replay_trace_model::Deviation;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct ExpectedResponse {
    pub status: i64,
    pub headers: HashMap<String, String>,
    pub body: Value,
}

#[derive(Debug, Clone)]
pub struct ActualResponse {
    pub status: i64,
    pub headers: HashMap<String, String>,
    pub body: Value,
}

#[derive(Debug, Clone, Default)]
pub struct ComparisonResult {
    pub deviations: Vec<Deviation>,
}

impl ComparisonResult {
    pub fn passed(&self) -> bool {
        self.deviations.is_empty()
    }
}

/// Compare `actual` against `expected`: status (strict equality), headers
/// (case-insensitive key lookup, case-preserving in the deviation field
/// path), then body. Deviations accumulate; nothing short-circuits.
pub fn compare_response(
    expected: &ExpectedResponse,
    actual: &ActualResponse,
    config: &DynamicMatchConfig,
) -> ComparisonResult {
    let mut deviations = Vec::new();

    if expected.status != actual.status {
        deviations.push(Deviation {
            field_path: "response.status".to_string(),
            expected: Value::from(expected.status),
            actual: Value::from(actual.status),
            description: format!("expected status {} but got {}", expected.status, actual.status),
        });
    }

    for (key, expected_value) in &expected.headers {
        match find_header_case_insensitive(&actual.headers, key) {
            Some(actual_value) if actual_value == expected_value => {}
            Some(actual_value) => deviations.push(Deviation {
                field_path: format!("response.headers.{}", key.to_ascii_lowercase()),
                expected: Value::String(expected_value.clone()),
                actual: Value::String(actual_value.clone()),
                description: format!("header '{key}' mismatch"),
            }),
            None => deviations.push(Deviation {
                field_path: format!("response.headers.{}", key.to_ascii_lowercase()),
                expected: Value::String(expected_value.clone()),
                actual: Value::Null,
                description: format!("header '{key}' missing from actual response"),
            }),
        }
    }

    diff_body(
        "response.body",
        &expected.body,
        &actual.body,
        config,
        &mut deviations,
    );

    ComparisonResult { deviations }
}

fn find_header_case_insensitive<'a>(headers: &'a HashMap<String, String>, key: &str) -> Option<&'a String> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
}

/// Body diff algorithm.
fn diff_body(
    path: &str,
    expected: &Value,
    actual: &Value,
    config: &DynamicMatchConfig,
    deviations: &mut Vec<Deviation>,
) {
    use replay_common::{kind_of, ValueKind};

    if kind_of(expected) != kind_of(actual) {
        deviations.push(Deviation {
            field_path: path.to_string(),
            expected: expected.clone(),
            actual: actual.clone(),
            description: "type mismatch".to_string(),
        });
        return;
    }

    match (expected, actual) {
        (Value::Object(expected_map), Value::Object(actual_map)) => {
            for (key, expected_value) in expected_map {
                let child_path = format!("{path}.{key}");
                match actual_map.get(key) {
                    Some(actual_value) => diff_body(&child_path, expected_value, actual_value, config, deviations),
                    None => deviations.push(Deviation {
                        field_path: child_path,
                        expected: expected_value.clone(),
                        actual: Value::Null,
                        description: format!("missing expected key '{key}'"),
                    }),
                }
            }
            for (key, actual_value) in actual_map {
                if expected_map.contains_key(key) {
                    continue;
                }
                if config.is_ignored_field_name(key) {
                    continue;
                }
                deviations.push(Deviation {
                    field_path: format!("{path}.{key}"),
                    expected: Value::Null,
                    actual: actual_value.clone(),
                    description: format!("unexpected extra key '{key}'"),
                });
            }
        }
        (Value::Array(expected_items), Value::Array(actual_items)) => {
            if expected_items.len() != actual_items.len() {
                deviations.push(Deviation {
                    field_path: path.to_string(),
                    expected: expected.clone(),
                    actual: actual.clone(),
                    description: format!(
                        "array length mismatch: expected {} got {}",
                        expected_items.len(),
                        actual_items.len()
                    ),
                });
                return;
            }
            for (i, (expected_item, actual_item)) in expected_items.iter().zip(actual_items.iter()).enumerate() {
                diff_body(&format!("{path}[{i}]"), expected_item, actual_item, config, deviations);
            }
        }
        _ => {
            let field_name = path.rsplit('.').next().unwrap_or(path);
            if expected != actual && !should_ignore(config, field_name, expected, actual) {
                deviations.push(Deviation {
                    field_path: path.to_string(),
                    expected: expected.clone(),
                    actual: actual.clone(),
                    description: "value mismatch".to_string(),
                });
            }
        }
    }
}
