//! `shouldIgnore` ladder.

use crate::config::DynamicMatchConfig;
use crate::jwt::jwt_equivalent;
use crate::patterns::{is_date, is_timestamp, is_uuid};
use replay_common::{value::display_value, Value};

/// Decide whether a field-level difference between `expected` and `actual`
/// should be tolerated. Order matters: the first matching rule wins, and
/// identity (`expected == actual`) always short-circuits true before any
/// rule runs.
pub fn should_ignore(config: &DynamicMatchConfig, field_name: &str, expected: &Value, actual: &Value) -> bool {
    if expected == actual {
        return true;
    }

    if config.is_ignored_field_name(field_name) {
        return true;
    }

    let (Some(expected_str), Some(actual_str)) = (as_comparable_str(expected), as_comparable_str(actual)) else {
        return false;
    };

    if config.ignore_uuids && is_uuid(&expected_str) && is_uuid(&actual_str) {
        return true;
    }

    if config.ignore_timestamps && is_timestamp(&expected_str) && is_timestamp(&actual_str) {
        return true;
    }

    if config.ignore_dates && is_date(&expected_str) && is_date(&actual_str) {
        return true;
    }

    if config
        .custom_patterns()
        .iter()
        .any(|pattern| pattern.is_match(&expected_str) && pattern.is_match(&actual_str))
    {
        return true;
    }

    if config.ignore_jwt_fields && jwt_equivalent(config, &expected_str, &actual_str, should_ignore) {
        return true;
    }

    false
}

fn as_comparable_str(value: &Value) -> Option<String> {
    match value {
        Value::String(_) => Some(display_value(value)),
        _ => None,
    }
}
