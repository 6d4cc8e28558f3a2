//! Environment grouping: bucket tests by their recorded environment label,
//! resolve each bucket's env-var overrides from a `process.env`
//! pre-app-start span, and snapshot/restore the host process's environment
//! around each group's run.

use replay_common::Value;
use replay_trace_model::{EnvironmentGroup, Span, Test};
use std::collections::HashMap;

const DEFAULT_ENVIRONMENT: &str = "default";
const PROCESS_ENV_PACKAGE: &str = "process.env";

/// `group(tests, preAppStartSpans)`
pub fn group(tests: Vec<Test>, pre_app_start_spans: &[Span]) -> Vec<EnvironmentGroup> {
    let mut buckets: HashMap<String, Vec<Test>> = HashMap::new();
    for test in tests {
        let name = test
            .metadata
            .get("environment")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_ENVIRONMENT)
            .to_string();
        buckets.entry(name).or_default().push(test);
    }

    let mut groups: Vec<EnvironmentGroup> = buckets
        .into_iter()
        .map(|(name, tests)| {
            let source_span = latest_matching_env_span(pre_app_start_spans, &name);
            let env_vars = source_span
                .as_ref()
                .map(|span| env_vars_from_output(&span.output_value))
                .unwrap_or_default();
            EnvironmentGroup {
                name,
                tests,
                env_vars,
                source_span,
            }
        })
        .collect();
    groups.sort_by(|a, b| a.name.cmp(&b.name));
    groups
}

fn latest_matching_env_span(spans: &[Span], environment_name: &str) -> Option<Span> {
    spans
        .iter()
        .filter(|span| span.package_name == PROCESS_ENV_PACKAGE)
        .filter(|span| matches_environment(span, environment_name))
        .max_by_key(|span| span.timestamp)
        .cloned()
}

fn matches_environment(span: &Span, environment_name: &str) -> bool {
    match &span.environment {
        Some(label) => label == environment_name,
        None => environment_name == DEFAULT_ENVIRONMENT,
    }
}

fn env_vars_from_output(output_value: &Value) -> HashMap<String, String> {
    let mut out = HashMap::new();
    if let Some(Value::Object(map)) = output_value.get("ENV_VARS") {
        for (k, v) in map {
            if let Some(s) = v.as_str() {
                out.insert(k.clone(), s.to_string());
            }
        }
    }
    out
}

/// Snapshot of the host process environment for the keys a group overrides,
/// restored (and absent keys unset) when dropped or explicitly restored.
pub struct EnvSnapshot {
    previous: HashMap<String, Option<String>>,
}

impl EnvSnapshot {
    /// Captures current values for `keys`, then applies `overrides`.
    pub fn apply(overrides: &HashMap<String, String>) -> Self {
        let mut previous = HashMap::new();
        for key in overrides.keys() {
            previous.insert(key.clone(), std::env::var(key).ok());
        }
        for (key, value) in overrides {
            std::env::set_var(key, value);
        }
        Self { previous }
    }

    pub fn restore(self) {
        for (key, value) in self.previous {
            match value {
                Some(value) => std::env::set_var(&key, value),
                None => std::env::remove_var(&key),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use replay_common::Schema;
    use replay_trace_model::SpanKind;
    use serde_json::json;
    use std::collections::HashMap as Map;

    fn test_with_env(id: &str, environment: Option<&str>) -> Test {
        let mut metadata = Map::new();
        if let Some(env) = environment {
            metadata.insert("environment".to_string(), Value::String(env.to_string()));
        }
        Test {
            trace_test_id: id.to_string(),
            method: "GET".to_string(),
            path: "/x".to_string(),
            headers: Map::new(),
            request_body: None,
            expected_status: 200,
            expected_headers: Map::new(),
            expected_body: Value::Null,
            display_name: None,
            metadata,
            spans: Vec::new(),
        }
    }

    fn env_span(environment: Option<&str>, ts_secs: i64, vars: serde_json::Value) -> Span {
        Span {
            trace_id: "t1".to_string(),
            span_id: format!("env-{ts_secs}"),
            package_name: PROCESS_ENV_PACKAGE.to_string(),
            submodule_name: None,
            kind: SpanKind::Internal,
            is_root_span: false,
            is_pre_app_start: true,
            timestamp: Utc.timestamp_opt(ts_secs, 0).unwrap(),
            duration_ms: None,
            input_value: Value::Null,
            input_schema: Schema::default(),
            input_value_hash: String::new(),
            input_schema_hash: String::new(),
            output_value: json!({"ENV_VARS": vars}),
            output_schema: Schema::default(),
            status: None,
            metadata: Map::new(),
            environment: environment.map(str::to_string),
        }
    }

    #[test]
    fn buckets_by_metadata_environment_with_default_fallback() {
        let tests = vec![
            test_with_env("a", Some("staging")),
            test_with_env("b", None),
        ];
        let groups = group(tests, &[]);
        let names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["default", "staging"]);
    }

    #[test]
    fn picks_latest_matching_pre_app_start_span() {
        let tests = vec![test_with_env("a", Some("staging"))];
        let spans = vec![
            env_span(Some("staging"), 100, json!({"FOO": "old"})),
            env_span(Some("staging"), 200, json!({"FOO": "new"})),
            env_span(Some("prod"), 300, json!({"FOO": "wrong-bucket"})),
        ];
        let groups = group(tests, &spans);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].env_vars.get("FOO"), Some(&"new".to_string()));
    }

    #[test]
    fn snapshot_restores_previously_unset_keys() {
        std::env::remove_var("REPLAY_EXECUTOR_TEST_VAR");
        let mut overrides = Map::new();
        overrides.insert("REPLAY_EXECUTOR_TEST_VAR".to_string(), "1".to_string());
        let snapshot = EnvSnapshot::apply(&overrides);
        assert_eq!(std::env::var("REPLAY_EXECUTOR_TEST_VAR").unwrap(), "1");
        snapshot.restore();
        assert!(std::env::var("REPLAY_EXECUTOR_TEST_VAR").is_err());
    }
}
