//! Recognized configuration options plus loading helpers.
//!
//! Mirrors `substrate-broker`'s `Policy::from_yaml`/`to_yaml` pattern: plain
//! `serde`-derived structs with `Default` impls, loadable from YAML (or
//! TOML, for callers that prefer it).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config as YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("failed to parse config as TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessConfig {
    pub command: Option<String>,
    #[serde(default = "default_readiness_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_readiness_interval_secs")]
    pub interval_secs: u64,
}

fn default_readiness_timeout_secs() -> u64 {
    10
}
fn default_readiness_interval_secs() -> u64 {
    2
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            command: None,
            timeout_secs: default_readiness_timeout_secs(),
            interval_secs: default_readiness_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CommunicationType {
    #[default]
    Auto,
    Unix,
    Tcp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunicationConfig {
    #[serde(rename = "type", default)]
    pub kind: CommunicationType,
    #[serde(default)]
    pub tcp_port: Option<u16>,
}

impl Default for CommunicationConfig {
    fn default() -> Self {
        Self {
            kind: CommunicationType::Auto,
            tcp_port: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub id: String,
    pub port: u16,
    pub start_command: String,
    #[serde(default)]
    pub stop_command: Option<String>,
    #[serde(default)]
    pub readiness: ReadinessConfig,
    #[serde(default)]
    pub communication: CommunicationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ComparisonConfig {
    #[serde(default)]
    pub ignore_fields: Vec<String>,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    #[serde(default)]
    pub ignore_uuids: Option<bool>,
    #[serde(default)]
    pub ignore_timestamps: Option<bool>,
    #[serde(default)]
    pub ignore_dates: Option<bool>,
    #[serde(default)]
    pub ignore_jwt_fields: Option<bool>,
}

fn default_parallel() -> usize {
    5
}
fn default_test_timeout_secs() -> u64 {
    30
}
fn default_mock_search_timeout_secs() -> u64 {
    15
}
fn default_sdk_connect_wait_secs() -> u64 {
    10
}
fn default_max_server_restart_attempts() -> u32 {
    1
}
fn default_backoff_base_secs() -> u64 {
    2
}
fn default_backoff_cap_exponent() -> u32 {
    10
}

/// Executor-level knobs, deliberately distinct
/// from `ServiceConfig`/`ComparisonConfig` since they govern how the batch
/// runner behaves rather than what it runs against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_parallel")]
    pub parallel: usize,
    #[serde(default = "default_test_timeout_secs")]
    pub test_timeout_secs: u64,
    #[serde(default = "default_mock_search_timeout_secs")]
    pub mock_search_timeout_secs: u64,
    #[serde(default = "default_sdk_connect_wait_secs")]
    pub sdk_connect_wait_secs: u64,
    #[serde(default = "default_max_server_restart_attempts")]
    pub max_server_restart_attempts: u32,
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,
    #[serde(default = "default_backoff_cap_exponent")]
    pub backoff_cap_exponent: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            parallel: default_parallel(),
            test_timeout_secs: default_test_timeout_secs(),
            mock_search_timeout_secs: default_mock_search_timeout_secs(),
            sdk_connect_wait_secs: default_sdk_connect_wait_secs(),
            max_server_restart_attempts: default_max_server_restart_attempts(),
            backoff_base_secs: default_backoff_base_secs(),
            backoff_cap_exponent: default_backoff_cap_exponent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub service: ServiceConfig,
    #[serde(default)]
    pub comparison: ComparisonConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    /// Arbitrary extra metadata an external CLI layer may have attached;
    /// preserved but not interpreted here.
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl RunnerConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Dispatches on file extension (`.toml` vs anything else treated as YAML).
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            _ => Self::from_yaml_str(&content),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_service_config() {
        let yaml = r#"
service:
  id: "checkout-api"
  port: 4000
  start_command: "node server.js"
"#;
        let config = RunnerConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.service.id, "checkout-api");
        assert_eq!(config.service.readiness.timeout_secs, 10);
        assert_eq!(config.service.readiness.interval_secs, 2);
        assert_eq!(config.service.communication.kind, CommunicationType::Auto);
    }

    #[test]
    fn parses_full_comparison_block() {
        let yaml = r#"
service:
  id: "svc"
  port: 4000
  start_command: "node server.js"
comparison:
  ignore_fields: ["traceId"]
  ignore_patterns: ["^debug-.*$"]
  ignore_uuids: false
"#;
        let config = RunnerConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.comparison.ignore_fields, vec!["traceId".to_string()]);
        assert_eq!(config.comparison.ignore_uuids, Some(false));
    }

    #[test]
    fn executor_defaults_match_named_values() {
        let yaml = r#"
service:
  id: "svc"
  port: 4000
  start_command: "node server.js"
"#;
        let config = RunnerConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.executor.parallel, 5);
        assert_eq!(config.executor.test_timeout_secs, 30);
        assert_eq!(config.executor.mock_search_timeout_secs, 15);
        assert_eq!(config.executor.sdk_connect_wait_secs, 10);
        assert_eq!(config.executor.max_server_restart_attempts, 1);
        assert_eq!(config.executor.backoff_base_secs, 2);
        assert_eq!(config.executor.backoff_cap_exponent, 10);
    }

    #[test]
    fn parses_toml_with_executor_overrides() {
        let toml = r#"
[service]
id = "svc"
port = 4000
start_command = "node server.js"

[executor]
parallel = 8
test_timeout_secs = 45
"#;
        let config = RunnerConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.executor.parallel, 8);
        assert_eq!(config.executor.test_timeout_secs, 45);
        assert_eq!(config.executor.mock_search_timeout_secs, 15);
    }
}
