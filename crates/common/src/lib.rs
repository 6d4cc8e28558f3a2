//! Shared value types, canonical hashing, schema reduction, configuration
//! and log field vocabulary used across the replay runner workspace.

pub mod config;
pub mod hash;
pub mod log_schema;
pub mod schema;
pub mod value;

pub use config::{
    ComparisonConfig, CommunicationConfig, CommunicationType, ConfigError, ExecutorConfig,
    ReadinessConfig, RunnerConfig, ServiceConfig,
};
pub use hash::deterministic_hash;
pub use schema::{reduce_schema, reduce_value, Schema};
pub use value::{kind_of, Value, ValueKind};
