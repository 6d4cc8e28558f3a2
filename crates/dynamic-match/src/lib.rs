//! Dynamic-field matcher (component C2): decides whether two differing leaf
//! values should be treated as equal during response comparison.

pub mod config;
pub mod jwt;
pub mod matcher;
pub mod patterns;

pub use config::{DynamicMatchConfig, DynamicMatchConfigBuilder};
pub use jwt::jwt_equivalent;
pub use matcher::should_ignore;
