//! Environment grouping types (component C9).

use crate::span::{Span, Test};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct EnvironmentGroup {
    pub name: String,
    pub tests: Vec<Test>,
    pub env_vars: HashMap<String, String>,
    pub source_span: Option<Span>,
}

impl EnvironmentGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tests: Vec::new(),
            env_vars: HashMap::new(),
            source_span: None,
        }
    }
}
