//! Filter DSL for selecting which tests to run.
//!
//! Syntax: `key=regex[,key=regex]*`, AND-semantics across clauses, values
//! may be single- or double-quoted. Recognized keys (with short aliases):
//! `path|p`, `name|n`, `op|o`, `type|t`, `method|m`, `status|s`, `id`,
//! `file|f`.

use regex::Regex;
use replay_trace_model::Test;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKey {
    Path,
    Name,
    Op,
    Type,
    Method,
    Status,
    Id,
    File,
}

impl FilterKey {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "path" | "p" => Some(FilterKey::Path),
            "name" | "n" => Some(FilterKey::Name),
            "op" | "o" => Some(FilterKey::Op),
            "type" | "t" => Some(FilterKey::Type),
            "method" | "m" => Some(FilterKey::Method),
            "status" | "s" => Some(FilterKey::Status),
            "id" => Some(FilterKey::Id),
            "file" | "f" => Some(FilterKey::File),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("malformed filter clause '{0}': expected key=regex")]
    MalformedClause(String),
    #[error("unrecognized filter key '{0}'")]
    UnknownKey(String),
    #[error("invalid regex for key '{key}': {source}")]
    InvalidRegex {
        key: String,
        #[source]
        source: regex::Error,
    },
}

struct Clause {
    key: FilterKey,
    pattern: Regex,
}

/// A parsed, AND-composed set of filter clauses.
pub struct TestFilter {
    clauses: Vec<Clause>,
}

impl TestFilter {
    pub fn parse(expr: &str) -> Result<Self, FilterError> {
        let mut clauses = Vec::new();
        for raw_clause in split_top_level_commas(expr) {
            let raw_clause = raw_clause.trim();
            if raw_clause.is_empty() {
                continue;
            }
            let (key_raw, value_raw) = raw_clause
                .split_once('=')
                .ok_or_else(|| FilterError::MalformedClause(raw_clause.to_string()))?;
            let key = FilterKey::parse(key_raw.trim()).ok_or_else(|| FilterError::UnknownKey(key_raw.trim().to_string()))?;
            let value = unquote(value_raw.trim());
            let pattern = Regex::new(&value).map_err(|source| FilterError::InvalidRegex {
                key: key_raw.trim().to_string(),
                source,
            })?;
            clauses.push(Clause { key, pattern });
        }
        Ok(Self { clauses })
    }

    /// No clauses means "match everything".
    pub fn matches(&self, test: &Test) -> bool {
        self.clauses.iter().all(|clause| {
            let field = field_value(test, clause.key);
            clause.pattern.is_match(&field)
        })
    }
}

fn field_value(test: &Test, key: FilterKey) -> String {
    match key {
        FilterKey::Path => test.path.clone(),
        FilterKey::Name => test.display_name.clone().unwrap_or_default(),
        FilterKey::Op => operation_of(test.display_name.as_deref()),
        FilterKey::Type => test
            .spans
            .first()
            .map(|s| s.package_name.clone())
            .unwrap_or_default(),
        FilterKey::Method => test.method.clone(),
        FilterKey::Status => test.expected_status.to_string(),
        FilterKey::Id => test.trace_test_id.clone(),
        FilterKey::File => test
            .metadata
            .get("file")
            .and_then(replay_common::Value::as_str)
            .unwrap_or_default()
            .to_string(),
    }
}

/// `op` for GraphQL extracts the second token of the display name when the
/// first is `query|mutation|subscription`; otherwise the whole name.
fn operation_of(display_name: Option<&str>) -> String {
    let Some(name) = display_name else {
        return String::new();
    };
    let mut tokens = name.split_whitespace();
    match tokens.next() {
        Some(first) if matches!(first.to_ascii_lowercase().as_str(), "query" | "mutation" | "subscription") => {
            tokens.next().unwrap_or("").to_string()
        }
        _ => name.to_string(),
    }
}

fn unquote(value: &str) -> String {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return value[1..value.len() - 1].to_string();
        }
    }
    value.to_string()
}

/// Splits on commas that aren't inside a quoted value.
fn split_top_level_commas(expr: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for ch in expr.chars() {
        match quote {
            Some(q) if ch == q => {
                quote = None;
                current.push(ch);
            }
            Some(_) => current.push(ch),
            None if ch == '"' || ch == '\'' => {
                quote = Some(ch);
                current.push(ch);
            }
            None if ch == ',' => {
                parts.push(std::mem::take(&mut current));
            }
            None => current.push(ch),
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}
