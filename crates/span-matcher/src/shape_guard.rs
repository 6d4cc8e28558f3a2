//! HTTP/GraphQL shape guard, applied to schema-hash tiers.

use replay_common::Value;
use std::collections::BTreeSet;

pub fn is_http_like(package_name: &str) -> bool {
    matches!(package_name, "http" | "https")
}

/// True iff `expected` and `actual` are compatible enough to rely on a
/// schema-hash match: method (when both carry one), derived hostname and
/// path (when both derivable), the *set* of query-parameter keys, and — if
/// either side carries a GraphQL body — the normalized query text.
pub fn shape_guard_passes(expected: &Value, actual: &Value) -> bool {
    if let (Some(a), Some(b)) = (method_of(expected), method_of(actual)) {
        if !a.eq_ignore_ascii_case(&b) {
            return false;
        }
    }

    if let (Some(a), Some(b)) = (hostname_of(expected), hostname_of(actual)) {
        if a != b {
            return false;
        }
    }

    if let (Some(a), Some(b)) = (path_of(expected), path_of(actual)) {
        if a != b {
            return false;
        }
    }

    if query_keys_of(expected) != query_keys_of(actual) {
        return false;
    }

    let (a_gql, b_gql) = (graphql_query_of(expected), graphql_query_of(actual));
    if a_gql.is_some() || b_gql.is_some() {
        return normalize_graphql(a_gql.as_deref().unwrap_or(""))
            == normalize_graphql(b_gql.as_deref().unwrap_or(""));
    }

    true
}

fn method_of(value: &Value) -> Option<String> {
    value.get("method").and_then(Value::as_str).map(str::to_string)
}

fn hostname_of(value: &Value) -> Option<String> {
    if let Some(h) = value.get("hostname").and_then(Value::as_str) {
        return Some(h.to_ascii_lowercase());
    }
    value
        .get("url")
        .and_then(Value::as_str)
        .and_then(parse_url_parts)
        .map(|(host, _, _)| host.to_ascii_lowercase())
}

fn path_of(value: &Value) -> Option<String> {
    if let Some(p) = value.get("path").and_then(Value::as_str) {
        return Some(p.to_string());
    }
    if let Some((_, path, _)) = value.get("url").and_then(Value::as_str).and_then(parse_url_parts) {
        return Some(path);
    }
    value.get("target").and_then(Value::as_str).map(str::to_string)
}

fn query_keys_of(value: &Value) -> BTreeSet<String> {
    if let Some(Value::Object(query)) = value.get("query") {
        return query.keys().cloned().collect();
    }
    let query_str = value
        .get("url")
        .and_then(Value::as_str)
        .and_then(parse_url_parts)
        .map(|(_, _, q)| q)
        .or_else(|| value.get("path").and_then(Value::as_str).and_then(query_string_of_path));
    query_str
        .map(|q| parse_query_keys(&q))
        .unwrap_or_default()
}

fn query_string_of_path(path: &str) -> Option<String> {
    path.split_once('?').map(|(_, q)| q.to_string())
}

fn parse_query_keys(query: &str) -> BTreeSet<String> {
    query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|pair| pair.split('=').next().unwrap_or("").to_string())
        .collect()
}

/// Minimal URL splitter: returns `(host, path, query)`. No external `url`
/// crate dependency needed for the narrow shapes recorded spans carry.
fn parse_url_parts(url: &str) -> Option<(String, String, String)> {
    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let (authority, rest) = match without_scheme.find('/') {
        Some(idx) => (&without_scheme[..idx], &without_scheme[idx..]),
        None => (without_scheme, "/"),
    };
    let host = authority.split(':').next().unwrap_or(authority).to_string();
    let (path, query) = match rest.split_once('?') {
        Some((p, q)) => (p.to_string(), q.to_string()),
        None => (rest.to_string(), String::new()),
    };
    let path = if path.is_empty() { "/".to_string() } else { path };
    Some((host, path, query))
}

fn graphql_query_of(value: &Value) -> Option<String> {
    match value.get("body") {
        Some(Value::Object(body)) => body.get("query").and_then(Value::as_str).map(str::to_string),
        Some(Value::String(s)) => serde_json::from_str::<Value>(s)
            .ok()
            .and_then(|v| v.get("query").and_then(Value::as_str).map(str::to_string)),
        _ => None,
    }
}

fn normalize_graphql(query: &str) -> String {
    let padded = query.replace('{', " { ").replace('}', " } ");
    padded.split_whitespace().collect::<Vec<_>>().join(" ")
}
