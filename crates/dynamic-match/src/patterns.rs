//! Built-in dynamic-field regexes.

use once_cell::sync::Lazy;
use regex::Regex;

pub static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$").unwrap()
});

pub static ISO8601_TIMESTAMP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:?\d{2})?$").unwrap()
});

pub static DATE_ISO_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());
pub static DATE_SLASH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{2}/\d{2}/\d{4}$").unwrap());
pub static DATE_DASH_US_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{2}-\d{2}-\d{4}$").unwrap());

pub static JWT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^eyJ[A-Za-z0-9_-]*\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]*$").unwrap());

pub fn is_uuid(s: &str) -> bool {
    UUID_RE.is_match(s)
}

pub fn is_timestamp(s: &str) -> bool {
    ISO8601_TIMESTAMP_RE.is_match(s)
}

pub fn is_date(s: &str) -> bool {
    DATE_ISO_RE.is_match(s) || DATE_SLASH_RE.is_match(s) || DATE_DASH_US_RE.is_match(s)
}

pub fn is_jwt(s: &str) -> bool {
    JWT_RE.is_match(s)
}
