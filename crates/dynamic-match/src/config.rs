//! Dynamic-field matcher configuration.

use regex::Regex;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct DynamicMatchConfig {
    ignore_fields: HashSet<String>,
    ignore_patterns: Vec<Regex>,
    pub ignore_uuids: bool,
    pub ignore_timestamps: bool,
    pub ignore_dates: bool,
    pub ignore_jwt_fields: bool,
}

impl Default for DynamicMatchConfig {
    fn default() -> Self {
        Self {
            ignore_fields: HashSet::new(),
            ignore_patterns: Vec::new(),
            ignore_uuids: true,
            ignore_timestamps: true,
            ignore_dates: true,
            ignore_jwt_fields: true,
        }
    }
}

impl DynamicMatchConfig {
    pub fn builder() -> DynamicMatchConfigBuilder {
        DynamicMatchConfigBuilder::default()
    }

    pub fn is_ignored_field_name(&self, field_name: &str) -> bool {
        self.ignore_fields.contains(&field_name.to_ascii_lowercase())
    }

    pub fn custom_patterns(&self) -> &[Regex] {
        &self.ignore_patterns
    }

    pub fn from_comparison_config(config: &replay_common::ComparisonConfig) -> Self {
        let mut builder = Self::builder();
        for field in &config.ignore_fields {
            builder = builder.ignore_field(field);
        }
        for pattern in &config.ignore_patterns {
            builder = builder.ignore_pattern(pattern);
        }
        if let Some(v) = config.ignore_uuids {
            builder = builder.ignore_uuids(v);
        }
        if let Some(v) = config.ignore_timestamps {
            builder = builder.ignore_timestamps(v);
        }
        if let Some(v) = config.ignore_dates {
            builder = builder.ignore_dates(v);
        }
        if let Some(v) = config.ignore_jwt_fields {
            builder = builder.ignore_jwt_fields(v);
        }
        builder.build()
    }
}

#[derive(Debug, Default)]
pub struct DynamicMatchConfigBuilder {
    inner: DynamicMatchConfigSeed,
}

#[derive(Debug)]
struct DynamicMatchConfigSeed {
    ignore_fields: HashSet<String>,
    ignore_patterns: Vec<String>,
    ignore_uuids: bool,
    ignore_timestamps: bool,
    ignore_dates: bool,
    ignore_jwt_fields: bool,
}

impl Default for DynamicMatchConfigSeed {
    fn default() -> Self {
        Self {
            ignore_fields: HashSet::new(),
            ignore_patterns: Vec::new(),
            ignore_uuids: true,
            ignore_timestamps: true,
            ignore_dates: true,
            ignore_jwt_fields: true,
        }
    }
}

impl DynamicMatchConfigBuilder {
    pub fn ignore_field(mut self, field: impl Into<String>) -> Self {
        self.inner.ignore_fields.insert(field.into().to_ascii_lowercase());
        self
    }

    pub fn ignore_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.inner.ignore_patterns.push(pattern.into());
        self
    }

    pub fn ignore_uuids(mut self, value: bool) -> Self {
        self.inner.ignore_uuids = value;
        self
    }

    pub fn ignore_timestamps(mut self, value: bool) -> Self {
        self.inner.ignore_timestamps = value;
        self
    }

    pub fn ignore_dates(mut self, value: bool) -> Self {
        self.inner.ignore_dates = value;
        self
    }

    pub fn ignore_jwt_fields(mut self, value: bool) -> Self {
        self.inner.ignore_jwt_fields = value;
        self
    }

    /// Invalid custom patterns are silently skipped,
    pub fn build(self) -> DynamicMatchConfig {
        let ignore_patterns = self
            .inner
            .ignore_patterns
            .iter()
            .filter_map(|p| match Regex::new(p) {
                Ok(re) => Some(re),
                Err(err) => {
                    tracing::warn!(pattern = %p, error = %err, "ignoring invalid comparison pattern");
                    None
                }
            })
            .collect();

        DynamicMatchConfig {
            ignore_fields: self.inner.ignore_fields,
            ignore_patterns,
            ignore_uuids: self.inner.ignore_uuids,
            ignore_timestamps: self.inner.ignore_timestamps,
            ignore_dates: self.inner.ignore_dates,
            ignore_jwt_fields: self.inner.ignore_jwt_fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_custom_pattern_is_skipped_not_fatal() {
        let config = DynamicMatchConfig::builder()
            .ignore_pattern("(unclosed")
            .ignore_pattern("^ok-\\d+$")
            .build();
        assert_eq!(config.custom_patterns().len(), 1);
    }

    #[test]
    fn ignore_field_lookup_is_case_insensitive() {
        let config = DynamicMatchConfig::builder().ignore_field("TraceId").build();
        assert!(config.is_ignored_field_name("traceid"));
        assert!(config.is_ignored_field_name("TRACEID"));
    }
}
