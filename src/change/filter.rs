use crate::core::{Result, SyncError};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::str::FromStr;

lazy_static! {
    static ref FILTER_PATTERN: Regex =
        Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)=eq\.(.+)$").expect("filter pattern compiles");
}

/// Equality predicate attached to a realtime channel: `column=eq.value`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelFilter {
    column: String,
    value: String,
}

impl ChannelFilter {
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn parse(filter: &str) -> Result<Self> {
        let captures = FILTER_PATTERN
            .captures(filter.trim())
            .ok_or_else(|| SyncError::InvalidFilter(filter.to_string()))?;
        Ok(Self::eq(&captures[1], &captures[2]))
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Evaluates the predicate against a row image.
    ///
    /// Scalars compare by their text form; null, missing and nested values
    /// never match.
    pub fn matches(&self, row: &Map<String, JsonValue>) -> bool {
        match row.get(&self.column) {
            Some(JsonValue::String(s)) => *s == self.value,
            Some(JsonValue::Number(n)) => n.to_string() == self.value,
            Some(JsonValue::Bool(b)) => b.to_string() == self.value,
            _ => false,
        }
    }
}

impl fmt::Display for ChannelFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=eq.{}", self.column, self.value)
    }
}

impl FromStr for ChannelFilter {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: JsonValue) -> Map<String, JsonValue> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        let filter = ChannelFilter::parse("customer_id=eq.c-17").unwrap();
        assert_eq!(filter.column(), "customer_id");
        assert_eq!(filter.value(), "c-17");
        assert_eq!(filter.to_string(), "customer_id=eq.c-17");
    }

    #[test]
    fn test_value_may_contain_dots() {
        let filter: ChannelFilter = "email=eq.a.b@example.com".parse().unwrap();
        assert_eq!(filter.value(), "a.b@example.com");
    }

    #[test]
    fn test_invalid_filters() {
        for bad in ["", "customer_id", "customer_id=neq.1", "customer_id=eq.", "1col=eq.x"] {
            assert!(
                matches!(ChannelFilter::parse(bad), Err(SyncError::InvalidFilter(_))),
                "expected '{bad}' to be rejected"
            );
        }
    }

    #[test]
    fn test_matches_scalars() {
        let filter = ChannelFilter::eq("customer_id", "7");
        assert!(filter.matches(&row(json!({"customer_id": "7"}))));
        assert!(filter.matches(&row(json!({"customer_id": 7}))));
        assert!(!filter.matches(&row(json!({"customer_id": 8}))));
        assert!(!filter.matches(&row(json!({"customer_id": null}))));
        assert!(!filter.matches(&row(json!({"id": "7"}))));
    }
}
