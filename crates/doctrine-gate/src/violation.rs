//! Violation records and redaction

use chrono::{DateTime, Utc};
use doctrine_envelope::{iso8601, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Replacement for redacted values
pub const REDACTED: &str = "[REDACTED]";

/// Keys whose values never reach a persisted record (exact, case-sensitive)
pub const SENSITIVE_KEYS: [&str; 5] = ["api_key", "password", "token", "secret", "auth"];

/// How many violations [`ViolationSummary::recent`] keeps
pub const RECENT_VIOLATIONS: usize = 5;

/// Audited, redacted snapshot of one failed validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    /// ISO-8601 capture instant
    pub timestamp: String,
    /// Calling tool
    pub tool: String,
    /// Operation name
    pub operation: String,
    /// Validation failure, every offending field
    pub error: String,
    /// Offending payload with sensitive values redacted
    pub payload: Value,
}

impl ViolationRecord {
    /// Capture a failure now; `raw` is redacted, never stored as-is
    #[must_use]
    pub fn capture(tool: &str, operation: &str, error: &ValidationError, raw: &Value) -> Self {
        Self::capture_at(tool, operation, error, raw, Utc::now())
    }

    /// Capture a failure at `at`
    #[must_use]
    pub fn capture_at(
        tool: &str,
        operation: &str,
        error: &ValidationError,
        raw: &Value,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp: iso8601(&at),
            tool: tool.to_string(),
            operation: operation.to_string(),
            error: error.to_string(),
            payload: redact(raw),
        }
    }
}

/// Copy `value` with every sensitive key's value replaced by [`REDACTED`]
///
/// Applies at every nesting level, inside objects and arrays.
#[must_use]
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, inner)| {
                    let inner = if SENSITIVE_KEYS.contains(&key.as_str()) {
                        Value::String(REDACTED.to_string())
                    } else {
                        redact(inner)
                    };
                    (key.clone(), inner)
                })
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        scalar => scalar.clone(),
    }
}

/// Read-only aggregation over the violation list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViolationSummary {
    /// Number of violations
    pub total: usize,
    /// Violations per tool
    pub by_tool: BTreeMap<String, usize>,
    /// The most recent violations, oldest first
    pub recent: Vec<ViolationRecord>,
}

impl ViolationSummary {
    /// Summarise `records` (oldest first)
    #[must_use]
    pub fn from_records(records: &[ViolationRecord]) -> Self {
        let mut by_tool = BTreeMap::new();
        for record in records {
            *by_tool.entry(record.tool.clone()).or_insert(0) += 1;
        }
        let skip = records.len().saturating_sub(RECENT_VIOLATIONS);
        Self {
            total: records.len(),
            by_tool,
            recent: records[skip..].to_vec(),
        }
    }
}
