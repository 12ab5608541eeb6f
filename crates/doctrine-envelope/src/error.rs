//! Error types for envelope validation

use std::fmt::{self, Display, Formatter};

/// A single structural problem found in a candidate envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    /// Offending envelope field
    pub field: &'static str,
    /// What is wrong with it
    pub message: String,
}

impl FieldIssue {
    /// Create issue for field
    #[inline]
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl Display for FieldIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Candidate envelope is structurally non-conforming
///
/// Always recoverable by the caller fixing its data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Candidate is not a JSON object at all
    #[error("envelope must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// One or more fields failed validation
    #[error("envelope validation failed: {}", join_issues(.0))]
    InvalidFields(Vec<FieldIssue>),
}

impl ValidationError {
    /// Field-level issues (empty for [`ValidationError::NotAnObject`])
    #[must_use]
    pub fn issues(&self) -> &[FieldIssue] {
        match self {
            Self::NotAnObject(_) => &[],
            Self::InvalidFields(issues) => issues,
        }
    }

    /// Whether `field` is among the offending fields
    #[must_use]
    pub fn mentions(&self, field: &str) -> bool {
        self.issues().iter().any(|issue| issue.field == field)
    }
}

fn join_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Describe a JSON value's kind for error messages
#[must_use]
pub fn value_kind(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
