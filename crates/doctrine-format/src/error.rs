//! Error types for dialect conversion
//!
//! Provides error handling for:
//! - Normalising sink records back into envelopes
//! - Parsing target names
//! - Building sink write statements

use doctrine_envelope::ValidationError;

/// Errors raised by the format layer
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    /// Input record is not a JSON object
    #[error("record must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// Normalised record failed envelope validation
    #[error("normalized record is not a valid envelope: {0}")]
    Invalid(#[from] ValidationError),

    /// Target name not recognised
    #[error("unknown target: '{0}' (expected doc_store, relational or warehouse)")]
    UnknownTarget(String),

    /// Table/dataset name is not a safe identifier
    #[error("invalid identifier: '{0}'")]
    InvalidIdentifier(String),

    /// Record could not be serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FormatError {
    /// Create invalid identifier error
    pub fn invalid_identifier(name: impl Into<String>) -> Self {
        Self::InvalidIdentifier(name.into())
    }
}

/// Result type alias for format operations
pub type FormatResult<T> = Result<T, FormatError>;

#[cfg(test)]
mod tests {
    use super::*;
    use doctrine_envelope::FieldIssue;

    #[test]
    fn unknown_target_display() {
        let err = FormatError::UnknownTarget("mongo".to_string());
        assert_eq!(
            err.to_string(),
            "unknown target: 'mongo' (expected doc_store, relational or warehouse)"
        );
    }

    #[test]
    fn validation_error_converts() {
        let err: FormatError =
            ValidationError::InvalidFields(vec![FieldIssue::new("process_id", "Required")]).into();
        assert!(matches!(err, FormatError::Invalid(_)));
        assert!(err.to_string().contains("process_id: Required"));
    }
}
