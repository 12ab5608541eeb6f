//! Error types for the enforcement layer
//!
//! Provides error handling for:
//! - Policy refusals under the standard gate ([`DoctrineViolation`])
//! - Zero-tolerance refusals ([`NuclearDoctrineViolation`], [`NuclearError`])
//! - Configuration loading and audit persistence

use crate::violation::ViolationRecord;
use doctrine_envelope::ValidationError;
use doctrine_format::FormatError;
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;

/// Why the gate refused to proceed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// Strict policy rejected the payload outright
    Rejected,
    /// Permissive policy tried one repair and it failed
    RepairFailed,
}

impl Display for ViolationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected => f.write_str("rejected"),
            Self::RepairFailed => f.write_str("repair failed"),
        }
    }
}

/// Validation failed and the gate's policy refuses to proceed
///
/// Fatal to the current call. Carries the redacted [`ViolationRecord`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error(
    "doctrine violation ({kind}) by tool '{}' in {}: {}",
    .record.tool,
    .record.operation,
    .record.error
)]
pub struct DoctrineViolation {
    kind: ViolationKind,
    record: ViolationRecord,
}

impl DoctrineViolation {
    /// Strict-mode rejection
    #[must_use]
    pub fn rejected(record: ViolationRecord) -> Self {
        Self {
            kind: ViolationKind::Rejected,
            record,
        }
    }

    /// Permissive-mode repair failure
    #[must_use]
    pub fn repair_failed(record: ViolationRecord) -> Self {
        Self {
            kind: ViolationKind::RepairFailed,
            record,
        }
    }

    /// Refusal kind
    #[must_use]
    pub fn kind(&self) -> ViolationKind {
        self.kind
    }

    /// The captured violation
    #[must_use]
    pub fn record(&self) -> &ViolationRecord {
        &self.record
    }

    /// Take the captured violation
    #[must_use]
    pub fn into_record(self) -> ViolationRecord {
        self.record
    }
}

/// A violation under the zero-tolerance policy
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error(
    "zero-tolerance violation #{violation_count} by tool '{}' in {}: {}",
    .record.tool,
    .record.operation,
    .record.error
)]
pub struct NuclearDoctrineViolation {
    /// The captured violation
    pub record: ViolationRecord,
    /// Running violation count, including this one
    pub violation_count: u32,
    /// Whether this violation triggered shutdown
    pub shutdown: bool,
}

/// Errors from the standard enforcement gate
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// Policy refusal
    #[error(transparent)]
    Violation(#[from] DoctrineViolation),

    /// Disabled gate passed a payload that is not an envelope
    #[error("enforcement disabled and payload is not an envelope: {0}")]
    Unchecked(ValidationError),

    /// Sink formatting failed
    #[error(transparent)]
    Format(#[from] FormatError),

    /// Required argument missing or blank
    #[error("{0} is required")]
    MissingField(&'static str),
}

impl GateError {
    /// Whether the current operation must stop
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Violation(_))
    }

    /// Violations are never retried internally
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// The captured violation, if this is a policy refusal
    #[must_use]
    pub fn violation(&self) -> Option<&DoctrineViolation> {
        match self {
            Self::Violation(violation) => Some(violation),
            _ => None,
        }
    }
}

/// Errors from the zero-tolerance gate
#[derive(Debug, thiserror::Error)]
pub enum NuclearError {
    /// Operation attempted before `arm()`
    #[error("zero-tolerance mode is not armed")]
    NotArmed,

    /// `arm()` called twice
    #[error("zero-tolerance mode is already armed")]
    AlreadyArmed,

    /// System locked after reaching the violation limit
    #[error("system locked after zero-tolerance shutdown")]
    SystemLocked,

    /// Caller has been blacklisted by an earlier violation
    #[error("tool '{0}' is blacklisted")]
    ToolBlacklisted(String),

    /// Wrong recovery authorization code
    #[error("recovery denied: invalid authorization code")]
    RecoveryDenied,

    /// Validation failed under zero tolerance
    #[error(transparent)]
    Violation(#[from] NuclearDoctrineViolation),
}

impl NuclearError {
    /// Whether the current operation must stop
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Violation(_) | Self::SystemLocked | Self::ToolBlacklisted(_)
        )
    }

    /// Whether the caller is shut out until manual recovery
    #[must_use]
    pub fn is_lockout(&self) -> bool {
        matches!(self, Self::SystemLocked | Self::ToolBlacklisted(_))
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config text is not valid TOML for this schema
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Parsed values are out of range
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Create invalid config error
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

/// Audit persistence errors
///
/// Always logged and swallowed by the gates; never turned into a
/// validation outcome.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// Filesystem failure
    #[error("audit write to {path} failed: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Entry could not be serialized
    #[error("audit serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AuditError {
    /// Create an I/O error for `path`
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether writing again might succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

/// Errors from the process runtime factory
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// A runtime already exists in this process
    #[error("doctrine runtime already installed in this process")]
    AlreadyInstalled,

    /// Configuration rejected
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> ViolationRecord {
        ViolationRecord {
            timestamp: "2025-01-02T03:04:05.678Z".to_string(),
            tool: "apify".to_string(),
            operation: "relational_operation".to_string(),
            error: "process_id: Process ID is required".to_string(),
            payload: json!({"source_id": "apify"}),
        }
    }

    #[test]
    fn violation_display() {
        let err = DoctrineViolation::rejected(record());
        assert_eq!(
            err.to_string(),
            "doctrine violation (rejected) by tool 'apify' in relational_operation: \
             process_id: Process ID is required"
        );
        assert_eq!(err.kind(), ViolationKind::Rejected);
    }

    #[test]
    fn nuclear_violation_display() {
        let err = NuclearDoctrineViolation {
            record: record(),
            violation_count: 1,
            shutdown: true,
        };
        assert!(err.to_string().starts_with("zero-tolerance violation #1 by tool 'apify'"));
    }

    #[test]
    fn classification() {
        let gate: GateError = DoctrineViolation::repair_failed(record()).into();
        assert!(gate.is_fatal());
        assert!(!gate.is_retryable());
        assert_eq!(
            gate.violation().map(DoctrineViolation::kind),
            Some(ViolationKind::RepairFailed)
        );
        assert!(!GateError::MissingField("tool_name").is_fatal());

        assert!(NuclearError::SystemLocked.is_lockout());
        assert!(NuclearError::ToolBlacklisted("x".into()).is_fatal());
        assert!(!NuclearError::RecoveryDenied.is_fatal());
        assert!(!NuclearError::NotArmed.is_lockout());
    }

    #[test]
    fn audit_io_is_retryable() {
        let err = AuditError::io("/tmp/x", std::io::Error::other("disk full"));
        assert!(err.is_retryable());
        assert!(err.to_string().contains("disk full"));
    }
}
