//! Doctrine Gate - enforcement for outbound envelopes
//!
//! Every payload bound for a sink passes through an [`EnforcementGate`] that
//! validates it against the envelope schema, records and audits failures, and
//! either rejects (strict), repairs (permissive) or waves it through
//! (disabled). [`NuclearGate`] layers a zero-tolerance policy on top.
//!
//! # Core Concepts
//!
//! - [`EnforcementGate::database_operation`]: validate then format, the only
//!   sanctioned way to produce a sink record
//! - [`ViolationRecord`]: redacted snapshot of a failed validation
//! - [`AuditSink`]: where success logs and violation reports go
//! - [`NuclearGate`]: blacklist on first failure, shut down at the limit
//! - [`DoctrineRuntime`]: once-per-process wiring of all of the above
//!
//! # Example
//!
//! ```rust
//! use doctrine_gate::{EnforcementGate, GateConfig, MemoryAuditSink};
//! use doctrine_format::Target;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let gate = EnforcementGate::new(&GateConfig::default(), Arc::new(MemoryAuditSink::new()));
//! let err = gate
//!     .database_operation(Target::Relational, &json!({"source_id": "rtrvr"}), "rtrvr")
//!     .unwrap_err();
//! assert!(err.is_fatal());
//! assert_eq!(gate.get_violation_summary().total, 1);
//! ```

#![warn(unreachable_pub)]

// Core modules
mod audit;
mod config;
mod error;
mod gate;
mod mode;
mod nuclear;
mod runtime;
mod session;
mod violation;

// Re-exports
pub use audit::{
    report_file_name, AuditSink, FileAuditSink, MemoryAuditSink, NUCLEAR_EVENTS_LOG,
    NUCLEAR_SHUTDOWN_PREFIX, SUCCESS_LOG, VIOLATIONS_PREFIX,
};
pub use config::{
    GateConfig, NuclearConfig, DEFAULT_EXIT_CODE, DEFAULT_LOG_DIR, DEFAULT_MAX_VIOLATIONS,
    DEFAULT_NUCLEAR_LOG_DIR, DEFAULT_RECOVERY_CODE,
};
pub use error::{
    AuditError, ConfigError, DoctrineViolation, GateError, NuclearDoctrineViolation,
    NuclearError, RuntimeError, ViolationKind,
};
pub use gate::{Admitted, EnforcementGate, REPAIR_BLUEPRINT, SCHEMA_COMPLIANCE, UNKNOWN_OPERATION};
pub use mode::EnforcementMode;
pub use nuclear::{
    NuclearEvent, NuclearGate, NuclearPhase, NuclearStatus, ProcessTerminator, Terminator,
};
pub use runtime::DoctrineRuntime;
pub use session::ToolSession;
pub use violation::{
    redact, ViolationRecord, ViolationSummary, RECENT_VIOLATIONS, REDACTED, SENSITIVE_KEYS,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for gate callers
    pub use crate::{
        Admitted, DoctrineViolation, EnforcementGate, GateConfig, GateError, NuclearGate,
        ToolSession,
    };
    pub use doctrine_envelope::prelude::*;
    pub use doctrine_format::Target;
}
