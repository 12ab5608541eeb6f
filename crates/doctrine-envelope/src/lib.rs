//! Envelope Doctrine - canonical envelope schema
//!
//! Every record leaving the system is first an [`Envelope`]: a fixed set of
//! seven fields around an opaque business payload.
//!
//! # Core Concepts
//!
//! - [`Envelope`]: the canonical, immutable record
//! - [`Envelope::construct`]: build a fresh envelope (never fails)
//! - [`Envelope::validate`]: the single authority turning untyped JSON into an envelope
//! - [`SignatureGenerator`]: the only source of [`ExecutionSignature`]s
//!
//! # Example
//!
//! ```rust
//! use doctrine_envelope::{ConstructOptions, Envelope};
//! use serde_json::{json, Map};
//!
//! let envelope = Envelope::construct("rtrvr", "search_42", Map::new(), ConstructOptions::new());
//! let reparsed = Envelope::validate(&envelope.to_value()).unwrap();
//! assert_eq!(envelope, reparsed);
//!
//! assert!(Envelope::validate(&json!({"source_id": "rtrvr"})).is_err());
//! ```

#![warn(unreachable_pub)]

// Core modules
mod envelope;
mod error;
mod signature;

// Re-exports
pub use envelope::{
    fields, iso8601, parse_timestamp, ApprovalStatus, ConstructOptions, Envelope, Validated,
    DEFAULT_AGENT_ID, DEFAULT_SCHEMA_VERSION,
};
pub use error::{value_kind, FieldIssue, ValidationError};
pub use signature::{ExecutionSignature, SignatureGenerator, SIGNATURE_HEX_LEN};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with envelopes
    pub use crate::{ConstructOptions, Envelope, ExecutionSignature, Validated, ValidationError};
}
