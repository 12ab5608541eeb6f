//! Doctrine Format - sink dialect conversion
//!
//! Projects validated [`Envelope`](doctrine_envelope::Envelope)s into the three
//! downstream dialects and normalises sink records back into envelopes.
//!
//! # Example
//!
//! ```rust
//! use doctrine_envelope::{ConstructOptions, Envelope};
//! use doctrine_format::{format_for, from_any_format, Target};
//! use serde_json::Map;
//!
//! let envelope = Envelope::construct("rtrvr", "search_42", Map::new(), ConstructOptions::new());
//! let row = format_for(&envelope, Target::Relational).to_value().unwrap();
//! assert_eq!(row["task_id"], "search_42");
//!
//! let back = from_any_format(&row).unwrap();
//! assert_eq!(back.execution_signature(), envelope.execution_signature());
//! ```

#![warn(unreachable_pub)]

mod dialect;
mod error;
mod sink;

pub use dialect::{
    detect_dialect, format_for, from_any_format, to_doc_store, to_relational, to_warehouse,
    DocStoreRecord, RelationalRecord, SinkRecord, Target, WarehouseRecord,
};
pub use error::{FormatError, FormatResult};
pub use sink::{
    validate_identifier, DocStoreDocument, RelationalUpsert, WarehouseInsert, WarehouseRow,
    DEFAULT_TTL_SECONDS, WORKING_MEMORY,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
