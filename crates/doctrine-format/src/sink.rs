//! Sink write builders
//!
//! Shapes the dialect records into what each store client expects: a
//! doc-store document with working-memory TTL metadata, a parameterised
//! relational upsert, and warehouse insert rows with deduplication ids.
//! Nothing here performs I/O.

use crate::dialect::{to_doc_store, to_relational, to_warehouse, WarehouseRecord};
use crate::error::{FormatError, FormatResult};
use chrono::{DateTime, Utc};
use doctrine_envelope::{iso8601, Envelope};
use serde::Serialize;
use serde_json::{Map, Value};

/// Document TTL attached to doc-store writes
pub const DEFAULT_TTL_SECONDS: u64 = 3600;

/// `collection_type` marker on doc-store writes
pub const WORKING_MEMORY: &str = "working_memory";

/// Doc-store document ready for a collection write
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocStoreDocument {
    /// Collection name
    pub collection: String,
    /// Flat SPVPET record plus `ttl`, `created_at`, `collection_type`
    pub document: Map<String, Value>,
}

impl DocStoreDocument {
    /// Build a document for `collection`, stamped now
    ///
    /// # Errors
    /// [`FormatError::Serialization`] if the record cannot be represented.
    pub fn build(collection: impl Into<String>, envelope: &Envelope) -> FormatResult<Self> {
        Self::build_at(collection, envelope, Utc::now())
    }

    /// Build a document stamped at `created_at`
    ///
    /// # Errors
    /// [`FormatError::Serialization`] if the record cannot be represented.
    pub fn build_at(
        collection: impl Into<String>,
        envelope: &Envelope,
        created_at: DateTime<Utc>,
    ) -> FormatResult<Self> {
        let Value::Object(mut document) = serde_json::to_value(to_doc_store(envelope))? else {
            return Err(FormatError::NotAnObject("non-object"));
        };
        document.insert("ttl".into(), Value::from(DEFAULT_TTL_SECONDS));
        document.insert("created_at".into(), Value::String(iso8601(&created_at)));
        document.insert("collection_type".into(), Value::String(WORKING_MEMORY.into()));

        Ok(Self {
            collection: collection.into(),
            document,
        })
    }
}

/// Parameterised relational upsert
///
/// Keyed on `(source_id, task_id, process_signature)`. A conflicting row has
/// its approval, migration target, timestamp and payload replaced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationalUpsert {
    /// Target table, validated identifier
    pub table: String,
    /// Statement text with `$1..$7` placeholders
    pub sql: String,
    /// Positional parameters, `data_payload` as JSON text
    pub params: Vec<Value>,
}

impl RelationalUpsert {
    /// Build an upsert into `table`
    ///
    /// # Errors
    /// - [`FormatError::InvalidIdentifier`] if `table` is not a safe identifier
    /// - [`FormatError::Serialization`] if the payload cannot be encoded
    pub fn build(table: &str, envelope: &Envelope) -> FormatResult<Self> {
        validate_identifier(table)?;
        let record = to_relational(envelope);

        let sql = format!(
            "INSERT INTO {table} \
             (source_id, task_id, approved, migrated_to, \
             process_signature, event_timestamp, data_payload) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (source_id, task_id, process_signature) DO UPDATE SET \
             approved = EXCLUDED.approved, \
             migrated_to = EXCLUDED.migrated_to, \
             event_timestamp = EXCLUDED.event_timestamp, \
             data_payload = EXCLUDED.data_payload, \
             updated_at = NOW()"
        );

        let params = vec![
            Value::String(record.source_id),
            Value::String(record.task_id),
            Value::Bool(record.approved),
            record.migrated_to.map_or(Value::Null, Value::String),
            Value::String(record.process_signature),
            Value::String(record.event_timestamp),
            Value::String(serde_json::to_string(&record.data_payload)?),
        ];

        Ok(Self {
            table: table.to_string(),
            sql,
            params,
        })
    }
}

/// One warehouse insert row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WarehouseRow {
    /// Best-effort deduplication id
    #[serde(rename = "insertId")]
    pub insert_id: String,
    /// STACKED record
    pub json: WarehouseRecord,
}

/// Warehouse streaming insert
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WarehouseInsert {
    /// Dataset name
    pub dataset: String,
    /// Table name
    pub table: String,
    /// Rows to insert
    pub rows: Vec<WarehouseRow>,
}

impl WarehouseInsert {
    /// Single-row insert, stamped now
    ///
    /// # Errors
    /// [`FormatError::InvalidIdentifier`] for an unsafe dataset or table name.
    pub fn build(dataset: &str, table: &str, envelope: &Envelope) -> FormatResult<Self> {
        Self::build_at(dataset, table, envelope, Utc::now())
    }

    /// Single-row insert with the row id derived from `at`
    ///
    /// # Errors
    /// [`FormatError::InvalidIdentifier`] for an unsafe dataset or table name.
    pub fn build_at(
        dataset: &str,
        table: &str,
        envelope: &Envelope,
        at: DateTime<Utc>,
    ) -> FormatResult<Self> {
        validate_identifier(dataset)?;
        validate_identifier(table)?;
        let record = to_warehouse(envelope);
        let insert_id = format!(
            "{}-{}-{}",
            record.source_id,
            record.task_id,
            at.timestamp_millis()
        );
        Ok(Self {
            dataset: dataset.to_string(),
            table: table.to_string(),
            rows: vec![WarehouseRow {
                insert_id,
                json: record,
            }],
        })
    }

    /// Batch insert; row ids carry the row index so a batch never collides
    /// with itself
    ///
    /// # Errors
    /// [`FormatError::InvalidIdentifier`] for an unsafe dataset or table name.
    pub fn batch(dataset: &str, table: &str, envelopes: &[Envelope]) -> FormatResult<Self> {
        validate_identifier(dataset)?;
        validate_identifier(table)?;
        let millis = Utc::now().timestamp_millis();
        let rows = envelopes
            .iter()
            .enumerate()
            .map(|(idx, envelope)| {
                let record = to_warehouse(envelope);
                WarehouseRow {
                    insert_id: format!("{}-{}-{millis}-{idx}", record.source_id, record.task_id),
                    json: record,
                }
            })
            .collect();
        Ok(Self {
            dataset: dataset.to_string(),
            table: table.to_string(),
            rows,
        })
    }
}

/// Check that `name` is `ident` or `schema.ident`, where `ident` matches
/// `[A-Za-z_][A-Za-z0-9_]*`
///
/// # Errors
/// [`FormatError::InvalidIdentifier`] otherwise.
pub fn validate_identifier(name: &str) -> FormatResult<()> {
    let mut parts = name.split('.');
    let valid = match (parts.next(), parts.next(), parts.next()) {
        (Some(ident), None, None) => is_ident(ident),
        (Some(schema), Some(ident), None) => is_ident(schema) && is_ident(ident),
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(FormatError::invalid_identifier(name))
    }
}

fn is_ident(part: &str) -> bool {
    let mut chars = part.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
