//! Sink dialects
//!
//! Three total, pure projections of a validated [`Envelope`]:
//!
//! | Target | Dialect | Shape |
//! |---|---|---|
//! | [`Target::DocStore`] | SPVPET | flat map, payload keys spread alongside the envelope fields |
//! | [`Target::Relational`] | STAMPED | fixed columns, payload nested |
//! | [`Target::Warehouse`] | STACKED | fixed analytics columns, payload nested |
//!
//! [`from_any_format`] is the inverse: it detects the dialect of an untyped
//! record, restores canonical field names and routes the result through
//! [`Envelope::validate`].

use crate::error::{FormatError, FormatResult};
use doctrine_envelope::{fields, value_kind, Envelope, Validated};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Downstream storage target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// Document store (SPVPET dialect)
    DocStore,
    /// Relational store (STAMPED dialect)
    Relational,
    /// Columnar warehouse (STACKED dialect)
    Warehouse,
}

impl Target {
    /// Every target
    pub const ALL: [Target; 3] = [Target::DocStore, Target::Relational, Target::Warehouse];

    /// Canonical target name
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DocStore => "doc_store",
            Self::Relational => "relational",
            Self::Warehouse => "warehouse",
        }
    }

    /// Structural dialect name
    #[inline]
    #[must_use]
    pub const fn dialect(&self) -> &'static str {
        match self {
            Self::DocStore => "SPVPET",
            Self::Relational => "STAMPED",
            Self::Warehouse => "STACKED",
        }
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Target {
    type Err = FormatError;

    /// Accepts target names (`doc_store`, `relational`, `warehouse`) and
    /// dialect names (`spvpet`, `stamped`, `stacked`), case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "doc_store" | "docstore" | "spvpet" => Ok(Self::DocStore),
            "relational" | "stamped" => Ok(Self::Relational),
            "warehouse" | "stacked" => Ok(Self::Warehouse),
            _ => Err(FormatError::UnknownTarget(s.to_string())),
        }
    }
}

/// Doc-store (SPVPET) record
///
/// Serializes flat: the six envelope fields, then every payload key at the
/// top level. Payload keys that collide with an envelope field are dropped
/// from `passthrough`; the envelope field wins.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocStoreRecord {
    /// Producing subsystem/tool
    pub source_id: String,
    /// Logical operation/task
    pub process_id: String,
    /// Approval flag, boolean or status
    pub validated: Validated,
    /// Downstream identifier (`null` when absent)
    pub promoted_to: Option<String>,
    /// Execution signature
    pub execution_signature: String,
    /// ISO-8601 timestamp
    pub timestamp_last_touched: String,
    /// Payload keys spread alongside the envelope fields
    #[serde(flatten)]
    pub passthrough: Map<String, Value>,
}

/// Relational (STAMPED) record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationalRecord {
    /// Producing subsystem/tool
    pub source_id: String,
    /// Envelope `process_id`
    pub task_id: String,
    /// `validated == true || validated == "approved"`
    pub approved: bool,
    /// Envelope `promoted_to`
    pub migrated_to: Option<String>,
    /// Envelope `execution_signature`
    pub process_signature: String,
    /// Envelope `timestamp_last_touched`, ISO-8601
    pub event_timestamp: String,
    /// Nested payload, empty when absent
    pub data_payload: Map<String, Value>,
}

/// Warehouse (STACKED) record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarehouseRecord {
    /// Producing subsystem/tool
    pub source_id: String,
    /// Envelope `process_id`
    pub task_id: String,
    /// `validated == true || validated == "approved"`
    pub analytics_approved: bool,
    /// Envelope `promoted_to`
    pub consolidated_from: Option<String>,
    /// Envelope `execution_signature`
    pub knowledge_signature: String,
    /// Envelope `timestamp_last_touched`, ISO-8601
    pub event_timestamp: String,
    /// Nested payload, empty when absent
    pub data_payload: Map<String, Value>,
}

/// A sink-ready record in one of the three dialects
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SinkRecord {
    /// SPVPET
    DocStore(DocStoreRecord),
    /// STAMPED
    Relational(RelationalRecord),
    /// STACKED
    Warehouse(WarehouseRecord),
}

impl SinkRecord {
    /// Target this record was formatted for
    #[must_use]
    pub const fn target(&self) -> Target {
        match self {
            Self::DocStore(_) => Target::DocStore,
            Self::Relational(_) => Target::Relational,
            Self::Warehouse(_) => Target::Warehouse,
        }
    }

    /// JSON form handed to the sink client
    ///
    /// # Errors
    /// [`FormatError::Serialization`] if the payload cannot be represented.
    pub fn to_value(&self) -> FormatResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Project into the doc-store dialect
#[must_use]
pub fn to_doc_store(envelope: &Envelope) -> DocStoreRecord {
    let mut passthrough = Map::new();
    if let Some(payload) = envelope.data_payload() {
        for (key, value) in payload {
            if fields::is_reserved(key) {
                tracing::warn!(
                    key = %key,
                    source_id = envelope.source_id(),
                    "payload key collides with envelope field; dropped from doc-store record"
                );
                continue;
            }
            passthrough.insert(key.clone(), value.clone());
        }
    }

    DocStoreRecord {
        source_id: envelope.source_id().to_string(),
        process_id: envelope.process_id().to_string(),
        validated: envelope.validated(),
        promoted_to: envelope.promoted_to().map(str::to_string),
        execution_signature: envelope.execution_signature().to_string(),
        timestamp_last_touched: envelope.timestamp_iso8601(),
        passthrough,
    }
}

/// Project into the relational dialect
#[must_use]
pub fn to_relational(envelope: &Envelope) -> RelationalRecord {
    RelationalRecord {
        source_id: envelope.source_id().to_string(),
        task_id: envelope.process_id().to_string(),
        approved: envelope.validated().is_approved(),
        migrated_to: envelope.promoted_to().map(str::to_string),
        process_signature: envelope.execution_signature().to_string(),
        event_timestamp: envelope.timestamp_iso8601(),
        data_payload: envelope.data_payload().cloned().unwrap_or_default(),
    }
}

/// Project into the warehouse dialect
#[must_use]
pub fn to_warehouse(envelope: &Envelope) -> WarehouseRecord {
    WarehouseRecord {
        source_id: envelope.source_id().to_string(),
        task_id: envelope.process_id().to_string(),
        analytics_approved: envelope.validated().is_approved(),
        consolidated_from: envelope.promoted_to().map(str::to_string),
        knowledge_signature: envelope.execution_signature().to_string(),
        event_timestamp: envelope.timestamp_iso8601(),
        data_payload: envelope.data_payload().cloned().unwrap_or_default(),
    }
}

/// Format an envelope for `target`
#[must_use]
pub fn format_for(envelope: &Envelope, target: Target) -> SinkRecord {
    match target {
        Target::DocStore => SinkRecord::DocStore(to_doc_store(envelope)),
        Target::Relational => SinkRecord::Relational(to_relational(envelope)),
        Target::Warehouse => SinkRecord::Warehouse(to_warehouse(envelope)),
    }
}

/// Relational column → canonical field
const RELATIONAL_COLUMNS: [(&str, &str); 7] = [
    ("source_id", fields::SOURCE_ID),
    ("task_id", fields::PROCESS_ID),
    ("approved", fields::VALIDATED),
    ("migrated_to", fields::PROMOTED_TO),
    ("process_signature", fields::EXECUTION_SIGNATURE),
    ("event_timestamp", fields::TIMESTAMP_LAST_TOUCHED),
    ("data_payload", fields::DATA_PAYLOAD),
];

/// Warehouse column → canonical field
const WAREHOUSE_COLUMNS: [(&str, &str); 7] = [
    ("source_id", fields::SOURCE_ID),
    ("task_id", fields::PROCESS_ID),
    ("analytics_approved", fields::VALIDATED),
    ("consolidated_from", fields::PROMOTED_TO),
    ("knowledge_signature", fields::EXECUTION_SIGNATURE),
    ("event_timestamp", fields::TIMESTAMP_LAST_TOUCHED),
    ("data_payload", fields::DATA_PAYLOAD),
];

/// Detect which dialect a record is shaped like
///
/// A record carrying `process_id` or `execution_signature` is doc-store (or
/// canonical) even when spread payload keys look like another dialect's
/// columns. Otherwise relational carries `task_id` + `approved`; warehouse
/// carries `analytics_approved` + `knowledge_signature`; anything else is
/// treated as doc-store.
#[must_use]
pub fn detect_dialect(record: &Map<String, Value>) -> Target {
    let has = |key: &str| record.contains_key(key);
    if has(fields::PROCESS_ID) || has(fields::EXECUTION_SIGNATURE) {
        Target::DocStore
    } else if has("task_id") && has("approved") {
        Target::Relational
    } else if has("analytics_approved") && has("knowledge_signature") {
        Target::Warehouse
    } else {
        Target::DocStore
    }
}

/// Normalise a record in any dialect back into an envelope
///
/// Doc-store records fold every non-reserved key back into `data_payload`.
/// A flat record that already carries a nested `data_payload` is the canonical
/// envelope form and is validated as-is.
///
/// # Errors
/// - [`FormatError::NotAnObject`] for non-object input
/// - [`FormatError::Invalid`] if the normalised record fails validation
pub fn from_any_format(record: &Value) -> FormatResult<Envelope> {
    let Value::Object(map) = record else {
        return Err(FormatError::NotAnObject(value_kind(record)));
    };

    let dialect = detect_dialect(map);
    let normalized = match dialect {
        Target::Relational => rename_columns(map, &RELATIONAL_COLUMNS),
        Target::Warehouse => rename_columns(map, &WAREHOUSE_COLUMNS),
        Target::DocStore if map.contains_key(fields::DATA_PAYLOAD) => map.clone(),
        Target::DocStore => fold_passthrough(map),
    };
    tracing::trace!(dialect = dialect.dialect(), "normalizing record");

    Ok(Envelope::validate(&Value::Object(normalized))?)
}

fn rename_columns(map: &Map<String, Value>, columns: &[(&str, &str)]) -> Map<String, Value> {
    columns
        .iter()
        .filter_map(|(column, field)| {
            map.get(*column)
                .map(|value| ((*field).to_string(), value.clone()))
        })
        .collect()
}

fn fold_passthrough(map: &Map<String, Value>) -> Map<String, Value> {
    let mut normalized = Map::new();
    let mut payload = Map::new();
    for (key, value) in map {
        if fields::is_reserved(key) {
            normalized.insert(key.clone(), value.clone());
        } else {
            payload.insert(key.clone(), value.clone());
        }
    }
    normalized.insert(fields::DATA_PAYLOAD.to_string(), Value::Object(payload));
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use doctrine_envelope::{ApprovalStatus, ConstructOptions};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample() -> Envelope {
        Envelope::validate(&json!({
            "source_id": "rtrvr",
            "process_id": "search_42",
            "validated": "approved",
            "promoted_to": "bq_row_1",
            "execution_signature": "0123456789abcdef0123456789abcdef",
            "timestamp_last_touched": "2025-01-02T03:04:05.678Z",
            "data_payload": {"query": "ai", "hits": 3}
        }))
        .unwrap()
    }

    #[test]
    fn doc_store_spreads_payload() {
        let value = format_for(&sample(), Target::DocStore).to_value().unwrap();
        assert_eq!(
            value,
            json!({
                "source_id": "rtrvr",
                "process_id": "search_42",
                "validated": "approved",
                "promoted_to": "bq_row_1",
                "execution_signature": "0123456789abcdef0123456789abcdef",
                "timestamp_last_touched": "2025-01-02T03:04:05.678Z",
                "query": "ai",
                "hits": 3
            })
        );
    }

    #[test]
    fn doc_store_reserved_keys_win() {
        let mut data = Map::new();
        data.insert("source_id".into(), json!("spoofed"));
        data.insert("note".into(), json!("kept"));
        let envelope = Envelope::construct("real", "op", data, ConstructOptions::new());
        let record = to_doc_store(&envelope);
        assert_eq!(record.source_id, "real");
        assert!(!record.passthrough.contains_key("source_id"));
        assert_eq!(record.passthrough.get("note"), Some(&json!("kept")));
    }

    #[test]
    fn relational_maps_columns() {
        let record = to_relational(&sample());
        assert_eq!(record.task_id, "search_42");
        assert!(record.approved);
        assert_eq!(record.migrated_to.as_deref(), Some("bq_row_1"));
        assert_eq!(record.process_signature, "0123456789abcdef0123456789abcdef");
        assert_eq!(record.event_timestamp, "2025-01-02T03:04:05.678Z");
        assert_eq!(record.data_payload.get("hits"), Some(&json!(3)));
    }

    #[test]
    fn warehouse_maps_columns() {
        let record = to_warehouse(&sample());
        assert!(record.analytics_approved);
        assert_eq!(record.consolidated_from.as_deref(), Some("bq_row_1"));
        assert_eq!(record.knowledge_signature, "0123456789abcdef0123456789abcdef");
    }

    #[test]
    fn approval_collapses_to_boolean() {
        for (validated, expected) in [
            (json!(true), true),
            (json!(false), false),
            (json!("approved"), true),
            (json!("pending"), false),
            (json!("rejected"), false),
        ] {
            let mut blob = sample().to_value();
            blob["validated"] = validated;
            let envelope = Envelope::validate(&blob).unwrap();
            assert_eq!(to_relational(&envelope).approved, expected);
            assert_eq!(to_warehouse(&envelope).analytics_approved, expected);
        }
    }

    #[test]
    fn absent_optionals_become_null_and_empty() {
        let envelope = Envelope::validate(&json!({
            "source_id": "s",
            "process_id": "p",
            "validated": false,
            "execution_signature": "sig",
            "timestamp_last_touched": "2025-01-02T03:04:05Z"
        }))
        .unwrap();
        let value = format_for(&envelope, Target::Relational).to_value().unwrap();
        assert_eq!(value["migrated_to"], Value::Null);
        assert_eq!(value["data_payload"], json!({}));
        let doc = format_for(&envelope, Target::DocStore).to_value().unwrap();
        assert_eq!(doc["promoted_to"], Value::Null);
    }

    #[test]
    fn detects_dialects() {
        let relational = to_relational(&sample());
        let warehouse = to_warehouse(&sample());
        let Value::Object(r) = serde_json::to_value(&relational).unwrap() else { unreachable!() };
        let Value::Object(w) = serde_json::to_value(&warehouse).unwrap() else { unreachable!() };
        assert_eq!(detect_dialect(&r), Target::Relational);
        assert_eq!(detect_dialect(&w), Target::Warehouse);
        assert_eq!(detect_dialect(&Map::new()), Target::DocStore);

        let mut data = Map::new();
        data.insert("task_id".into(), json!("ticket-7"));
        data.insert("approved".into(), json!(true));
        let envelope = Envelope::construct("jira", "sync_1", data, ConstructOptions::new());
        let Value::Object(d) = format_for(&envelope, Target::DocStore).to_value().unwrap() else {
            unreachable!()
        };
        assert_eq!(detect_dialect(&d), Target::DocStore);
    }

    #[test]
    fn normalizes_each_dialect() {
        let original = sample();
        let doc = format_for(&original, Target::DocStore).to_value().unwrap();
        let doc = from_any_format(&doc).unwrap();
        assert_eq!(doc, original);

        let relational = format_for(&original, Target::Relational).to_value().unwrap();
        let relational = from_any_format(&relational).unwrap();
        assert_eq!(relational.validated(), Validated::Flag(true));
        assert_eq!(relational.process_id(), original.process_id());
        assert_eq!(relational.data_payload(), original.data_payload());
    }

    #[test]
    fn canonical_form_is_accepted() {
        let original = sample();
        assert_eq!(from_any_format(&original.to_value()).unwrap(), original);
    }

    #[test]
    fn normalize_reports_canonical_field_names() {
        let err = from_any_format(&json!({
            "source_id": "s",
            "task_id": "",
            "approved": true,
            "process_signature": "sig",
            "event_timestamp": "2025-01-02T03:04:05Z"
        }))
        .unwrap_err();
        let FormatError::Invalid(validation) = err else {
            panic!("expected validation failure");
        };
        assert!(validation.mentions("process_id"));
    }

    #[test]
    fn normalize_rejects_non_objects() {
        assert!(matches!(
            from_any_format(&json!("flat string")),
            Err(FormatError::NotAnObject("string"))
        ));
    }

    #[test]
    fn target_parsing() {
        assert_eq!("doc_store".parse::<Target>().unwrap(), Target::DocStore);
        assert_eq!("STAMPED".parse::<Target>().unwrap(), Target::Relational);
        assert_eq!(" warehouse ".parse::<Target>().unwrap(), Target::Warehouse);
        assert!(matches!("mongo".parse::<Target>(), Err(FormatError::UnknownTarget(_))));
        assert_eq!(Target::Warehouse.dialect(), "STACKED");
        assert_eq!(
            serde_json::to_value(Target::DocStore).unwrap(),
            json!("doc_store")
        );
    }

    #[test]
    fn status_survives_doc_store() {
        let mut blob = sample().to_value();
        blob["validated"] = json!("pending");
        let envelope = Envelope::validate(&blob).unwrap();
        let doc = format_for(&envelope, Target::DocStore).to_value().unwrap();
        let back = from_any_format(&doc).unwrap();
        assert_eq!(back.validated(), Validated::Status(ApprovalStatus::Pending));
    }
}
