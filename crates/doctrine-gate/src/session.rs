//! Per-tool sessions
//!
//! A [`ToolSession`] is how an integration wrapper talks to the gate: it
//! stamps its tool name on every envelope and routes every write through
//! [`EnforcementGate::admit_for`].

use crate::error::GateError;
use crate::gate::{Admitted, EnforcementGate};
use doctrine_envelope::{ConstructOptions, Envelope};
use doctrine_format::{DocStoreDocument, RelationalUpsert, Target, WarehouseInsert};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Handle bound to one calling tool
#[derive(Debug, Clone)]
pub struct ToolSession {
    tool: String,
    gate: Arc<EnforcementGate>,
}

impl ToolSession {
    /// Open a session; pins the shared gate to enabled + strict
    ///
    /// # Errors
    /// [`GateError::MissingField`] for a blank tool name.
    pub fn open(
        tool_name: impl Into<String>,
        gate: Arc<EnforcementGate>,
    ) -> Result<Self, GateError> {
        let tool = tool_name.into();
        if tool.trim().is_empty() {
            return Err(GateError::MissingField("tool_name"));
        }
        gate.set_enabled(true);
        gate.set_strict(true);
        tracing::info!(tool = %tool, "tool session opened");
        Ok(Self { tool, gate })
    }

    /// Tool name
    #[must_use]
    pub fn tool_name(&self) -> &str {
        &self.tool
    }

    /// Build a fresh envelope with this tool as `agent_id`
    ///
    /// # Errors
    /// [`GateError::MissingField`] for an empty source or process id.
    pub fn create_payload(
        &self,
        source_id: &str,
        process_id: &str,
        data: Map<String, Value>,
        options: ConstructOptions,
    ) -> Result<Envelope, GateError> {
        if source_id.is_empty() {
            return Err(GateError::MissingField("source_id"));
        }
        if process_id.is_empty() {
            return Err(GateError::MissingField("process_id"));
        }
        Ok(Envelope::construct(
            source_id,
            process_id,
            data,
            options.with_agent_id(self.tool.clone()),
        ))
    }

    /// Validate `raw` through the gate
    ///
    /// # Errors
    /// [`GateError::Violation`] when the gate refuses the payload.
    pub fn validate(&self, raw: &Value) -> Result<Admitted, GateError> {
        Ok(self.gate.validate_payload(raw, &self.tool, "validate")?)
    }

    /// Validate and build a doc-store document for `collection`
    ///
    /// # Errors
    /// As [`EnforcementGate::admit_for`].
    pub fn save_to_doc_store(
        &self,
        collection: &str,
        raw: &Value,
    ) -> Result<DocStoreDocument, GateError> {
        let envelope = self.gate.admit_for(Target::DocStore, raw, &self.tool)?;
        Ok(DocStoreDocument::build(collection, &envelope)?)
    }

    /// Validate and build a relational upsert into `table`
    ///
    /// # Errors
    /// As [`EnforcementGate::admit_for`], plus [`GateError::Format`] for an
    /// unsafe table name.
    pub fn save_to_relational(
        &self,
        table: &str,
        raw: &Value,
    ) -> Result<RelationalUpsert, GateError> {
        let envelope = self.gate.admit_for(Target::Relational, raw, &self.tool)?;
        Ok(RelationalUpsert::build(table, &envelope)?)
    }

    /// Validate and build a warehouse insert
    ///
    /// # Errors
    /// As [`ToolSession::save_to_relational`].
    pub fn save_to_warehouse(
        &self,
        dataset: &str,
        table: &str,
        raw: &Value,
    ) -> Result<WarehouseInsert, GateError> {
        let envelope = self.gate.admit_for(Target::Warehouse, raw, &self.tool)?;
        Ok(WarehouseInsert::build(dataset, table, &envelope)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::config::GateConfig;
    use crate::mode::EnforcementMode;
    use serde_json::json;

    fn permissive_gate() -> Arc<EnforcementGate> {
        Arc::new(EnforcementGate::new(
            &GateConfig::default().with_strict(false),
            Arc::new(MemoryAuditSink::new()),
        ))
    }

    #[test]
    fn open_pins_strict() {
        let gate = permissive_gate();
        let session = ToolSession::open("rtrvr", gate.clone()).unwrap();
        assert_eq!(session.tool_name(), "rtrvr");
        assert_eq!(gate.mode(), EnforcementMode::EnabledStrict);
        assert!(matches!(
            ToolSession::open("  ", gate),
            Err(GateError::MissingField("tool_name"))
        ));
    }

    #[test]
    fn create_payload_rejects_empty_ids() {
        let session = ToolSession::open("apify", permissive_gate()).unwrap();
        assert!(matches!(
            session.create_payload("", "crawl", Map::new(), ConstructOptions::new()),
            Err(GateError::MissingField("source_id"))
        ));
        assert!(matches!(
            session.create_payload("apify", "", Map::new(), ConstructOptions::new()),
            Err(GateError::MissingField("process_id"))
        ));
    }

    #[test]
    fn saves_route_through_the_gate() {
        let gate = permissive_gate();
        let session = ToolSession::open("apify", gate.clone()).unwrap();
        let envelope = session
            .create_payload("apify", "crawl", Map::new(), ConstructOptions::new())
            .unwrap();

        let upsert = session.save_to_relational("events", &envelope.to_value()).unwrap();
        assert_eq!(upsert.params[1], json!("crawl"));
        let doc = session.save_to_doc_store("memory", &envelope.to_value()).unwrap();
        assert_eq!(doc.document["collection_type"], json!("working_memory"));
        let insert = session
            .save_to_warehouse("analytics", "events", &envelope.to_value())
            .unwrap();
        assert_eq!(insert.rows.len(), 1);

        assert!(session.save_to_relational("events", &json!({})).unwrap_err().is_fatal());
        assert_eq!(gate.get_violation_summary().by_tool["apify"], 1);
    }
}
