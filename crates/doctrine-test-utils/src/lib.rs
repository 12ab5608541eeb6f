//! Testing utilities for the doctrine workspace
//!
//! Shared fixtures, in-memory gate builders and a recording terminator.

#![allow(missing_docs)]

use doctrine_envelope::{ConstructOptions, Envelope};
use doctrine_gate::{
    AuditSink, EnforcementGate, FileAuditSink, GateConfig, MemoryAuditSink, NuclearConfig,
    NuclearGate, Terminator,
};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tempfile::TempDir;

/// Records exit codes instead of exiting
#[derive(Debug, Default)]
pub struct RecordingTerminator {
    calls: Mutex<Vec<i32>>,
}

impl RecordingTerminator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<i32> {
        self.calls.lock().clone()
    }

    pub fn terminated(&self) -> bool {
        !self.calls.lock().is_empty()
    }
}

impl Terminator for RecordingTerminator {
    fn terminate(&self, exit_code: i32) {
        self.calls.lock().push(exit_code);
    }
}

pub fn sample_data() -> Map<String, Value> {
    let mut data = Map::new();
    data.insert("query".into(), json!("ai"));
    data
}

pub fn sample_envelope() -> Envelope {
    Envelope::construct(
        "rtrvr",
        "search_42",
        sample_data(),
        ConstructOptions::new().with_agent_id("rtrvr"),
    )
}

pub fn sample_raw() -> Value {
    sample_envelope().to_value()
}

/// Well-formed apart from the missing `process_id`
pub fn missing_process_id() -> Value {
    let mut raw = sample_raw();
    if let Some(map) = raw.as_object_mut() {
        map.remove("process_id");
    }
    raw
}

/// Malformed and carrying credentials
pub fn secret_bearing_blob() -> Value {
    json!({
        "source_id": "apify",
        "validated": false,
        "password": "hunter2",
        "api_key": "sk-live-0000",
        "data_payload": {"auth": "Bearer abc"}
    })
}

pub fn memory_gate(config: &GateConfig) -> (Arc<EnforcementGate>, Arc<MemoryAuditSink>) {
    let audit = Arc::new(MemoryAuditSink::new());
    let gate = Arc::new(EnforcementGate::new(config, audit.clone()));
    (gate, audit)
}

pub fn strict_gate() -> (Arc<EnforcementGate>, Arc<MemoryAuditSink>) {
    memory_gate(&GateConfig::default())
}

pub fn permissive_gate() -> (Arc<EnforcementGate>, Arc<MemoryAuditSink>) {
    memory_gate(&GateConfig::default().with_strict(false))
}

/// Gate whose audit trail lands in a temp directory
pub struct FileGate {
    pub dir: TempDir,
    pub gate: Arc<EnforcementGate>,
}

pub fn file_gate(config: &GateConfig) -> FileGate {
    let dir = tempfile::tempdir().expect("temp dir");
    let audit: Arc<dyn AuditSink> = Arc::new(FileAuditSink::new(dir.path()));
    FileGate {
        gate: Arc::new(EnforcementGate::new(config, audit)),
        dir,
    }
}

/// Armed-or-not zero-tolerance gate over in-memory sinks
pub struct NuclearHarness {
    pub gate: Arc<EnforcementGate>,
    pub gate_audit: Arc<MemoryAuditSink>,
    pub nuclear: NuclearGate,
    pub nuclear_audit: Arc<MemoryAuditSink>,
    pub terminator: Arc<RecordingTerminator>,
}

pub fn nuclear_harness(config: NuclearConfig) -> NuclearHarness {
    let (gate, gate_audit) = strict_gate();
    let nuclear_audit = Arc::new(MemoryAuditSink::new());
    let terminator = Arc::new(RecordingTerminator::new());
    let nuclear = NuclearGate::new(config, gate.clone(), nuclear_audit.clone(), terminator.clone());
    NuclearHarness {
        gate,
        gate_audit,
        nuclear,
        nuclear_audit,
        terminator,
    }
}

pub fn armed_harness() -> NuclearHarness {
    let harness = nuclear_harness(NuclearConfig::default());
    harness.nuclear.arm().expect("fresh gate arms");
    harness
}
