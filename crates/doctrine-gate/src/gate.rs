//! Enforcement gate
//!
//! The only sanctioned path from caller data to a sink-ready record.
//!
//! ```text
//! raw ──► mode? ──DISABLED─────────────────────► Unchecked(raw)
//!           │
//!           └─► validate ──ok──► success log ──► Checked(envelope)
//!                  │
//!                  └─fail─► record + snapshot ─┬─STRICT─────► DoctrineViolation
//!                                              └─PERMISSIVE─► repair once
//!                                                               ├─ok───► Repaired
//!                                                               └─fail─► DoctrineViolation
//! ```
//!
//! The whole composed operation runs under one mutex.

use crate::audit::{best_effort, report_file_name, AuditSink, SUCCESS_LOG, VIOLATIONS_PREFIX};
use crate::config::GateConfig;
use crate::error::{AuditError, DoctrineViolation, GateError};
use crate::mode::EnforcementMode;
use crate::violation::{ViolationRecord, ViolationSummary};
use chrono::Utc;
use doctrine_envelope::{fields, iso8601, ConstructOptions, Envelope, ValidationError};
use doctrine_format::{format_for, SinkRecord, Target};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use ulid::Ulid;

/// Operation name used when the caller supplies none
pub const UNKNOWN_OPERATION: &str = "unknown";

/// Blueprint tagged on repaired envelopes
pub const REPAIR_BLUEPRINT: &str = "emergency_repair";

/// `schema_compliance` marker on success log entries
pub const SCHEMA_COMPLIANCE: &str = "ENVELOPE_DOCTRINE";

/// Keys tried, in order, for a repaired envelope's `source_id`
const SOURCE_KEYS: [&str; 2] = ["source_id", "sourceId"];

/// Keys tried, in order, for a repaired envelope's `process_id`
const PROCESS_KEYS: [&str; 3] = ["process_id", "task_id", "processId"];

/// Outcome of an admitted payload
#[derive(Debug, Clone, PartialEq)]
pub enum Admitted {
    /// Payload was a valid envelope
    Checked(Envelope),
    /// Payload failed validation and was repaired (permissive mode)
    Repaired {
        /// Freshly constructed envelope wrapping the raw payload
        envelope: Envelope,
        /// The recorded violation
        violation: ViolationRecord,
    },
    /// Enforcement disabled; payload passed through untouched
    Unchecked(Value),
}

impl Admitted {
    /// The envelope, unless the payload passed unchecked
    #[must_use]
    pub fn envelope(&self) -> Option<&Envelope> {
        match self {
            Self::Checked(envelope) | Self::Repaired { envelope, .. } => Some(envelope),
            Self::Unchecked(_) => None,
        }
    }

    /// Convert into an envelope; unchecked payloads are validated here
    ///
    /// # Errors
    /// [`ValidationError`] if an unchecked payload is not an envelope.
    pub fn into_envelope(self) -> Result<Envelope, ValidationError> {
        match self {
            Self::Checked(envelope) | Self::Repaired { envelope, .. } => Ok(envelope),
            Self::Unchecked(raw) => Envelope::validate(&raw),
        }
    }
}

#[derive(Debug, Serialize)]
struct SuccessEntry<'a> {
    timestamp: String,
    tool: &'a str,
    operation: &'a str,
    status: &'static str,
    schema_compliance: &'static str,
    execution_signature: &'a str,
}

#[derive(Debug, Serialize)]
struct ViolationReport<'a> {
    timestamp: String,
    total_violations: usize,
    enforcement_enabled: bool,
    strict_mode: bool,
    violations: &'a [ViolationRecord],
}

#[derive(Debug)]
struct GateState {
    enabled: bool,
    strict: bool,
    violations: Vec<ViolationRecord>,
    flushed: usize,
}

impl GateState {
    fn mode(&self) -> EnforcementMode {
        EnforcementMode::from_flags(self.enabled, self.strict)
    }
}

/// Enforcement gate
///
/// Construct once and share through `Arc`.
#[derive(Debug)]
pub struct EnforcementGate {
    state: Mutex<GateState>,
    audit: Arc<dyn AuditSink>,
}

impl EnforcementGate {
    /// Gate in the mode `config` names, auditing to `audit`
    #[must_use]
    pub fn new(config: &GateConfig, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            state: Mutex::new(GateState {
                enabled: config.enabled,
                strict: config.strict,
                violations: Vec::new(),
                flushed: 0,
            }),
            audit,
        }
    }

    /// Current mode
    #[must_use]
    pub fn mode(&self) -> EnforcementMode {
        self.state.lock().mode()
    }

    /// Turn validation on or off
    pub fn set_enabled(&self, enabled: bool) {
        let mut state = self.state.lock();
        state.enabled = enabled;
        if enabled {
            tracing::info!(mode = %state.mode(), "doctrine enforcement enabled");
        } else {
            tracing::warn!("doctrine enforcement DISABLED; payloads will pass unchecked");
        }
    }

    /// Switch between strict and permissive policy
    pub fn set_strict(&self, strict: bool) {
        let mut state = self.state.lock();
        state.strict = strict;
        let label = if strict { "on" } else { "off" };
        tracing::info!(mode = %state.mode(), "doctrine strict mode {label}");
    }

    /// Validate `raw` on behalf of `tool_name`
    ///
    /// Disabled: passes `raw` through unchecked. Otherwise validates; a
    /// failure is recorded, then rejected (strict) or repaired once
    /// (permissive). `raw` is never mutated.
    ///
    /// # Errors
    /// [`DoctrineViolation`] when the policy refuses the payload.
    pub fn validate_payload(
        &self,
        raw: &Value,
        tool_name: &str,
        operation: &str,
    ) -> Result<Admitted, DoctrineViolation> {
        let mut state = self.state.lock();
        let mode = state.mode();

        if !mode.is_enabled() {
            tracing::warn!(
                tool = tool_name,
                operation,
                "doctrine enforcement disabled; payload passed UNCHECKED"
            );
            return Ok(Admitted::Unchecked(raw.clone()));
        }

        let record = match self.check(&mut state, raw, tool_name, operation) {
            Ok(envelope) => return Ok(Admitted::Checked(envelope)),
            Err(record) => record,
        };

        if mode.is_strict() {
            return Err(DoctrineViolation::rejected(record));
        }

        match repair(raw, tool_name) {
            Ok(envelope) => {
                tracing::warn!(
                    tool = tool_name,
                    operation,
                    source_id = envelope.source_id(),
                    process_id = envelope.process_id(),
                    signature = %envelope.execution_signature(),
                    "payload repaired into a fresh envelope"
                );
                Ok(Admitted::Repaired {
                    envelope,
                    violation: record,
                })
            }
            Err(err) => {
                tracing::error!(tool = tool_name, operation, error = %err, "repair failed");
                Err(DoctrineViolation::repair_failed(record))
            }
        }
    }

    /// Validate with strict semantics regardless of mode
    pub(crate) fn validate_strict(
        &self,
        raw: &Value,
        tool_name: &str,
        operation: &str,
    ) -> Result<Envelope, DoctrineViolation> {
        let mut state = self.state.lock();
        self.check(&mut state, raw, tool_name, operation)
            .map_err(DoctrineViolation::rejected)
    }

    /// Validate for `target` and return the envelope
    ///
    /// # Errors
    /// - [`GateError::Violation`] when the policy refuses the payload
    /// - [`GateError::Unchecked`] when the gate is disabled and `raw` is not an envelope
    pub fn admit_for(
        &self,
        target: Target,
        raw: &Value,
        tool_name: &str,
    ) -> Result<Envelope, GateError> {
        let operation = format!("{target}_operation");
        self.validate_payload(raw, tool_name, &operation)?
            .into_envelope()
            .map_err(GateError::Unchecked)
    }

    /// Validate then format for `target`
    ///
    /// # Errors
    /// As [`EnforcementGate::admit_for`].
    pub fn database_operation(
        &self,
        target: Target,
        raw: &Value,
        tool_name: &str,
    ) -> Result<SinkRecord, GateError> {
        let envelope = self.admit_for(target, raw, tool_name)?;
        Ok(format_for(&envelope, target))
    }

    /// Aggregate over recorded violations
    #[must_use]
    pub fn get_violation_summary(&self) -> ViolationSummary {
        ViolationSummary::from_records(&self.state.lock().violations)
    }

    /// Every recorded violation, oldest first
    #[must_use]
    pub fn violations(&self) -> Vec<ViolationRecord> {
        self.state.lock().violations.clone()
    }

    /// Persist the aggregate violation report
    ///
    /// Writes only when violations arrived since the last flush. Returns the
    /// report path if one was written.
    pub fn flush(&self) -> Option<PathBuf> {
        let mut state = self.state.lock();
        if state.violations.len() == state.flushed {
            return None;
        }
        let path = self.write_report(&state);
        if path.is_some() {
            state.flushed = state.violations.len();
            tracing::info!(total = state.violations.len(), "violation report flushed");
        }
        path
    }

    fn check(
        &self,
        state: &mut GateState,
        raw: &Value,
        tool_name: &str,
        operation: &str,
    ) -> Result<Envelope, ViolationRecord> {
        match Envelope::validate(raw) {
            Ok(envelope) => {
                tracing::debug!(
                    tool = tool_name,
                    operation,
                    signature = %envelope.execution_signature(),
                    "payload compliant"
                );
                self.log_success(tool_name, operation, &envelope);
                Ok(envelope)
            }
            Err(err) => {
                let record = ViolationRecord::capture(tool_name, operation, &err, raw);
                tracing::error!(
                    tool = tool_name,
                    operation,
                    error = %err,
                    total = state.violations.len() + 1,
                    "DOCTRINE VIOLATION"
                );
                state.violations.push(record.clone());
                self.write_report(state);
                Err(record)
            }
        }
    }

    fn log_success(&self, tool_name: &str, operation: &str, envelope: &Envelope) {
        let entry = SuccessEntry {
            timestamp: iso8601(&Utc::now()),
            tool: tool_name,
            operation,
            status: "SUCCESS",
            schema_compliance: SCHEMA_COMPLIANCE,
            execution_signature: envelope.execution_signature().as_str(),
        };
        let line = serde_json::to_string(&entry).map_err(AuditError::from);
        best_effort(
            line.and_then(|line| self.audit.append_line(SUCCESS_LOG, &line)),
            SUCCESS_LOG,
        );
    }

    fn write_report(&self, state: &GateState) -> Option<PathBuf> {
        let now = Utc::now();
        let report = ViolationReport {
            timestamp: iso8601(&now),
            total_violations: state.violations.len(),
            enforcement_enabled: state.enabled,
            strict_mode: state.strict,
            violations: &state.violations,
        };
        let file = report_file_name(VIOLATIONS_PREFIX, now);
        let written = serde_json::to_value(&report)
            .map_err(AuditError::from)
            .and_then(|body| self.audit.write_report(&file, &body));
        best_effort(written, &file)
    }
}

/// Build a fresh envelope around a payload that failed validation
///
/// `source_id` and `process_id` are taken from the first non-empty string
/// under [`SOURCE_KEYS`] / [`PROCESS_KEYS`], falling back to the tool name and
/// `repair_<ulid>`. A blob that already carries an object `data_payload`
/// keeps that payload; other object blobs become `data_payload` verbatim;
/// anything else is wrapped as `{"raw_payload": ...}`. Attempted exactly once.
fn repair(raw: &Value, tool_name: &str) -> Result<Envelope, ValidationError> {
    let source_id = first_text(raw, &SOURCE_KEYS).unwrap_or(tool_name).to_string();
    let process_id = first_text(raw, &PROCESS_KEYS)
        .map_or_else(|| format!("repair_{}", Ulid::new()), str::to_string);

    let data = match raw {
        Value::Object(map) => match map.get(fields::DATA_PAYLOAD) {
            Some(Value::Object(payload)) => payload.clone(),
            _ => map.clone(),
        },
        other => {
            let mut wrapped = Map::new();
            wrapped.insert("raw_payload".to_string(), other.clone());
            wrapped
        }
    };

    let envelope = Envelope::construct(
        source_id,
        process_id,
        data,
        ConstructOptions::new()
            .with_agent_id(tool_name)
            .with_blueprint_id(REPAIR_BLUEPRINT),
    );
    Envelope::validate(&envelope.to_value())
}

fn first_text<'a>(raw: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| raw.get(*key).and_then(Value::as_str))
        .find(|text| !text.is_empty())
}
