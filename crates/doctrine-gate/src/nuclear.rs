//! Zero-tolerance ("nuclear") enforcement
//!
//! Layered over the same validation primitive as [`EnforcementGate`], with
//! its own state and an irreversibility rule: every failing tool is
//! blacklisted, and reaching `max_violations` locks the system, persists a
//! shutdown report and terminates the process. Only
//! [`NuclearGate::manual_recovery`] undoes any of it.
//!
//! Lock order is nuclear state, then gate state. Each public operation is a
//! single critical section.

use crate::audit::{
    best_effort, report_file_name, AuditSink, NUCLEAR_EVENTS_LOG, NUCLEAR_SHUTDOWN_PREFIX,
};
use crate::config::NuclearConfig;
use crate::error::{AuditError, NuclearDoctrineViolation, NuclearError};
use crate::gate::EnforcementGate;
use crate::violation::ViolationRecord;
use chrono::Utc;
use doctrine_envelope::{iso8601, Envelope};
use doctrine_format::{format_for, SinkRecord, Target};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::sync::Arc;

/// Terminates the process on zero-tolerance shutdown
pub trait Terminator: Send + Sync + Debug {
    /// End the process with `exit_code`
    fn terminate(&self, exit_code: i32);
}

/// Calls [`std::process::exit`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessTerminator;

impl Terminator for ProcessTerminator {
    fn terminate(&self, exit_code: i32) {
        std::process::exit(exit_code);
    }
}

/// State tag on nuclear events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NuclearPhase {
    /// Armed
    Active,
    /// Payload passed
    Compliant,
    /// Payload failed
    Violation,
    /// Shut down
    Locked,
    /// Manually recovered
    Recovered,
}

/// One zero-tolerance audit event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NuclearEvent {
    /// ISO-8601 instant
    pub timestamp: String,
    /// Tool involved, or `"SYSTEM"`
    pub tool: String,
    /// Operation name
    pub operation: String,
    /// Event name, e.g. `NUCLEAR_VIOLATION_1`
    pub event: String,
    /// State after the event
    pub state: NuclearPhase,
    /// Running violation count
    pub violation_count: u32,
    /// Lock flag after the event
    pub system_locked: bool,
    /// Blacklist after the event
    pub blacklisted_tools: Vec<String>,
}

/// Read-only snapshot of the zero-tolerance state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NuclearStatus {
    /// Whether `arm()` has been called
    pub armed: bool,
    /// Violations since arming or recovery
    pub violation_count: u32,
    /// Shutdown threshold
    pub max_violations: u32,
    /// Whether shutdown fired
    pub system_locked: bool,
    /// Permanently refused tools
    pub blacklisted_tools: BTreeSet<String>,
    /// Every event since construction
    pub event_log: Vec<NuclearEvent>,
}

#[derive(Debug, Serialize)]
struct ShutdownReport<'a> {
    timestamp: String,
    nuclear_mode: bool,
    violation_count: u32,
    max_violations: u32,
    system_locked: bool,
    blacklisted_tools: &'a BTreeSet<String>,
    event_log: &'a [NuclearEvent],
    final_violation: &'a ViolationRecord,
}

#[derive(Debug, Default)]
struct NuclearState {
    armed: bool,
    violation_count: u32,
    system_locked: bool,
    blacklisted: BTreeSet<String>,
    events: Vec<NuclearEvent>,
}

const SYSTEM_TOOL: &str = "SYSTEM";

/// Zero-tolerance gate
#[derive(Debug)]
pub struct NuclearGate {
    config: NuclearConfig,
    gate: Arc<EnforcementGate>,
    audit: Arc<dyn AuditSink>,
    terminator: Arc<dyn Terminator>,
    state: Mutex<NuclearState>,
}

impl NuclearGate {
    /// Unarmed gate delegating validation to `gate`
    #[must_use]
    pub fn new(
        config: NuclearConfig,
        gate: Arc<EnforcementGate>,
        audit: Arc<dyn AuditSink>,
        terminator: Arc<dyn Terminator>,
    ) -> Self {
        Self {
            config,
            gate,
            audit,
            terminator,
            state: Mutex::new(NuclearState::default()),
        }
    }

    /// Activate zero tolerance
    ///
    /// # Errors
    /// [`NuclearError::AlreadyArmed`] on a second call.
    pub fn arm(&self) -> Result<(), NuclearError> {
        let mut state = self.state.lock();
        if state.armed {
            return Err(NuclearError::AlreadyArmed);
        }
        state.armed = true;
        tracing::warn!(
            max_violations = self.config.max_violations,
            "ZERO-TOLERANCE MODE ARMED"
        );
        self.record_event(
            &mut state,
            SYSTEM_TOOL,
            "arm",
            "NUCLEAR_MODE_ENABLED".to_string(),
            NuclearPhase::Active,
        );
        Ok(())
    }

    /// Validate under zero tolerance
    ///
    /// # Errors
    /// - [`NuclearError::NotArmed`] before [`NuclearGate::arm`]
    /// - [`NuclearError::SystemLocked`] / [`NuclearError::ToolBlacklisted`]
    ///   without attempting validation
    /// - [`NuclearError::Violation`] when validation fails; the tool is
    ///   blacklisted and shutdown fires once the limit is reached
    pub fn nuclear_validate(
        &self,
        raw: &Value,
        tool_name: &str,
        operation: &str,
    ) -> Result<Envelope, NuclearError> {
        let mut state = self.state.lock();
        self.validate_locked(&mut state, raw, tool_name, operation)
    }

    /// [`NuclearGate::nuclear_validate`] then format for `target`
    ///
    /// # Errors
    /// As [`NuclearGate::nuclear_validate`].
    pub fn nuclear_database_operation(
        &self,
        target: Target,
        raw: &Value,
        tool_name: &str,
    ) -> Result<SinkRecord, NuclearError> {
        let operation = format!("{target}_operation");
        let mut state = self.state.lock();
        let envelope = self.validate_locked(&mut state, raw, tool_name, &operation)?;
        let record = format_for(&envelope, target);
        self.record_event(
            &mut state,
            tool_name,
            &operation,
            "NUCLEAR_DATABASE_SUCCESS".to_string(),
            NuclearPhase::Compliant,
        );
        Ok(record)
    }

    /// Shut down on a violation that escaped the host's normal handling
    ///
    /// Locks, writes the shutdown report and terminates; the counter and
    /// blacklist are left as they are. Returns whether shutdown fired; it
    /// never fires when unarmed or already locked.
    pub fn escalate(&self, violation: &ViolationRecord) -> bool {
        let mut state = self.state.lock();
        if !state.armed || state.system_locked {
            return false;
        }
        tracing::error!(
            tool = %violation.tool,
            operation = %violation.operation,
            "escaped doctrine violation escalated"
        );
        self.shutdown(&mut state, violation);
        true
    }

    /// Clear blacklist, counter and lock, and disarm
    ///
    /// # Errors
    /// [`NuclearError::RecoveryDenied`] for any code but the configured one.
    pub fn manual_recovery(&self, authorization_code: &str) -> Result<(), NuclearError> {
        if authorization_code != self.config.recovery_code {
            tracing::error!("manual recovery denied: invalid authorization code");
            return Err(NuclearError::RecoveryDenied);
        }
        let mut state = self.state.lock();
        state.armed = false;
        state.violation_count = 0;
        state.system_locked = false;
        state.blacklisted.clear();
        tracing::warn!("manual recovery performed; zero-tolerance mode disarmed");
        self.record_event(
            &mut state,
            SYSTEM_TOOL,
            "manual_recovery",
            "MANUAL_RECOVERY".to_string(),
            NuclearPhase::Recovered,
        );
        Ok(())
    }

    /// Current state snapshot
    #[must_use]
    pub fn status(&self) -> NuclearStatus {
        let state = self.state.lock();
        NuclearStatus {
            armed: state.armed,
            violation_count: state.violation_count,
            max_violations: self.config.max_violations,
            system_locked: state.system_locked,
            blacklisted_tools: state.blacklisted.clone(),
            event_log: state.events.clone(),
        }
    }

    /// Underlying standard gate
    #[must_use]
    pub fn gate(&self) -> &Arc<EnforcementGate> {
        &self.gate
    }

    fn validate_locked(
        &self,
        state: &mut NuclearState,
        raw: &Value,
        tool_name: &str,
        operation: &str,
    ) -> Result<Envelope, NuclearError> {
        if !state.armed {
            return Err(NuclearError::NotArmed);
        }
        if state.system_locked {
            tracing::error!(tool = tool_name, operation, "rejected: system locked");
            return Err(NuclearError::SystemLocked);
        }
        if state.blacklisted.contains(tool_name) {
            tracing::error!(tool = tool_name, operation, "rejected: tool blacklisted");
            return Err(NuclearError::ToolBlacklisted(tool_name.to_string()));
        }

        match self.gate.validate_strict(raw, tool_name, operation) {
            Ok(envelope) => {
                self.record_event(
                    state,
                    tool_name,
                    operation,
                    "VALIDATION_SUCCESS".to_string(),
                    NuclearPhase::Compliant,
                );
                Ok(envelope)
            }
            Err(violation) => {
                state.violation_count += 1;
                let count = state.violation_count;
                state.blacklisted.insert(tool_name.to_string());
                tracing::error!(
                    tool = tool_name,
                    operation,
                    violation_count = count,
                    max_violations = self.config.max_violations,
                    "ZERO-TOLERANCE VIOLATION; tool blacklisted"
                );
                self.record_event(
                    state,
                    tool_name,
                    operation,
                    format!("NUCLEAR_VIOLATION_{count}"),
                    NuclearPhase::Violation,
                );

                let record = violation.into_record();
                let shutdown = count >= self.config.max_violations;
                if shutdown {
                    self.shutdown(state, &record);
                }
                Err(NuclearDoctrineViolation {
                    record,
                    violation_count: count,
                    shutdown,
                }
                .into())
            }
        }
    }

    fn shutdown(&self, state: &mut NuclearState, trigger: &ViolationRecord) {
        state.system_locked = true;
        tracing::error!(
            violation_count = state.violation_count,
            exit_code = self.config.exit_code,
            "ZERO-TOLERANCE SHUTDOWN"
        );
        self.record_event(
            state,
            &trigger.tool,
            &trigger.operation,
            "NUCLEAR_SHUTDOWN".to_string(),
            NuclearPhase::Locked,
        );

        let now = Utc::now();
        let report = ShutdownReport {
            timestamp: iso8601(&now),
            nuclear_mode: state.armed,
            violation_count: state.violation_count,
            max_violations: self.config.max_violations,
            system_locked: state.system_locked,
            blacklisted_tools: &state.blacklisted,
            event_log: &state.events,
            final_violation: trigger,
        };
        let file = report_file_name(NUCLEAR_SHUTDOWN_PREFIX, now);
        let written = serde_json::to_value(&report)
            .map_err(AuditError::from)
            .and_then(|body| self.audit.write_report(&file, &body));
        best_effort(written, &file);
        self.gate.flush();

        self.terminator.terminate(self.config.exit_code);
    }

    fn record_event(
        &self,
        state: &mut NuclearState,
        tool: &str,
        operation: &str,
        event: String,
        phase: NuclearPhase,
    ) {
        let event = NuclearEvent {
            timestamp: iso8601(&Utc::now()),
            tool: tool.to_string(),
            operation: operation.to_string(),
            event,
            state: phase,
            violation_count: state.violation_count,
            system_locked: state.system_locked,
            blacklisted_tools: state.blacklisted.iter().cloned().collect(),
        };
        let line = serde_json::to_string(&event).map_err(AuditError::from);
        best_effort(
            line.and_then(|line| self.audit.append_line(NUCLEAR_EVENTS_LOG, &line)),
            NUCLEAR_EVENTS_LOG,
        );
        state.events.push(event);
    }
}
