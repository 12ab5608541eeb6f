//! Process-wide runtime
//!
//! [`DoctrineRuntime::install`] is the entry-point factory: it wires the
//! gate, the zero-tolerance gate and their file audit sinks exactly once per
//! process. Everything else receives the pieces by `Arc`.

use crate::audit::{AuditSink, FileAuditSink};
use crate::config::GateConfig;
use crate::error::{GateError, RuntimeError};
use crate::gate::EnforcementGate;
use crate::nuclear::{NuclearGate, Terminator};
use crate::session::ToolSession;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Gate, zero-tolerance gate and their configuration
#[derive(Debug)]
pub struct DoctrineRuntime {
    config: GateConfig,
    gate: Arc<EnforcementGate>,
    nuclear: Arc<NuclearGate>,
}

impl DoctrineRuntime {
    /// Install the process runtime, auditing to the configured directories
    ///
    /// # Errors
    /// - [`RuntimeError::AlreadyInstalled`] on a second call in this process
    /// - [`RuntimeError::Config`] if `config` fails validation
    pub fn install(
        config: GateConfig,
        terminator: Arc<dyn Terminator>,
    ) -> Result<Self, RuntimeError> {
        config.validate()?;
        if INSTALLED
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(RuntimeError::AlreadyInstalled);
        }

        let gate_audit = Arc::new(FileAuditSink::new(config.log_dir.clone()));
        let nuclear_audit = Arc::new(FileAuditSink::new(config.nuclear.log_dir.clone()));
        tracing::info!(
            log_dir = %config.log_dir.display(),
            nuclear_log_dir = %config.nuclear.log_dir.display(),
            enabled = config.enabled,
            strict = config.strict,
            "doctrine runtime installed"
        );
        Ok(Self::with_sinks(config, gate_audit, nuclear_audit, terminator))
    }

    /// Wire a runtime over explicit sinks, outside the once-per-process guard
    #[must_use]
    pub fn with_sinks(
        config: GateConfig,
        gate_audit: Arc<dyn AuditSink>,
        nuclear_audit: Arc<dyn AuditSink>,
        terminator: Arc<dyn Terminator>,
    ) -> Self {
        let gate = Arc::new(EnforcementGate::new(&config, gate_audit));
        let nuclear = Arc::new(NuclearGate::new(
            config.nuclear.clone(),
            gate.clone(),
            nuclear_audit,
            terminator,
        ));
        Self {
            config,
            gate,
            nuclear,
        }
    }

    /// Effective configuration
    #[must_use]
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Standard gate
    #[must_use]
    pub fn gate(&self) -> &Arc<EnforcementGate> {
        &self.gate
    }

    /// Zero-tolerance gate
    #[must_use]
    pub fn nuclear(&self) -> &Arc<NuclearGate> {
        &self.nuclear
    }

    /// Open a session for `tool_name`
    ///
    /// # Errors
    /// [`GateError::MissingField`] for a blank tool name.
    pub fn session(&self, tool_name: &str) -> Result<ToolSession, GateError> {
        ToolSession::open(tool_name, self.gate.clone())
    }

    /// Flush accumulated violations; call from the host's shutdown path
    pub fn shutdown(&self) -> Option<PathBuf> {
        let path = self.gate.flush();
        let summary = self.gate.get_violation_summary();
        tracing::info!(total_violations = summary.total, "doctrine runtime shut down");
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::nuclear::ProcessTerminator;
    use serde_json::json;

    #[test]
    fn with_sinks_shares_one_gate() {
        let audit = Arc::new(MemoryAuditSink::new());
        let runtime = DoctrineRuntime::with_sinks(
            GateConfig::default(),
            audit.clone(),
            Arc::new(MemoryAuditSink::new()),
            Arc::new(ProcessTerminator),
        );
        assert!(Arc::ptr_eq(runtime.gate(), runtime.nuclear().gate()));

        let session = runtime.session("apify").unwrap();
        assert!(session.validate(&json!({})).is_err());
        assert!(runtime.shutdown().is_some());
        assert!(runtime.shutdown().is_none());
        assert!(!audit.reports("violations").is_empty());
    }
}
