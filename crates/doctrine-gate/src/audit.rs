//! Durable audit trail
//!
//! The gates write through the [`AuditSink`] seam: append-only JSONL logs
//! plus one-off JSON reports. Writes are best effort; callers log and swallow
//! every [`AuditError`].

use crate::error::AuditError;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Success log, one JSON line per admitted payload
pub const SUCCESS_LOG: &str = "validation-success.log";

/// Zero-tolerance event log, one JSON line per event
pub const NUCLEAR_EVENTS_LOG: &str = "nuclear-events.log";

/// Violation report file prefix
pub const VIOLATIONS_PREFIX: &str = "violations";

/// Zero-tolerance shutdown report file prefix
pub const NUCLEAR_SHUTDOWN_PREFIX: &str = "nuclear-shutdown";

/// `<prefix>-<ts>.json`, where `<ts>` is the ISO-8601 instant (milliseconds)
/// with `:` and `.` replaced by `-`
#[must_use]
pub fn report_file_name(prefix: &str, at: DateTime<Utc>) -> String {
    let stamp = at
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("{prefix}-{stamp}.json")
}

/// Destination for audit entries
pub trait AuditSink: Send + Sync + Debug {
    /// Append one line to `file`
    ///
    /// # Errors
    /// [`AuditError`] if the line could not be written.
    fn append_line(&self, file: &str, line: &str) -> Result<(), AuditError>;

    /// Write `report` as pretty JSON to `file`, replacing any previous content
    ///
    /// # Errors
    /// [`AuditError`] if the report could not be written.
    fn write_report(&self, file: &str, report: &Value) -> Result<PathBuf, AuditError>;
}

/// Log an audit failure and carry on
pub(crate) fn best_effort<T>(result: Result<T, AuditError>, what: &str) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::error!(error = %err, what, "audit write failed");
            None
        }
    }
}

/// Audit files under a root directory, created on demand
#[derive(Debug, Clone)]
pub struct FileAuditSink {
    root: PathBuf,
}

impl FileAuditSink {
    /// Sink rooted at `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_root(&self) -> Result<(), AuditError> {
        fs::create_dir_all(&self.root).map_err(|e| AuditError::io(&self.root, e))
    }
}

impl AuditSink for FileAuditSink {
    fn append_line(&self, file: &str, line: &str) -> Result<(), AuditError> {
        self.ensure_root()?;
        let path = self.root.join(file);
        let mut handle = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| AuditError::io(&path, e))?;
        writeln!(handle, "{line}").map_err(|e| AuditError::io(&path, e))
    }

    fn write_report(&self, file: &str, report: &Value) -> Result<PathBuf, AuditError> {
        self.ensure_root()?;
        let path = self.root.join(file);
        let body = serde_json::to_string_pretty(report)?;
        fs::write(&path, body).map_err(|e| AuditError::io(&path, e))?;
        Ok(path)
    }
}

/// In-memory audit files
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    files: Mutex<BTreeMap<String, String>>,
}

impl MemoryAuditSink {
    /// Empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Full contents of `file`
    #[must_use]
    pub fn contents(&self, file: &str) -> Option<String> {
        self.files.lock().get(file).cloned()
    }

    /// Parsed JSON lines of `file`
    #[must_use]
    pub fn lines(&self, file: &str) -> Vec<Value> {
        self.contents(file)
            .map(|text| {
                text.lines()
                    .filter_map(|line| serde_json::from_str(line).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every file name written so far
    #[must_use]
    pub fn file_names(&self) -> Vec<String> {
        self.files.lock().keys().cloned().collect()
    }

    /// Parsed reports whose name starts with `prefix`
    #[must_use]
    pub fn reports(&self, prefix: &str) -> Vec<Value> {
        self.files
            .lock()
            .iter()
            .filter(|(name, _)| name.starts_with(prefix) && name.ends_with(".json"))
            .filter_map(|(_, body)| serde_json::from_str(body).ok())
            .collect()
    }

    /// Everything written, concatenated
    #[must_use]
    pub fn dump(&self) -> String {
        self.files.lock().values().cloned().collect::<Vec<_>>().join("\n")
    }
}

impl AuditSink for MemoryAuditSink {
    fn append_line(&self, file: &str, line: &str) -> Result<(), AuditError> {
        let mut files = self.files.lock();
        let entry = files.entry(file.to_string()).or_default();
        entry.push_str(line);
        entry.push('\n');
        Ok(())
    }

    fn write_report(&self, file: &str, report: &Value) -> Result<PathBuf, AuditError> {
        let body = serde_json::to_string_pretty(report)?;
        self.files.lock().insert(file.to_string(), body);
        Ok(PathBuf::from(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn report_names_replace_separators() {
        let at = Utc.timestamp_millis_opt(1_735_787_045_678).unwrap();
        assert_eq!(
            report_file_name(VIOLATIONS_PREFIX, at),
            "violations-2025-01-02T03-04-05-678Z.json"
        );
    }

    #[test]
    fn file_sink_appends_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileAuditSink::new(dir.path().join("nested/logs"));
        sink.append_line(SUCCESS_LOG, r#"{"n":1}"#).unwrap();
        sink.append_line(SUCCESS_LOG, r#"{"n":2}"#).unwrap();
        let log = fs::read_to_string(sink.root().join(SUCCESS_LOG)).unwrap();
        assert_eq!(log, "{\"n\":1}\n{\"n\":2}\n");

        let path = sink.write_report("r.json", &json!({"total": 2})).unwrap();
        let body: Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(body, json!({"total": 2}));
    }

    #[test]
    fn file_sink_reports_io_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();
        let sink = FileAuditSink::new(blocker.join("logs"));
        let err = sink.append_line(SUCCESS_LOG, "{}").unwrap_err();
        assert!(matches!(err, AuditError::Io { .. }));
        assert!(best_effort(Err::<(), _>(err), "test").is_none());
    }

    #[test]
    fn memory_sink_parses_lines() {
        let sink = MemoryAuditSink::new();
        sink.append_line(NUCLEAR_EVENTS_LOG, r#"{"event":"A"}"#).unwrap();
        sink.append_line(NUCLEAR_EVENTS_LOG, r#"{"event":"B"}"#).unwrap();
        sink.write_report("violations-x.json", &json!({"total_violations": 1}))
            .unwrap();
        assert_eq!(sink.lines(NUCLEAR_EVENTS_LOG).len(), 2);
        assert_eq!(sink.reports(VIOLATIONS_PREFIX)[0]["total_violations"], json!(1));
        assert_eq!(sink.file_names().len(), 2);
    }
}
