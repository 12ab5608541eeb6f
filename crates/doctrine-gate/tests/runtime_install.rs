//! Runs in its own test binary: installation is once per process.

use doctrine_gate::{DoctrineRuntime, GateConfig, NuclearConfig, RuntimeError, SUCCESS_LOG};
use doctrine_test_utils::{missing_process_id, sample_raw, RecordingTerminator};
use doctrine_format::Target;
use std::sync::Arc;

#[test]
fn installs_once_and_flushes_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let config = GateConfig::default()
        .with_log_dir(dir.path().join("doctrine"))
        .with_nuclear(NuclearConfig::default().with_log_dir(dir.path().join("nuclear")));

    let bad = GateConfig::default().with_nuclear(NuclearConfig::default().with_max_violations(0));
    assert!(matches!(
        DoctrineRuntime::install(bad, Arc::new(RecordingTerminator::new())),
        Err(RuntimeError::Config(_))
    ));

    let runtime =
        DoctrineRuntime::install(config.clone(), Arc::new(RecordingTerminator::new())).unwrap();
    assert!(matches!(
        DoctrineRuntime::install(config, Arc::new(RecordingTerminator::new())),
        Err(RuntimeError::AlreadyInstalled)
    ));

    runtime
        .gate()
        .database_operation(Target::Relational, &sample_raw(), "rtrvr")
        .unwrap();
    let _ = runtime.gate().validate_payload(&missing_process_id(), "apify", "crawl");

    let report = runtime.shutdown().unwrap();
    assert!(report.starts_with(dir.path().join("doctrine")));
    assert!(dir.path().join("doctrine").join(SUCCESS_LOG).exists());
}
