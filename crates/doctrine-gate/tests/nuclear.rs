use doctrine_format::Target;
use doctrine_gate::{
    NuclearConfig, NuclearError, NuclearPhase, DEFAULT_EXIT_CODE, DEFAULT_RECOVERY_CODE,
    NUCLEAR_EVENTS_LOG, NUCLEAR_SHUTDOWN_PREFIX, REDACTED,
};
use doctrine_test_utils::*;
use serde_json::json;

#[test]
fn first_violation_locks_the_system() {
    let harness = armed_harness();
    let err = harness
        .nuclear
        .nuclear_validate(&missing_process_id(), "apify", "crawl")
        .unwrap_err();
    let NuclearError::Violation(violation) = err else {
        panic!("expected violation");
    };
    assert_eq!(violation.violation_count, 1);
    assert!(violation.shutdown);
    assert_eq!(harness.terminator.calls(), vec![DEFAULT_EXIT_CODE]);

    let status = harness.nuclear.status();
    assert!(status.system_locked);
    assert!(status.blacklisted_tools.contains("apify"));

    let before = harness.gate.violations().len();
    let err = harness
        .nuclear
        .nuclear_validate(&sample_raw(), "rtrvr", "search")
        .unwrap_err();
    assert!(matches!(err, NuclearError::SystemLocked));
    assert_eq!(harness.gate.violations().len(), before);
}

#[test]
fn shutdown_report_is_persisted_and_redacted() {
    let harness = armed_harness();
    let _ = harness
        .nuclear
        .nuclear_validate(&secret_bearing_blob(), "apify", "crawl");

    let reports = harness.nuclear_audit.reports(NUCLEAR_SHUTDOWN_PREFIX);
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report["violation_count"], json!(1));
    assert_eq!(report["max_violations"], json!(1));
    assert_eq!(report["system_locked"], json!(true));
    assert_eq!(report["blacklisted_tools"], json!(["apify"]));
    assert_eq!(report["final_violation"]["tool"], json!("apify"));
    assert_eq!(report["final_violation"]["payload"]["password"], json!(REDACTED));
    assert!(!harness.nuclear_audit.dump().contains("hunter2"));

    let events: Vec<_> = harness
        .nuclear_audit
        .lines(NUCLEAR_EVENTS_LOG)
        .into_iter()
        .map(|e| e["event"].clone())
        .collect();
    assert_eq!(
        events,
        vec![
            json!("NUCLEAR_MODE_ENABLED"),
            json!("NUCLEAR_VIOLATION_1"),
            json!("NUCLEAR_SHUTDOWN")
        ]
    );
}

#[test]
fn blacklist_holds_until_recovery() {
    let harness = nuclear_harness(NuclearConfig::default().with_max_violations(10));
    harness.nuclear.arm().unwrap();
    let _ = harness.nuclear.nuclear_validate(&missing_process_id(), "apify", "crawl");

    for _ in 0..3 {
        let err = harness
            .nuclear
            .nuclear_validate(&sample_raw(), "apify", "crawl")
            .unwrap_err();
        assert!(matches!(err, NuclearError::ToolBlacklisted(ref tool) if tool == "apify"));
    }
    assert!(harness.nuclear.nuclear_validate(&sample_raw(), "rtrvr", "search").is_ok());
    assert!(!harness.terminator.terminated());

    assert!(matches!(
        harness.nuclear.manual_recovery("let me in"),
        Err(NuclearError::RecoveryDenied)
    ));
    assert!(harness.nuclear.status().blacklisted_tools.contains("apify"));

    harness.nuclear.manual_recovery(DEFAULT_RECOVERY_CODE).unwrap();
    assert!(matches!(
        harness.nuclear.nuclear_validate(&sample_raw(), "apify", "crawl"),
        Err(NuclearError::NotArmed)
    ));
    harness.nuclear.arm().unwrap();
    assert!(harness.nuclear.nuclear_validate(&sample_raw(), "apify", "crawl").is_ok());
}

#[test]
fn nuclear_ignores_permissive_gate() {
    let harness = nuclear_harness(NuclearConfig::default().with_max_violations(5));
    harness.gate.set_strict(false);
    harness.nuclear.arm().unwrap();
    assert!(matches!(
        harness.nuclear.nuclear_validate(&missing_process_id(), "apify", "crawl"),
        Err(NuclearError::Violation(_))
    ));
}

#[test]
fn nuclear_database_operation_formats() {
    let harness = armed_harness();
    let record = harness
        .nuclear
        .nuclear_database_operation(Target::Warehouse, &sample_raw(), "rtrvr")
        .unwrap()
        .to_value()
        .unwrap();
    assert_eq!(record["task_id"], json!("search_42"));
    let last = harness.nuclear.status().event_log.pop().unwrap();
    assert_eq!(last.event, "NUCLEAR_DATABASE_SUCCESS");
    assert_eq!(last.state, NuclearPhase::Compliant);
    assert_eq!(last.operation, "warehouse_operation");
}

#[test]
fn custom_exit_code_and_threshold() {
    let harness = nuclear_harness(
        NuclearConfig::default()
            .with_max_violations(2)
            .with_exit_code(42),
    );
    harness.nuclear.arm().unwrap();
    let _ = harness.nuclear.nuclear_validate(&json!({}), "a", "op");
    assert!(!harness.terminator.terminated());
    let _ = harness.nuclear.nuclear_validate(&json!({}), "b", "op");
    assert_eq!(harness.terminator.calls(), vec![42]);
}

#[test]
fn escalating_a_counted_violation_keeps_the_count() {
    let harness = nuclear_harness(NuclearConfig::default().with_max_violations(5));
    harness.nuclear.arm().unwrap();
    let Err(NuclearError::Violation(violation)) =
        harness.nuclear.nuclear_validate(&missing_process_id(), "apify", "crawl")
    else {
        panic!("expected violation");
    };
    assert!(!violation.shutdown);

    assert!(harness.nuclear.escalate(&violation.record));
    let status = harness.nuclear.status();
    assert_eq!(status.violation_count, 1);
    assert!(status.system_locked);
    assert_eq!(harness.terminator.calls(), vec![DEFAULT_EXIT_CODE]);

    let reports = harness.nuclear_audit.reports(NUCLEAR_SHUTDOWN_PREFIX);
    assert_eq!(reports[0]["violation_count"], json!(1));
}
