use doctrine_envelope::{ConstructOptions, Envelope, Validated};
use doctrine_format::{format_for, from_any_format, Target};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn payload_strategy() -> impl Strategy<Value = Map<String, Value>> {
    let key = prop_oneof![
        "[a-z_]{1,8}",
        prop::sample::select(vec![
            "task_id",
            "approved",
            "analytics_approved",
            "knowledge_signature",
            "process_signature",
            "event_timestamp",
        ])
        .prop_map(String::from),
    ];
    prop::collection::btree_map(
        key,
        prop_oneof![
            any::<i64>().prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
            "[ -~]{0,16}".prop_map(Value::from),
        ],
        0..6,
    )
    .prop_map(|entries| entries.into_iter().collect())
}

proptest! {
    #[test]
    fn prop_every_dialect_round_trips(
        source in "[a-z]{1,10}",
        process in "[a-z0-9_]{1,10}",
        payload in payload_strategy(),
    ) {
        // payload keys that shadow envelope fields are dropped by the doc-store dialect
        let payload: Map<String, Value> = payload
            .into_iter()
            .filter(|(k, _)| !doctrine_envelope::fields::is_reserved(k))
            .collect();
        let envelope = Envelope::construct(source, process, payload, ConstructOptions::new());

        for target in Target::ALL {
            let record = format_for(&envelope, target).to_value().unwrap();
            let back = from_any_format(&record).unwrap();
            prop_assert_eq!(&back, &envelope, "target {}", target);
        }
    }
}

#[test]
fn relational_row_from_search_tool() {
    let mut data = Map::new();
    data.insert("query".into(), json!("rust crates"));
    data.insert("results".into(), json!(12));
    let envelope = Envelope::construct(
        "rtrvr",
        "search_42",
        data,
        ConstructOptions::new().with_agent_id("rtrvr"),
    );

    let row = format_for(&envelope, Target::Relational).to_value().unwrap();
    assert_eq!(row["source_id"], json!("rtrvr"));
    assert_eq!(row["task_id"], json!("search_42"));
    assert_eq!(row["approved"], json!(false));
    assert_eq!(row["migrated_to"], Value::Null);
    assert_eq!(
        row["process_signature"],
        json!(envelope.execution_signature().as_str())
    );
    assert_eq!(row["event_timestamp"], json!(envelope.timestamp_iso8601()));
    assert_eq!(row["data_payload"], json!({"query": "rust crates", "results": 12}));

    let back = from_any_format(&row).unwrap();
    assert_eq!(back, envelope);
    assert_eq!(back.validated(), Validated::Flag(false));
}

#[test]
fn doc_store_payload_with_column_names_round_trips() {
    let mut data = Map::new();
    data.insert("task_id".into(), json!("ticket-7"));
    data.insert("approved".into(), json!(true));
    data.insert("analytics_approved".into(), json!(false));
    data.insert("knowledge_signature".into(), json!("kb"));
    let envelope = Envelope::construct("jira", "sync_1", data, ConstructOptions::new());

    let doc = format_for(&envelope, Target::DocStore).to_value().unwrap();
    assert_eq!(doc["task_id"], json!("ticket-7"));
    assert_eq!(from_any_format(&doc).unwrap(), envelope);
}

#[test]
fn garbage_records_are_rejected() {
    assert!(from_any_format(&json!({"hello": "world"})).is_err());
    assert!(from_any_format(&json!(42)).is_err());
}
