use livesync::{CrmProjection, ReplayReport, SyncConfig, replay_lines};
use serde_json::json;
use std::io::Cursor;

const SESSION: &str = r#"
{"eventType":"INSERT","schema":"public","table":"customers","commit_timestamp":"2024-01-01T00:00:00Z","new":{"id":"c1","company_name":"Acme","offers_count":0},"old":{}}
{"eventType":"INSERT","schema":"public","table":"offers","new":{"id":"o1","customer_id":"c1","result":"pending"},"old":{}}
{"eventType":"INSERT","schema":"public","table":"tasks","new":{"id":"t1","customer_id":"c1","status":"todo"},"old":{}}
{"eventType":"UPDATE","schema":"public","table":"offers","new":{"id":"o1","customer_id":"c1","result":"pending","deleted_at":"2024-01-01"},"old":{"id":"o1","customer_id":"c1","result":"pending","deleted_at":null}}
{"eventType":"UPDATE","schema":"public","table":"offers","new":{"id":"o2","customer_id":"c1"},"old":{"id":"o2"}}
{"eventType":"TRUNCATE","schema":"public","table":"offers","new":{},"old":{}}
"#;

#[test]
fn test_replay_session() {
    let mut projection = CrmProjection::new(&SyncConfig::default());
    let report = replay_lines(Cursor::new(SESSION), &mut projection).unwrap();

    assert_eq!(
        report,
        ReplayReport {
            lines: 6,
            applied: 4,
            ignored: 1,
            malformed: 1,
        }
    );

    let customer = projection.customer("c1").unwrap();
    assert_eq!(customer.offers_count, 0);
    assert_eq!(customer.open_tasks_count, 0);
    assert_eq!(projection.to_json()["offers"], json!({"c1": []}));
}

#[test]
fn test_replay_with_custom_activity_rule() {
    let config = SyncConfig::from_json_str(r#"{ "task_activity": { "active_values": ["todo"] } }"#).unwrap();
    let mut projection = CrmProjection::new(&config);
    replay_lines(Cursor::new(SESSION), &mut projection).unwrap();

    assert_eq!(projection.customer("c1").unwrap().open_tasks_count, 1);
}

#[test]
fn test_replay_of_nothing() {
    let mut projection = CrmProjection::new(&SyncConfig::default());
    let report = replay_lines(Cursor::new("\n# only comments\n\n"), &mut projection).unwrap();
    assert_eq!(report, ReplayReport::default());
    assert!(projection.customers().is_empty());
}
