use serde_json::json;
use soi_core::ids::{ProjectId, RecordId, UserId};
use soi_core::{EventFilter, NewEvent, SortOrder};
use soi_storage::SqliteStore;
use std::path::PathBuf;

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = base.join(format!("soi_storage_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn event(user: i64, project: Option<i64>, record: Option<i64>, action: &str) -> NewEvent {
    NewEvent {
        user_id: UserId::new(user),
        project_id: project.map(ProjectId::new),
        record_id: record.map(RecordId::new),
        action: action.to_string(),
        info: json!({ "action": action }),
    }
}

fn actions(events: &[soi_core::Event]) -> Vec<&str> {
    events.iter().map(|event| event.action.as_str()).collect()
}

#[test]
fn events_are_filtered_by_subject_in_either_order() {
    let mut store = SqliteStore::open(temp_dir("events_filter")).expect("open store");
    store
        .append_event(event(1, Some(10), None, "create_project"))
        .expect("append");
    store
        .append_event(event(1, Some(10), Some(100), "insert_record"))
        .expect("append");
    store
        .append_event(event(2, Some(10), Some(100), "set_record_tag"))
        .expect("append");
    store
        .append_event(event(2, Some(20), None, "create_project"))
        .expect("append");

    let by_user = store
        .events_by(EventFilter::User(UserId::new(1)), SortOrder::Ascending)
        .expect("by user");
    assert_eq!(actions(&by_user), vec!["create_project", "insert_record"]);

    let by_project = store
        .events_by(EventFilter::Project(ProjectId::new(10)), SortOrder::Descending)
        .expect("by project");
    assert_eq!(
        actions(&by_project),
        vec!["set_record_tag", "insert_record", "create_project"]
    );

    let by_record = store
        .events_by(EventFilter::Record(RecordId::new(100)), SortOrder::Ascending)
        .expect("by record");
    assert_eq!(by_record.len(), 2);
    assert!(by_record.iter().all(|e| e.record_id == Some(RecordId::new(100))));

    let none = store
        .events_by(EventFilter::User(UserId::new(3)), SortOrder::Ascending)
        .expect("by unknown user");
    assert!(none.is_empty());
}

#[test]
fn appended_events_round_trip_their_info() {
    let mut store = SqliteStore::open(temp_dir("events_info")).expect("open store");
    let appended = store
        .append_event(NewEvent {
            user_id: UserId::new(7),
            project_id: Some(ProjectId::new(3)),
            record_id: None,
            action: "add_tag_value".to_string(),
            info: json!({ "tag": "Type", "value": "Water" }),
        })
        .expect("append");

    let listed = store.list_events(SortOrder::Ascending).expect("list");
    assert_eq!(listed, vec![appended.clone()]);
    assert_eq!(listed[0].info["value"], "Water");
    assert_eq!(listed[0].record_id, None);
}

#[test]
fn timestamps_never_go_backwards() {
    let mut store = SqliteStore::open(temp_dir("events_monotonic")).expect("open store");
    for i in 0..20 {
        store
            .append_event(event(1, None, None, &format!("step_{i}")))
            .expect("append");
    }

    let ascending = store.list_events(SortOrder::Ascending).expect("list");
    assert_eq!(ascending.len(), 20);
    assert!(ascending.windows(2).all(|pair| {
        pair[0].id < pair[1].id && pair[0].created_at_ms <= pair[1].created_at_ms
    }));

    let descending = store.list_events(SortOrder::Descending).expect("list");
    let reversed: Vec<_> = ascending.into_iter().rev().collect();
    assert_eq!(descending, reversed);
}

#[test]
fn append_clamps_to_the_latest_event_time() {
    let dir = temp_dir("events_clamp");
    let mut store = SqliteStore::open(&dir).expect("open store");
    let first = store
        .append_event(event(1, None, None, "first"))
        .expect("append");

    let future_ms = first.created_at_ms + 3_600_000;
    let conn = rusqlite::Connection::open(dir.join("soi.db")).expect("open side connection");
    conn.execute(
        "INSERT INTO events(user_id, action, info_json, created_at_ms) VALUES (1, 'ahead', '{}', ?1)",
        [future_ms],
    )
    .expect("insert future-dated event");
    drop(conn);

    let next = store
        .append_event(event(1, None, None, "next"))
        .expect("append");
    assert_eq!(next.created_at_ms, future_ms);

    let listed = store.list_events(SortOrder::Ascending).expect("list");
    assert_eq!(actions(&listed), vec!["first", "ahead", "next"]);
    assert!(listed.windows(2).all(|pair| pair[0].created_at_ms <= pair[1].created_at_ms));
}
