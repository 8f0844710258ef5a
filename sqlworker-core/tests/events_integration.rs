mod common;

use std::time::Duration;

use sqlworker_core::{BindParams, ChangeType, OpenOptions, SqliteDatabase};

#[tokio::test]
async fn test_change_listener_reports_row_changes() {
    let root = common::temp_root();
    let worker = common::spawn_worker(&root);
    let mut events = worker.subscribe();
    let options = OpenOptions {
        enable_change_listener: true,
        ..OpenOptions::default()
    };
    let db = SqliteDatabase::open_database_async(worker, "events.db", options)
        .await
        .expect("open");

    db.exec_async("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)")
        .await
        .expect("create");
    db.run_async("INSERT INTO items (name) VALUES (?)", BindParams::positional(["a"]))
        .await
        .expect("insert");
    db.exec_async("UPDATE items SET name = 'b' WHERE id = 1")
        .await
        .expect("update");
    db.exec_async("DELETE FROM items WHERE id = 1")
        .await
        .expect("delete");

    let mut kinds = Vec::new();
    for _ in 0..3 {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("event in time")
            .expect("event");
        assert_eq!(event.table_name, "items");
        assert_eq!(event.database_name, "main");
        assert_eq!(event.row_id, 1);
        assert!(event.database_file_path.ends_with("events.db"));
        kinds.push(event.type_id);
    }
    assert_eq!(
        kinds,
        vec![ChangeType::Insert, ChangeType::Update, ChangeType::Delete]
    );
    common::cleanup_storage(&root);
}

#[tokio::test]
async fn test_no_events_without_listener() {
    let root = common::temp_root();
    let worker = common::spawn_worker(&root);
    let mut events = worker.subscribe();
    let db = SqliteDatabase::open_database_async(worker, ":memory:", OpenOptions::default())
        .await
        .expect("open");
    db.exec_async("CREATE TABLE t (v INTEGER); INSERT INTO t VALUES (1);")
        .await
        .expect("write");

    // Replies and events share one queue, so any event would already be here.
    assert!(events.try_recv().is_err());
    common::cleanup_storage(&root);
}
