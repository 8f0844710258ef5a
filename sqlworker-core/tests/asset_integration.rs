mod common;

use sqlworker_core::native::{
    backup_database_async, delete_database_async, delete_database_sync,
    import_asset_database_async,
};
use sqlworker_core::{BindParams, OpenOptions, SqliteDatabase, Value};

fn seed_image() -> Vec<u8> {
    let connection = sqlworker_db::Connection::open_in_memory().expect("open seed");
    connection
        .execute_batch("CREATE TABLE fruit (name TEXT); INSERT INTO fruit VALUES ('apple'), ('pear');")
        .expect("seed");
    connection.serialize("main").expect("serialize seed")
}

#[tokio::test]
async fn test_import_asset_over_http() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/assets/fruit.db")
        .with_status(200)
        .with_body(seed_image())
        .expect(1)
        .create_async()
        .await;

    let root = common::temp_root();
    let worker = common::spawn_worker(&root);
    let url = format!("{}/assets/fruit.db", server.url());
    import_asset_database_async(&worker, "fruit.db", &url, false)
        .await
        .expect("import");
    // Present now: a second import is a no-op and does not hit the server.
    import_asset_database_async(&worker, "fruit.db", &url, false)
        .await
        .expect("skip import");
    mock.assert_async().await;

    let db = SqliteDatabase::open_database_async(worker, "fruit.db", OpenOptions::default())
        .await
        .expect("open imported");
    let rows = db
        .get_all_async("SELECT name FROM fruit ORDER BY name", BindParams::default())
        .await
        .expect("select");
    let names: Vec<_> = rows.iter().filter_map(|row| row.get("name").cloned()).collect();
    assert_eq!(names, vec![Value::from("apple"), Value::from("pear")]);
    db.close_async().await.expect("close");
    common::cleanup_storage(&root);
}

#[tokio::test]
async fn test_import_reports_http_failures() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/gone.db")
        .with_status(404)
        .create_async()
        .await;

    let root = common::temp_root();
    let worker = common::spawn_worker(&root);
    let err = import_asset_database_async(
        &worker,
        "gone.db",
        &format!("{}/gone.db", server.url()),
        true,
    )
    .await
    .expect_err("not found");
    assert!(err.to_string().contains("Failed to fetch asset database: 404"));
    common::cleanup_storage(&root);
}

#[tokio::test]
async fn test_delete_refuses_open_databases() {
    let root = common::temp_root();
    let worker = common::spawn_worker(&root);
    let db = SqliteDatabase::open_database_async(worker.clone(), "doomed.db", OpenOptions::default())
        .await
        .expect("open");
    db.exec_async("CREATE TABLE t (v INTEGER)").await.expect("create");

    let err = delete_database_async(&worker, "doomed.db")
        .await
        .expect_err("still open");
    assert!(err
        .to_string()
        .starts_with("Unable to delete database that is currently open"));

    db.close_async().await.expect("close");
    delete_database_async(&worker, "doomed.db")
        .await
        .expect("delete");
    assert!(!root.join("doomed.db").exists());

    let err = delete_database_sync(&worker, "doomed.db").expect_err("already deleted");
    assert!(err.to_string().starts_with("Database file not found"));
    common::cleanup_storage(&root);
}

#[tokio::test]
async fn test_backup_into_file_database() {
    let root = common::temp_root();
    let worker = common::spawn_worker(&root);
    let source = SqliteDatabase::deserialize_database_async(
        worker.clone(),
        seed_image(),
        OpenOptions::default(),
    )
    .await
    .expect("open source");
    let dest = SqliteDatabase::open_database_async(worker.clone(), "copy.db", OpenOptions::default())
        .await
        .expect("open dest");

    backup_database_async(&worker, dest.native(), "main", source.native(), "main")
        .await
        .expect("backup");
    let row = dest
        .get_first_async("SELECT count(*) AS n FROM fruit", BindParams::default())
        .await
        .expect("select")
        .expect("one row");
    assert_eq!(row.get("n"), Some(&Value::Integer(2)));
    common::cleanup_storage(&root);
}
