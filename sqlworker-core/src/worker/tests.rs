//! Dispatcher tests, run directly against a [`WorkerState`] on the test
//! thread.

use std::sync::mpsc;

use tempfile::TempDir;

use super::*;
use crate::channel::sync::SyncTrait;
use crate::config::SyncCallConfig;
use crate::protocol::{BindParams, ChangeType, OpenOptions, Request, RunResult};
use crate::value::Value;

struct Harness {
    state: WorkerState,
    outbound: mpsc::Receiver<OutboundMessage>,
    dir: TempDir,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = BridgeConfig::default().with_database_directory(dir.path());
        let (sender, outbound) = mpsc::channel();
        Self {
            state: WorkerState::new(&config, sender),
            outbound,
            dir,
        }
    }

    fn execute(&mut self, request: Request) -> BridgeResult<Value> {
        self.state.execute(request)
    }

    fn open(&mut self, database_id: u32, path: &str, options: OpenOptions) {
        self.execute(Request::Open {
            database_id,
            database_path: path.to_string(),
            options,
            serialized_data: None,
        })
        .expect("open database");
    }

    fn exec(&mut self, database_id: u32, source: &str) {
        self.execute(Request::Exec {
            database_id,
            source: source.to_string(),
        })
        .expect("exec");
    }

    fn prepare(&mut self, database_id: u32, statement_id: u32, source: &str) {
        self.execute(Request::Prepare {
            database_id,
            statement_id,
            source: source.to_string(),
        })
        .expect("prepare");
    }

    fn run(
        &mut self,
        database_id: u32,
        statement_id: u32,
        params: BindParams,
    ) -> BridgeResult<RunResult> {
        let value = self.execute(Request::Run {
            database_id,
            statement_id,
            params,
        })?;
        RunResult::from_value(&value)
    }

    /// Prepares `source` as a throwaway statement and returns every row.
    fn query(&mut self, database_id: u32, source: &str) -> Value {
        const SCRATCH: u32 = 9_999;
        self.prepare(database_id, SCRATCH, source);
        let rows = self
            .execute(Request::GetAll {
                database_id,
                statement_id: SCRATCH,
            })
            .expect("get all");
        self.execute(Request::Finalize {
            database_id,
            statement_id: SCRATCH,
        })
        .expect("finalize");
        rows
    }
}

fn rows<const N: usize>(expected: [&[Value]; N]) -> Value {
    Value::Array(expected.iter().map(|row| Value::Array(row.to_vec())).collect())
}

#[test]
fn test_finalized_statement_is_gone() {
    let mut h = Harness::new();
    h.open(1, ":memory:", OpenOptions::default());
    h.exec(1, "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)");
    h.prepare(1, 10, "INSERT INTO t (name) VALUES (?)");

    let result = h.run(1, 10, BindParams::positional(["a"])).expect("run");
    assert_eq!(result.last_insert_row_id, 1);
    assert_eq!(result.changes, 1);
    assert!(result.first_row_values.is_empty());

    h.execute(Request::Finalize {
        database_id: 1,
        statement_id: 10,
    })
    .expect("finalize");
    let err = h
        .execute(Request::Step {
            database_id: 1,
            statement_id: 10,
        })
        .expect_err("finalized");
    assert_eq!(err.to_string(), "Statement not found - nativeStatementId[10]");
}

#[test]
fn test_run_returns_first_row_and_named_params() {
    let mut h = Harness::new();
    h.open(1, ":memory:", OpenOptions::default());
    h.exec(1, "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT, data BLOB)");
    h.prepare(1, 10, "INSERT INTO t (name, data) VALUES ($name, $data) RETURNING id, name");

    let params = BindParams::named([
        ("$name", Value::from("blob")),
        ("$data", Value::Bytes(vec![0, 255])),
    ]);
    let result = h.run(1, 10, params).expect("run");
    assert_eq!(
        result.first_row_values,
        vec![Value::Integer(1), Value::from("blob")]
    );
    assert_eq!(
        h.query(1, "SELECT data FROM t"),
        rows([&[Value::Bytes(vec![0, 255])]])
    );
}

#[test]
fn test_step_walks_rows_then_null() {
    let mut h = Harness::new();
    h.open(1, ":memory:", OpenOptions::default());
    h.prepare(1, 10, "SELECT 1 AS one, 'x' AS two UNION ALL SELECT 2, 'y'");

    let step = |h: &mut Harness| {
        h.execute(Request::Step {
            database_id: 1,
            statement_id: 10,
        })
        .expect("step")
    };
    assert_eq!(
        step(&mut h),
        Value::Array(vec![Value::Integer(1), Value::from("x")])
    );
    assert_eq!(
        step(&mut h),
        Value::Array(vec![Value::Integer(2), Value::from("y")])
    );
    assert_eq!(step(&mut h), Value::Null);
    assert_eq!(
        h.execute(Request::GetColumnNames { statement_id: 10 })
            .expect("column names"),
        Value::Array(vec![Value::from("one"), Value::from("two")])
    );

    h.execute(Request::Reset {
        database_id: 1,
        statement_id: 10,
    })
    .expect("reset");
    assert_eq!(
        h.execute(Request::GetAll {
            database_id: 1,
            statement_id: 10,
        })
        .expect("get all"),
        rows([
            &[Value::Integer(1), Value::from("x")],
            &[Value::Integer(2), Value::from("y")],
        ])
    );
}

#[test]
fn test_unsupported_bind_parameter() {
    let mut h = Harness::new();
    h.open(1, ":memory:", OpenOptions::default());
    h.prepare(1, 10, "SELECT ?");
    let err = h
        .run(1, 10, BindParams::positional([Value::Array(vec![])]))
        .expect_err("array parameter");
    assert_eq!(err.to_string(), "Unsupported parameter type: array");
}

#[test]
fn test_same_path_and_options_share_a_connection() {
    let mut h = Harness::new();
    h.open(1, "shared.db", OpenOptions::default());
    h.open(2, "shared.db", OpenOptions::default());
    h.exec(1, "BEGIN; CREATE TABLE t (v INTEGER); INSERT INTO t VALUES (42);");

    // Uncommitted rows are only visible through the same connection.
    assert_eq!(h.query(2, "SELECT v FROM t"), rows([&[Value::Integer(42)]]));
    assert_eq!(
        h.execute(Request::IsInTransaction { database_id: 2 })
            .expect("transaction state"),
        Value::Bool(true)
    );
    h.exec(2, "COMMIT");
    assert_eq!(
        h.execute(Request::IsInTransaction { database_id: 1 })
            .expect("transaction state"),
        Value::Bool(false)
    );
}

#[test]
fn test_memory_databases_share_a_connection() {
    let mut h = Harness::new();
    h.open(1, ":memory:", OpenOptions::default());
    h.open(2, ":memory:", OpenOptions::default());
    h.exec(1, "CREATE TABLE t (v INTEGER); INSERT INTO t VALUES (7);");

    assert_eq!(h.query(2, "SELECT v FROM t"), rows([&[Value::Integer(7)]]));
}

#[test]
fn test_plain_open_shares_a_snapshot_connection() {
    let mut h = Harness::new();
    h.open(1, ":memory:", OpenOptions::default());
    h.exec(1, "CREATE TABLE t (v INTEGER); INSERT INTO t VALUES (7);");
    let Value::Bytes(snapshot) = h
        .execute(Request::Serialize {
            database_id: 1,
            schema_name: "main".to_string(),
        })
        .expect("serialize")
    else {
        panic!("serialize must return bytes");
    };
    h.execute(Request::Close { database_id: 1 }).expect("close");

    h.execute(Request::Open {
        database_id: 2,
        database_path: "snap.db".to_string(),
        options: OpenOptions::default(),
        serialized_data: Some(snapshot),
    })
    .expect("open snapshot");
    h.open(3, "snap.db", OpenOptions::default());

    assert_eq!(h.query(3, "SELECT v FROM t"), rows([&[Value::Integer(7)]]));
    assert!(!h.dir.path().join("snap.db").exists());
}

#[test]
fn test_new_connection_is_not_shared() {
    let mut h = Harness::new();
    h.open(1, "private.db", OpenOptions::default());
    h.open(
        2,
        "private.db",
        OpenOptions {
            use_new_connection: true,
            ..OpenOptions::default()
        },
    );
    h.exec(1, "CREATE TABLE t (v INTEGER)");
    h.exec(1, "BEGIN; INSERT INTO t VALUES (1);");
    assert_eq!(h.query(2, "SELECT count(*) FROM t"), rows([&[Value::Integer(0)]]));
    h.exec(1, "COMMIT");
}

#[test]
fn test_close_finalizes_leftover_statements() {
    let mut h = Harness::new();
    h.open(1, "cleanup.db", OpenOptions::default());
    h.exec(1, "CREATE TABLE t (v INTEGER UNIQUE)");
    h.prepare(1, 10, "INSERT INTO t VALUES (?)");
    h.run(1, 10, BindParams::positional([1])).expect("first insert");
    // Leaves the statement in a state where finalizing it alone reports the
    // constraint failure.
    h.run(1, 10, BindParams::positional([1]))
        .expect_err("unique violation");

    h.execute(Request::Close { database_id: 1 })
        .expect("close succeeds");
    assert_eq!(h.state.handle_counts(), (0, 0, 0));
    assert!(matches!(
        h.execute(Request::Step {
            database_id: 1,
            statement_id: 10,
        }),
        Err(BridgeError::DatabaseNotFound(1))
    ));
}

#[test]
fn test_close_of_one_alias_keeps_the_others_statements() {
    let mut h = Harness::new();
    h.open(1, "aliased.db", OpenOptions::default());
    h.open(2, "aliased.db", OpenOptions::default());
    h.prepare(1, 10, "SELECT 1");
    h.prepare(2, 20, "SELECT 2");

    h.execute(Request::Close { database_id: 1 }).expect("close");
    assert_eq!(h.state.handle_counts(), (1, 1, 0));
    assert_eq!(
        h.execute(Request::GetAll {
            database_id: 2,
            statement_id: 20,
        })
        .expect("alias still usable"),
        rows([&[Value::Integer(2)]])
    );
}

#[test]
fn test_close_without_finalizing_keeps_statements() {
    let mut h = Harness::new();
    let options = OpenOptions {
        finalize_unused_statements_before_closing: false,
        ..OpenOptions::default()
    };
    h.open(1, ":memory:", options);
    h.prepare(1, 10, "SELECT 1");
    h.execute(Request::Close { database_id: 1 }).expect("close");
    assert_eq!(h.state.handle_counts(), (0, 1, 0));
}

#[test]
fn test_change_listener_posts_events() {
    let mut h = Harness::new();
    let options = OpenOptions {
        enable_change_listener: true,
        ..OpenOptions::default()
    };
    h.open(1, ":memory:", options);
    h.exec(1, "CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)");
    h.exec(1, "INSERT INTO t (v) VALUES ('a')");
    h.exec(1, "UPDATE t SET v = 'b' WHERE id = 1");
    h.exec(1, "DELETE FROM t WHERE id = 1");

    let kinds: Vec<_> = h
        .outbound
        .try_iter()
        .map(|message| match message {
            OutboundMessage::DatabaseChange(event) => {
                assert_eq!(event.table_name, "t");
                assert_eq!(event.database_name, "main");
                assert_eq!(event.row_id, 1);
                event.type_id
            }
            OutboundMessage::Reply { .. } => panic!("unexpected reply"),
        })
        .collect();
    assert_eq!(
        kinds,
        vec![ChangeType::Insert, ChangeType::Update, ChangeType::Delete]
    );
}

#[test]
fn test_no_events_without_listener() {
    let mut h = Harness::new();
    h.open(1, ":memory:", OpenOptions::default());
    h.exec(1, "CREATE TABLE t (v INTEGER); INSERT INTO t VALUES (1);");
    assert!(h.outbound.try_recv().is_err());
}

#[test]
fn test_serialize_and_open_snapshot() {
    let mut h = Harness::new();
    h.open(1, ":memory:", OpenOptions::default());
    h.exec(1, "CREATE TABLE t (v TEXT); INSERT INTO t VALUES ('snap');");
    let bytes = h
        .execute(Request::Serialize {
            database_id: 1,
            schema_name: "main".to_string(),
        })
        .expect("serialize");
    let Value::Bytes(snapshot) = bytes else {
        panic!("serialize must return bytes");
    };

    h.execute(Request::Open {
        database_id: 2,
        database_path: "snapshot.db".to_string(),
        options: OpenOptions::default(),
        serialized_data: Some(snapshot),
    })
    .expect("open snapshot");
    assert_eq!(h.query(2, "SELECT v FROM t"), rows([&[Value::from("snap")]]));
    assert!(!h.dir.path().join("snapshot.db").exists());
}

#[test]
fn test_backup_between_databases() {
    let mut h = Harness::new();
    h.open(1, ":memory:", OpenOptions::default());
    h.open(2, "backup.db", OpenOptions::default());
    h.exec(1, "CREATE TABLE t (v INTEGER); INSERT INTO t VALUES (7);");

    h.execute(Request::BackupDatabase {
        dest_database_id: 2,
        dest_database_name: "main".to_string(),
        source_database_id: 1,
        source_database_name: "main".to_string(),
    })
    .expect("backup");
    assert_eq!(h.query(2, "SELECT v FROM t"), rows([&[Value::Integer(7)]]));
}

#[test]
fn test_delete_database() {
    let mut h = Harness::new();
    h.open(1, "doomed.db", OpenOptions::default());
    h.exec(1, "CREATE TABLE t (v INTEGER)");
    let delete = |h: &mut Harness| {
        h.execute(Request::DeleteDatabase {
            database_path: "doomed.db".to_string(),
        })
    };

    assert!(matches!(delete(&mut h), Err(BridgeError::DeleteOpenDatabase(_))));
    h.execute(Request::Close { database_id: 1 }).expect("close");
    delete(&mut h).expect("delete closed database");
    assert!(!h.dir.path().join("doomed.db").exists());
    assert!(matches!(delete(&mut h), Err(BridgeError::DatabaseFileNotFound(_))));

    h.execute(Request::DeleteDatabase {
        database_path: ":memory:".to_string(),
    })
    .expect("memory delete is a no-op");
}

#[test]
fn test_import_asset_from_file() {
    let mut h = Harness::new();
    let asset = h.dir.path().join("asset.db");
    {
        let seed = sqlworker_db::Connection::open(&asset, false, None).expect("seed");
        seed.execute_batch("CREATE TABLE t (v TEXT); INSERT INTO t VALUES ('seeded');")
            .expect("seed data");
    }
    let asset = asset.to_str().expect("utf-8 path").to_string();
    let import = |h: &mut Harness, asset: &str, force: bool| {
        h.execute(Request::ImportAssetDatabase {
            database_path: "imported.db".to_string(),
            asset_database_path: asset.to_string(),
            force_overwrite: force,
        })
    };

    import(&mut h, &asset, false).expect("import");
    h.open(1, "imported.db", OpenOptions::default());
    assert_eq!(h.query(1, "SELECT v FROM t"), rows([&[Value::from("seeded")]]));
    h.execute(Request::Close { database_id: 1 }).expect("close");

    // Existing destination: skipped without touching the asset.
    import(&mut h, "/no/such/asset.db", false).expect("skipped");
    assert!(matches!(
        import(&mut h, "/no/such/asset.db", true),
        Err(BridgeError::Io(_))
    ));
}

#[test]
fn test_session_changeset_round_trip() {
    let mut h = Harness::new();
    h.open(1, ":memory:", OpenOptions::default());
    h.open(
        2,
        ":memory:",
        OpenOptions {
            use_new_connection: true,
            ..OpenOptions::default()
        },
    );
    for db in [1, 2] {
        h.exec(db, "CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)");
    }

    h.execute(Request::SessionCreate {
        database_id: 1,
        session_id: 100,
        db_name: "main".to_string(),
    })
    .expect("create session");
    h.execute(Request::SessionAttach {
        database_id: 1,
        session_id: 100,
        table: None,
    })
    .expect("attach");
    h.exec(1, "INSERT INTO t VALUES (1, 'one'), (2, 'two')");

    let Value::Bytes(changeset) = h
        .execute(Request::SessionCreateChangeset {
            database_id: 1,
            session_id: 100,
        })
        .expect("changeset")
    else {
        panic!("changeset must be bytes");
    };
    assert!(!changeset.is_empty());

    h.execute(Request::SessionCreate {
        database_id: 2,
        session_id: 200,
        db_name: "main".to_string(),
    })
    .expect("create second session");
    h.execute(Request::SessionApplyChangeset {
        database_id: 2,
        session_id: 200,
        changeset: changeset.clone(),
    })
    .expect("apply");
    assert_eq!(h.query(2, "SELECT count(*) FROM t"), rows([&[Value::Integer(2)]]));

    let Value::Bytes(inverted) = h
        .execute(Request::SessionInvertChangeset {
            database_id: 2,
            session_id: 200,
            changeset,
        })
        .expect("invert")
    else {
        panic!("inverted changeset must be bytes");
    };
    h.execute(Request::SessionApplyChangeset {
        database_id: 2,
        session_id: 200,
        changeset: inverted,
    })
    .expect("apply inverse");
    assert_eq!(h.query(2, "SELECT count(*) FROM t"), rows([&[Value::Integer(0)]]));
}

#[test]
fn test_session_handles_are_checked() {
    let mut h = Harness::new();
    h.open(1, ":memory:", OpenOptions::default());
    h.exec(1, "CREATE TABLE t (id INTEGER PRIMARY KEY)");
    assert!(matches!(
        h.execute(Request::SessionAttach {
            database_id: 1,
            session_id: 5,
            table: Some("t".to_string()),
        }),
        Err(BridgeError::SessionNotFound(5))
    ));
    assert!(matches!(
        h.execute(Request::SessionCreate {
            database_id: 3,
            session_id: 5,
            db_name: "main".to_string(),
        }),
        Err(BridgeError::DatabaseNotFound(3))
    ));

    h.execute(Request::SessionCreate {
        database_id: 1,
        session_id: 5,
        db_name: "main".to_string(),
    })
    .expect("create");
    assert_eq!(
        h.execute(Request::SessionEnable {
            database_id: 1,
            session_id: 5,
            enabled: false,
        })
        .expect("disable"),
        Value::Bool(false)
    );
    h.execute(Request::SessionClose {
        database_id: 1,
        session_id: 5,
    })
    .expect("close session");
    assert!(matches!(
        h.execute(Request::SessionCreateChangeset {
            database_id: 1,
            session_id: 5,
        }),
        Err(BridgeError::SessionNotFound(5))
    ));
}

#[test]
fn test_closing_database_closes_its_sessions() {
    let mut h = Harness::new();
    h.open(1, ":memory:", OpenOptions::default());
    h.execute(Request::SessionCreate {
        database_id: 1,
        session_id: 7,
        db_name: "main".to_string(),
    })
    .expect("create");
    h.execute(Request::Close { database_id: 1 }).expect("close");
    assert_eq!(h.state.handle_counts(), (0, 0, 0));
}

#[test]
fn test_async_envelope_gets_a_reply() {
    let mut h = Harness::new();
    h.state.handle(WorkerMessage {
        id: 41,
        kind: "open".to_string(),
        data: Request::Open {
            database_id: 1,
            database_path: ":memory:".to_string(),
            options: OpenOptions::default(),
            serialized_data: None,
        }
        .to_data(),
        sync: None,
    });
    h.state.handle(WorkerMessage {
        id: 42,
        kind: "vacuumEverything".to_string(),
        data: Value::Null,
        sync: None,
    });

    let replies: Vec<_> = h.outbound.try_iter().collect();
    assert_eq!(
        replies,
        vec![
            OutboundMessage::Reply {
                id: 41,
                result: Ok(Value::Null),
            },
            OutboundMessage::Reply {
                id: 42,
                result: Err("Unknown message type: vacuumEverything".to_string()),
            },
        ]
    );
}

#[test]
fn test_sync_envelope_writes_the_shared_buffer() {
    let mut h = Harness::new();
    h.open(1, ":memory:", OpenOptions::default());
    let config = SyncCallConfig::default();

    let sync = SyncTrait::new(config.result_buffer_size);
    sync.lock.store_pending();
    h.state.handle(WorkerMessage {
        id: 1,
        kind: "isInTransaction".to_string(),
        data: Request::IsInTransaction { database_id: 1 }.to_data(),
        sync: Some(sync.clone()),
    });
    assert_eq!(sync.wait(&config).expect("result"), Value::Bool(false));

    let sync = SyncTrait::new(config.result_buffer_size);
    sync.lock.store_pending();
    h.state.handle(WorkerMessage {
        id: 2,
        kind: "exec".to_string(),
        data: Request::Exec {
            database_id: 1,
            source: "SELEC nonsense".to_string(),
        }
        .to_data(),
        sync: Some(sync.clone()),
    });
    let err = sync.wait(&config).expect_err("syntax error");
    let BridgeError::Remote(remote) = err else {
        panic!("expected a remote error");
    };
    assert!(remote.message().contains("syntax error"));
    assert_eq!(remote.code(), Some("ENGINE"));
    assert_eq!(
        remote.object().properties.get("sqliteCode"),
        Some(&Value::Integer(1))
    );
    assert!(h.outbound.try_recv().is_err());
}

#[test]
fn test_spawned_worker_answers_and_exits() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (port, replies) =
        spawn_worker(BridgeConfig::default().with_database_directory(dir.path()))
            .expect("spawn worker");
    port.post(WorkerMessage {
        id: 1,
        kind: "deleteDatabase".to_string(),
        data: Request::DeleteDatabase {
            database_path: ":memory:".to_string(),
        }
        .to_data(),
        sync: None,
    })
    .expect("post");
    assert_eq!(
        replies.recv().expect("reply"),
        OutboundMessage::Reply {
            id: 1,
            result: Ok(Value::Null),
        }
    );
    drop(port);
    assert!(replies.recv().is_err());
}
