//! Unit tests for the worker channel, driven through a scripted port.

use std::sync::Mutex;

use super::*;
use crate::protocol::ChangeType;

/// Records posted messages instead of delivering them.
#[derive(Clone, Default)]
struct RecordingPort(Arc<Mutex<Vec<WorkerMessage>>>);

impl RecordingPort {
    fn taken(&self) -> Vec<WorkerMessage> {
        std::mem::take(&mut *self.0.lock().expect("port lock"))
    }

    fn len(&self) -> usize {
        self.0.lock().expect("port lock").len()
    }
}

impl WorkerPort for RecordingPort {
    fn post(&self, message: WorkerMessage) -> BridgeResult<()> {
        self.0.lock().expect("port lock").push(message);
        Ok(())
    }
}

struct ClosedPort;

impl WorkerPort for ClosedPort {
    fn post(&self, _message: WorkerMessage) -> BridgeResult<()> {
        Err(BridgeError::WorkerTerminated)
    }
}

fn quick_sync() -> SyncCallConfig {
    SyncCallConfig {
        max_spin_iterations: 5_000,
        spins_before_yield: 100,
        result_buffer_size: 1024,
    }
}

#[tokio::test]
async fn test_scrambled_replies_reach_their_callers() {
    const CALLS: i64 = 16;
    let port = RecordingPort::default();
    let channel = Arc::new(WorkerChannel::new(port.clone(), quick_sync()));

    let handles: Vec<_> = (0..CALLS)
        .map(|i| {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move {
                let result = channel.call_raw("exec", Value::Integer(i)).await;
                (i, result)
            })
        })
        .collect();

    while port.len() < usize::try_from(CALLS).expect("count") {
        tokio::task::yield_now().await;
    }
    let mut posted = port.taken();
    assert!(posted.iter().all(|message| !message.is_sync()));

    // Reply in an order unrelated to issue order: odd IDs backwards, then even.
    posted.sort_by_key(|message| (message.id % 2 == 0, std::cmp::Reverse(message.id)));
    for message in posted {
        let echoed = Value::object([("echo", message.data.clone())]);
        channel.handle_message(OutboundMessage::Reply {
            id: message.id,
            result: Ok(echoed),
        });
    }

    for handle in handles {
        let (i, result) = handle.await.expect("task");
        let value = result.expect("reply");
        assert_eq!(value.get("echo"), Some(&Value::Integer(i)));
    }
    assert_eq!(channel.pending_calls(), 0);
}

#[tokio::test]
async fn test_error_reply_becomes_remote_error() {
    let port = RecordingPort::default();
    let channel = Arc::new(WorkerChannel::new(port.clone(), quick_sync()));
    let caller = {
        let channel = Arc::clone(&channel);
        tokio::spawn(async move { channel.call(Request::Close { database_id: 3 }).await })
    };
    while port.len() == 0 {
        tokio::task::yield_now().await;
    }
    let message = port.taken().remove(0);
    assert_eq!(message.kind, "close");
    channel.handle_message(OutboundMessage::Reply {
        id: message.id,
        result: Err("Database not found - nativeDatabaseId[3]".to_string()),
    });

    let err = caller.await.expect("task").expect_err("rejected");
    assert_eq!(err.to_string(), "Database not found - nativeDatabaseId[3]");
    assert!(matches!(err, BridgeError::Remote(_)));
}

#[tokio::test]
async fn test_post_failure_clears_pending() {
    let channel = WorkerChannel::new(ClosedPort, quick_sync());
    let err = channel
        .call(Request::IsInTransaction { database_id: 1 })
        .await
        .expect_err("closed");
    assert!(matches!(err, BridgeError::WorkerTerminated));
    assert_eq!(channel.pending_calls(), 0);
}

#[test]
fn test_unknown_reply_is_ignored() {
    let channel = WorkerChannel::new(RecordingPort::default(), quick_sync());
    channel.handle_message(OutboundMessage::Reply {
        id: 999,
        result: Ok(Value::Null),
    });
    assert_eq!(channel.pending_calls(), 0);
}

#[test]
fn test_sync_call_times_out_when_never_resolved() {
    let port = RecordingPort::default();
    let channel = WorkerChannel::new(port.clone(), quick_sync());
    let err = channel
        .call_sync(Request::Exec {
            database_id: 1,
            source: "SELECT 1".to_string(),
        })
        .expect_err("timeout");
    assert!(matches!(err, BridgeError::SyncTimeout { iterations: 5_000 }));

    let posted = port.taken();
    assert_eq!(posted.len(), 1);
    assert!(posted[0].is_sync());
}

#[test]
fn test_sync_call_reads_published_result() {
    struct AnsweringPort;

    impl WorkerPort for AnsweringPort {
        fn post(&self, message: WorkerMessage) -> BridgeResult<()> {
            let sync = message.sync.expect("blocking call");
            std::thread::spawn(move || sync.publish(&Ok(Value::Bool(true))));
            Ok(())
        }
    }

    let config = SyncCallConfig {
        max_spin_iterations: u64::MAX,
        ..quick_sync()
    };
    let channel = WorkerChannel::new(AnsweringPort, config);
    let value = channel
        .call_sync(Request::IsInTransaction { database_id: 1 })
        .expect("result");
    assert_eq!(value, Value::Bool(true));
}

#[tokio::test]
async fn test_change_events_are_broadcast() {
    let channel = WorkerChannel::new(RecordingPort::default(), quick_sync());
    let mut events = channel.subscribe();
    let event = DatabaseChangeEvent {
        database_name: "main".to_string(),
        database_file_path: String::new(),
        table_name: "t".to_string(),
        row_id: 1,
        type_id: ChangeType::Insert,
    };
    channel.handle_message(OutboundMessage::DatabaseChange(event.clone()));
    assert_eq!(events.recv().await.expect("event"), event);
}

#[tokio::test]
async fn test_pump_fails_pending_when_worker_hangs_up() {
    let port = RecordingPort::default();
    let channel = Arc::new(WorkerChannel::new(port.clone(), quick_sync()));
    let (outbound_tx, outbound_rx) = mpsc::channel();
    channel.pump(outbound_rx).expect("pump");

    let caller = {
        let channel = Arc::clone(&channel);
        tokio::spawn(async move { channel.call_raw("exec", Value::Null).await })
    };
    while port.len() == 0 {
        tokio::task::yield_now().await;
    }
    drop(outbound_tx);

    let err = caller.await.expect("task").expect_err("terminated");
    assert!(matches!(err, BridgeError::WorkerTerminated));
}
