//! Foreground side of the worker transport.
//!
//! [`WorkerChannel`] assigns correlation IDs, posts requests through a
//! [`WorkerPort`] and settles the matching [`Deferred`] when a reply comes
//! back. Replies may arrive in any order; only the ID matters.
//!
//! Blocking calls skip the reply path entirely: see [`sync`].

pub mod sync;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex, Once, PoisonError, Weak};
use std::thread;

use tokio::sync::broadcast;

use crate::config::{BridgeConfig, SyncCallConfig};
use crate::deferred::Deferred;
use crate::error::{BridgeError, BridgeResult, RemoteError};
use crate::protocol::{DatabaseChangeEvent, OutboundMessage, Request, WorkerMessage};
use crate::value::Value;
use crate::worker;

use self::sync::SyncTrait;

const EVENT_CAPACITY: usize = 256;

/// Something that delivers request envelopes to a worker.
pub trait WorkerPort: Send + Sync {
    /// Posts `message` without waiting for it to be handled.
    ///
    /// # Errors
    ///
    /// [`BridgeError::WorkerTerminated`] when the worker is gone.
    fn post(&self, message: WorkerMessage) -> BridgeResult<()>;
}

/// Correlates requests posted to a worker with their replies.
pub struct WorkerChannel {
    port: Box<dyn WorkerPort>,
    pending: Mutex<HashMap<u64, Deferred<Value>>>,
    next_id: AtomicU64,
    events: broadcast::Sender<DatabaseChangeEvent>,
    sync_config: SyncCallConfig,
}

impl WorkerChannel {
    /// Creates a channel over `port`. Replies must be fed back through
    /// [`handle_message`](Self::handle_message).
    pub fn new(port: impl WorkerPort + 'static, sync_config: SyncCallConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            port: Box::new(port),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            events,
            sync_config,
        }
    }

    /// Starts a worker thread and a channel wired to it.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Io`] if a thread cannot be spawned.
    pub fn spawn(config: BridgeConfig) -> BridgeResult<Arc<Self>> {
        let sync_config = config.sync.clone();
        let (port, outbound) = worker::spawn_worker(config)?;
        let channel = Arc::new(Self::new(port, sync_config));
        channel.pump(outbound)?;
        Ok(channel)
    }

    /// Feeds every message from `outbound` into
    /// [`handle_message`](Self::handle_message) on a background thread. When
    /// the worker hangs up, calls still pending fail with
    /// [`BridgeError::WorkerTerminated`].
    ///
    /// # Errors
    ///
    /// [`BridgeError::Io`] if the thread cannot be spawned.
    pub fn pump(self: &Arc<Self>, outbound: mpsc::Receiver<OutboundMessage>) -> BridgeResult<()> {
        let channel: Weak<Self> = Arc::downgrade(self);
        thread::Builder::new()
            .name("sqlworker-pump".to_string())
            .spawn(move || {
                for message in outbound {
                    let Some(channel) = channel.upgrade() else {
                        return;
                    };
                    channel.handle_message(message);
                }
                if let Some(channel) = channel.upgrade() {
                    channel.fail_pending();
                }
            })?;
        Ok(())
    }

    /// Sends `request` and waits for its reply.
    ///
    /// # Errors
    ///
    /// The worker's error as [`BridgeError::Remote`], or a transport error.
    pub async fn call(&self, request: Request) -> BridgeResult<Value> {
        self.call_raw(request.kind(), request.to_data()).await
    }

    /// Sends `request` and blocks the current thread until the worker has
    /// written the result.
    ///
    /// # Errors
    ///
    /// The worker's error (with its stack and properties) as
    /// [`BridgeError::Remote`], or [`BridgeError::SyncTimeout`].
    pub fn call_sync(&self, request: Request) -> BridgeResult<Value> {
        self.call_raw_sync(request.kind(), request.to_data())
    }

    /// Async call with an arbitrary `type` and payload.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn call_raw(&self, kind: &str, data: Value) -> BridgeResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let deferred = Deferred::new();
        let promise = deferred.promise().ok_or(BridgeError::WorkerTerminated)?;
        self.lock_pending().insert(id, deferred);

        let message = WorkerMessage {
            id,
            kind: kind.to_string(),
            data,
            sync: None,
        };
        if let Err(err) = self.port.post(message) {
            self.lock_pending().remove(&id);
            return Err(err);
        }
        promise.await
    }

    /// Blocking call with an arbitrary `type` and payload.
    ///
    /// # Errors
    ///
    /// See [`call_sync`](Self::call_sync).
    pub fn call_raw_sync(&self, kind: &str, data: Value) -> BridgeResult<Value> {
        static SYNC_WARNING: Once = Once::new();
        SYNC_WARNING.call_once(|| {
            log::warn!(
                "Using synchronous database calls. Each call blocks the calling thread \
                 in a spin-wait until the worker answers; prefer the async variants."
            );
        });

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let sync = SyncTrait::new(self.sync_config.result_buffer_size);
        sync.lock.store_pending();
        self.port.post(WorkerMessage {
            id,
            kind: kind.to_string(),
            data,
            sync: Some(sync.clone()),
        })?;
        sync.wait(&self.sync_config).inspect_err(|err| {
            if matches!(err, BridgeError::SyncTimeout { .. }) {
                log::error!("blocking call {id} ({kind}) timed out");
            }
        })
    }

    /// Settles the pending call a reply belongs to, or broadcasts a change
    /// event.
    pub fn handle_message(&self, message: OutboundMessage) {
        match message {
            OutboundMessage::Reply { id, result } => {
                let Some(deferred) = self.lock_pending().remove(&id) else {
                    log::warn!("dropping reply for unknown call {id}");
                    return;
                };
                match result {
                    Ok(value) => deferred.resolve(value),
                    Err(message) => {
                        deferred.reject(BridgeError::Remote(RemoteError::from_message(message)))
                    }
                };
            }
            OutboundMessage::DatabaseChange(event) => {
                // No subscribers is fine.
                let _ = self.events.send(event);
            }
        }
    }

    /// Receives every `onDatabaseChange` event posted after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DatabaseChangeEvent> {
        self.events.subscribe()
    }

    /// Number of async calls still waiting for a reply.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.lock_pending().len()
    }

    fn fail_pending(&self) {
        let drained: Vec<_> = self.lock_pending().drain().collect();
        for (_, deferred) in drained {
            deferred.reject(BridgeError::WorkerTerminated);
        }
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Deferred<Value>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for WorkerChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerChannel")
            .field("pending", &self.pending_calls())
            .finish_non_exhaustive()
    }
}

// ── Process-wide worker ─────────────────────────────────────────────────

static SHARED_WORKER: Mutex<Option<Arc<WorkerChannel>>> = Mutex::new(None);

/// The process-wide worker, started on first use with
/// [`BridgeConfig::from_env`].
///
/// # Errors
///
/// [`BridgeError::Io`] if the worker cannot be started.
pub fn shared_worker() -> BridgeResult<Arc<WorkerChannel>> {
    init_shared_worker(BridgeConfig::from_env())
}

/// Starts the process-wide worker with `config`, or returns the running one.
///
/// Safe to call concurrently; exactly one worker is started. `config` is
/// ignored once a worker exists.
///
/// # Errors
///
/// [`BridgeError::Io`] if the worker cannot be started.
pub fn init_shared_worker(config: BridgeConfig) -> BridgeResult<Arc<WorkerChannel>> {
    let mut shared = SHARED_WORKER.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(channel) = shared.as_ref() {
        return Ok(Arc::clone(channel));
    }
    log::debug!(
        "starting shared sqlworker with database directory {}",
        config.database_directory.display()
    );
    let channel = WorkerChannel::spawn(config)?;
    *shared = Some(Arc::clone(&channel));
    Ok(channel)
}

#[cfg(test)]
mod tests;
