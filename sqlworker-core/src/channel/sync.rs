//! Shared-memory handshake behind blocking calls.
//!
//! The caller allocates a [`SyncTrait`]: a lock word and a result buffer shared
//! with the worker. It stores [`PENDING`], posts the request and spins on the
//! lock. Instead of posting a reply, the worker writes a 4-byte little-endian
//! length followed by the serialized `{ result }` or `{ error }` object into
//! the buffer, then stores [`RESOLVED`].
//!
//! Both sides touch the shared memory only through atomics. The lock store is
//! a release and the waiter's load an acquire, so the payload bytes written
//! before the flip are visible once the flip is observed.

use std::fmt;
use std::sync::atomic::{AtomicI32, AtomicU8, Ordering};
use std::sync::Arc;

use crate::config::SyncCallConfig;
use crate::error::{BridgeError, BridgeResult, RemoteError};
use crate::serialization;
use crate::value::Value;

/// Lock value while the worker is still running the request.
pub const PENDING: i32 = 1;
/// Lock value once the result buffer holds the reply.
pub const RESOLVED: i32 = 2;

const LENGTH_PREFIX: usize = 4;

/// The shared 4-byte lock word.
#[derive(Debug, Clone, Default)]
pub struct SharedLock(Arc<AtomicI32>);

impl SharedLock {
    /// Marks the call as in flight.
    pub fn store_pending(&self) {
        self.0.store(PENDING, Ordering::Release);
    }

    /// Publishes the reply written to the result buffer.
    pub fn resolve(&self) {
        self.0.store(RESOLVED, Ordering::Release);
    }

    /// `true` once [`resolve`](Self::resolve) has been observed.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.0.load(Ordering::Acquire) == RESOLVED
    }
}

/// The shared result buffer.
#[derive(Clone)]
pub struct SharedResultBuffer(Arc<[AtomicU8]>);

impl SharedResultBuffer {
    /// Allocates a zeroed buffer of `capacity` bytes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self((0..capacity).map(|_| AtomicU8::new(0)).collect())
    }

    /// Total size in bytes, length prefix included.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.0.len()
    }

    /// Writes `payload` behind a little-endian `u32` length prefix.
    ///
    /// # Errors
    ///
    /// [`BridgeError::ResultTooLarge`] when prefix and payload do not fit.
    pub fn write_payload(&self, payload: &[u8]) -> BridgeResult<()> {
        let size = payload.len() + LENGTH_PREFIX;
        let too_large = || BridgeError::ResultTooLarge {
            size,
            capacity: self.capacity(),
        };
        if size > self.capacity() {
            return Err(too_large());
        }
        let length = u32::try_from(payload.len()).map_err(|_| too_large())?;
        let prefix = length.to_le_bytes();
        for (slot, byte) in self.0.iter().zip(prefix.iter().chain(payload)) {
            slot.store(*byte, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Reads the length-prefixed payload.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Serialization`] when the prefix points past the buffer.
    pub fn read_payload(&self) -> BridgeResult<Vec<u8>> {
        if self.capacity() < LENGTH_PREFIX {
            return Err(BridgeError::Serialization(
                "result buffer is smaller than its length prefix".to_string(),
            ));
        }
        let mut prefix = [0_u8; LENGTH_PREFIX];
        for (byte, slot) in prefix.iter_mut().zip(self.0.iter()) {
            *byte = slot.load(Ordering::Relaxed);
        }
        let length = usize::try_from(u32::from_le_bytes(prefix))
            .map_err(|e| BridgeError::Serialization(e.to_string()))?;
        let end = LENGTH_PREFIX + length;
        let Some(slots) = self.0.get(LENGTH_PREFIX..end) else {
            return Err(BridgeError::Serialization(format!(
                "payload length {length} exceeds the result buffer"
            )));
        };
        Ok(slots.iter().map(|slot| slot.load(Ordering::Relaxed)).collect())
    }
}

impl fmt::Debug for SharedResultBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedResultBuffer")
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// Shared buffers attached to a blocking request.
#[derive(Debug, Clone)]
pub struct SyncTrait {
    /// Lock word.
    pub lock: SharedLock,
    /// Result buffer.
    pub result: SharedResultBuffer,
}

impl SyncTrait {
    /// Allocates a lock and a result buffer of `capacity` bytes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            lock: SharedLock::default(),
            result: SharedResultBuffer::new(capacity),
        }
    }

    /// Worker side: writes `{ result }` or `{ error }` and flips the lock.
    ///
    /// A result that does not fit is replaced by the size error, so the
    /// waiter is always released.
    pub fn publish(&self, outcome: &BridgeResult<Value>) {
        if let Err(err) = self.write_outcome(outcome) {
            log::error!("failed to publish blocking-call result: {err}");
            let fallback = Err(err);
            if let Err(err) = self.write_outcome(&fallback) {
                log::error!("failed to publish blocking-call error: {err}");
            }
        }
        self.lock.resolve();
    }

    fn write_outcome(&self, outcome: &BridgeResult<Value>) -> BridgeResult<()> {
        let envelope = match outcome {
            Ok(result) => Value::object([("result", result.clone())]),
            Err(err) => Value::object([("error", Value::Error(err.to_error_object()))]),
        };
        let text = serialization::serialize(&envelope)?;
        self.result.write_payload(text.as_bytes())
    }

    /// Caller side: spins until the worker resolves the lock, then decodes the
    /// reply.
    ///
    /// Spins with [`std::hint::spin_loop`] for the first
    /// `spins_before_yield` iterations and yields the thread between checks
    /// after that.
    ///
    /// # Errors
    ///
    /// [`BridgeError::SyncTimeout`] after `max_spin_iterations` checks;
    /// [`BridgeError::Remote`] carrying the worker's error object otherwise.
    pub fn wait(&self, config: &SyncCallConfig) -> BridgeResult<Value> {
        let mut iterations: u64 = 0;
        while !self.lock.is_resolved() {
            if iterations >= config.max_spin_iterations {
                return Err(BridgeError::SyncTimeout { iterations });
            }
            if iterations < config.spins_before_yield {
                std::hint::spin_loop();
            } else {
                std::thread::yield_now();
            }
            iterations += 1;
        }
        self.read_reply()
    }

    fn read_reply(&self) -> BridgeResult<Value> {
        let payload = self.result.read_payload()?;
        let text =
            String::from_utf8(payload).map_err(|e| BridgeError::Serialization(e.to_string()))?;
        let reply = serialization::deserialize(&text)?;
        if let Some(error) = reply.get("error") {
            let error = serialization::deserialize_error(error)?;
            return Err(BridgeError::Remote(RemoteError(error)));
        }
        Ok(reply.get("result").cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick() -> SyncCallConfig {
        SyncCallConfig {
            max_spin_iterations: 10_000,
            spins_before_yield: 100,
            result_buffer_size: 64,
        }
    }

    #[test]
    fn test_length_prefix_is_little_endian() {
        let buffer = SharedResultBuffer::new(16);
        buffer.write_payload(b"abc").expect("write");
        let raw: Vec<u8> = buffer.0.iter().take(7).map(|b| b.load(Ordering::Relaxed)).collect();
        assert_eq!(raw, vec![3, 0, 0, 0, b'a', b'b', b'c']);
        assert_eq!(buffer.read_payload().expect("read"), b"abc");
    }

    #[test]
    fn test_payload_too_large() {
        let buffer = SharedResultBuffer::new(8);
        let err = buffer.write_payload(b"12345").expect_err("too large");
        assert!(matches!(err, BridgeError::ResultTooLarge { size: 9, capacity: 8 }));
    }

    #[test]
    fn test_timeout_when_never_resolved() {
        let sync = SyncTrait::new(64);
        sync.lock.store_pending();
        let err = sync.wait(&quick()).expect_err("timeout");
        assert!(matches!(err, BridgeError::SyncTimeout { iterations: 10_000 }));
    }

    #[test]
    fn test_publish_result_across_threads() {
        let sync = SyncTrait::new(256);
        sync.lock.store_pending();
        let worker_side = sync.clone();
        let handle = std::thread::spawn(move || {
            worker_side.publish(&Ok(Value::Bytes(vec![4, 5])));
        });
        let config = SyncCallConfig {
            max_spin_iterations: u64::MAX,
            ..quick()
        };
        assert_eq!(sync.wait(&config).expect("result"), Value::Bytes(vec![4, 5]));
        handle.join().expect("worker thread");
    }

    #[test]
    fn test_published_error_keeps_code() {
        let sync = SyncTrait::new(256);
        sync.publish(&Err(BridgeError::StatementNotFound(7)));
        let err = sync.wait(&quick()).expect_err("remote error");
        let BridgeError::Remote(remote) = err else {
            panic!("expected a remote error");
        };
        assert_eq!(remote.message(), "Statement not found - nativeStatementId[7]");
        assert_eq!(remote.code(), Some("STATEMENT_NOT_FOUND"));
    }

    #[test]
    fn test_oversized_result_is_replaced_by_error() {
        let sync = SyncTrait::new(256);
        sync.publish(&Ok(Value::Bytes(vec![0; 400])));
        let err = sync.wait(&quick()).expect_err("too large");
        let BridgeError::Remote(remote) = err else {
            panic!("expected a remote error");
        };
        assert_eq!(remote.code(), Some("RESULT_TOO_LARGE"));
    }
}
