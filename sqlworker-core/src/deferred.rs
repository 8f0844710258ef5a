//! Single-resolution future.
//!
//! A [`Deferred`] separates settling a result from waiting on it: the worker
//! channel keeps the `Deferred` in its pending table and hands the matching
//! [`Promise`] to the caller. The first call to [`Deferred::resolve`] or
//! [`Deferred::reject`] wins; later calls change nothing.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::{BridgeError, BridgeResult};

/// Settling side of a single-resolution future.
#[derive(Debug)]
pub struct Deferred<T> {
    sender: Mutex<Option<oneshot::Sender<BridgeResult<T>>>>,
    receiver: Mutex<Option<oneshot::Receiver<BridgeResult<T>>>>,
}

impl<T> Deferred<T> {
    /// Creates an unsettled deferred.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = oneshot::channel();
        Self {
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
        }
    }

    /// Hands out the waiting side. Returns `None` once it has been taken.
    pub fn promise(&self) -> Option<Promise<T>> {
        self.receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map(|receiver| Promise { receiver })
    }

    /// Settles with a value. Returns `false` if already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Settles with an error. Returns `false` if already settled.
    pub fn reject(&self, error: BridgeError) -> bool {
        self.settle(Err(error))
    }

    /// `true` once [`resolve`](Self::resolve) or [`reject`](Self::reject) has
    /// been called.
    pub fn is_settled(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn settle(&self, outcome: BridgeResult<T>) -> bool {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        sender.is_some_and(|sender| {
            // A dropped promise just means nobody is waiting any more.
            let _ = sender.send(outcome);
            true
        })
    }
}

impl<T> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Waiting side of a [`Deferred`].
///
/// Resolves to [`BridgeError::WorkerTerminated`] if the deferred is dropped
/// without being settled.
#[derive(Debug)]
pub struct Promise<T> {
    receiver: oneshot::Receiver<BridgeResult<T>>,
}

impl<T> Promise<T> {
    /// Blocks the current thread until the deferred settles.
    ///
    /// Must not be called from inside an async runtime.
    ///
    /// # Errors
    ///
    /// The rejection, or [`BridgeError::WorkerTerminated`].
    pub fn wait(self) -> BridgeResult<T> {
        self.receiver
            .blocking_recv()
            .unwrap_or(Err(BridgeError::WorkerTerminated))
    }
}

impl<T> Future for Promise<T> {
    type Output = BridgeResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(BridgeError::WorkerTerminated)))
    }
}
