//! The worker: a dedicated thread owning every SQLite connection.
//!
//! Requests are handled one at a time, in arrival order, by a single
//! [`WorkerState`]. Connections never leave the worker thread.

mod asset;
mod bind;
mod dispatch;
mod tables;
pub mod vfs;

use std::sync::mpsc;
use std::thread;

pub use asset::AssetFetcher;
pub use bind::{coerce, BindValue};
pub use dispatch::WorkerState;

use crate::channel::WorkerPort;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::protocol::{OutboundMessage, WorkerMessage};

/// Posts requests onto the worker thread's queue.
#[derive(Debug, Clone)]
pub struct ThreadWorker {
    inbox: mpsc::Sender<WorkerMessage>,
}

impl WorkerPort for ThreadWorker {
    fn post(&self, message: WorkerMessage) -> BridgeResult<()> {
        self.inbox
            .send(message)
            .map_err(|_| BridgeError::WorkerTerminated)
    }
}

/// Starts the worker thread.
///
/// Returns the port requests are posted through and the receiving end of the
/// worker's replies and change events. The worker exits once every port
/// clone is dropped.
///
/// # Errors
///
/// [`BridgeError::Io`] if the thread cannot be spawned.
pub fn spawn_worker(
    config: BridgeConfig,
) -> BridgeResult<(ThreadWorker, mpsc::Receiver<OutboundMessage>)> {
    let (inbox, requests) = mpsc::channel::<WorkerMessage>();
    let (outbound, replies) = mpsc::channel();
    thread::Builder::new()
        .name("sqlworker".to_string())
        .spawn(move || {
            let mut state = WorkerState::new(&config, outbound);
            for message in requests {
                state.handle(message);
            }
            log::debug!("sqlworker thread exiting");
        })?;
    Ok((ThreadWorker { inbox }, replies))
}

#[cfg(test)]
mod tests;
