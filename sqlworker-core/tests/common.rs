//! Common test utilities shared across integration tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sqlworker_core::{BridgeConfig, SyncCallConfig, WorkerChannel};
use uuid::Uuid;

pub fn temp_root() -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("sqlworker-test-{}", Uuid::new_v4()));
    path
}

/// A fresh worker whose database directory is `root`.
pub fn spawn_worker(root: &Path) -> Arc<WorkerChannel> {
    let config = BridgeConfig {
        sync: SyncCallConfig {
            // Generous enough for a loaded CI machine.
            max_spin_iterations: 500_000_000,
            ..SyncCallConfig::default()
        },
        ..BridgeConfig::default().with_database_directory(root)
    };
    WorkerChannel::spawn(config).expect("spawn worker")
}

pub fn cleanup_storage(root: &Path) {
    let _ = std::fs::remove_dir_all(root);
}
