//! Bridge configuration.
//!
//! Every setting has a default; [`BridgeConfig::from_env`] applies the
//! `SQLWORKER_*` environment overrides on top of them.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};

/// Overrides the durable database directory.
pub const DATABASE_DIR_ENV: &str = "SQLWORKER_DATABASE_DIR";
/// Overrides [`SyncCallConfig::max_spin_iterations`].
pub const SYNC_MAX_SPINS_ENV: &str = "SQLWORKER_SYNC_MAX_SPINS";

/// Size of the shared result buffer used by blocking calls (1 MiB).
pub const DEFAULT_RESULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Top-level configuration for the worker and its channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Root directory of the durable storage backend. Relative database paths
    /// resolve against it.
    pub database_directory: PathBuf,
    /// Blocking call path tuning.
    pub sync: SyncCallConfig,
    /// Asset download tuning.
    pub asset_fetch: AssetFetchConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            database_directory: std::env::temp_dir().join("sqlworker"),
            sync: SyncCallConfig::default(),
            asset_fetch: AssetFetchConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Defaults with environment overrides applied.
    ///
    /// An override that does not parse is ignored with a warning.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(dir) = std::env::var_os(DATABASE_DIR_ENV) {
            config.database_directory = PathBuf::from(dir);
        }
        if let Ok(raw) = std::env::var(SYNC_MAX_SPINS_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(spins) => config.sync.max_spin_iterations = spins,
                Err(err) => log::warn!("ignoring {SYNC_MAX_SPINS_ENV}={raw}: {err}"),
            }
        }
        config
    }

    /// Parses a JSON configuration document. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Serialization`] for invalid JSON.
    pub fn from_json(json: &str) -> BridgeResult<Self> {
        serde_json::from_str(json).map_err(|e| BridgeError::Serialization(e.to_string()))
    }

    /// Uses `dir` as the durable database directory.
    #[must_use]
    pub fn with_database_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.database_directory = dir.into();
        self
    }
}

/// Tuning of the blocking call path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncCallConfig {
    /// Spin iterations after which a blocking call fails with a timeout.
    pub max_spin_iterations: u64,
    /// Iterations of pure spinning before the waiter starts yielding the
    /// thread between checks.
    pub spins_before_yield: u64,
    /// Capacity of the shared result buffer, length prefix included.
    pub result_buffer_size: usize,
}

impl Default for SyncCallConfig {
    fn default() -> Self {
        Self {
            max_spin_iterations: 50_000_000,
            spins_before_yield: 1_000,
            result_buffer_size: DEFAULT_RESULT_BUFFER_SIZE,
        }
    }
}

/// Tuning of asset downloads for `importAssetDatabase`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetFetchConfig {
    /// Per-attempt timeout in seconds.
    pub timeout_secs: u64,
    /// Retries after the first attempt for transient failures.
    pub max_retries: u32,
}

impl Default for AssetFetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.sync.max_spin_iterations, 50_000_000);
        assert_eq!(config.sync.result_buffer_size, 1024 * 1024);
        assert_eq!(config.asset_fetch.max_retries, 3);
        assert!(config.database_directory.ends_with("sqlworker"));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = BridgeConfig::from_json(
            r#"{"sync": {"max_spin_iterations": 10}}"#,
        )
        .expect("parse config");
        assert_eq!(config.sync.max_spin_iterations, 10);
        assert_eq!(config.sync.spins_before_yield, 1_000);
        assert_eq!(config.asset_fetch, AssetFetchConfig::default());
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            BridgeConfig::from_json("{"),
            Err(BridgeError::Serialization(_))
        ));
    }
}
