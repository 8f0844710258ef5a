//! Storage backends the worker opens databases through.
//!
//! The durable backend keeps database files under one directory; the memory
//! backend serves the `:memory:` marker and holds nothing on disk.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{BridgeError, BridgeResult};
use crate::protocol::MEMORY_DATABASE_PATH;

/// Files SQLite keeps next to a database.
const COMPANION_SUFFIXES: [&str; 3] = ["-wal", "-shm", "-journal"];

/// A place databases live.
pub trait StorageBackend {
    /// Short name used in log messages.
    fn name(&self) -> &'static str;

    /// Path handed to the engine for `database_path`.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Io`] if the backing storage cannot be prepared.
    fn resolve(&self, database_path: &str) -> BridgeResult<PathBuf>;

    /// `true` when a database already exists at `database_path`.
    fn exists(&self, database_path: &str) -> bool;

    /// Deletes the database at `database_path`.
    ///
    /// # Errors
    ///
    /// [`BridgeError::DatabaseFileNotFound`] when there is nothing to delete,
    /// [`BridgeError::Io`] for any other failure.
    fn delete(&self, database_path: &str) -> BridgeResult<()>;
}

/// Durable storage rooted at a directory. Relative paths resolve against the
/// root; absolute paths are used as they are.
#[derive(Debug, Clone)]
pub struct DirectoryBackend {
    root: PathBuf,
}

impl DirectoryBackend {
    /// Creates a backend rooted at `root`. The directory is created on first
    /// use.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, database_path: &str) -> PathBuf {
        let path = Path::new(database_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl StorageBackend for DirectoryBackend {
    fn name(&self) -> &'static str {
        "directory"
    }

    fn resolve(&self, database_path: &str) -> BridgeResult<PathBuf> {
        let path = self.path_of(database_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(path)
    }

    fn exists(&self, database_path: &str) -> bool {
        self.path_of(database_path).is_file()
    }

    fn delete(&self, database_path: &str) -> BridgeResult<()> {
        let path = self.path_of(database_path);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(BridgeError::DatabaseFileNotFound(
                    path.display().to_string(),
                ));
            }
            Err(err) => return Err(err.into()),
        }
        for suffix in COMPANION_SUFFIXES {
            let mut companion = path.clone().into_os_string();
            companion.push(suffix);
            match fs::remove_file(&companion) {
                Err(err) if err.kind() != io::ErrorKind::NotFound => return Err(err.into()),
                _ => {}
            }
        }
        log::debug!("deleted database {}", path.display());
        Ok(())
    }
}

/// Pure in-memory storage. Every open gets a fresh, private database.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryBackend;

impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn resolve(&self, _database_path: &str) -> BridgeResult<PathBuf> {
        Ok(PathBuf::from(MEMORY_DATABASE_PATH))
    }

    fn exists(&self, _database_path: &str) -> bool {
        false
    }

    fn delete(&self, _database_path: &str) -> BridgeResult<()> {
        Ok(())
    }
}

/// `true` for the in-memory marker.
#[must_use]
pub fn is_memory_path(database_path: &str) -> bool {
    database_path == MEMORY_DATABASE_PATH
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_and_absolute_resolution() {
        let dir = tempfile::tempdir().expect("temp dir");
        let backend = DirectoryBackend::new(dir.path().join("dbs"));
        let resolved = backend.resolve("nested/app.db").expect("resolve");
        assert_eq!(resolved, dir.path().join("dbs/nested/app.db"));
        assert!(dir.path().join("dbs/nested").is_dir());

        let absolute = dir.path().join("elsewhere.db");
        let absolute_str = absolute.to_str().expect("utf-8 path");
        assert_eq!(backend.resolve(absolute_str).expect("resolve"), absolute);
    }

    #[test]
    fn test_delete_removes_companions() {
        let dir = tempfile::tempdir().expect("temp dir");
        let backend = DirectoryBackend::new(dir.path());
        fs::write(dir.path().join("app.db"), b"db").expect("write db");
        fs::write(dir.path().join("app.db-wal"), b"wal").expect("write wal");
        assert!(backend.exists("app.db"));

        backend.delete("app.db").expect("delete");
        assert!(!backend.exists("app.db"));
        assert!(!dir.path().join("app.db-wal").exists());
    }

    #[test]
    fn test_delete_missing_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let backend = DirectoryBackend::new(dir.path());
        assert!(matches!(
            backend.delete("missing.db"),
            Err(BridgeError::DatabaseFileNotFound(_))
        ));
    }

    #[test]
    fn test_memory_backend() {
        assert!(is_memory_path(":memory:"));
        assert!(!MemoryBackend.exists(":memory:"));
        assert!(MemoryBackend.delete(":memory:").is_ok());
        assert_eq!(
            MemoryBackend.resolve(":memory:").expect("resolve"),
            PathBuf::from(":memory:")
        );
    }
}
