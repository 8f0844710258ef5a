//! Safe wrapper around a `SQLite` database connection.
//!
//! This file contains **no `unsafe` code**. All FFI interaction is delegated to
//! [`ffi::RawDb`] which encapsulates the raw pointers and C type conversions.

use std::path::Path;
use std::rc::Rc;

use super::error::{DbError, DbResult};
use super::ffi::{self, RawDb};
use super::hook::UpdateEvent;
use super::session::Session;
use super::statement::{Statement, StatementHandle, StepResult};
use super::value::Value;

/// Path that opens a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

/// A `SQLite` database connection.
///
/// Closed when dropped. Not `Sync` or `Send`: a connection lives on the
/// thread that opened it.
pub struct Connection {
    db: Rc<RawDb>,
}

impl Connection {
    /// Opens (or creates) a database at `path`.
    ///
    /// `vfs` selects a registered VFS by name; `None` uses the default.
    ///
    /// # Errors
    ///
    /// Returns the engine error if the file cannot be opened.
    pub fn open(path: &Path, read_only: bool, vfs: Option<&str>) -> DbResult<Self> {
        let path_str = path.to_string_lossy();
        let mut flags = if read_only {
            ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_FULLMUTEX
        } else {
            ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE | ffi::SQLITE_OPEN_FULLMUTEX
        };
        if path_str == MEMORY_PATH {
            flags |= ffi::SQLITE_OPEN_MEMORY;
        }
        let db = RawDb::open(&path_str, flags, vfs)?;
        log::debug!("opened sqlite connection to {path_str}");
        Ok(Self { db: Rc::new(db) })
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns the engine error if the allocation fails.
    pub fn open_in_memory() -> DbResult<Self> {
        Self::open(Path::new(MEMORY_PATH), false, None)
    }

    /// Opens an in-memory database and loads `snapshot` into its `main`
    /// schema. The snapshot is copied; the engine owns its copy.
    ///
    /// # Errors
    ///
    /// Returns the engine error if the bytes are not a valid database image.
    pub fn open_from_snapshot(snapshot: &[u8]) -> DbResult<Self> {
        let connection = Self::open_in_memory()?;
        connection.deserialize("main", snapshot)?;
        Ok(connection)
    }

    /// Executes one or more SQL statements separated by semicolons.
    ///
    /// No result rows are returned. Suitable for DDL, PRAGMAs, and
    /// multi-statement scripts.
    ///
    /// # Errors
    ///
    /// Returns the first statement error.
    pub fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.db.exec(sql)
    }

    /// Prepares the first SQL statement in `sql`. Any further statements are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns the compile error, or "Failed to prepare statement" when `sql`
    /// contains no statement at all.
    pub fn prepare(&self, sql: &str) -> DbResult<Statement> {
        self.db
            .prepare(sql)?
            .map(Statement::new)
            .ok_or_else(|| DbError::new(ffi::SQLITE_ERROR, "Failed to prepare statement"))
    }

    /// Prepares and executes a single SQL statement with the given parameters.
    ///
    /// Returns the number of rows changed.
    ///
    /// # Errors
    ///
    /// Returns the prepare, bind or step error.
    pub fn execute(&self, sql: &str, params: &[Value]) -> DbResult<usize> {
        let stmt = self.prepare(sql)?;
        stmt.bind_values(params)?;
        stmt.step()?;
        Ok(self.changes())
    }

    /// Prepares and executes a statement, returning the first row if any.
    ///
    /// # Errors
    ///
    /// Returns the prepare, bind or step error.
    pub fn query_row(&self, sql: &str, params: &[Value]) -> DbResult<Option<Vec<Value>>> {
        let stmt = self.prepare(sql)?;
        stmt.bind_values(params)?;
        match stmt.step()? {
            StepResult::Row => stmt.column_values().map(Some),
            StepResult::Done => Ok(None),
        }
    }

    /// Returns the rowid of the most recent successful INSERT.
    #[must_use]
    pub fn last_insert_rowid(&self) -> i64 {
        self.db.last_insert_rowid()
    }

    /// Returns the number of rows changed by the most recent statement.
    #[must_use]
    pub fn changes(&self) -> usize {
        usize::try_from(self.db.changes()).unwrap_or(0)
    }

    /// `true` while an explicit transaction is open.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        !self.db.autocommit()
    }

    /// File backing `schema`, or `None` for in-memory and temporary databases.
    ///
    /// # Errors
    ///
    /// Returns an error if `schema` contains a NUL byte.
    pub fn filename(&self, schema: &str) -> DbResult<Option<String>> {
        self.db.filename(schema)
    }

    /// Every statement currently prepared (and not yet finalized) on this
    /// connection.
    #[must_use]
    pub fn statement_handles(&self) -> Vec<StatementHandle> {
        self.db
            .statement_addresses()
            .into_iter()
            .map(StatementHandle::from_address)
            .collect()
    }

    /// Installs `callback` as the row-change observer, replacing any previous
    /// one. `None` removes the observer.
    pub fn set_update_hook<F>(&self, callback: Option<F>)
    where
        F: FnMut(UpdateEvent) + 'static,
    {
        self.db.set_update_hook(callback.map(|mut callback| {
            Box::new(move |raw: ffi::RawUpdate| callback(UpdateEvent::from_raw(raw)))
                as Box<dyn FnMut(ffi::RawUpdate)>
        }));
    }

    // ── Snapshots ───────────────────────────────────────────────────────

    /// Serializes `schema` into a standalone database image.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema does not exist.
    pub fn serialize(&self, schema: &str) -> DbResult<Vec<u8>> {
        self.db.serialize(schema)
    }

    /// Replaces `schema` with a copy of the database image in `data`.
    ///
    /// # Errors
    ///
    /// Returns the engine error if the image is rejected.
    pub fn deserialize(&self, schema: &str, data: &[u8]) -> DbResult<()> {
        self.db.deserialize(schema, data)
    }

    /// Copies the whole of `schema` on this connection into `dest_schema` on
    /// `dest`, in a single backup step.
    ///
    /// # Errors
    ///
    /// Returns the engine error if the backup cannot start or finish.
    pub fn backup_to(&self, schema: &str, dest: &Self, dest_schema: &str) -> DbResult<()> {
        ffi::backup(&dest.db, dest_schema, &self.db, schema)
    }

    // ── Change tracking ─────────────────────────────────────────────────

    /// Creates a change-tracking session over `schema` (usually `"main"`).
    ///
    /// # Errors
    ///
    /// Returns the engine error if the session cannot be created.
    pub fn create_session(&self, schema: &str) -> DbResult<Session> {
        let raw = self.db.create_session(schema)?;
        Ok(Session::new(raw, Rc::clone(&self.db)))
    }

    /// Applies `changeset` to this connection. Conflicting rows are replaced;
    /// rows that no longer exist are skipped.
    ///
    /// # Errors
    ///
    /// Returns the engine error if the changeset is malformed or a constraint
    /// aborts the apply.
    pub fn apply_changeset(&self, changeset: &[u8]) -> DbResult<()> {
        self.db.apply_changeset(changeset)
    }
}

/// Produces the inverse of `changeset`: inserts become deletes and vice versa,
/// updates swap old and new values.
///
/// # Errors
///
/// Returns the engine error if the changeset is malformed.
pub fn invert_changeset(changeset: &[u8]) -> DbResult<Vec<u8>> {
    ffi::invert_changeset(changeset)
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}
