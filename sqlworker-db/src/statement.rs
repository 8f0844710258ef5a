//! Safe wrapper around a `SQLite` prepared statement.
//!
//! This file contains **no `unsafe` code**. All FFI interaction is delegated to
//! [`ffi::RawStmt`] which encapsulates the raw pointers and C type conversions.
//!
//! Statements carry no borrow of their [`Connection`](super::Connection): the
//! connection is closed with `sqlite3_close_v2`, which keeps the engine handle
//! alive until the last statement is finalized. This lets the worker keep
//! statements in handle tables next to the connection they came from.

use super::error::{DbError, DbResult};
use super::ffi::{self, RawStmt};
use super::value::Value;

/// Result of a single `sqlite3_step` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    /// A result row is available.
    Row,
    /// The statement has finished executing.
    Done,
}

/// Identity of a prepared statement within its connection.
///
/// Compared against [`Connection::statement_handles`](super::Connection::statement_handles)
/// to find statements that are still live on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatementHandle(usize);

impl StatementHandle {
    pub(super) const fn from_address(address: usize) -> Self {
        Self(address)
    }
}

/// A prepared `SQLite` statement.
///
/// Created via [`Connection::prepare`](super::Connection::prepare).
/// Finalized when dropped, or explicitly with [`finalize`](Self::finalize).
pub struct Statement {
    raw: RawStmt,
}

impl Statement {
    pub(super) const fn new(raw: RawStmt) -> Self {
        Self { raw }
    }

    /// Engine identity of this statement.
    #[must_use]
    pub fn handle(&self) -> StatementHandle {
        StatementHandle::from_address(self.raw.address())
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Executes a single step.
    ///
    /// # Errors
    ///
    /// Any outcome other than a row or completion, carrying the connection's
    /// error message.
    pub fn step(&self) -> DbResult<StepResult> {
        let rc = self.raw.step()?;
        if rc == ffi::SQLITE_ROW {
            Ok(StepResult::Row)
        } else {
            Ok(StepResult::Done)
        }
    }

    /// Rewinds the statement so it can be stepped again. Bindings are kept.
    ///
    /// # Errors
    ///
    /// Returns the error of the most recent failed step, if there was one.
    pub fn reset(&self) -> DbResult<()> {
        self.raw.reset()
    }

    /// Resets every parameter to NULL.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the call.
    pub fn clear_bindings(&self) -> DbResult<()> {
        self.raw.clear_bindings()
    }

    /// Finalizes the statement, releasing it from its connection.
    ///
    /// # Errors
    ///
    /// Returns the error of the most recent failed step, if there was one.
    /// The statement is released either way.
    pub fn finalize(self) -> DbResult<()> {
        self.raw.finalize()
    }

    // ── Binding ─────────────────────────────────────────────────────────

    /// Number of parameters the statement declares.
    #[must_use]
    pub fn parameter_count(&self) -> usize {
        usize::try_from(self.raw.bind_parameter_count()).unwrap_or(0)
    }

    /// 1-based index of the named parameter (`:name`, `$name` or `@name`),
    /// or `None` when the statement has no such parameter.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` contains a NUL byte.
    pub fn parameter_index(&self, name: &str) -> DbResult<Option<i32>> {
        let idx = self.raw.bind_parameter_index(name)?;
        Ok((idx > 0).then_some(idx))
    }

    /// Binds SQL NULL.
    ///
    /// # Errors
    ///
    /// Returns an error if `idx` is out of range.
    pub fn bind_null(&self, idx: i32) -> DbResult<()> {
        self.raw.bind_null(idx)
    }

    /// Binds a 32-bit integer.
    ///
    /// # Errors
    ///
    /// Returns an error if `idx` is out of range.
    pub fn bind_int(&self, idx: i32, value: i32) -> DbResult<()> {
        self.raw.bind_int(idx, value)
    }

    /// Binds a 64-bit integer.
    ///
    /// # Errors
    ///
    /// Returns an error if `idx` is out of range.
    pub fn bind_int64(&self, idx: i32, value: i64) -> DbResult<()> {
        self.raw.bind_int64(idx, value)
    }

    /// Binds a double.
    ///
    /// # Errors
    ///
    /// Returns an error if `idx` is out of range.
    pub fn bind_double(&self, idx: i32, value: f64) -> DbResult<()> {
        self.raw.bind_double(idx, value)
    }

    /// Binds UTF-8 text. The engine copies the value.
    ///
    /// # Errors
    ///
    /// Returns an error if `idx` is out of range.
    pub fn bind_text(&self, idx: i32, value: &str) -> DbResult<()> {
        self.raw.bind_text(idx, value)
    }

    /// Binds a blob. The engine copies the value.
    ///
    /// # Errors
    ///
    /// Returns an error if `idx` is out of range.
    pub fn bind_blob(&self, idx: i32, value: &[u8]) -> DbResult<()> {
        self.raw.bind_blob(idx, value)
    }

    /// Binds a slice of [`Value`]s to the statement parameters (1-indexed).
    ///
    /// # Errors
    ///
    /// Returns an error if there are more values than parameters.
    pub fn bind_values(&self, values: &[Value]) -> DbResult<()> {
        for (i, val) in values.iter().enumerate() {
            let idx = i32::try_from(i + 1)
                .map_err(|_| DbError::new(ffi::SQLITE_TOOBIG, "parameter index overflow"))?;
            match val {
                Value::Integer(v) => self.raw.bind_int64(idx, *v)?,
                Value::Real(v) => self.raw.bind_double(idx, *v)?,
                Value::Text(v) => self.raw.bind_text(idx, v)?,
                Value::Blob(v) => self.raw.bind_blob(idx, v)?,
                Value::Null => self.raw.bind_null(idx)?,
            }
        }
        Ok(())
    }

    // ── Columns ─────────────────────────────────────────────────────────

    /// Number of result columns.
    #[must_use]
    pub fn column_count(&self) -> usize {
        usize::try_from(self.raw.column_count()).unwrap_or(0)
    }

    /// Names of all result columns, in order.
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        (0..self.raw.column_count())
            .map(|idx| self.raw.column_name(idx).unwrap_or_default())
            .collect()
    }

    /// Reads one column of the current row, dispatching on its storage class.
    ///
    /// # Errors
    ///
    /// Returns an error for a storage class the wrapper does not know.
    pub fn column_value(&self, idx: usize) -> DbResult<Value> {
        let idx = i32::try_from(idx)
            .map_err(|_| DbError::new(ffi::SQLITE_TOOBIG, "column index overflow"))?;
        match self.raw.column_type(idx) {
            ffi::SQLITE_INTEGER => Ok(Value::Integer(self.raw.column_int64(idx))),
            ffi::SQLITE_FLOAT => Ok(Value::Real(self.raw.column_double(idx))),
            ffi::SQLITE_TEXT => Ok(Value::Text(self.raw.column_text(idx))),
            ffi::SQLITE_BLOB => Ok(Value::Blob(self.raw.column_blob(idx))),
            ffi::SQLITE_NULL => Ok(Value::Null),
            other => Err(DbError::new(
                ffi::SQLITE_MISUSE,
                format!("Unsupported column type: {other}"),
            )),
        }
    }

    /// Reads every column of the current row.
    ///
    /// # Errors
    ///
    /// See [`column_value`](Self::column_value).
    pub fn column_values(&self) -> DbResult<Vec<Value>> {
        (0..self.column_count())
            .map(|idx| self.column_value(idx))
            .collect()
    }
}

impl std::fmt::Debug for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("handle", &self.handle())
            .finish_non_exhaustive()
    }
}
