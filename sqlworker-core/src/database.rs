//! High-level database API built on the native shims.
//!
//! [`SqliteDatabase`] owns a [`NativeDatabase`] and hands out statements and
//! sessions bound to it, so callers never pass the database around. Rows come
//! back as [`Row`]s that pair column names with values.
//!
//! Handles are not closed on drop: call `close_*`/`finalize_*` explicitly.

use std::future::Future;
use std::sync::Arc;

use crate::channel::WorkerChannel;
use crate::error::BridgeResult;
use crate::native::{NativeDatabase, NativeSession, NativeStatement};
use crate::protocol::{BindParams, OpenOptions, RunResult, MEMORY_DATABASE_PATH};
use crate::value::Value;

/// One result row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    /// Value of the first column named `column`.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|name| name == column)
            .and_then(|idx| self.values.get(idx))
    }

    /// Column names, in result order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Column values, in result order.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    #[must_use]
    #[allow(missing_docs)]
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// The row as an object keyed by column name. A later duplicate column
    /// name wins.
    #[must_use]
    pub fn to_object(&self) -> Value {
        Value::object(self.columns.iter().cloned().zip(self.values.iter().cloned()))
    }
}

fn rows(columns: Vec<String>, values: impl IntoIterator<Item = Vec<Value>>) -> Vec<Row> {
    let columns: Arc<[String]> = columns.into();
    values
        .into_iter()
        .map(|values| Row {
            columns: Arc::clone(&columns),
            values,
        })
        .collect()
}

/// Keeps the first error: `result`'s if it failed, `cleanup`'s otherwise.
fn first_error<T>(result: BridgeResult<T>, cleanup: BridgeResult<()>) -> BridgeResult<T> {
    let value = result?;
    cleanup?;
    Ok(value)
}

// ── Database ────────────────────────────────────────────────────────────

/// An open database.
#[derive(Debug, Clone)]
pub struct SqliteDatabase {
    native: Arc<NativeDatabase>,
}

impl SqliteDatabase {
    /// Opens the database at `database_path` through `channel`.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Remote`](crate::BridgeError::Remote) carrying the
    /// worker's error; the same applies to every other operation here.
    pub async fn open_database_async(
        channel: Arc<WorkerChannel>,
        database_path: &str,
        options: OpenOptions,
    ) -> BridgeResult<Self> {
        let native = NativeDatabase::new(channel, database_path, options);
        native.init_async().await?;
        Ok(Self::from_native(native))
    }

    /// Blocking [`open_database_async`](Self::open_database_async).
    ///
    /// # Errors
    ///
    /// See [`open_database_async`](Self::open_database_async).
    pub fn open_database_sync(
        channel: Arc<WorkerChannel>,
        database_path: &str,
        options: OpenOptions,
    ) -> BridgeResult<Self> {
        let native = NativeDatabase::new(channel, database_path, options);
        native.init_sync()?;
        Ok(Self::from_native(native))
    }

    /// Opens a private in-memory database loaded from `serialized_data`.
    ///
    /// # Errors
    ///
    /// See [`open_database_async`](Self::open_database_async).
    pub async fn deserialize_database_async(
        channel: Arc<WorkerChannel>,
        serialized_data: Vec<u8>,
        options: OpenOptions,
    ) -> BridgeResult<Self> {
        let native = NativeDatabase::from_serialized(
            channel,
            MEMORY_DATABASE_PATH,
            options,
            serialized_data,
        );
        native.init_async().await?;
        Ok(Self::from_native(native))
    }

    /// Blocking [`deserialize_database_async`](Self::deserialize_database_async).
    ///
    /// # Errors
    ///
    /// See [`open_database_async`](Self::open_database_async).
    pub fn deserialize_database_sync(
        channel: Arc<WorkerChannel>,
        serialized_data: Vec<u8>,
        options: OpenOptions,
    ) -> BridgeResult<Self> {
        let native = NativeDatabase::from_serialized(
            channel,
            MEMORY_DATABASE_PATH,
            options,
            serialized_data,
        );
        native.init_sync()?;
        Ok(Self::from_native(native))
    }

    /// Wraps a handle that is already open.
    #[must_use]
    pub fn from_native(native: NativeDatabase) -> Self {
        Self {
            native: Arc::new(native),
        }
    }

    /// The underlying handle.
    #[must_use]
    pub fn native(&self) -> &NativeDatabase {
        &self.native
    }

    /// Runs `source`, which may hold several statements, and discards any rows.
    ///
    /// # Errors
    ///
    /// See [`open_database_async`](Self::open_database_async).
    pub async fn exec_async(&self, source: &str) -> BridgeResult<()> {
        self.native.exec_async(source).await
    }

    /// Blocking [`exec_async`](Self::exec_async).
    ///
    /// # Errors
    ///
    /// See [`open_database_async`](Self::open_database_async).
    pub fn exec_sync(&self, source: &str) -> BridgeResult<()> {
        self.native.exec_sync(source)
    }

    /// Compiles the first statement of `source`.
    ///
    /// # Errors
    ///
    /// See [`open_database_async`](Self::open_database_async).
    pub async fn prepare_async(&self, source: &str) -> BridgeResult<SqliteStatement> {
        let statement = NativeStatement::new(Arc::clone(self.native.channel()));
        self.native.prepare_async(&statement, source).await?;
        Ok(self.statement(statement))
    }

    /// Blocking [`prepare_async`](Self::prepare_async).
    ///
    /// # Errors
    ///
    /// See [`open_database_async`](Self::open_database_async).
    pub fn prepare_sync(&self, source: &str) -> BridgeResult<SqliteStatement> {
        let statement = NativeStatement::new(Arc::clone(self.native.channel()));
        self.native.prepare_sync(&statement, source)?;
        Ok(self.statement(statement))
    }

    /// Runs `source` once with `params` and finalizes it.
    ///
    /// # Errors
    ///
    /// See [`open_database_async`](Self::open_database_async).
    pub async fn run_async(&self, source: &str, params: BindParams) -> BridgeResult<RunResult> {
        let statement = self.prepare_async(source).await?;
        let result = statement.run_async(params).await;
        first_error(result, statement.finalize_async().await)
    }

    /// Blocking [`run_async`](Self::run_async).
    ///
    /// # Errors
    ///
    /// See [`open_database_async`](Self::open_database_async).
    pub fn run_sync(&self, source: &str, params: BindParams) -> BridgeResult<RunResult> {
        let statement = self.prepare_sync(source)?;
        let result = statement.run_sync(params);
        first_error(result, statement.finalize_sync())
    }

    /// First row of `source`, if any.
    ///
    /// # Errors
    ///
    /// See [`open_database_async`](Self::open_database_async).
    pub async fn get_first_async(
        &self,
        source: &str,
        params: BindParams,
    ) -> BridgeResult<Option<Row>> {
        let statement = self.prepare_async(source).await?;
        let result = statement.get_first_async(params).await;
        first_error(result, statement.finalize_async().await)
    }

    /// Blocking [`get_first_async`](Self::get_first_async).
    ///
    /// # Errors
    ///
    /// See [`open_database_async`](Self::open_database_async).
    pub fn get_first_sync(&self, source: &str, params: BindParams) -> BridgeResult<Option<Row>> {
        let statement = self.prepare_sync(source)?;
        let result = statement.get_first_sync(params);
        first_error(result, statement.finalize_sync())
    }

    /// Every row of `source`.
    ///
    /// # Errors
    ///
    /// See [`open_database_async`](Self::open_database_async).
    pub async fn get_all_async(&self, source: &str, params: BindParams) -> BridgeResult<Vec<Row>> {
        let statement = self.prepare_async(source).await?;
        let result = statement.get_all_async(params).await;
        first_error(result, statement.finalize_async().await)
    }

    /// Blocking [`get_all_async`](Self::get_all_async).
    ///
    /// # Errors
    ///
    /// See [`open_database_async`](Self::open_database_async).
    pub fn get_all_sync(&self, source: &str, params: BindParams) -> BridgeResult<Vec<Row>> {
        let statement = self.prepare_sync(source)?;
        let result = statement.get_all_sync(params);
        first_error(result, statement.finalize_sync())
    }

    /// Runs `task` inside `BEGIN`/`COMMIT`. The transaction is rolled back
    /// when `task` fails, and `task`'s error is returned.
    ///
    /// Other callers sharing the connection see the open transaction while
    /// `task` runs.
    ///
    /// # Errors
    ///
    /// `task`'s error, or the error of `BEGIN`/`COMMIT`.
    #[allow(clippy::future_not_send)]
    pub async fn with_transaction_async<'a, F, Fut, T>(&'a self, task: F) -> BridgeResult<T>
    where
        F: FnOnce(&'a Self) -> Fut,
        Fut: Future<Output = BridgeResult<T>>,
    {
        self.exec_async("BEGIN").await?;
        match task(self).await {
            Ok(value) => {
                self.exec_async("COMMIT").await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = self.exec_async("ROLLBACK").await {
                    log::warn!("rollback after failed transaction: {rollback}");
                }
                Err(err)
            }
        }
    }

    /// Blocking [`with_transaction_async`](Self::with_transaction_async).
    ///
    /// # Errors
    ///
    /// See [`with_transaction_async`](Self::with_transaction_async).
    pub fn with_transaction_sync<T>(
        &self,
        task: impl FnOnce(&Self) -> BridgeResult<T>,
    ) -> BridgeResult<T> {
        self.exec_sync("BEGIN")?;
        match task(self) {
            Ok(value) => {
                self.exec_sync("COMMIT")?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = self.exec_sync("ROLLBACK") {
                    log::warn!("rollback after failed transaction: {rollback}");
                }
                Err(err)
            }
        }
    }

    /// `true` while a transaction is open on the connection.
    ///
    /// # Errors
    ///
    /// See [`open_database_async`](Self::open_database_async).
    pub async fn is_in_transaction_async(&self) -> BridgeResult<bool> {
        self.native.is_in_transaction_async().await
    }

    /// Blocking [`is_in_transaction_async`](Self::is_in_transaction_async).
    ///
    /// # Errors
    ///
    /// See [`open_database_async`](Self::open_database_async).
    pub fn is_in_transaction_sync(&self) -> BridgeResult<bool> {
        self.native.is_in_transaction_sync()
    }

    /// Standalone image of schema `schema_name` (usually `"main"`).
    ///
    /// # Errors
    ///
    /// See [`open_database_async`](Self::open_database_async).
    pub async fn serialize_async(&self, schema_name: &str) -> BridgeResult<Vec<u8>> {
        self.native.serialize_async(schema_name).await
    }

    /// Blocking [`serialize_async`](Self::serialize_async).
    ///
    /// # Errors
    ///
    /// See [`open_database_async`](Self::open_database_async).
    pub fn serialize_sync(&self, schema_name: &str) -> BridgeResult<Vec<u8>> {
        self.native.serialize_sync(schema_name)
    }

    /// Starts a change-tracking session over schema `db_name`.
    ///
    /// # Errors
    ///
    /// See [`open_database_async`](Self::open_database_async).
    pub async fn create_session_async(&self, db_name: &str) -> BridgeResult<SqliteSession> {
        let session = NativeSession::new(Arc::clone(self.native.channel()));
        self.native.create_session_async(&session, db_name).await?;
        Ok(self.session(session))
    }

    /// Blocking [`create_session_async`](Self::create_session_async).
    ///
    /// # Errors
    ///
    /// See [`open_database_async`](Self::open_database_async).
    pub fn create_session_sync(&self, db_name: &str) -> BridgeResult<SqliteSession> {
        let session = NativeSession::new(Arc::clone(self.native.channel()));
        self.native.create_session_sync(&session, db_name)?;
        Ok(self.session(session))
    }

    /// Closes this handle. Sessions created through it are closed too.
    ///
    /// # Errors
    ///
    /// See [`open_database_async`](Self::open_database_async).
    pub async fn close_async(&self) -> BridgeResult<()> {
        self.native.close_async().await
    }

    /// Blocking [`close_async`](Self::close_async).
    ///
    /// # Errors
    ///
    /// See [`open_database_async`](Self::open_database_async).
    pub fn close_sync(&self) -> BridgeResult<()> {
        self.native.close_sync()
    }

    fn statement(&self, native: NativeStatement) -> SqliteStatement {
        SqliteStatement {
            native,
            database: Arc::clone(&self.native),
        }
    }

    fn session(&self, native: NativeSession) -> SqliteSession {
        SqliteSession {
            native,
            database: Arc::clone(&self.native),
        }
    }
}

// ── Statements ──────────────────────────────────────────────────────────

/// A prepared statement of a [`SqliteDatabase`].
#[derive(Debug)]
pub struct SqliteStatement {
    native: NativeStatement,
    database: Arc<NativeDatabase>,
}

impl SqliteStatement {
    /// The underlying handle.
    #[must_use]
    pub const fn native(&self) -> &NativeStatement {
        &self.native
    }

    /// Binds `params` and steps once.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Remote`](crate::BridgeError::Remote) carrying the
    /// worker's error; the same applies to every other operation here.
    pub async fn run_async(&self, params: BindParams) -> BridgeResult<RunResult> {
        self.native.run_async(&self.database, params).await
    }

    /// Blocking [`run_async`](Self::run_async).
    ///
    /// # Errors
    ///
    /// See [`run_async`](Self::run_async).
    pub fn run_sync(&self, params: BindParams) -> BridgeResult<RunResult> {
        self.native.run_sync(&self.database, params)
    }

    /// Binds `params` and returns the first row. The statement is reset
    /// afterwards.
    ///
    /// # Errors
    ///
    /// See [`run_async`](Self::run_async).
    pub async fn get_first_async(&self, params: BindParams) -> BridgeResult<Option<Row>> {
        let result = self.native.run_async(&self.database, params).await?;
        let row = if result.first_row_values.is_empty() {
            None
        } else {
            let columns = self.native.get_column_names_async().await?;
            rows(columns, [result.first_row_values]).pop()
        };
        self.native.reset_async(&self.database).await?;
        Ok(row)
    }

    /// Blocking [`get_first_async`](Self::get_first_async).
    ///
    /// # Errors
    ///
    /// See [`run_async`](Self::run_async).
    pub fn get_first_sync(&self, params: BindParams) -> BridgeResult<Option<Row>> {
        let result = self.native.run_sync(&self.database, params)?;
        let row = if result.first_row_values.is_empty() {
            None
        } else {
            let columns = self.native.get_column_names_sync()?;
            rows(columns, [result.first_row_values]).pop()
        };
        self.native.reset_sync(&self.database)?;
        Ok(row)
    }

    /// Binds `params` and returns every row. The statement is reset
    /// afterwards.
    ///
    /// # Errors
    ///
    /// See [`run_async`](Self::run_async).
    pub async fn get_all_async(&self, params: BindParams) -> BridgeResult<Vec<Row>> {
        let result = self.native.run_async(&self.database, params).await?;
        let mut values = Vec::new();
        // Stepping a finished statement would run it again.
        if !result.first_row_values.is_empty() {
            values.push(result.first_row_values);
            values.extend(self.native.get_all_async(&self.database).await?);
        }
        let columns = self.native.get_column_names_async().await?;
        self.native.reset_async(&self.database).await?;
        Ok(rows(columns, values))
    }

    /// Blocking [`get_all_async`](Self::get_all_async).
    ///
    /// # Errors
    ///
    /// See [`run_async`](Self::run_async).
    pub fn get_all_sync(&self, params: BindParams) -> BridgeResult<Vec<Row>> {
        let result = self.native.run_sync(&self.database, params)?;
        let mut values = Vec::new();
        if !result.first_row_values.is_empty() {
            values.push(result.first_row_values);
            values.extend(self.native.get_all_sync(&self.database)?);
        }
        let columns = self.native.get_column_names_sync()?;
        self.native.reset_sync(&self.database)?;
        Ok(rows(columns, values))
    }

    /// Names of the columns the statement returns.
    ///
    /// # Errors
    ///
    /// See [`run_async`](Self::run_async).
    pub async fn column_names_async(&self) -> BridgeResult<Vec<String>> {
        self.native.get_column_names_async().await
    }

    /// Blocking [`column_names_async`](Self::column_names_async).
    ///
    /// # Errors
    ///
    /// See [`run_async`](Self::run_async).
    pub fn column_names_sync(&self) -> BridgeResult<Vec<String>> {
        self.native.get_column_names_sync()
    }

    /// Rewinds the statement so it can run again.
    ///
    /// # Errors
    ///
    /// See [`run_async`](Self::run_async).
    pub async fn reset_async(&self) -> BridgeResult<()> {
        self.native.reset_async(&self.database).await
    }

    /// Blocking [`reset_async`](Self::reset_async).
    ///
    /// # Errors
    ///
    /// See [`run_async`](Self::run_async).
    pub fn reset_sync(&self) -> BridgeResult<()> {
        self.native.reset_sync(&self.database)
    }

    /// Releases the statement.
    ///
    /// # Errors
    ///
    /// See [`run_async`](Self::run_async).
    pub async fn finalize_async(&self) -> BridgeResult<()> {
        self.native.finalize_async(&self.database).await
    }

    /// Blocking [`finalize_async`](Self::finalize_async).
    ///
    /// # Errors
    ///
    /// See [`run_async`](Self::run_async).
    pub fn finalize_sync(&self) -> BridgeResult<()> {
        self.native.finalize_sync(&self.database)
    }
}

// ── Sessions ────────────────────────────────────────────────────────────

/// A change-tracking session of a [`SqliteDatabase`].
#[derive(Debug)]
pub struct SqliteSession {
    native: NativeSession,
    database: Arc<NativeDatabase>,
}

impl SqliteSession {
    /// The underlying handle.
    #[must_use]
    pub const fn native(&self) -> &NativeSession {
        &self.native
    }

    /// Records changes to `table`, or to every table when `None`.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Remote`](crate::BridgeError::Remote) carrying the
    /// worker's error; the same applies to every other operation here.
    pub async fn attach_async(&self, table: Option<&str>) -> BridgeResult<()> {
        self.native.attach_async(&self.database, table).await
    }

    /// Blocking [`attach_async`](Self::attach_async).
    ///
    /// # Errors
    ///
    /// See [`attach_async`](Self::attach_async).
    pub fn attach_sync(&self, table: Option<&str>) -> BridgeResult<()> {
        self.native.attach_sync(&self.database, table)
    }

    /// Turns recording on or off and returns the resulting state.
    ///
    /// # Errors
    ///
    /// See [`attach_async`](Self::attach_async).
    pub async fn enable_async(&self, enabled: bool) -> BridgeResult<bool> {
        self.native.enable_async(&self.database, enabled).await
    }

    /// Blocking [`enable_async`](Self::enable_async).
    ///
    /// # Errors
    ///
    /// See [`attach_async`](Self::attach_async).
    pub fn enable_sync(&self, enabled: bool) -> BridgeResult<bool> {
        self.native.enable_sync(&self.database, enabled)
    }

    /// Changes recorded so far, as a changeset.
    ///
    /// # Errors
    ///
    /// See [`attach_async`](Self::attach_async).
    pub async fn create_changeset_async(&self) -> BridgeResult<Vec<u8>> {
        self.native.create_changeset_async(&self.database).await
    }

    /// Blocking [`create_changeset_async`](Self::create_changeset_async).
    ///
    /// # Errors
    ///
    /// See [`attach_async`](Self::attach_async).
    pub fn create_changeset_sync(&self) -> BridgeResult<Vec<u8>> {
        self.native.create_changeset_sync(&self.database)
    }

    /// Changeset that undoes the changes recorded so far.
    ///
    /// # Errors
    ///
    /// See [`attach_async`](Self::attach_async).
    pub async fn create_inverted_changeset_async(&self) -> BridgeResult<Vec<u8>> {
        self.native.create_inverted_changeset_async(&self.database).await
    }

    /// Blocking [`create_inverted_changeset_async`](Self::create_inverted_changeset_async).
    ///
    /// # Errors
    ///
    /// See [`attach_async`](Self::attach_async).
    pub fn create_inverted_changeset_sync(&self) -> BridgeResult<Vec<u8>> {
        self.native.create_inverted_changeset_sync(&self.database)
    }

    /// Applies `changeset` to this session's database.
    ///
    /// # Errors
    ///
    /// See [`attach_async`](Self::attach_async).
    pub async fn apply_changeset_async(&self, changeset: &[u8]) -> BridgeResult<()> {
        self.native.apply_changeset_async(&self.database, changeset).await
    }

    /// Blocking [`apply_changeset_async`](Self::apply_changeset_async).
    ///
    /// # Errors
    ///
    /// See [`attach_async`](Self::attach_async).
    pub fn apply_changeset_sync(&self, changeset: &[u8]) -> BridgeResult<()> {
        self.native.apply_changeset_sync(&self.database, changeset)
    }

    /// Inverts `changeset` without touching any database.
    ///
    /// # Errors
    ///
    /// See [`attach_async`](Self::attach_async).
    pub async fn invert_changeset_async(&self, changeset: &[u8]) -> BridgeResult<Vec<u8>> {
        self.native.invert_changeset_async(&self.database, changeset).await
    }

    /// Blocking [`invert_changeset_async`](Self::invert_changeset_async).
    ///
    /// # Errors
    ///
    /// See [`attach_async`](Self::attach_async).
    pub fn invert_changeset_sync(&self, changeset: &[u8]) -> BridgeResult<Vec<u8>> {
        self.native.invert_changeset_sync(&self.database, changeset)
    }

    /// Deletes the session. Its handle is invalid afterwards.
    ///
    /// # Errors
    ///
    /// See [`attach_async`](Self::attach_async).
    pub async fn close_async(&self) -> BridgeResult<()> {
        self.native.close_async(&self.database).await
    }

    /// Blocking [`close_async`](Self::close_async).
    ///
    /// # Errors
    ///
    /// See [`attach_async`](Self::attach_async).
    pub fn close_sync(&self) -> BridgeResult<()> {
        self.native.close_sync(&self.database)
    }
}
