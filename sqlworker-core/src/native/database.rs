use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::channel::WorkerChannel;
use crate::error::BridgeResult;
use crate::protocol::{NativeId, OpenOptions, Request};

use super::{into_bool, into_bytes, NativeSession, NativeStatement};

static NEXT_DATABASE_ID: AtomicU32 = AtomicU32::new(1);

/// Foreground handle of a database opened in the worker.
///
/// Construction only allocates the ID; [`init_async`](Self::init_async) or
/// [`init_sync`](Self::init_sync) opens the database.
#[derive(Debug)]
pub struct NativeDatabase {
    id: NativeId,
    channel: Arc<WorkerChannel>,
    database_path: String,
    options: OpenOptions,
    serialized_data: Option<Vec<u8>>,
}

impl NativeDatabase {
    /// A handle for the database at `database_path`. Relative paths resolve
    /// against the worker's database directory; `":memory:"` is a private
    /// in-memory database.
    #[must_use]
    pub fn new(
        channel: Arc<WorkerChannel>,
        database_path: impl Into<String>,
        options: OpenOptions,
    ) -> Self {
        Self {
            id: NEXT_DATABASE_ID.fetch_add(1, Ordering::Relaxed),
            channel,
            database_path: database_path.into(),
            options,
            serialized_data: None,
        }
    }

    /// A handle for an in-memory database loaded from `serialized_data`.
    #[must_use]
    pub fn from_serialized(
        channel: Arc<WorkerChannel>,
        database_path: impl Into<String>,
        options: OpenOptions,
        serialized_data: Vec<u8>,
    ) -> Self {
        Self {
            serialized_data: Some(serialized_data),
            ..Self::new(channel, database_path, options)
        }
    }

    /// Worker-side identity.
    #[must_use]
    pub const fn id(&self) -> NativeId {
        self.id
    }

    /// Path the database was opened with.
    #[must_use]
    pub fn database_path(&self) -> &str {
        &self.database_path
    }

    /// Options the database was opened with.
    #[must_use]
    pub const fn options(&self) -> &OpenOptions {
        &self.options
    }

    /// The channel this handle talks through.
    #[must_use]
    pub const fn channel(&self) -> &Arc<WorkerChannel> {
        &self.channel
    }

    /// Opens the database.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Remote`](crate::BridgeError::Remote) carrying the
    /// worker's error; the same applies to every other operation here.
    pub async fn init_async(&self) -> BridgeResult<()> {
        self.channel.call(self.open_request()).await.map(drop)
    }

    /// Blocking [`init_async`](Self::init_async).
    ///
    /// # Errors
    ///
    /// See [`init_async`](Self::init_async).
    pub fn init_sync(&self) -> BridgeResult<()> {
        self.channel.call_sync(self.open_request()).map(drop)
    }

    /// Closes the database, finalizing leftover statements when the options
    /// ask for it.
    ///
    /// # Errors
    ///
    /// See [`init_async`](Self::init_async).
    pub async fn close_async(&self) -> BridgeResult<()> {
        self.channel.call(self.close_request()).await.map(drop)
    }

    /// Blocking [`close_async`](Self::close_async).
    ///
    /// # Errors
    ///
    /// See [`init_async`](Self::init_async).
    pub fn close_sync(&self) -> BridgeResult<()> {
        self.channel.call_sync(self.close_request()).map(drop)
    }

    /// Runs one or more `;`-separated statements, discarding their rows.
    ///
    /// # Errors
    ///
    /// See [`init_async`](Self::init_async).
    pub async fn exec_async(&self, source: &str) -> BridgeResult<()> {
        self.channel.call(self.exec_request(source)).await.map(drop)
    }

    /// Blocking [`exec_async`](Self::exec_async).
    ///
    /// # Errors
    ///
    /// See [`init_async`](Self::init_async).
    pub fn exec_sync(&self, source: &str) -> BridgeResult<()> {
        self.channel.call_sync(self.exec_request(source)).map(drop)
    }

    /// Compiles the first statement of `source` under `statement`'s ID.
    ///
    /// # Errors
    ///
    /// See [`init_async`](Self::init_async).
    pub async fn prepare_async(
        &self,
        statement: &NativeStatement,
        source: &str,
    ) -> BridgeResult<()> {
        self.channel
            .call(self.prepare_request(statement, source))
            .await
            .map(drop)
    }

    /// Blocking [`prepare_async`](Self::prepare_async).
    ///
    /// # Errors
    ///
    /// See [`init_async`](Self::init_async).
    pub fn prepare_sync(&self, statement: &NativeStatement, source: &str) -> BridgeResult<()> {
        self.channel
            .call_sync(self.prepare_request(statement, source))
            .map(drop)
    }

    /// `true` while a transaction is open on the connection.
    ///
    /// # Errors
    ///
    /// See [`init_async`](Self::init_async).
    pub async fn is_in_transaction_async(&self) -> BridgeResult<bool> {
        let reply = self.channel.call(self.transaction_request()).await?;
        into_bool("isInTransaction", &reply)
    }

    /// Blocking [`is_in_transaction_async`](Self::is_in_transaction_async).
    ///
    /// # Errors
    ///
    /// See [`init_async`](Self::init_async).
    pub fn is_in_transaction_sync(&self) -> BridgeResult<bool> {
        let reply = self.channel.call_sync(self.transaction_request())?;
        into_bool("isInTransaction", &reply)
    }

    /// Serializes schema `schema_name` into a standalone database image.
    ///
    /// # Errors
    ///
    /// See [`init_async`](Self::init_async).
    pub async fn serialize_async(&self, schema_name: &str) -> BridgeResult<Vec<u8>> {
        let reply = self.channel.call(self.serialize_request(schema_name)).await?;
        into_bytes("serialize", reply)
    }

    /// Blocking [`serialize_async`](Self::serialize_async).
    ///
    /// # Errors
    ///
    /// See [`init_async`](Self::init_async).
    pub fn serialize_sync(&self, schema_name: &str) -> BridgeResult<Vec<u8>> {
        let reply = self.channel.call_sync(self.serialize_request(schema_name))?;
        into_bytes("serialize", reply)
    }

    /// Starts a change-tracking session over schema `db_name` under
    /// `session`'s ID.
    ///
    /// # Errors
    ///
    /// See [`init_async`](Self::init_async).
    pub async fn create_session_async(
        &self,
        session: &NativeSession,
        db_name: &str,
    ) -> BridgeResult<()> {
        self.channel
            .call(self.session_request(session, db_name))
            .await
            .map(drop)
    }

    /// Blocking [`create_session_async`](Self::create_session_async).
    ///
    /// # Errors
    ///
    /// See [`init_async`](Self::init_async).
    pub fn create_session_sync(&self, session: &NativeSession, db_name: &str) -> BridgeResult<()> {
        self.channel
            .call_sync(self.session_request(session, db_name))
            .map(drop)
    }

    fn open_request(&self) -> Request {
        Request::Open {
            database_id: self.id,
            database_path: self.database_path.clone(),
            options: self.options,
            serialized_data: self.serialized_data.clone(),
        }
    }

    const fn close_request(&self) -> Request {
        Request::Close {
            database_id: self.id,
        }
    }

    fn exec_request(&self, source: &str) -> Request {
        Request::Exec {
            database_id: self.id,
            source: source.to_string(),
        }
    }

    fn prepare_request(&self, statement: &NativeStatement, source: &str) -> Request {
        Request::Prepare {
            database_id: self.id,
            statement_id: statement.id(),
            source: source.to_string(),
        }
    }

    const fn transaction_request(&self) -> Request {
        Request::IsInTransaction {
            database_id: self.id,
        }
    }

    fn serialize_request(&self, schema_name: &str) -> Request {
        Request::Serialize {
            database_id: self.id,
            schema_name: schema_name.to_string(),
        }
    }

    fn session_request(&self, session: &NativeSession, db_name: &str) -> Request {
        Request::SessionCreate {
            database_id: self.id,
            session_id: session.id(),
            db_name: db_name.to_string(),
        }
    }
}
