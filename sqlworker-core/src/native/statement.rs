use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::channel::WorkerChannel;
use crate::error::BridgeResult;
use crate::protocol::{BindParams, NativeId, Request, RunResult};
use crate::value::Value;

use super::{into_row, into_rows, into_strings, NativeDatabase};

static NEXT_STATEMENT_ID: AtomicU32 = AtomicU32::new(1);

/// Foreground handle of a prepared statement.
///
/// Compiled by [`NativeDatabase::prepare_async`]. The owning database is
/// passed to every call rather than stored.
#[derive(Debug)]
pub struct NativeStatement {
    id: NativeId,
    channel: Arc<WorkerChannel>,
}

impl NativeStatement {
    /// A handle with a fresh statement ID.
    #[must_use]
    pub fn new(channel: Arc<WorkerChannel>) -> Self {
        Self {
            id: NEXT_STATEMENT_ID.fetch_add(1, Ordering::Relaxed),
            channel,
        }
    }

    /// Worker-side identity.
    #[must_use]
    pub const fn id(&self) -> NativeId {
        self.id
    }

    /// Resets the statement, binds `params` and steps once.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Remote`](crate::BridgeError::Remote) carrying the
    /// worker's error; the same applies to every other operation here.
    pub async fn run_async(
        &self,
        database: &NativeDatabase,
        params: BindParams,
    ) -> BridgeResult<RunResult> {
        let reply = self.channel.call(self.run_request(database, params)).await?;
        RunResult::from_value(&reply)
    }

    /// Blocking [`run_async`](Self::run_async).
    ///
    /// # Errors
    ///
    /// See [`run_async`](Self::run_async).
    pub fn run_sync(
        &self,
        database: &NativeDatabase,
        params: BindParams,
    ) -> BridgeResult<RunResult> {
        let reply = self.channel.call_sync(self.run_request(database, params))?;
        RunResult::from_value(&reply)
    }

    /// The next row, or `None` once the statement is done.
    ///
    /// # Errors
    ///
    /// See [`run_async`](Self::run_async).
    pub async fn step_async(&self, database: &NativeDatabase) -> BridgeResult<Option<Vec<Value>>> {
        let reply = self.channel.call(self.step_request(database)).await?;
        into_row("step", reply)
    }

    /// Blocking [`step_async`](Self::step_async).
    ///
    /// # Errors
    ///
    /// See [`run_async`](Self::run_async).
    pub fn step_sync(&self, database: &NativeDatabase) -> BridgeResult<Option<Vec<Value>>> {
        let reply = self.channel.call_sync(self.step_request(database))?;
        into_row("step", reply)
    }

    /// Every remaining row.
    ///
    /// # Errors
    ///
    /// See [`run_async`](Self::run_async).
    pub async fn get_all_async(&self, database: &NativeDatabase) -> BridgeResult<Vec<Vec<Value>>> {
        let reply = self.channel.call(self.get_all_request(database)).await?;
        into_rows("getAll", reply)
    }

    /// Blocking [`get_all_async`](Self::get_all_async).
    ///
    /// # Errors
    ///
    /// See [`run_async`](Self::run_async).
    pub fn get_all_sync(&self, database: &NativeDatabase) -> BridgeResult<Vec<Vec<Value>>> {
        let reply = self.channel.call_sync(self.get_all_request(database))?;
        into_rows("getAll", reply)
    }

    /// Names of the result columns, in order.
    ///
    /// # Errors
    ///
    /// See [`run_async`](Self::run_async).
    pub async fn get_column_names_async(&self) -> BridgeResult<Vec<String>> {
        let reply = self.channel.call(self.column_names_request()).await?;
        into_strings("getColumnNames", reply)
    }

    /// Blocking [`get_column_names_async`](Self::get_column_names_async).
    ///
    /// # Errors
    ///
    /// See [`run_async`](Self::run_async).
    pub fn get_column_names_sync(&self) -> BridgeResult<Vec<String>> {
        let reply = self.channel.call_sync(self.column_names_request())?;
        into_strings("getColumnNames", reply)
    }

    /// Rewinds the statement. Bindings are kept.
    ///
    /// # Errors
    ///
    /// See [`run_async`](Self::run_async).
    pub async fn reset_async(&self, database: &NativeDatabase) -> BridgeResult<()> {
        self.channel.call(self.reset_request(database)).await.map(drop)
    }

    /// Blocking [`reset_async`](Self::reset_async).
    ///
    /// # Errors
    ///
    /// See [`run_async`](Self::run_async).
    pub fn reset_sync(&self, database: &NativeDatabase) -> BridgeResult<()> {
        self.channel.call_sync(self.reset_request(database)).map(drop)
    }

    /// Releases the statement. Its ID is unknown to the worker afterwards.
    ///
    /// # Errors
    ///
    /// See [`run_async`](Self::run_async).
    pub async fn finalize_async(&self, database: &NativeDatabase) -> BridgeResult<()> {
        self.channel.call(self.finalize_request(database)).await.map(drop)
    }

    /// Blocking [`finalize_async`](Self::finalize_async).
    ///
    /// # Errors
    ///
    /// See [`run_async`](Self::run_async).
    pub fn finalize_sync(&self, database: &NativeDatabase) -> BridgeResult<()> {
        self.channel.call_sync(self.finalize_request(database)).map(drop)
    }

    const fn run_request(&self, database: &NativeDatabase, params: BindParams) -> Request {
        Request::Run {
            database_id: database.id(),
            statement_id: self.id,
            params,
        }
    }

    const fn step_request(&self, database: &NativeDatabase) -> Request {
        Request::Step {
            database_id: database.id(),
            statement_id: self.id,
        }
    }

    const fn get_all_request(&self, database: &NativeDatabase) -> Request {
        Request::GetAll {
            database_id: database.id(),
            statement_id: self.id,
        }
    }

    const fn column_names_request(&self) -> Request {
        Request::GetColumnNames {
            statement_id: self.id,
        }
    }

    const fn reset_request(&self, database: &NativeDatabase) -> Request {
        Request::Reset {
            database_id: database.id(),
            statement_id: self.id,
        }
    }

    const fn finalize_request(&self, database: &NativeDatabase) -> Request {
        Request::Finalize {
            database_id: database.id(),
            statement_id: self.id,
        }
    }
}
