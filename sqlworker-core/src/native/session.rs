use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::channel::WorkerChannel;
use crate::error::BridgeResult;
use crate::protocol::{NativeId, Request};

use super::{into_bool, into_bytes, NativeDatabase};

static NEXT_SESSION_ID: AtomicU32 = AtomicU32::new(1);

/// Foreground handle of a change-tracking session.
///
/// Created in the worker by [`NativeDatabase::create_session_async`]; the
/// owning database is passed to every call.
#[derive(Debug)]
pub struct NativeSession {
    id: NativeId,
    channel: Arc<WorkerChannel>,
}

impl NativeSession {
    /// A handle with a fresh session ID.
    #[must_use]
    pub fn new(channel: Arc<WorkerChannel>) -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            channel,
        }
    }

    /// Worker-side identity.
    #[must_use]
    pub const fn id(&self) -> NativeId {
        self.id
    }

    /// Records changes to `table`, or to every table when `None`.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Remote`](crate::BridgeError::Remote) carrying the
    /// worker's error; the same applies to every other operation here.
    pub async fn attach_async(
        &self,
        database: &NativeDatabase,
        table: Option<&str>,
    ) -> BridgeResult<()> {
        self.channel.call(self.attach_request(database, table)).await.map(drop)
    }

    /// Blocking [`attach_async`](Self::attach_async).
    ///
    /// # Errors
    ///
    /// See [`attach_async`](Self::attach_async).
    pub fn attach_sync(&self, database: &NativeDatabase, table: Option<&str>) -> BridgeResult<()> {
        self.channel.call_sync(self.attach_request(database, table)).map(drop)
    }

    /// Turns recording on or off. Returns the recording state afterwards.
    ///
    /// # Errors
    ///
    /// See [`attach_async`](Self::attach_async).
    pub async fn enable_async(
        &self,
        database: &NativeDatabase,
        enabled: bool,
    ) -> BridgeResult<bool> {
        let reply = self.channel.call(self.enable_request(database, enabled)).await?;
        into_bool("sessionEnable", &reply)
    }

    /// Blocking [`enable_async`](Self::enable_async).
    ///
    /// # Errors
    ///
    /// See [`attach_async`](Self::attach_async).
    pub fn enable_sync(&self, database: &NativeDatabase, enabled: bool) -> BridgeResult<bool> {
        let reply = self.channel.call_sync(self.enable_request(database, enabled))?;
        into_bool("sessionEnable", &reply)
    }

    /// Deletes the session.
    ///
    /// # Errors
    ///
    /// See [`attach_async`](Self::attach_async).
    pub async fn close_async(&self, database: &NativeDatabase) -> BridgeResult<()> {
        self.channel
            .call(Request::SessionClose {
                database_id: database.id(),
                session_id: self.id,
            })
            .await
            .map(drop)
    }

    /// Blocking [`close_async`](Self::close_async).
    ///
    /// # Errors
    ///
    /// See [`attach_async`](Self::attach_async).
    pub fn close_sync(&self, database: &NativeDatabase) -> BridgeResult<()> {
        self.channel
            .call_sync(Request::SessionClose {
                database_id: database.id(),
                session_id: self.id,
            })
            .map(drop)
    }

    /// Changes recorded so far, as a binary changeset.
    ///
    /// # Errors
    ///
    /// See [`attach_async`](Self::attach_async).
    pub async fn create_changeset_async(&self, database: &NativeDatabase) -> BridgeResult<Vec<u8>> {
        let reply = self
            .channel
            .call(Request::SessionCreateChangeset {
                database_id: database.id(),
                session_id: self.id,
            })
            .await?;
        into_bytes("sessionCreateChangeset", reply)
    }

    /// Blocking [`create_changeset_async`](Self::create_changeset_async).
    ///
    /// # Errors
    ///
    /// See [`attach_async`](Self::attach_async).
    pub fn create_changeset_sync(&self, database: &NativeDatabase) -> BridgeResult<Vec<u8>> {
        let reply = self.channel.call_sync(Request::SessionCreateChangeset {
            database_id: database.id(),
            session_id: self.id,
        })?;
        into_bytes("sessionCreateChangeset", reply)
    }

    /// The inverse of the recorded changes.
    ///
    /// # Errors
    ///
    /// See [`attach_async`](Self::attach_async).
    pub async fn create_inverted_changeset_async(
        &self,
        database: &NativeDatabase,
    ) -> BridgeResult<Vec<u8>> {
        let reply = self
            .channel
            .call(Request::SessionCreateInvertedChangeset {
                database_id: database.id(),
                session_id: self.id,
            })
            .await?;
        into_bytes("sessionCreateInvertedChangeset", reply)
    }

    /// Blocking [`create_inverted_changeset_async`](Self::create_inverted_changeset_async).
    ///
    /// # Errors
    ///
    /// See [`attach_async`](Self::attach_async).
    pub fn create_inverted_changeset_sync(
        &self,
        database: &NativeDatabase,
    ) -> BridgeResult<Vec<u8>> {
        let reply = self.channel.call_sync(Request::SessionCreateInvertedChangeset {
            database_id: database.id(),
            session_id: self.id,
        })?;
        into_bytes("sessionCreateInvertedChangeset", reply)
    }

    /// Applies `changeset` to `database`. Conflicting rows are replaced.
    ///
    /// # Errors
    ///
    /// See [`attach_async`](Self::attach_async).
    pub async fn apply_changeset_async(
        &self,
        database: &NativeDatabase,
        changeset: &[u8],
    ) -> BridgeResult<()> {
        self.channel
            .call(Request::SessionApplyChangeset {
                database_id: database.id(),
                session_id: self.id,
                changeset: changeset.to_vec(),
            })
            .await
            .map(drop)
    }

    /// Blocking [`apply_changeset_async`](Self::apply_changeset_async).
    ///
    /// # Errors
    ///
    /// See [`attach_async`](Self::attach_async).
    pub fn apply_changeset_sync(
        &self,
        database: &NativeDatabase,
        changeset: &[u8],
    ) -> BridgeResult<()> {
        self.channel
            .call_sync(Request::SessionApplyChangeset {
                database_id: database.id(),
                session_id: self.id,
                changeset: changeset.to_vec(),
            })
            .map(drop)
    }

    /// Inverts an arbitrary `changeset`.
    ///
    /// # Errors
    ///
    /// See [`attach_async`](Self::attach_async).
    pub async fn invert_changeset_async(
        &self,
        database: &NativeDatabase,
        changeset: &[u8],
    ) -> BridgeResult<Vec<u8>> {
        let reply = self
            .channel
            .call(Request::SessionInvertChangeset {
                database_id: database.id(),
                session_id: self.id,
                changeset: changeset.to_vec(),
            })
            .await?;
        into_bytes("sessionInvertChangeset", reply)
    }

    /// Blocking [`invert_changeset_async`](Self::invert_changeset_async).
    ///
    /// # Errors
    ///
    /// See [`attach_async`](Self::attach_async).
    pub fn invert_changeset_sync(
        &self,
        database: &NativeDatabase,
        changeset: &[u8],
    ) -> BridgeResult<Vec<u8>> {
        let reply = self.channel.call_sync(Request::SessionInvertChangeset {
            database_id: database.id(),
            session_id: self.id,
            changeset: changeset.to_vec(),
        })?;
        into_bytes("sessionInvertChangeset", reply)
    }

    fn attach_request(&self, database: &NativeDatabase, table: Option<&str>) -> Request {
        Request::SessionAttach {
            database_id: database.id(),
            session_id: self.id,
            table: table.map(str::to_string),
        }
    }

    const fn enable_request(&self, database: &NativeDatabase, enabled: bool) -> Request {
        Request::SessionEnable {
            database_id: database.id(),
            session_id: self.id,
            enabled,
        }
    }
}
