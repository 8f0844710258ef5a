//! Change-tracking sessions.
//!
//! A [`Session`] records row changes on the tables it is attached to and
//! produces a binary changeset that can be inverted with
//! [`invert_changeset`](super::invert_changeset) or replayed on another
//! connection with [`Connection::apply_changeset`](super::Connection::apply_changeset).

use std::rc::Rc;

use super::error::DbResult;
use super::ffi::{self, RawDb, RawSession};

/// A change-tracking session bound to one connection.
///
/// Holds a reference to its connection's handle so the session is always
/// deleted before the connection closes.
pub struct Session {
    // Field order matters: the session must be deleted before the handle drops.
    raw: RawSession,
    _db: Rc<RawDb>,
}

impl Session {
    pub(super) const fn new(raw: RawSession, db: Rc<RawDb>) -> Self {
        Self { raw, _db: db }
    }

    /// Starts tracking `table`, or every table of the schema when `None`.
    ///
    /// # Errors
    ///
    /// Returns the engine error if the table name is rejected.
    pub fn attach(&self, table: Option<&str>) -> DbResult<()> {
        self.raw.attach(table)
    }

    /// Turns recording on or off. Returns the state after the call.
    pub fn enable(&self, enabled: bool) -> bool {
        self.raw.enable(enabled)
    }

    /// Changes recorded so far.
    ///
    /// # Errors
    ///
    /// Returns the engine error if the changeset cannot be built.
    pub fn changeset(&self) -> DbResult<Vec<u8>> {
        self.raw.changeset()
    }

    /// The inverse of [`changeset`](Self::changeset): applying it undoes the
    /// recorded changes.
    ///
    /// # Errors
    ///
    /// Returns the engine error if the changeset cannot be built or inverted.
    pub fn inverted_changeset(&self) -> DbResult<Vec<u8>> {
        ffi::invert_changeset(&self.raw.changeset()?)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}
