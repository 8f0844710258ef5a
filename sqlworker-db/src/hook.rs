//! Row-change notifications from the update hook.

use super::ffi::{self, RawUpdate};

/// Kind of row change reported by the update hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateAction {
    /// A row was inserted.
    Insert,
    /// A row was deleted.
    Delete,
    /// A row was updated.
    Update,
    /// Any other engine action code.
    Unknown(i32),
}

impl UpdateAction {
    /// Decodes an engine action code (9 delete, 18 insert, 23 update).
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            ffi::SQLITE_INSERT => Self::Insert,
            ffi::SQLITE_DELETE => Self::Delete,
            ffi::SQLITE_UPDATE => Self::Update,
            other => Self::Unknown(other),
        }
    }
}

/// One row change on a connection with an update hook installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateEvent {
    /// What happened to the row.
    pub action: UpdateAction,
    /// Schema name, usually `"main"`.
    pub database_name: String,
    /// File backing the schema; empty for in-memory databases.
    pub database_file_path: String,
    /// Table the row belongs to.
    pub table_name: String,
    /// Rowid of the changed row.
    pub row_id: i64,
}

impl UpdateEvent {
    pub(super) fn from_raw(raw: RawUpdate) -> Self {
        Self {
            action: UpdateAction::from_code(raw.action_code),
            database_name: raw.database_name,
            database_file_path: raw.database_file_path,
            table_name: raw.table_name,
            row_id: raw.row_id,
        }
    }
}
