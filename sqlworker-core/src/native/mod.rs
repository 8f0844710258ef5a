//! Foreground handles for worker-side resources.
//!
//! A shim holds nothing but its numeric ID and its constructor arguments;
//! every operation is a request to the worker. Each operation comes in an
//! `_async` flavor awaiting the reply and a `_sync` flavor that blocks the
//! calling thread.
//!
//! IDs come from process-wide counters, one per kind, starting at 1.

mod database;
mod session;
mod statement;

pub use database::NativeDatabase;
pub use session::NativeSession;
pub use statement::NativeStatement;

use crate::channel::WorkerChannel;
use crate::error::{BridgeError, BridgeResult};
use crate::protocol::Request;
use crate::value::Value;

/// Deletes the database file at `database_path`, with its journal
/// companions. Fails while any handle has the file open.
///
/// # Errors
///
/// [`BridgeError::Remote`] carrying the worker's error.
pub async fn delete_database_async(
    channel: &WorkerChannel,
    database_path: &str,
) -> BridgeResult<()> {
    channel
        .call(delete_database_request(database_path))
        .await
        .map(drop)
}

/// Blocking [`delete_database_async`].
///
/// # Errors
///
/// See [`delete_database_async`].
pub fn delete_database_sync(channel: &WorkerChannel, database_path: &str) -> BridgeResult<()> {
    channel
        .call_sync(delete_database_request(database_path))
        .map(drop)
}

/// Copies schema `source_name` of `source` over schema `dest_name` of `dest`.
///
/// # Errors
///
/// [`BridgeError::Remote`] carrying the worker's error.
pub async fn backup_database_async(
    channel: &WorkerChannel,
    dest: &NativeDatabase,
    dest_name: &str,
    source: &NativeDatabase,
    source_name: &str,
) -> BridgeResult<()> {
    channel
        .call(backup_request(dest, dest_name, source, source_name))
        .await
        .map(drop)
}

/// Blocking [`backup_database_async`].
///
/// # Errors
///
/// See [`backup_database_async`].
pub fn backup_database_sync(
    channel: &WorkerChannel,
    dest: &NativeDatabase,
    dest_name: &str,
    source: &NativeDatabase,
    source_name: &str,
) -> BridgeResult<()> {
    channel
        .call_sync(backup_request(dest, dest_name, source, source_name))
        .map(drop)
}

/// Copies the asset database at `asset_database_path` (a URL or a local
/// path) to `database_path`. Without `force_overwrite` an existing database
/// is left alone.
///
/// # Errors
///
/// [`BridgeError::Remote`] carrying the worker's error.
pub async fn import_asset_database_async(
    channel: &WorkerChannel,
    database_path: &str,
    asset_database_path: &str,
    force_overwrite: bool,
) -> BridgeResult<()> {
    channel
        .call(import_request(database_path, asset_database_path, force_overwrite))
        .await
        .map(drop)
}

/// Blocking [`import_asset_database_async`].
///
/// # Errors
///
/// See [`import_asset_database_async`].
pub fn import_asset_database_sync(
    channel: &WorkerChannel,
    database_path: &str,
    asset_database_path: &str,
    force_overwrite: bool,
) -> BridgeResult<()> {
    channel
        .call_sync(import_request(database_path, asset_database_path, force_overwrite))
        .map(drop)
}

fn delete_database_request(database_path: &str) -> Request {
    Request::DeleteDatabase {
        database_path: database_path.to_string(),
    }
}

fn backup_request(
    dest: &NativeDatabase,
    dest_name: &str,
    source: &NativeDatabase,
    source_name: &str,
) -> Request {
    Request::BackupDatabase {
        dest_database_id: dest.id(),
        dest_database_name: dest_name.to_string(),
        source_database_id: source.id(),
        source_database_name: source_name.to_string(),
    }
}

fn import_request(
    database_path: &str,
    asset_database_path: &str,
    force_overwrite: bool,
) -> Request {
    Request::ImportAssetDatabase {
        database_path: database_path.to_string(),
        asset_database_path: asset_database_path.to_string(),
        force_overwrite,
    }
}

// ── Reply decoding ──────────────────────────────────────────────────────

fn unexpected(kind: &str, value: &Value) -> BridgeError {
    BridgeError::Serialization(format!(
        "unexpected {} in {kind} reply",
        value.type_name()
    ))
}

pub(crate) fn into_bytes(kind: &str, value: Value) -> BridgeResult<Vec<u8>> {
    match value {
        Value::Bytes(bytes) => Ok(bytes),
        other => Err(unexpected(kind, &other)),
    }
}

pub(crate) fn into_bool(kind: &str, value: &Value) -> BridgeResult<bool> {
    value.as_bool().ok_or_else(|| unexpected(kind, value))
}

/// A row is an array of column values; `null` marks the end of the rows.
pub(crate) fn into_row(kind: &str, value: Value) -> BridgeResult<Option<Vec<Value>>> {
    match value {
        Value::Null => Ok(None),
        Value::Array(values) => Ok(Some(values)),
        other => Err(unexpected(kind, &other)),
    }
}

pub(crate) fn into_rows(kind: &str, value: Value) -> BridgeResult<Vec<Vec<Value>>> {
    let Value::Array(rows) = value else {
        return Err(unexpected(kind, &value));
    };
    rows.into_iter()
        .map(|row| into_row(kind, row)?.ok_or_else(|| unexpected(kind, &Value::Null)))
        .collect()
}

pub(crate) fn into_strings(kind: &str, value: Value) -> BridgeResult<Vec<String>> {
    let Value::Array(items) = value else {
        return Err(unexpected(kind, &value));
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Text(text) => Ok(text),
            other => Err(unexpected(kind, &other)),
        })
        .collect()
}
