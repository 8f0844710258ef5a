//! Worker message protocol.
//!
//! Requests travel as `{ type, id, data, isSync }` where `data` is a
//! [`Value::Object`] with camelCase keys. [`Request`] is the typed form of the
//! `(type, data)` pair; [`Request::from_wire`] rejects unknown types with
//! `Unknown message type` and bad payloads with a malformed-request error.

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::channel::sync::SyncTrait;
use crate::error::{BridgeError, BridgeResult};
use crate::value::Value;

/// Numeric identity of a worker-side resource.
pub type NativeId = u32;

/// Path that selects the in-memory storage backend.
pub const MEMORY_DATABASE_PATH: &str = ":memory:";

/// Type of the out-of-band change notification message.
pub const DATABASE_CHANGE_EVENT: &str = "onDatabaseChange";

// ── Options and parameters ──────────────────────────────────────────────

/// Options a database is opened with. Two handles alias the same connection
/// only when their options are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpenOptions {
    /// Emit `onDatabaseChange` events for row changes on this connection.
    pub enable_change_listener: bool,
    /// Never share an existing connection, even with matching path and options.
    pub use_new_connection: bool,
    /// Finalize statements still prepared on the connection when it closes.
    pub finalize_unused_statements_before_closing: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            enable_change_listener: false,
            use_new_connection: false,
            finalize_unused_statements_before_closing: true,
        }
    }
}

impl OpenOptions {
    /// Encodes the options as a wire object.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::object([
            ("enableChangeListener", self.enable_change_listener),
            ("useNewConnection", self.use_new_connection),
            (
                "finalizeUnusedStatementsBeforeClosing",
                self.finalize_unused_statements_before_closing,
            ),
        ])
    }

    /// Decodes options; absent keys keep their defaults.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let defaults = Self::default();
        let flag = |key: &str, default: bool| {
            value.get(key).and_then(Value::as_bool).unwrap_or(default)
        };
        Self {
            enable_change_listener: flag("enableChangeListener", defaults.enable_change_listener),
            use_new_connection: flag("useNewConnection", defaults.use_new_connection),
            finalize_unused_statements_before_closing: flag(
                "finalizeUnusedStatementsBeforeClosing",
                defaults.finalize_unused_statements_before_closing,
            ),
        }
    }
}

/// Parameters bound by `run`.
///
/// Positional parameters are keyed by their 0-based position as a decimal
/// string; named parameters by their prefixed name (`:id`, `$id`, `@id`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BindParams {
    entries: Vec<(String, Value)>,
    positional: bool,
}

impl BindParams {
    /// Binds `values` to `?1`, `?2`, and so on.
    pub fn positional<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Self {
            entries: values
                .into_iter()
                .enumerate()
                .map(|(i, value)| (i.to_string(), value.into()))
                .collect(),
            positional: true,
        }
    }

    /// Binds each value to the parameter with that name.
    pub fn named<K: Into<String>, V: Into<Value>>(
        entries: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
            positional: false,
        }
    }

    /// Key/value pairs in insertion order.
    #[must_use]
    pub fn entries(&self) -> &[(String, Value)] {
        &self.entries
    }

    /// `true` when keys are positions rather than names.
    #[must_use]
    pub const fn is_positional(&self) -> bool {
        self.positional
    }

    fn to_value(&self) -> Value {
        Value::Object(self.entries.iter().cloned().collect())
    }
}

/// Result of `run`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunResult {
    /// Rowid of the most recent successful insert on the connection.
    pub last_insert_row_id: i64,
    /// Rows changed by the most recent statement on the connection.
    pub changes: i64,
    /// Column values of the first row, when the step produced one.
    pub first_row_values: Vec<Value>,
}

impl RunResult {
    /// Encodes the result as a wire object.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::object([
            ("lastInsertRowId", Value::Integer(self.last_insert_row_id)),
            ("changes", Value::Integer(self.changes)),
            ("firstRowValues", Value::Array(self.first_row_values.clone())),
        ])
    }

    /// Decodes a wire object.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::MalformedRequest`] if a field is missing.
    pub fn from_value(value: &Value) -> BridgeResult<Self> {
        let fields = Fields::new("run", value);
        Ok(Self {
            last_insert_row_id: fields.integer("lastInsertRowId")?,
            changes: fields.integer("changes")?,
            first_row_values: fields.array("firstRowValues")?.to_vec(),
        })
    }
}

// ── Change events ───────────────────────────────────────────────────────

/// Kind of row change carried by a [`DatabaseChangeEvent`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString, strum::IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum ChangeType {
    /// A row was inserted.
    Insert,
    /// A row was deleted.
    Delete,
    /// A row was updated.
    Update,
    /// Any other engine action.
    Unknown,
}

impl ChangeType {
    /// Decodes an engine action code: 9 delete, 18 insert, 23 update.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        Self::from_action(sqlworker_db::UpdateAction::from_code(code))
    }

    /// Maps the engine's decoded action.
    #[must_use]
    pub const fn from_action(action: sqlworker_db::UpdateAction) -> Self {
        match action {
            sqlworker_db::UpdateAction::Insert => Self::Insert,
            sqlworker_db::UpdateAction::Delete => Self::Delete,
            sqlworker_db::UpdateAction::Update => Self::Update,
            sqlworker_db::UpdateAction::Unknown(_) => Self::Unknown,
        }
    }
}

/// Out-of-band notification of a row change on a connection opened with
/// [`OpenOptions::enable_change_listener`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseChangeEvent {
    /// Schema name, usually `"main"`.
    pub database_name: String,
    /// File backing the schema; empty for in-memory databases.
    pub database_file_path: String,
    /// Table the row belongs to.
    pub table_name: String,
    /// Rowid of the changed row.
    pub row_id: i64,
    /// What happened to the row.
    pub type_id: ChangeType,
}

impl DatabaseChangeEvent {
    /// Builds the event for an update-hook callback.
    #[must_use]
    pub fn from_update(event: sqlworker_db::UpdateEvent) -> Self {
        Self {
            database_name: event.database_name,
            database_file_path: event.database_file_path,
            table_name: event.table_name,
            row_id: event.row_id,
            type_id: ChangeType::from_action(event.action),
        }
    }

    /// Encodes the `{ type: "onDatabaseChange", data }` message.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let type_id: &'static str = self.type_id.into();
        Value::object([
            ("type", Value::from(DATABASE_CHANGE_EVENT)),
            (
                "data",
                Value::object([
                    ("databaseName", Value::from(self.database_name.as_str())),
                    ("databaseFilePath", Value::from(self.database_file_path.as_str())),
                    ("tableName", Value::from(self.table_name.as_str())),
                    ("rowId", Value::Integer(self.row_id)),
                    ("typeId", Value::from(type_id)),
                ]),
            ),
        ])
    }
}

// ── Requests ────────────────────────────────────────────────────────────

/// A typed worker request. The variant name in camelCase is the wire `type`.
#[derive(Debug, Clone, PartialEq, strum::IntoStaticStr, strum::EnumDiscriminants)]
#[strum(serialize_all = "camelCase")]
#[strum_discriminants(name(RequestKind), derive(strum::EnumString, strum::IntoStaticStr))]
#[strum_discriminants(strum(serialize_all = "camelCase"))]
#[allow(missing_docs)]
pub enum Request {
    Open {
        database_id: NativeId,
        database_path: String,
        options: OpenOptions,
        serialized_data: Option<Vec<u8>>,
    },
    Close {
        database_id: NativeId,
    },
    Exec {
        database_id: NativeId,
        source: String,
    },
    Prepare {
        database_id: NativeId,
        statement_id: NativeId,
        source: String,
    },
    Run {
        database_id: NativeId,
        statement_id: NativeId,
        params: BindParams,
    },
    Step {
        database_id: NativeId,
        statement_id: NativeId,
    },
    GetAll {
        database_id: NativeId,
        statement_id: NativeId,
    },
    GetColumnNames {
        statement_id: NativeId,
    },
    Reset {
        database_id: NativeId,
        statement_id: NativeId,
    },
    Finalize {
        database_id: NativeId,
        statement_id: NativeId,
    },
    Serialize {
        database_id: NativeId,
        schema_name: String,
    },
    BackupDatabase {
        dest_database_id: NativeId,
        dest_database_name: String,
        source_database_id: NativeId,
        source_database_name: String,
    },
    DeleteDatabase {
        database_path: String,
    },
    ImportAssetDatabase {
        database_path: String,
        asset_database_path: String,
        force_overwrite: bool,
    },
    IsInTransaction {
        database_id: NativeId,
    },
    SessionCreate {
        database_id: NativeId,
        session_id: NativeId,
        db_name: String,
    },
    SessionAttach {
        database_id: NativeId,
        session_id: NativeId,
        table: Option<String>,
    },
    SessionEnable {
        database_id: NativeId,
        session_id: NativeId,
        enabled: bool,
    },
    SessionClose {
        database_id: NativeId,
        session_id: NativeId,
    },
    SessionCreateChangeset {
        database_id: NativeId,
        session_id: NativeId,
    },
    SessionCreateInvertedChangeset {
        database_id: NativeId,
        session_id: NativeId,
    },
    SessionApplyChangeset {
        database_id: NativeId,
        session_id: NativeId,
        changeset: Vec<u8>,
    },
    SessionInvertChangeset {
        database_id: NativeId,
        session_id: NativeId,
        changeset: Vec<u8>,
    },
}

impl Request {
    /// The wire `type` of this request.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.into()
    }

    /// Encodes the request payload as the wire `data` object.
    #[must_use]
    pub fn to_data(&self) -> Value {
        let db = |id: &NativeId| ("nativeDatabaseId", Value::from(*id));
        let stmt = |id: &NativeId| ("nativeStatementId", Value::from(*id));
        let session = |id: &NativeId| ("nativeSessionId", Value::from(*id));
        match self {
            Self::Open {
                database_id,
                database_path,
                options,
                serialized_data,
            } => Value::object([
                db(database_id),
                ("databasePath", Value::from(database_path.as_str())),
                ("options", options.to_value()),
                ("serializedData", Value::from(serialized_data.clone())),
            ]),
            Self::Close { database_id } | Self::IsInTransaction { database_id } => {
                Value::object([db(database_id)])
            }
            Self::Exec { database_id, source } => Value::object([
                db(database_id),
                ("source", Value::from(source.as_str())),
            ]),
            Self::Prepare {
                database_id,
                statement_id,
                source,
            } => Value::object([
                db(database_id),
                stmt(statement_id),
                ("source", Value::from(source.as_str())),
            ]),
            Self::Run {
                database_id,
                statement_id,
                params,
            } => Value::object([
                db(database_id),
                stmt(statement_id),
                ("bindParams", params.to_value()),
                ("shouldPassAsArray", Value::Bool(params.is_positional())),
            ]),
            Self::Step {
                database_id,
                statement_id,
            }
            | Self::GetAll {
                database_id,
                statement_id,
            }
            | Self::Reset {
                database_id,
                statement_id,
            }
            | Self::Finalize {
                database_id,
                statement_id,
            } => Value::object([db(database_id), stmt(statement_id)]),
            Self::GetColumnNames { statement_id } => Value::object([stmt(statement_id)]),
            Self::Serialize {
                database_id,
                schema_name,
            } => Value::object([
                db(database_id),
                ("schemaName", Value::from(schema_name.as_str())),
            ]),
            Self::BackupDatabase {
                dest_database_id,
                dest_database_name,
                source_database_id,
                source_database_name,
            } => Value::object([
                ("destNativeDatabaseId", Value::from(*dest_database_id)),
                ("destDatabaseName", Value::from(dest_database_name.as_str())),
                ("sourceNativeDatabaseId", Value::from(*source_database_id)),
                ("sourceDatabaseName", Value::from(source_database_name.as_str())),
            ]),
            Self::DeleteDatabase { database_path } => {
                Value::object([("databasePath", Value::from(database_path.as_str()))])
            }
            Self::ImportAssetDatabase {
                database_path,
                asset_database_path,
                force_overwrite,
            } => Value::object([
                ("databasePath", Value::from(database_path.as_str())),
                ("assetDatabasePath", Value::from(asset_database_path.as_str())),
                ("forceOverwrite", Value::Bool(*force_overwrite)),
            ]),
            Self::SessionCreate {
                database_id,
                session_id,
                db_name,
            } => Value::object([
                db(database_id),
                session(session_id),
                ("dbName", Value::from(db_name.as_str())),
            ]),
            Self::SessionAttach {
                database_id,
                session_id,
                table,
            } => Value::object([
                db(database_id),
                session(session_id),
                ("table", Value::from(table.clone())),
            ]),
            Self::SessionEnable {
                database_id,
                session_id,
                enabled,
            } => Value::object([
                db(database_id),
                session(session_id),
                ("enabled", Value::Bool(*enabled)),
            ]),
            Self::SessionClose {
                database_id,
                session_id,
            }
            | Self::SessionCreateChangeset {
                database_id,
                session_id,
            }
            | Self::SessionCreateInvertedChangeset {
                database_id,
                session_id,
            } => Value::object([db(database_id), session(session_id)]),
            Self::SessionApplyChangeset {
                database_id,
                session_id,
                changeset,
            }
            | Self::SessionInvertChangeset {
                database_id,
                session_id,
                changeset,
            } => Value::object([
                db(database_id),
                session(session_id),
                ("changeset", Value::from(changeset.as_slice())),
            ]),
        }
    }

    /// Decodes a request from its wire `type` and `data`.
    ///
    /// # Errors
    ///
    /// [`BridgeError::UnknownMessageType`] for an unrecognised `kind`;
    /// [`BridgeError::MalformedRequest`] for a missing or mistyped field.
    pub fn from_wire(kind: &str, data: &Value) -> BridgeResult<Self> {
        let parsed = RequestKind::from_str(kind)
            .map_err(|_| BridgeError::UnknownMessageType(kind.to_string()))?;
        let f = Fields::new(kind, data);
        Ok(match parsed {
            RequestKind::Open => Self::Open {
                database_id: f.id("nativeDatabaseId")?,
                database_path: f.string("databasePath")?,
                options: f.optional("options").map(OpenOptions::from_value).unwrap_or_default(),
                serialized_data: f.optional_bytes("serializedData")?,
            },
            RequestKind::Close => Self::Close {
                database_id: f.id("nativeDatabaseId")?,
            },
            RequestKind::Exec => Self::Exec {
                database_id: f.id("nativeDatabaseId")?,
                source: f.string("source")?,
            },
            RequestKind::Prepare => Self::Prepare {
                database_id: f.id("nativeDatabaseId")?,
                statement_id: f.id("nativeStatementId")?,
                source: f.string("source")?,
            },
            RequestKind::Run => Self::Run {
                database_id: f.id("nativeDatabaseId")?,
                statement_id: f.id("nativeStatementId")?,
                params: f.bind_params()?,
            },
            RequestKind::Step => Self::Step {
                database_id: f.id("nativeDatabaseId")?,
                statement_id: f.id("nativeStatementId")?,
            },
            RequestKind::GetAll => Self::GetAll {
                database_id: f.id("nativeDatabaseId")?,
                statement_id: f.id("nativeStatementId")?,
            },
            RequestKind::GetColumnNames => Self::GetColumnNames {
                statement_id: f.id("nativeStatementId")?,
            },
            RequestKind::Reset => Self::Reset {
                database_id: f.id("nativeDatabaseId")?,
                statement_id: f.id("nativeStatementId")?,
            },
            RequestKind::Finalize => Self::Finalize {
                database_id: f.id("nativeDatabaseId")?,
                statement_id: f.id("nativeStatementId")?,
            },
            RequestKind::Serialize => Self::Serialize {
                database_id: f.id("nativeDatabaseId")?,
                schema_name: f.string("schemaName")?,
            },
            RequestKind::BackupDatabase => Self::BackupDatabase {
                dest_database_id: f.id("destNativeDatabaseId")?,
                dest_database_name: f.string("destDatabaseName")?,
                source_database_id: f.id("sourceNativeDatabaseId")?,
                source_database_name: f.string("sourceDatabaseName")?,
            },
            RequestKind::DeleteDatabase => Self::DeleteDatabase {
                database_path: f.string("databasePath")?,
            },
            RequestKind::ImportAssetDatabase => Self::ImportAssetDatabase {
                database_path: f.string("databasePath")?,
                asset_database_path: f.string("assetDatabasePath")?,
                force_overwrite: f.flag("forceOverwrite")?,
            },
            RequestKind::IsInTransaction => Self::IsInTransaction {
                database_id: f.id("nativeDatabaseId")?,
            },
            RequestKind::SessionCreate => Self::SessionCreate {
                database_id: f.id("nativeDatabaseId")?,
                session_id: f.id("nativeSessionId")?,
                db_name: f.string("dbName")?,
            },
            RequestKind::SessionAttach => Self::SessionAttach {
                database_id: f.id("nativeDatabaseId")?,
                session_id: f.id("nativeSessionId")?,
                table: f.optional_string("table")?,
            },
            RequestKind::SessionEnable => Self::SessionEnable {
                database_id: f.id("nativeDatabaseId")?,
                session_id: f.id("nativeSessionId")?,
                enabled: f.flag("enabled")?,
            },
            RequestKind::SessionClose => Self::SessionClose {
                database_id: f.id("nativeDatabaseId")?,
                session_id: f.id("nativeSessionId")?,
            },
            RequestKind::SessionCreateChangeset => Self::SessionCreateChangeset {
                database_id: f.id("nativeDatabaseId")?,
                session_id: f.id("nativeSessionId")?,
            },
            RequestKind::SessionCreateInvertedChangeset => Self::SessionCreateInvertedChangeset {
                database_id: f.id("nativeDatabaseId")?,
                session_id: f.id("nativeSessionId")?,
            },
            RequestKind::SessionApplyChangeset => Self::SessionApplyChangeset {
                database_id: f.id("nativeDatabaseId")?,
                session_id: f.id("nativeSessionId")?,
                changeset: f.bytes("changeset")?,
            },
            RequestKind::SessionInvertChangeset => Self::SessionInvertChangeset {
                database_id: f.id("nativeDatabaseId")?,
                session_id: f.id("nativeSessionId")?,
                changeset: f.bytes("changeset")?,
            },
        })
    }
}

/// Typed access to the fields of a request payload.
struct Fields<'a> {
    kind: &'a str,
    data: &'a Value,
}

impl<'a> Fields<'a> {
    const fn new(kind: &'a str, data: &'a Value) -> Self {
        Self { kind, data }
    }

    fn malformed(&self, key: &str, expected: &str) -> BridgeError {
        BridgeError::MalformedRequest(format!("{}: `{key}` must be {expected}", self.kind))
    }

    fn optional(&self, key: &str) -> Option<&'a Value> {
        self.data.get(key).filter(|value| !value.is_null())
    }

    fn required(&self, key: &str, expected: &str) -> BridgeResult<&'a Value> {
        self.optional(key).ok_or_else(|| self.malformed(key, expected))
    }

    fn id(&self, key: &str) -> BridgeResult<NativeId> {
        self.required(key, "a handle id")?
            .as_i64()
            .and_then(|id| NativeId::try_from(id).ok())
            .ok_or_else(|| self.malformed(key, "a handle id"))
    }

    fn integer(&self, key: &str) -> BridgeResult<i64> {
        self.required(key, "an integer")?
            .as_i64()
            .ok_or_else(|| self.malformed(key, "an integer"))
    }

    fn string(&self, key: &str) -> BridgeResult<String> {
        self.required(key, "a string")?
            .as_str()
            .map(ToString::to_string)
            .ok_or_else(|| self.malformed(key, "a string"))
    }

    fn optional_string(&self, key: &str) -> BridgeResult<Option<String>> {
        self.optional(key)
            .map(|value| {
                value
                    .as_str()
                    .map(ToString::to_string)
                    .ok_or_else(|| self.malformed(key, "a string or null"))
            })
            .transpose()
    }

    /// Absent flags read as `false`.
    fn flag(&self, key: &str) -> BridgeResult<bool> {
        self.optional(key).map_or(Ok(false), |value| {
            value
                .as_bool()
                .ok_or_else(|| self.malformed(key, "a boolean"))
        })
    }

    fn bytes(&self, key: &str) -> BridgeResult<Vec<u8>> {
        self.required(key, "a byte buffer")?
            .as_bytes()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| self.malformed(key, "a byte buffer"))
    }

    fn optional_bytes(&self, key: &str) -> BridgeResult<Option<Vec<u8>>> {
        self.optional(key)
            .map(|value| {
                value
                    .as_bytes()
                    .map(<[u8]>::to_vec)
                    .ok_or_else(|| self.malformed(key, "a byte buffer or null"))
            })
            .transpose()
    }

    fn array(&self, key: &str) -> BridgeResult<&'a [Value]> {
        self.required(key, "an array")?
            .as_array()
            .ok_or_else(|| self.malformed(key, "an array"))
    }

    /// Reads `bindParams`, merging a legacy `bindBlobParams` map when present.
    fn bind_params(&self) -> BridgeResult<BindParams> {
        let mut entries: Vec<(String, Value)> = Vec::new();
        for key in ["bindParams", "bindBlobParams"] {
            let Some(value) = self.optional(key) else {
                continue;
            };
            let map: &BTreeMap<String, Value> =
                value.as_object().ok_or_else(|| self.malformed(key, "an object"))?;
            entries.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Ok(BindParams {
            entries,
            positional: self.flag("shouldPassAsArray")?,
        })
    }
}

// ── Envelopes ───────────────────────────────────────────────────────────

/// A request envelope posted to the worker.
#[derive(Debug, Clone)]
pub struct WorkerMessage {
    /// Correlation ID.
    pub id: u64,
    /// Wire `type` of the request.
    pub kind: String,
    /// Request payload.
    pub data: Value,
    /// Shared buffers of a blocking call; `None` for async calls.
    pub sync: Option<SyncTrait>,
}

impl WorkerMessage {
    /// `true` for blocking calls.
    #[must_use]
    pub const fn is_sync(&self) -> bool {
        self.sync.is_some()
    }
}

/// A message posted back by the worker.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// Reply to an async request: `{ id, result }` or `{ id, error }`.
    Reply {
        /// Correlation ID of the request.
        id: u64,
        /// Result value or error message.
        result: Result<Value, String>,
    },
    /// Row change on a listened connection.
    DatabaseChange(DatabaseChangeEvent),
}

impl OutboundMessage {
    /// Encodes the message as posted over the wire.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Reply {
                id,
                result: Ok(result),
            } => Value::object([
                ("id", Value::Integer(i64::try_from(*id).unwrap_or(i64::MAX))),
                ("result", result.clone()),
            ]),
            Self::Reply {
                id,
                result: Err(error),
            } => Value::object([
                ("id", Value::Integer(i64::try_from(*id).unwrap_or(i64::MAX))),
                ("error", Value::from(error.as_str())),
            ]),
            Self::DatabaseChange(event) => event.to_value(),
        }
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(9, ChangeType::Delete ; "delete")]
    #[test_case(18, ChangeType::Insert ; "insert")]
    #[test_case(23, ChangeType::Update ; "update")]
    #[test_case(0, ChangeType::Unknown ; "zero")]
    #[test_case(42, ChangeType::Unknown ; "other")]
    fn test_change_type_from_code(code: i32, expected: ChangeType) {
        assert_eq!(ChangeType::from_code(code), expected);
    }

    #[test]
    fn test_change_type_names() {
        assert_eq!(ChangeType::Insert.to_string(), "insert");
        assert_eq!(ChangeType::Unknown.to_string(), "unknown");
    }

    #[test_case(Request::GetAll { database_id: 1, statement_id: 2 }, "getAll")]
    #[test_case(Request::IsInTransaction { database_id: 1 }, "isInTransaction")]
    #[test_case(Request::GetColumnNames { statement_id: 3 }, "getColumnNames")]
    #[test_case(
        Request::SessionCreateInvertedChangeset { database_id: 1, session_id: 2 },
        "sessionCreateInvertedChangeset"
    )]
    #[test_case(
        Request::BackupDatabase {
            dest_database_id: 1,
            dest_database_name: "main".into(),
            source_database_id: 2,
            source_database_name: "main".into(),
        },
        "backupDatabase"
    )]
    fn test_kind_names_and_wire_decoding(request: Request, kind: &str) {
        assert_eq!(request.kind(), kind);
        let decoded = Request::from_wire(kind, &request.to_data()).expect("decode");
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_open_defaults_when_options_missing() {
        let data = Value::object([
            ("nativeDatabaseId", Value::Integer(4)),
            ("databasePath", Value::from("app.db")),
        ]);
        let request = Request::from_wire("open", &data).expect("decode");
        assert_eq!(
            request,
            Request::Open {
                database_id: 4,
                database_path: "app.db".to_string(),
                options: OpenOptions::default(),
                serialized_data: None,
            }
        );
    }

    #[test]
    fn test_unknown_message_type() {
        let err = Request::from_wire("vacuum", &Value::Null).expect_err("unknown");
        assert_eq!(err.to_string(), "Unknown message type: vacuum");
    }

    #[test]
    fn test_missing_field_is_malformed() {
        let err = Request::from_wire("exec", &Value::object([("source", "SELECT 1")]))
            .expect_err("missing id");
        assert!(matches!(err, BridgeError::MalformedRequest(msg) if msg.contains("nativeDatabaseId")));
    }

    #[test]
    fn test_run_merges_blob_params() {
        let data = Value::object([
            ("nativeDatabaseId", Value::Integer(1)),
            ("nativeStatementId", Value::Integer(2)),
            ("bindParams", Value::object([("$name", Value::from("a"))])),
            ("bindBlobParams", Value::object([("$data", Value::Bytes(vec![1]))])),
            ("shouldPassAsArray", Value::Bool(false)),
        ]);
        let Request::Run { params, .. } = Request::from_wire("run", &data).expect("decode") else {
            panic!("not a run request");
        };
        assert!(!params.is_positional());
        assert_eq!(params.entries().len(), 2);
    }

    #[test]
    fn test_change_event_wire_shape() {
        let event = DatabaseChangeEvent {
            database_name: "main".to_string(),
            database_file_path: "/tmp/app.db".to_string(),
            table_name: "users".to_string(),
            row_id: 3,
            type_id: ChangeType::Update,
        };
        let value = event.to_value();
        assert_eq!(value.get("type"), Some(&Value::from("onDatabaseChange")));
        let data = value.get("data").expect("data");
        assert_eq!(data.get("typeId"), Some(&Value::from("update")));
        assert_eq!(data.get("rowId"), Some(&Value::Integer(3)));
    }

    #[test]
    fn test_run_result_round_trip() {
        let result = RunResult {
            last_insert_row_id: 9,
            changes: 1,
            first_row_values: vec![Value::from("x")],
        };
        assert_eq!(RunResult::from_value(&result.to_value()).expect("decode"), result);
    }
}
