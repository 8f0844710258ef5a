use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::mpsc;

use sqlworker_db::{Connection, StepResult};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::protocol::{
    BindParams, DatabaseChangeEvent, NativeId, OpenOptions, OutboundMessage, Request, RunResult,
    WorkerMessage, MEMORY_DATABASE_PATH,
};
use crate::value::Value;

use super::asset::AssetFetcher;
use super::bind::bind_params;
use super::tables::{DatabaseEntry, HandleTables, SessionEntry, StatementEntry};
use super::vfs::{is_memory_path, DirectoryBackend, MemoryBackend, StorageBackend};

/// Everything the worker owns: the handle tables, the storage backends and
/// the sender its replies and change events go out through.
///
/// Not `Send`; lives on the thread that created it.
#[derive(Debug)]
pub struct WorkerState {
    tables: HandleTables,
    directory: DirectoryBackend,
    memory: MemoryBackend,
    fetcher: AssetFetcher,
    outbound: mpsc::Sender<OutboundMessage>,
}

impl WorkerState {
    /// Creates an empty state. Replies and change events are sent to
    /// `outbound`.
    pub fn new(config: &BridgeConfig, outbound: mpsc::Sender<OutboundMessage>) -> Self {
        Self {
            tables: HandleTables::default(),
            directory: DirectoryBackend::new(config.database_directory.clone()),
            memory: MemoryBackend,
            fetcher: AssetFetcher::new(&config.asset_fetch),
            outbound,
        }
    }

    /// Handles one request envelope and delivers its outcome: written into
    /// the shared buffers for blocking calls, posted as a reply otherwise.
    ///
    /// Never fails. Errors, including panics inside a handler, become error
    /// replies.
    pub fn handle(&mut self, message: WorkerMessage) {
        let WorkerMessage {
            id,
            kind,
            data,
            sync,
        } = message;
        log::debug!("handling {kind} request {id}");

        let outcome = Request::from_wire(&kind, &data).and_then(|request| {
            panic::catch_unwind(AssertUnwindSafe(|| self.execute(request)))
                .unwrap_or_else(|payload| Err(BridgeError::Execution(panic_message(&*payload))))
        });
        if let Err(err) = &outcome {
            log::debug!("{kind} request {id} failed: {err}");
        }

        match sync {
            Some(sync) => sync.publish(&outcome),
            None => {
                let reply = OutboundMessage::Reply {
                    id,
                    result: outcome.map_err(|err| err.to_string()),
                };
                if self.outbound.send(reply).is_err() {
                    log::warn!("dropping reply to {kind} request {id}: channel closed");
                }
            }
        }
    }

    /// Runs `request` against the handle tables.
    ///
    /// # Errors
    ///
    /// Whatever the operation raises; see [`BridgeError`].
    #[allow(clippy::too_many_lines)] // one arm per request type
    pub fn execute(&mut self, request: Request) -> BridgeResult<Value> {
        match request {
            Request::Open {
                database_id,
                database_path,
                options,
                serialized_data,
            } => self.open(database_id, database_path, options, serialized_data),
            Request::Close { database_id } => self.close(database_id),
            Request::Exec {
                database_id,
                source,
            } => {
                self.connection(database_id)?.execute_batch(&source)?;
                Ok(Value::Null)
            }
            Request::Prepare {
                database_id,
                statement_id,
                source,
            } => {
                let statement = self.connection(database_id)?.prepare(&source)?;
                self.tables.insert_statement(
                    statement_id,
                    StatementEntry {
                        statement,
                        database_id,
                    },
                );
                Ok(Value::Null)
            }
            Request::Run {
                database_id,
                statement_id,
                params,
            } => self.run(database_id, statement_id, &params),
            Request::Step {
                database_id,
                statement_id,
            } => {
                self.tables.database(database_id)?;
                let statement = &self.tables.statement(statement_id)?.statement;
                match statement.step()? {
                    StepResult::Row => Ok(row_values(statement)?),
                    StepResult::Done => Ok(Value::Null),
                }
            }
            Request::GetAll {
                database_id,
                statement_id,
            } => {
                self.tables.database(database_id)?;
                let statement = &self.tables.statement(statement_id)?.statement;
                let mut rows = Vec::new();
                while statement.step()? == StepResult::Row {
                    rows.push(row_values(statement)?);
                }
                Ok(Value::Array(rows))
            }
            Request::GetColumnNames { statement_id } => {
                let statement = &self.tables.statement(statement_id)?.statement;
                Ok(Value::Array(
                    statement.column_names().into_iter().map(Value::Text).collect(),
                ))
            }
            Request::Reset {
                database_id,
                statement_id,
            } => {
                self.tables.database(database_id)?;
                self.tables
                    .statement(statement_id)?
                    .statement
                    .reset()
                    .map_err(|err| {
                        BridgeError::Execution(format!(
                            "Error resetting statement: {}",
                            err.message
                        ))
                    })?;
                Ok(Value::Null)
            }
            Request::Finalize {
                database_id,
                statement_id,
            } => {
                self.tables.database(database_id)?;
                let entry = self
                    .tables
                    .remove_statement(statement_id)
                    .ok_or(BridgeError::StatementNotFound(statement_id))?;
                entry.statement.finalize().map_err(|err| {
                    BridgeError::Execution(format!("Error finalizing statement: {}", err.message))
                })?;
                Ok(Value::Null)
            }
            Request::Serialize {
                database_id,
                schema_name,
            } => Ok(Value::Bytes(
                self.connection(database_id)?.serialize(&schema_name)?,
            )),
            Request::BackupDatabase {
                dest_database_id,
                dest_database_name,
                source_database_id,
                source_database_name,
            } => {
                let dest = self.connection(dest_database_id)?;
                let source = self.connection(source_database_id)?;
                source.backup_to(&source_database_name, dest, &dest_database_name)?;
                Ok(Value::Null)
            }
            Request::DeleteDatabase { database_path } => self.delete_database(&database_path),
            Request::ImportAssetDatabase {
                database_path,
                asset_database_path,
                force_overwrite,
            } => self.import_asset_database(&database_path, &asset_database_path, force_overwrite),
            Request::IsInTransaction { database_id } => {
                Ok(Value::Bool(self.connection(database_id)?.in_transaction()))
            }
            Request::SessionCreate {
                database_id,
                session_id,
                db_name,
            } => {
                let session = self.connection(database_id)?.create_session(&db_name)?;
                self.tables.insert_session(
                    session_id,
                    SessionEntry {
                        session,
                        database_id,
                    },
                );
                Ok(Value::Null)
            }
            Request::SessionAttach {
                database_id,
                session_id,
                table,
            } => {
                self.session(database_id, session_id)?
                    .session
                    .attach(table.as_deref())?;
                Ok(Value::Null)
            }
            Request::SessionEnable {
                database_id,
                session_id,
                enabled,
            } => Ok(Value::Bool(
                self.session(database_id, session_id)?.session.enable(enabled),
            )),
            Request::SessionClose {
                database_id,
                session_id,
            } => {
                self.session(database_id, session_id)?;
                self.tables.remove_session(session_id);
                Ok(Value::Null)
            }
            Request::SessionCreateChangeset {
                database_id,
                session_id,
            } => Ok(Value::Bytes(
                self.session(database_id, session_id)?.session.changeset()?,
            )),
            Request::SessionCreateInvertedChangeset {
                database_id,
                session_id,
            } => Ok(Value::Bytes(
                self.session(database_id, session_id)?
                    .session
                    .inverted_changeset()?,
            )),
            Request::SessionApplyChangeset {
                database_id,
                session_id,
                changeset,
            } => {
                self.session(database_id, session_id)?;
                self.connection(database_id)?.apply_changeset(&changeset)?;
                Ok(Value::Null)
            }
            Request::SessionInvertChangeset {
                database_id,
                session_id,
                changeset,
            } => {
                self.session(database_id, session_id)?;
                Ok(Value::Bytes(sqlworker_db::invert_changeset(&changeset)?))
            }
        }
    }

    /// Number of open database, statement and session handles.
    #[must_use]
    pub fn handle_counts(&self) -> (usize, usize, usize) {
        (
            self.tables.database_count(),
            self.tables.statement_count(),
            self.tables.session_count(),
        )
    }

    fn connection(&self, database_id: NativeId) -> BridgeResult<&Connection> {
        Ok(&self.tables.database(database_id)?.connection)
    }

    fn session(&self, database_id: NativeId, session_id: NativeId) -> BridgeResult<&SessionEntry> {
        self.tables.database(database_id)?;
        self.tables.session(session_id)
    }

    fn backend(&self, database_path: &str) -> &dyn StorageBackend {
        if is_memory_path(database_path) {
            &self.memory
        } else {
            &self.directory
        }
    }

    // ── Databases ───────────────────────────────────────────────────────

    fn open(
        &mut self,
        database_id: NativeId,
        database_path: String,
        options: OpenOptions,
        serialized_data: Option<Vec<u8>>,
    ) -> BridgeResult<Value> {
        if let Some(snapshot) = serialized_data {
            let connection = Rc::new(Connection::open_from_snapshot(&snapshot)?);
            self.listen(&connection, options);
            log::debug!(
                "opened database {database_id} from a {} byte snapshot",
                snapshot.len()
            );
            self.tables.insert_database(
                database_id,
                DatabaseEntry {
                    connection,
                    database_path,
                    file_path: PathBuf::from(MEMORY_DATABASE_PATH),
                    options,
                    from_snapshot: true,
                },
            );
            return Ok(Value::Null);
        }

        let shared = if options.use_new_connection {
            None
        } else {
            self.tables.find_alias(&database_path, &options).map(|entry| {
                (
                    Rc::clone(&entry.connection),
                    entry.file_path.clone(),
                    entry.from_snapshot,
                )
            })
        };
        let entry = if let Some((connection, file_path, from_snapshot)) = shared {
            log::debug!("database {database_id} shares the open connection to {database_path}");
            DatabaseEntry {
                connection,
                database_path,
                file_path,
                options,
                from_snapshot,
            }
        } else {
            let backend = self.backend(&database_path);
            let file_path = backend.resolve(&database_path)?;
            let connection = Rc::new(Connection::open(&file_path, false, None)?);
            log::debug!(
                "opened database {database_id} at {} ({} backend)",
                file_path.display(),
                backend.name()
            );
            self.listen(&connection, options);
            DatabaseEntry {
                connection,
                database_path,
                file_path,
                options,
                from_snapshot: false,
            }
        };
        self.tables.insert_database(database_id, entry);
        Ok(Value::Null)
    }

    /// Installs the update hook that posts `onDatabaseChange` events.
    fn listen(&self, connection: &Connection, options: OpenOptions) {
        if !options.enable_change_listener {
            return;
        }
        let outbound = self.outbound.clone();
        connection.set_update_hook(Some(move |event| {
            let event = DatabaseChangeEvent::from_update(event);
            // The foreground may already be gone.
            let _ = outbound.send(OutboundMessage::DatabaseChange(event));
        }));
    }

    fn close(&mut self, database_id: NativeId) -> BridgeResult<Value> {
        let entry = self.tables.database(database_id)?;
        let connection = Rc::clone(&entry.connection);
        let finalize = entry.options.finalize_unused_statements_before_closing;

        for session_id in self.tables.sessions_of(database_id) {
            log::debug!("closing session {session_id} with database {database_id}");
            self.tables.remove_session(session_id);
        }

        if finalize {
            let statement_ids = if self.tables.alias_count(&connection) > 1 {
                self.tables.statements_of(database_id)
            } else {
                self.tables
                    .statements_with_handles(&connection.statement_handles())
            };
            for statement_id in statement_ids {
                let Some(statement) = self.tables.remove_statement(statement_id) else {
                    continue;
                };
                if let Err(err) = statement.statement.finalize() {
                    log::warn!(
                        "finalizing statement {statement_id} while closing database {database_id}: {err}"
                    );
                }
            }
        }

        self.tables.remove_database(database_id);
        log::debug!("closed database {database_id}");
        Ok(Value::Null)
    }

    fn run(
        &self,
        database_id: NativeId,
        statement_id: NativeId,
        params: &BindParams,
    ) -> BridgeResult<Value> {
        let connection = self.connection(database_id)?;
        let statement = &self.tables.statement(statement_id)?.statement;
        // A failed previous step resurfaces from reset; it does not concern this run.
        if let Err(err) = statement.reset() {
            log::debug!("statement {statement_id} reset before run: {err}");
        }
        statement.clear_bindings()?;
        bind_params(statement, params)?;

        let first_row_values = match statement.step()? {
            StepResult::Row => statement
                .column_values()?
                .into_iter()
                .map(Value::from)
                .collect(),
            StepResult::Done => Vec::new(),
        };
        Ok(RunResult {
            last_insert_row_id: connection.last_insert_rowid(),
            changes: i64::try_from(connection.changes()).unwrap_or(i64::MAX),
            first_row_values,
        }
        .to_value())
    }

    fn delete_database(&self, database_path: &str) -> BridgeResult<Value> {
        if is_memory_path(database_path) {
            return Ok(Value::Null);
        }
        let file_path = self.directory.resolve(database_path)?;
        if self.tables.is_file_open(&file_path) {
            return Err(BridgeError::DeleteOpenDatabase(database_path.to_string()));
        }
        self.directory.delete(database_path)?;
        Ok(Value::Null)
    }

    fn import_asset_database(
        &self,
        database_path: &str,
        asset_database_path: &str,
        force_overwrite: bool,
    ) -> BridgeResult<Value> {
        let backend = self.backend(database_path);
        if !force_overwrite && backend.exists(database_path) {
            log::debug!("{database_path} already exists; skipping asset import");
            return Ok(Value::Null);
        }
        let bytes = self.fetcher.fetch(asset_database_path)?;
        let source = Connection::open_from_snapshot(&bytes)?;
        let dest = Connection::open(&backend.resolve(database_path)?, false, None)?;
        source.backup_to("main", &dest, "main")?;
        log::debug!(
            "imported {} byte asset {asset_database_path} into {database_path}",
            bytes.len()
        );
        Ok(Value::Null)
    }
}

fn row_values(statement: &sqlworker_db::Statement) -> BridgeResult<Value> {
    Ok(Value::Array(
        statement
            .column_values()?
            .into_iter()
            .map(Value::from)
            .collect(),
    ))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "worker handler panicked".to_string())
}
