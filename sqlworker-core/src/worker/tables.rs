//! Handle tables mapping foreground IDs to worker-side resources.

use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

use sqlworker_db::{Connection, Session, Statement};

use crate::error::{BridgeError, BridgeResult};
use crate::protocol::{NativeId, OpenOptions};

/// An open database handle. Several handles may share one connection.
#[derive(Debug)]
pub struct DatabaseEntry {
    pub connection: Rc<Connection>,
    pub database_path: String,
    pub file_path: PathBuf,
    pub options: OpenOptions,
    /// Opened from serialized bytes, so no file backs the connection.
    pub from_snapshot: bool,
}

impl DatabaseEntry {
    /// `true` when an `open` for `database_path` with `options` may reuse
    /// this entry's connection.
    fn shares_with(&self, database_path: &str, options: &OpenOptions) -> bool {
        self.database_path == database_path && self.options == *options
    }
}

#[derive(Debug)]
pub struct StatementEntry {
    pub statement: Statement,
    pub database_id: NativeId,
}

#[derive(Debug)]
pub struct SessionEntry {
    pub session: Session,
    pub database_id: NativeId,
}

/// Worker-side resources keyed by the IDs the foreground assigned.
#[derive(Debug, Default)]
pub struct HandleTables {
    databases: HashMap<NativeId, DatabaseEntry>,
    statements: HashMap<NativeId, StatementEntry>,
    sessions: HashMap<NativeId, SessionEntry>,
}

impl HandleTables {
    pub fn database(&self, id: NativeId) -> BridgeResult<&DatabaseEntry> {
        self.databases
            .get(&id)
            .ok_or(BridgeError::DatabaseNotFound(id))
    }

    pub fn statement(&self, id: NativeId) -> BridgeResult<&StatementEntry> {
        self.statements
            .get(&id)
            .ok_or(BridgeError::StatementNotFound(id))
    }

    pub fn session(&self, id: NativeId) -> BridgeResult<&SessionEntry> {
        self.sessions.get(&id).ok_or(BridgeError::SessionNotFound(id))
    }

    pub fn insert_database(&mut self, id: NativeId, entry: DatabaseEntry) {
        if self.databases.insert(id, entry).is_some() {
            log::warn!("database handle {id} was reopened; previous handle replaced");
        }
    }

    pub fn insert_statement(&mut self, id: NativeId, entry: StatementEntry) {
        self.statements.insert(id, entry);
    }

    pub fn insert_session(&mut self, id: NativeId, entry: SessionEntry) {
        self.sessions.insert(id, entry);
    }

    pub fn remove_database(&mut self, id: NativeId) -> Option<DatabaseEntry> {
        self.databases.remove(&id)
    }

    pub fn remove_statement(&mut self, id: NativeId) -> Option<StatementEntry> {
        self.statements.remove(&id)
    }

    pub fn remove_session(&mut self, id: NativeId) -> Option<SessionEntry> {
        self.sessions.remove(&id)
    }

    /// An open handle whose connection `open` may share for `database_path`
    /// and `options`.
    pub fn find_alias(&self, database_path: &str, options: &OpenOptions) -> Option<&DatabaseEntry> {
        self.databases
            .values()
            .find(|entry| entry.shares_with(database_path, options))
    }

    /// `true` if any open handle has `file_path` as its backing file.
    pub fn is_file_open(&self, file_path: &std::path::Path) -> bool {
        self.databases
            .values()
            .any(|entry| !entry.from_snapshot && entry.file_path == file_path)
    }

    /// Number of handles sharing `connection`, `connection`'s own handle
    /// included.
    pub fn alias_count(&self, connection: &Rc<Connection>) -> usize {
        self.databases
            .values()
            .filter(|entry| Rc::ptr_eq(&entry.connection, connection))
            .count()
    }

    /// IDs of the statements prepared through database handle `database_id`.
    pub fn statements_of(&self, database_id: NativeId) -> Vec<NativeId> {
        self.statements
            .iter()
            .filter(|(_, entry)| entry.database_id == database_id)
            .map(|(id, _)| *id)
            .collect()
    }

    /// IDs of every statement whose engine handle is in `handles`.
    pub fn statements_with_handles(
        &self,
        handles: &[sqlworker_db::StatementHandle],
    ) -> Vec<NativeId> {
        self.statements
            .iter()
            .filter(|(_, entry)| handles.contains(&entry.statement.handle()))
            .map(|(id, _)| *id)
            .collect()
    }

    /// IDs of the sessions created through database handle `database_id`.
    pub fn sessions_of(&self, database_id: NativeId) -> Vec<NativeId> {
        self.sessions
            .iter()
            .filter(|(_, entry)| entry.database_id == database_id)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn database_count(&self) -> usize {
        self.databases.len()
    }

    pub fn statement_count(&self) -> usize {
        self.statements.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(connection: &Rc<Connection>, path: &str, options: OpenOptions) -> DatabaseEntry {
        DatabaseEntry {
            connection: Rc::clone(connection),
            database_path: path.to_string(),
            file_path: PathBuf::from(path),
            options,
            from_snapshot: false,
        }
    }

    #[test]
    fn test_lookup_errors_name_the_id() {
        let tables = HandleTables::default();
        assert_eq!(
            tables.database(7).expect_err("missing").to_string(),
            "Database not found - nativeDatabaseId[7]"
        );
        assert_eq!(
            tables.statement(8).expect_err("missing").to_string(),
            "Statement not found - nativeStatementId[8]"
        );
        assert_eq!(
            tables.session(9).expect_err("missing").to_string(),
            "Session not found - nativeSessionId[9]"
        );
    }

    #[test]
    fn test_alias_requires_same_path_and_options() {
        let connection = Rc::new(Connection::open_in_memory().expect("open in-memory db"));
        let mut tables = HandleTables::default();
        tables.insert_database(1, entry(&connection, "app.db", OpenOptions::default()));

        assert!(tables.find_alias("app.db", &OpenOptions::default()).is_some());
        assert!(tables.find_alias("other.db", &OpenOptions::default()).is_none());
        let listening = OpenOptions {
            enable_change_listener: true,
            ..OpenOptions::default()
        };
        assert!(tables.find_alias("app.db", &listening).is_none());
        assert_eq!(tables.alias_count(&connection), 1);
    }

    #[test]
    fn test_memory_and_snapshot_entries_alias_by_path() {
        let memory = Rc::new(Connection::open_in_memory().expect("open in-memory db"));
        let restored = Rc::new(Connection::open_in_memory().expect("open in-memory db"));
        let mut tables = HandleTables::default();
        tables.insert_database(1, entry(&memory, ":memory:", OpenOptions::default()));
        let mut snapshot = entry(&restored, "snap.db", OpenOptions::default());
        snapshot.from_snapshot = true;
        tables.insert_database(2, snapshot);

        let shared = tables.find_alias(":memory:", &OpenOptions::default()).expect("memory alias");
        assert!(Rc::ptr_eq(&shared.connection, &memory));
        let shared = tables.find_alias("snap.db", &OpenOptions::default()).expect("snapshot alias");
        assert!(Rc::ptr_eq(&shared.connection, &restored));
        assert!(shared.from_snapshot);
        assert!(!tables.is_file_open(std::path::Path::new("snap.db")));
    }

    #[test]
    fn test_children_are_found_by_database() {
        let connection = Rc::new(Connection::open_in_memory().expect("open in-memory db"));
        let mut tables = HandleTables::default();
        tables.insert_database(1, entry(&connection, ":memory:", OpenOptions::default()));
        for id in [10, 11] {
            let statement = connection.prepare("SELECT 1").expect("prepare");
            tables.insert_statement(id, StatementEntry { statement, database_id: 1 });
        }
        let statement = connection.prepare("SELECT 2").expect("prepare");
        tables.insert_statement(12, StatementEntry { statement, database_id: 2 });

        let mut ids = tables.statements_of(1);
        ids.sort_unstable();
        assert_eq!(ids, vec![10, 11]);
        assert_eq!(
            tables.statements_with_handles(&connection.statement_handles()).len(),
            3
        );
        assert!(tables.remove_statement(12).is_some());
        assert_eq!(tables.statement_count(), 2);
    }
}
