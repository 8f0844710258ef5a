//! Minimal safe `SQLite` wrapper for the sqlworker engine thread.
//!
//! This crate provides a small, safe Rust API over the `SQLite` C FFI:
//! connections, prepared statements, the update hook, change-tracking
//! sessions, online backups and serialized snapshots. The raw symbols come
//! from the amalgamation bundled by `libsqlite3-sys`, built with the session
//! extension enabled.
//!
//! Consumer code (the worker dispatcher) uses only the safe types defined
//! here and never touches raw FFI directly. The `ffi` module is the **only**
//! file that contains `unsafe` code or C types.

// Links the bundled SQLite amalgamation that `ffi` binds against.
extern crate libsqlite3_sys;

mod ffi;

mod connection;
pub mod error;
mod hook;
mod session;
mod statement;
pub mod value;

pub use connection::{invert_changeset, Connection, MEMORY_PATH};
pub use error::{DbError, DbErrorCode, DbResult};
pub use hook::{UpdateAction, UpdateEvent};
pub use session::Session;
pub use statement::{Statement, StatementHandle, StepResult};
pub use value::Value;
