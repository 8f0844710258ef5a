//! `sqlworker-core` runs SQLite on a dedicated worker thread and exposes it to
//! any number of foreground callers.
//!
//! Every operation is a request to the worker, answered either through an
//! awaitable reply ([`WorkerChannel::call`]) or through a shared-memory
//! handshake the caller blocks on ([`WorkerChannel::call_sync`]). The
//! [`native`] shims wrap each request kind in an `_async`/`_sync` pair, and
//! [`SqliteDatabase`] layers a convenient API on top.
//!
//! ```no_run
//! use sqlworker_core::{shared_worker, BindParams, OpenOptions, SqliteDatabase};
//!
//! # fn main() -> sqlworker_core::BridgeResult<()> {
//! let worker = shared_worker()?;
//! let db = SqliteDatabase::open_database_sync(worker, "app.db", OpenOptions::default())?;
//! db.exec_sync("CREATE TABLE IF NOT EXISTS notes (body TEXT)")?;
//! db.run_sync("INSERT INTO notes VALUES (?)", BindParams::positional(["hello"]))?;
//! let rows = db.get_all_sync("SELECT body FROM notes", BindParams::default())?;
//! println!("{} notes", rows.len());
//! # Ok(())
//! # }
//! ```
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod channel;
pub use channel::{init_shared_worker, shared_worker, WorkerChannel, WorkerPort};

mod config;
pub use config::*;

mod database;
pub use database::{Row, SqliteDatabase, SqliteSession, SqliteStatement};

mod deferred;
pub use deferred::{Deferred, Promise};

mod error;
pub use error::*;

pub mod logger;

pub mod native;
pub use native::{NativeDatabase, NativeSession, NativeStatement};

mod protocol;
pub use protocol::*;

pub mod serialization;

mod value;
pub use value::{ErrorObject, Value};

pub mod worker;
