//! `sqlworker`: drive a SQLite worker from the command line.
//!
//! - `sqlworker requests`: read `{"type", "data"}` objects from stdin, one per
//!   line, and print each reply
//! - `sqlworker query <db> <sql>`: run one statement and print its rows
//! - `sqlworker import <db> <asset>`: copy an asset database into place
//! - `sqlworker delete <db>`: delete a database file
//!
//! Output is one JSON document per line on stdout; logs go to stderr and are
//! filtered with `RUST_LOG`.

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use eyre::{bail, WrapErr};
use sqlworker_core::native::{
    delete_database_async, delete_database_sync, import_asset_database_async,
    import_asset_database_sync,
};
use sqlworker_core::serialization::{deserialize, serialize};
use sqlworker_core::{
    BindParams, BridgeConfig, BridgeError, OpenOptions, SqliteDatabase, Value, WorkerChannel,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sqlworker")]
#[command(author, version, about = "Drive a SQLite worker thread", long_about = None)]
struct Cli {
    /// Directory relative database paths resolve against.
    #[arg(long, env = "SQLWORKER_DATABASE_DIR")]
    database_dir: Option<PathBuf>,

    /// Use the blocking call path instead of awaiting replies.
    #[arg(long, global = true)]
    sync: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read raw worker requests from stdin, one JSON object per line
    Requests,

    /// Run one SQL statement and print the rows it returns
    Query {
        /// Database path, or `:memory:`
        database: String,

        /// SQL text; only the first statement runs
        sql: String,

        /// Positional parameters as a JSON array
        #[arg(long)]
        params: Option<String>,
    },

    /// Import an asset database from a URL or a local path
    Import {
        /// Destination database path
        database: String,

        /// `http(s)://` URL, `file://` URL or path of the asset
        asset: String,

        /// Replace an existing database
        #[arg(long)]
        force: bool,
    },

    /// Delete a database file and its journal companions
    Delete {
        /// Database path
        database: String,
    },
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = BridgeConfig::from_env();
    if let Some(dir) = cli.database_dir {
        config = config.with_database_directory(dir);
    }
    tracing::debug!(
        database_directory = %config.database_directory.display(),
        "starting worker"
    );
    let worker = WorkerChannel::spawn(config).wrap_err("failed to start the worker")?;

    match cli.command {
        Commands::Requests => run_requests(&worker, cli.sync).await,
        Commands::Query {
            database,
            sql,
            params,
        } => run_query(worker, &database, &sql, params.as_deref(), cli.sync).await,
        Commands::Import {
            database,
            asset,
            force,
        } => {
            if cli.sync {
                import_asset_database_sync(&worker, &database, &asset, force)?;
            } else {
                import_asset_database_async(&worker, &database, &asset, force).await?;
            }
            tracing::info!("imported {asset} into {database}");
            Ok(())
        }
        Commands::Delete { database } => {
            if cli.sync {
                delete_database_sync(&worker, &database)?;
            } else {
                delete_database_async(&worker, &database).await?;
            }
            tracing::info!("deleted {database}");
            Ok(())
        }
    }
}

async fn run_requests(worker: &Arc<WorkerChannel>, sync: bool) -> eyre::Result<()> {
    let mut events = worker.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let Err(err) = print_value(&event.to_value()) {
                tracing::warn!("failed to print change event: {err}");
            }
        }
    });

    for (index, line) in io::stdin().lock().lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let reply = match parse_request(&line) {
            Ok((kind, data)) => {
                let outcome = if sync {
                    worker.call_raw_sync(&kind, data)
                } else {
                    worker.call_raw(&kind, data).await
                };
                reply_value(index, outcome)
            }
            Err(err) => {
                tracing::warn!("line {}: {err}", index + 1);
                reply_value(index, Err(err))
            }
        };
        print_value(&reply)?;
    }
    Ok(())
}

async fn run_query(
    worker: Arc<WorkerChannel>,
    database: &str,
    sql: &str,
    params: Option<&str>,
    sync: bool,
) -> eyre::Result<()> {
    let params = match params {
        Some(json) => parse_params(json)?,
        None => BindParams::default(),
    };
    let rows = if sync {
        let db = SqliteDatabase::open_database_sync(worker, database, OpenOptions::default())?;
        let rows = db.get_all_sync(sql, params);
        db.close_sync()?;
        rows?
    } else {
        let db =
            SqliteDatabase::open_database_async(worker, database, OpenOptions::default()).await?;
        let rows = db.get_all_async(sql, params).await;
        db.close_async().await?;
        rows?
    };
    for row in rows {
        print_value(&row.to_object())?;
    }
    Ok(())
}

/// Splits a request line into its `type` and `data`.
fn parse_request(line: &str) -> Result<(String, Value), BridgeError> {
    let request = deserialize(line)?;
    let kind = request
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| BridgeError::MalformedRequest("missing `type`".to_string()))?
        .to_string();
    let data = request.get("data").cloned().unwrap_or_default();
    Ok((kind, data))
}

fn parse_params(json: &str) -> eyre::Result<BindParams> {
    match deserialize(json).wrap_err("invalid --params")? {
        Value::Array(values) => Ok(BindParams::positional(values)),
        other => bail!("--params must be a JSON array, got {}", other.type_name()),
    }
}

fn reply_value(index: usize, outcome: Result<Value, BridgeError>) -> Value {
    let line = Value::Integer(i64::try_from(index + 1).unwrap_or(i64::MAX));
    match outcome {
        Ok(result) => Value::object([("line", line), ("result", result)]),
        Err(err) => Value::object([("line", line), ("error", Value::Error(err.to_error_object()))]),
    }
}

fn print_value(value: &Value) -> eyre::Result<()> {
    println!("{}", serialize(value)?);
    Ok(())
}
