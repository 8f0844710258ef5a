use sqlworker_db::DbError;
use thiserror::Error;

use crate::protocol::NativeId;
use crate::value::ErrorObject;

/// Error outputs from the worker bridge.
///
/// Each variant maps to a stable `code` property when the error is turned
/// into an [`ErrorObject`] for the blocking call path.
#[derive(Debug, Error, strum::IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BridgeError {
    /// No database handle with this ID is registered in the worker.
    #[error("Database not found - nativeDatabaseId[{0}]")]
    DatabaseNotFound(NativeId),
    /// No statement handle with this ID is registered in the worker.
    #[error("Statement not found - nativeStatementId[{0}]")]
    StatementNotFound(NativeId),
    /// No session handle with this ID is registered in the worker.
    #[error("Session not found - nativeSessionId[{0}]")]
    SessionNotFound(NativeId),
    /// The SQLite engine reported an error.
    #[error(transparent)]
    Engine(#[from] DbError),
    /// A statement-level operation failed.
    #[error("{0}")]
    Execution(String),
    /// A bind parameter has no SQL counterpart.
    #[error("Unsupported parameter type: {0}")]
    UnsupportedParameterType(String),
    /// A positional bind key is not a number.
    #[error("Invalid bind parameter: {0}")]
    InvalidBindParameter(String),
    /// The worker does not know the request type.
    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),
    /// The request payload is missing a field or has the wrong shape.
    #[error("Malformed request: {0}")]
    MalformedRequest(String),
    /// The blocking call path gave up waiting for the worker.
    #[error("Synchronous call timed out after {iterations} spin iterations")]
    SyncTimeout {
        /// Iterations spent before giving up.
        iterations: u64,
    },
    /// A blocking-call result did not fit the shared result buffer.
    #[error("Result of {size} bytes does not fit the {capacity}-byte result buffer")]
    ResultTooLarge {
        /// Encoded result size, including the length prefix.
        size: usize,
        /// Capacity of the shared buffer.
        capacity: usize,
    },
    /// Unexpected error encoding or decoding a payload.
    #[error("serialization_error: {0}")]
    Serialization(String),
    /// Fetching an asset over the network failed.
    #[error("network_error: {url} (status {status:?}): {error}")]
    Network {
        /// Requested URL.
        url: String,
        /// HTTP status, when a response was received.
        status: Option<u16>,
        /// Failure description.
        error: String,
    },
    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// `deleteDatabase` was asked to remove a database that is still open.
    #[error("Unable to delete database that is currently open: {0}")]
    DeleteOpenDatabase(String),
    /// `deleteDatabase` was asked to remove a file that does not exist.
    #[error("Database file not found: {0}")]
    DatabaseFileNotFound(String),
    /// The worker went away before answering.
    #[error("worker terminated before replying")]
    WorkerTerminated,
    /// An error raised inside the worker and re-thrown at the call site.
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl BridgeError {
    /// Stable code naming the kind of error.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::Remote(remote) => remote.code().unwrap_or("REMOTE"),
            other => {
                let code: &'static str = other.into();
                code
            }
        }
    }

    /// Converts the error into an [`ErrorObject`] with a `code` property.
    /// Engine errors also carry the SQLite result code as `sqliteCode`.
    #[must_use]
    pub fn to_error_object(&self) -> ErrorObject {
        match self {
            Self::Remote(remote) => remote.0.clone(),
            Self::Engine(err) => ErrorObject::new(self.to_string())
                .with_property("code", self.code())
                .with_property("sqliteCode", err.code.0),
            _ => ErrorObject::new(self.to_string()).with_property("code", self.code()),
        }
    }
}

/// An error that was raised inside the worker.
///
/// Async replies carry only a message; blocking replies carry the complete
/// error object, including its stack and extra properties.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}", .0.message)]
pub struct RemoteError(pub ErrorObject);

impl RemoteError {
    /// Wraps a plain error string.
    pub fn from_message(message: impl Into<String>) -> Self {
        Self(ErrorObject::new(message))
    }

    /// The error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.0.message
    }

    /// The `code` property, when present.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.0.code()
    }

    /// The underlying error object.
    #[must_use]
    pub const fn object(&self) -> &ErrorObject {
        &self.0
    }
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
