//! The database capability the command dispatcher drives.
//!
//! A [`DatabaseDriver`] opens databases and a [`DatabaseHandle`] runs
//! statements against one of them. Handles are shared between worker threads,
//! so they must be `Send + Sync` and serialize access internally when the
//! engine requires it. Once [`DatabaseHandle::close`] has run, every later call
//! on the same handle reports [`EngineError::Closed`].

mod remote;
mod sqlite;

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use sqlbridge_config::Config;
use sqlbridge_protocol::{ConnectOptions, ExecuteResult};

use crate::codec::NativeValue;

pub use remote::RemoteDriver;
pub use sqlite::SqliteDriver;

/// Driver used by the daemon: remote URLs go to a libsql server, everything
/// else to SQLite.
pub struct EngineDriver {
    local: SqliteDriver,
    remote: RemoteDriver,
}

impl EngineDriver {
    /// Creates the driver pair tuned by the daemon configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            local: SqliteDriver::from_config(config),
            remote: RemoteDriver::from_config(config),
        }
    }
}

impl Default for EngineDriver {
    fn default() -> Self {
        Self {
            local: SqliteDriver::default(),
            remote: RemoteDriver::default(),
        }
    }
}

impl DatabaseDriver for EngineDriver {
    fn open(&self, options: &ConnectOptions) -> Result<Box<dyn DatabaseHandle>, EngineError> {
        if remote::is_remote(&options.url) {
            self.remote.open(options)
        } else {
            self.local.open(options)
        }
    }
}

/// Opens databases described by [`ConnectOptions`].
pub trait DatabaseDriver: Send + Sync {
    /// Opens the database named by `options`.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] when the location is unsupported or the
    /// engine cannot open it.
    fn open(&self, options: &ConnectOptions) -> Result<Box<dyn DatabaseHandle>, EngineError>;
}

/// One open database.
pub trait DatabaseHandle: Send + Sync {
    /// Runs a statement that returns no rows.
    fn execute(&self, sql: &str, params: Vec<NativeValue>) -> Result<ExecuteResult, EngineError>;

    /// Runs a statement and collects every row.
    fn query(&self, sql: &str, params: Vec<NativeValue>) -> Result<NativeRows, EngineError>;

    /// Pulls the primary's latest state into a local replica.
    fn sync(&self) -> Result<(), EngineError>;

    /// Releases the database.
    fn close(&self) -> Result<(), EngineError>;
}

/// Rows produced by [`DatabaseHandle::query`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NativeRows {
    /// Column names in statement order.
    pub columns: Vec<String>,
    /// Row cells; each row has one cell per column.
    pub rows: Vec<Vec<NativeValue>>,
}

/// Failures reported by a database engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The handle has already been closed.
    #[error("database handle is closed")]
    Closed,
    /// `sync` was called on a database without a replica.
    #[error("sync requires an embedded replica")]
    SyncNotSupported,
    /// The URL names a scheme this engine cannot reach.
    #[error("unsupported remote scheme '{scheme}'")]
    UnsupportedScheme {
        /// Scheme found in the URL.
        scheme: String,
    },
    /// The URL could not be turned into a file location.
    #[error("invalid database url '{url}': {message}")]
    InvalidUrl {
        /// URL as supplied.
        url: String,
        /// Why it was rejected.
        message: String,
    },
    /// A database directory could not be created.
    #[error("failed to prepare database directory '{}': {source}", path.display())]
    Directory {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: io::Error,
    },
    /// SQLite reported an error.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    /// The libsql client or server reported an error.
    #[error(transparent)]
    Remote(#[from] libsql::Error),
    /// The runtime driving remote requests could not start.
    #[error("failed to start the remote client runtime: {source}")]
    Runtime {
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// A remote request did not finish in time.
    #[error("remote {operation} timed out after {after:?}")]
    TimedOut {
        /// Operation that was abandoned.
        operation: &'static str,
        /// Deadline that elapsed.
        after: Duration,
    },
    /// The engine panicked while running the operation.
    #[error("database engine panicked: {message}")]
    Panicked {
        /// Panic payload, when it was text.
        message: String,
    },
    /// Any other engine failure.
    #[error("{message}")]
    Other {
        /// Failure description.
        message: String,
    },
}

impl EngineError {
    /// Creates an error carrying only a message.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Creates an unsupported scheme error.
    pub fn unsupported_scheme(scheme: impl Into<String>) -> Self {
        Self::UnsupportedScheme {
            scheme: scheme.into(),
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a panic report from an unwind payload.
    pub fn panicked(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|text| (*text).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| String::from("non-text panic payload"));
        Self::Panicked { message }
    }
}
