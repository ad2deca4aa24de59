//! Shared configuration for the sqlbridge daemon and its hosts.
//!
//! Values are layered by [`ortho_config`]: built-in defaults, then an optional
//! TOML file (`--config-path` or `SQLBRIDGE_CONFIG_PATH`), then `SQLBRIDGE_*`
//! environment variables, then command-line flags.

mod defaults;
mod logging;
mod socket;

use std::num::NonZeroUsize;
use std::thread;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_BUSY_TIMEOUT_MS, DEFAULT_LOG_FILTER, DEFAULT_MAX_REQUEST_BYTES,
    DEFAULT_REMOTE_TIMEOUT_MS, DEFAULT_TCP_PORT, DEFAULT_WORKER_THREADS, default_log_filter, default_log_filter_string, default_log_format,
    default_socket_endpoint,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

/// Worker count used when the platform cannot report its parallelism.
const FALLBACK_WORKER_THREADS: usize = 4;

/// Resolved runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "SQLBRIDGE")]
pub struct Config {
    /// Endpoint the daemon listens on.
    #[ortho_config(default = default_socket_endpoint())]
    pub daemon_socket: SocketEndpoint,
    /// `tracing` filter directive, for example `info` or `sqlbridged=debug`.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format of daemon logs.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Size of the command worker pool; `0` selects the available parallelism.
    #[ortho_config(default = DEFAULT_WORKER_THREADS)]
    pub worker_threads: usize,
    /// Largest request line accepted from a client, in bytes.
    #[ortho_config(default = DEFAULT_MAX_REQUEST_BYTES)]
    pub max_request_bytes: usize,
    /// How long the SQLite engine waits on a locked database, in milliseconds.
    #[ortho_config(default = DEFAULT_BUSY_TIMEOUT_MS)]
    pub busy_timeout_ms: u64,
    /// Upper bound on each remote libsql round trip, in milliseconds.
    #[ortho_config(default = DEFAULT_REMOTE_TIMEOUT_MS)]
    pub remote_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon_socket: default_socket_endpoint(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            worker_threads: DEFAULT_WORKER_THREADS,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            remote_timeout_ms: DEFAULT_REMOTE_TIMEOUT_MS,
        }
    }
}

impl Config {
    /// Endpoint the daemon binds.
    #[must_use]
    pub const fn daemon_socket(&self) -> &SocketEndpoint {
        &self.daemon_socket
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Effective worker pool size.
    ///
    /// A configured value of zero resolves to the parallelism reported by the
    /// platform.
    #[must_use]
    pub fn worker_threads(&self) -> usize {
        if self.worker_threads > 0 {
            return self.worker_threads;
        }
        thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(FALLBACK_WORKER_THREADS)
    }

    /// Maximum accepted request line length in bytes.
    #[must_use]
    pub const fn max_request_bytes(&self) -> usize {
        self.max_request_bytes
    }

    /// Busy timeout applied to every engine connection.
    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Limit applied to every request sent to a remote database.
    #[must_use]
    pub const fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }
}
