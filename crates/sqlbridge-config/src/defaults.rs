#[cfg(unix)]
use std::env;

#[cfg(unix)]
use camino::Utf8PathBuf;
#[cfg(unix)]
use libc::geteuid;

#[cfg(unix)]
use dirs::runtime_dir;

use crate::socket::SocketEndpoint;

/// Default TCP port used when Unix domain sockets are not available.
pub const DEFAULT_TCP_PORT: u16 = 9797;

/// Default log filter expression used by the daemon.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Worker pool size placeholder meaning "use the available parallelism".
pub const DEFAULT_WORKER_THREADS: usize = 0;

/// Default upper bound for a single request line.
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 1024 * 1024;

/// Default SQLite busy timeout in milliseconds.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Default limit on a single round trip to a remote libsql server, in
/// milliseconds.
pub const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 30_000;

/// Default log filter expression used by the daemon.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the daemon.
#[must_use]
pub const fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

/// Computes the default socket endpoint for the daemon.
#[must_use]
pub fn default_socket_endpoint() -> SocketEndpoint {
    default_socket_endpoint_inner()
}

#[cfg(unix)]
fn default_socket_endpoint_inner() -> SocketEndpoint {
    let mut base = runtime_dir()
        .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
        .map_or_else(namespaced_temp_directory, |mut dir| {
            dir.push("sqlbridge");
            dir
        });
    base.push("sqlbridged.sock");
    SocketEndpoint::unix(base)
}

/// `$TMPDIR/sqlbridge/uid-N`, used when no per-user runtime directory exists.
#[cfg(unix)]
fn namespaced_temp_directory() -> Utf8PathBuf {
    let mut base = Utf8PathBuf::from_path_buf(env::temp_dir())
        .unwrap_or_else(|_| Utf8PathBuf::from("/tmp"));
    base.push("sqlbridge");
    // SAFETY: `geteuid` has no preconditions and cannot fail.
    let uid = unsafe { geteuid() };
    base.push(format!("uid-{uid}"));
    base
}

#[cfg(not(unix))]
fn default_socket_endpoint_inner() -> SocketEndpoint {
    SocketEndpoint::tcp("127.0.0.1", DEFAULT_TCP_PORT)
}
