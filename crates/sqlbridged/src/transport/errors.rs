//! Failures of the socket listener.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Reasons the listener could not bind its endpoint or keep accepting.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Name resolution for the TCP host failed.
    #[error("cannot resolve {host}:{port}: {source}")]
    Resolve {
        /// Configured host.
        host: String,
        /// Configured port.
        port: u16,
        /// Resolver error.
        #[source]
        source: io::Error,
    },
    /// The TCP host resolved, but to no address at all.
    #[error("{host}:{port} resolved to no addresses")]
    ResolveEmpty {
        /// Configured host.
        host: String,
        /// Configured port.
        port: u16,
    },
    /// The TCP address could not be bound.
    #[error("cannot listen on {addr}: {source}")]
    BindTcp {
        /// Resolved address.
        addr: SocketAddr,
        /// Bind error.
        #[source]
        source: io::Error,
    },
    /// The bound socket refused non-blocking mode.
    #[error("cannot switch the listener to non-blocking accepts: {source}")]
    NonBlocking {
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// A Unix endpoint was configured on a platform without Unix sockets.
    #[cfg(not(unix))]
    #[error("{endpoint}: Unix sockets are not available on this platform")]
    UnsupportedUnix {
        /// Configured endpoint.
        endpoint: String,
    },
    /// The Unix socket path could not be bound.
    #[cfg(unix)]
    #[error("cannot listen on {path}: {source}")]
    BindUnix {
        /// Socket path.
        path: String,
        /// Bind error.
        #[source]
        source: io::Error,
    },
    /// A live daemon already answers on the socket path.
    #[cfg(unix)]
    #[error("another daemon is already listening on {path}")]
    UnixInUse {
        /// Socket path.
        path: String,
    },
    /// The socket path is taken by something that is not a socket.
    #[cfg(unix)]
    #[error("{path} exists but is not a socket")]
    UnixNotSocket {
        /// Socket path.
        path: String,
    },
    /// A socket file left by an earlier run could not be checked or removed.
    #[cfg(unix)]
    #[error("cannot {action} leftover socket {path}: {source}")]
    StaleSocket {
        /// What was being attempted: `inspect`, `probe` or `remove`.
        action: &'static str,
        /// Socket path.
        path: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The accept loop thread could not be started.
    #[error("cannot start the accept loop: {source}")]
    Spawn {
        /// Thread builder error.
        #[source]
        source: io::Error,
    },
    /// The accept loop thread panicked.
    #[error("the accept loop panicked")]
    ThreadPanic,
}
