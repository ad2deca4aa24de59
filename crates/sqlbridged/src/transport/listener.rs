//! Listener implementation for daemon transport sockets.

use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use sqlbridge_config::SocketEndpoint;

use super::{ConnectionHandler, ConnectionStream, LISTENER_TARGET, ListenerError};

#[cfg(unix)]
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::FileTypeExt;
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};
#[cfg(unix)]
use std::path::Path;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// Listener bound to the configured endpoint but not yet accepting.
#[derive(Debug)]
pub(crate) struct SocketListener {
    endpoint: SocketEndpoint,
    listener: ListenerKind,
}

#[derive(Debug)]
enum ListenerKind {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl SocketListener {
    pub(crate) fn bind(endpoint: &SocketEndpoint) -> Result<Self, ListenerError> {
        let listener = match endpoint {
            SocketEndpoint::Tcp { host, port } => ListenerKind::Tcp(bind_tcp(host, *port)?),
            #[cfg(unix)]
            SocketEndpoint::Unix { path } => ListenerKind::Unix(bind_unix(path.as_std_path())?),
            #[cfg(not(unix))]
            SocketEndpoint::Unix { .. } => {
                return Err(ListenerError::UnsupportedUnix {
                    endpoint: endpoint.to_string(),
                });
            }
        };
        Ok(Self {
            endpoint: endpoint.clone(),
            listener,
        })
    }

    /// Endpoint that clients should dial. TCP endpoints bound to port zero
    /// report the port the kernel picked.
    pub(crate) fn endpoint(&self) -> SocketEndpoint {
        match (&self.endpoint, self.local_addr()) {
            (SocketEndpoint::Tcp { host, .. }, Some(addr)) => {
                SocketEndpoint::tcp(host.clone(), addr.port())
            }
            (endpoint, _) => endpoint.clone(),
        }
    }

    pub(crate) fn local_addr(&self) -> Option<SocketAddr> {
        match &self.listener {
            ListenerKind::Tcp(listener) => listener.local_addr().ok(),
            #[cfg(unix)]
            ListenerKind::Unix(_) => None,
        }
    }

    /// Starts the accept loop on a background thread.
    pub(crate) fn start(
        self,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<ListenerHandle, ListenerError> {
        let shutdown = Arc::new(AtomicBool::new(false));
        if let Err(error) = match &self.listener {
            ListenerKind::Tcp(listener) => listener.set_nonblocking(true),
            #[cfg(unix)]
            ListenerKind::Unix(listener) => listener.set_nonblocking(true),
        } {
            #[cfg(unix)]
            cleanup_unix_socket(&self.endpoint);
            return Err(ListenerError::NonBlocking { source: error });
        }
        let shutdown_flag = Arc::clone(&shutdown);
        let handle = thread::Builder::new()
            .name(format!("{}-listener", env!("CARGO_PKG_NAME")))
            .spawn(move || run_accept_loop(&self, &shutdown_flag, &handler))
            .map_err(|source| ListenerError::Spawn { source })?;
        Ok(ListenerHandle {
            shutdown,
            handle: Some(handle),
        })
    }
}

/// Handle to the background listener thread.
pub(crate) struct ListenerHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ListenerHandle {
    /// Asks the accept loop to stop. Connections already accepted keep running.
    pub(crate) fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub(crate) fn join(mut self) -> Result<(), ListenerError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| ListenerError::ThreadPanic),
            None => Ok(()),
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

fn run_accept_loop(
    listener: &SocketListener,
    shutdown: &AtomicBool,
    handler: &Arc<dyn ConnectionHandler>,
) {
    info!(
        target: LISTENER_TARGET,
        endpoint = %listener.endpoint(),
        "socket listener active"
    );
    let mut last_error = None::<io::ErrorKind>;
    while !shutdown.load(Ordering::SeqCst) {
        match accept_connection(listener) {
            Ok(Some(stream)) => {
                last_error = None;
                spawn_connection(stream, Arc::clone(handler));
            }
            Ok(None) => thread::sleep(ACCEPT_BACKOFF),
            Err(error) => {
                let kind = error.kind();
                if last_error != Some(kind) {
                    warn!(
                        target: LISTENER_TARGET,
                        error = %error,
                        "socket accept error"
                    );
                }
                last_error = Some(kind);
                thread::sleep(ERROR_BACKOFF);
            }
        }
    }

    #[cfg(unix)]
    cleanup_unix_socket(&listener.endpoint);
    info!(target: LISTENER_TARGET, "socket listener stopped");
}

fn spawn_connection(stream: ConnectionStream, handler: Arc<dyn ConnectionHandler>) {
    let spawned = thread::Builder::new()
        .name(format!("{}-connection", env!("CARGO_PKG_NAME")))
        .spawn(move || handler.handle(stream));
    if let Err(error) = spawned {
        warn!(
            target: LISTENER_TARGET,
            error = %error,
            "failed to spawn connection thread"
        );
    }
}

fn accept_connection(listener: &SocketListener) -> Result<Option<ConnectionStream>, io::Error> {
    let stream = match &listener.listener {
        ListenerKind::Tcp(tcp) => match tcp.accept() {
            Ok((stream, peer)) => {
                stream.set_nonblocking(false)?;
                stream.set_nodelay(true)?;
                debug!(target: LISTENER_TARGET, %peer, "accepted tcp connection");
                ConnectionStream::Tcp(stream)
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => return Ok(None),
            Err(error) => return Err(error),
        },
        #[cfg(unix)]
        ListenerKind::Unix(unix) => match unix.accept() {
            Ok((stream, _)) => {
                stream.set_nonblocking(false)?;
                debug!(target: LISTENER_TARGET, "accepted unix connection");
                ConnectionStream::Unix(stream)
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => return Ok(None),
            Err(error) => return Err(error),
        },
    };
    Ok(Some(stream))
}

fn bind_tcp(host: &str, port: u16) -> Result<TcpListener, ListenerError> {
    let addr = (host, port)
        .to_socket_addrs()
        .map_err(|source| ListenerError::Resolve {
            host: host.to_owned(),
            port,
            source,
        })?
        .next()
        .ok_or_else(|| ListenerError::ResolveEmpty {
            host: host.to_owned(),
            port,
        })?;
    TcpListener::bind(addr).map_err(|source| ListenerError::BindTcp { addr, source })
}

/// Binds a Unix socket. A socket file whose daemon no longer answers is
/// removed first; a live one is refused.
#[cfg(unix)]
fn bind_unix(path: &Path) -> Result<UnixListener, ListenerError> {
    let shown = path.display().to_string();
    let stale = |action, source| ListenerError::StaleSocket {
        action,
        path: shown.clone(),
        source,
    };
    match probe_existing(path) {
        Ok(Leftover::Absent) => {}
        Ok(Leftover::Live) => return Err(ListenerError::UnixInUse { path: shown }),
        Ok(Leftover::NotSocket) => return Err(ListenerError::UnixNotSocket { path: shown }),
        Ok(Leftover::Stale) => {
            warn!(target: LISTENER_TARGET, path = %shown, "removing stale socket");
            fs::remove_file(path).map_err(|source| stale("remove", source))?;
        }
        Err((action, source)) => return Err(stale(action, source)),
    }

    UnixListener::bind(path).map_err(|source| ListenerError::BindUnix {
        path: shown,
        source,
    })
}

/// What occupies a socket path before binding.
#[cfg(unix)]
enum Leftover {
    Absent,
    Live,
    Stale,
    NotSocket,
}

#[cfg(unix)]
fn probe_existing(path: &Path) -> Result<Leftover, (&'static str, io::Error)> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Leftover::Absent),
        Err(error) => return Err(("inspect", error)),
    };
    if !metadata.file_type().is_socket() {
        return Ok(Leftover::NotSocket);
    }
    match UnixStream::connect(path) {
        Ok(_stream) => Ok(Leftover::Live),
        Err(error)
            if matches!(
                error.kind(),
                io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound
            ) =>
        {
            Ok(Leftover::Stale)
        }
        Err(error) => Err(("probe", error)),
    }
}

#[cfg(unix)]
fn cleanup_unix_socket(endpoint: &SocketEndpoint) {
    let SocketEndpoint::Unix { path } = endpoint else {
        return;
    };
    if let Err(error) = fs::remove_file(path.as_std_path())
        && error.kind() != io::ErrorKind::NotFound
    {
        warn!(
            target: LISTENER_TARGET,
            error = %error,
            path = %path,
            "failed to remove unix socket file"
        );
    }
}
