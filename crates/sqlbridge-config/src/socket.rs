//! Listening endpoints for the daemon.

use std::fmt;
use std::fs::DirBuilder;
use std::io;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Address the daemon accepts host connections on.
///
/// Written as `unix:///run/user/1000/sqlbridge/sqlbridged.sock` or
/// `tcp://127.0.0.1:9797` on the command line and in the environment, and as a
/// table tagged by `transport` in configuration files. Either form
/// deserializes from any layer.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(try_from = "EndpointSource", into = "EndpointTable")]
pub enum SocketEndpoint {
    /// Unix domain socket endpoint.
    Unix {
        /// Filesystem location of the socket.
        path: Utf8PathBuf,
    },
    /// TCP socket endpoint.
    Tcp {
        /// Host name or address to bind.
        host: String,
        /// Port to bind; `0` asks the OS for an ephemeral port.
        port: u16,
    },
}

impl SocketEndpoint {
    /// Builds a Unix domain socket endpoint.
    #[must_use]
    pub fn unix(path: impl Into<Utf8PathBuf>) -> Self {
        Self::Unix { path: path.into() }
    }

    /// Builds a TCP socket endpoint.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Socket path for Unix endpoints.
    #[must_use]
    pub fn unix_path(&self) -> Option<&Utf8Path> {
        match self {
            Self::Unix { path } => Some(path.as_path()),
            Self::Tcp { .. } => None,
        }
    }

    /// Creates the parent directory of a Unix socket, owner-only on Unix.
    ///
    /// TCP endpoints need no filesystem preparation.
    ///
    /// # Errors
    ///
    /// Returns [`SocketPreparationError`] when the path has no parent or the
    /// directory cannot be created.
    pub fn prepare_filesystem(&self) -> Result<(), SocketPreparationError> {
        let Some(path) = self.unix_path() else {
            return Ok(());
        };
        let parent = path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .ok_or_else(|| SocketPreparationError::MissingParent {
                path: path.to_path_buf(),
            })?;

        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }

        match builder.create(parent.as_std_path()) {
            Err(source) if source.kind() != io::ErrorKind::AlreadyExists => {
                Err(SocketPreparationError::CreateDirectory {
                    path: parent.to_path_buf(),
                    source,
                })
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for SocketEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix { path } => write!(formatter, "unix://{path}"),
            Self::Tcp { host, port } => write!(formatter, "tcp://{host}:{port}"),
        }
    }
}

impl FromStr for SocketEndpoint {
    type Err = SocketParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(input)?;
        match url.scheme() {
            "unix" => match url.path() {
                "" | "/" => Err(SocketParseError::MissingUnixPath(input.to_owned())),
                path => {
                    let decoded = percent_decode_str(path)
                        .decode_utf8()
                        .map_err(|_| SocketParseError::NonUtf8Path(input.to_owned()))?;
                    Ok(Self::unix(decoded.as_ref()))
                }
            },
            "tcp" => {
                let host = url
                    .host_str()
                    .ok_or_else(|| SocketParseError::MissingHost(input.to_owned()))?;
                let port = url
                    .port()
                    .ok_or_else(|| SocketParseError::MissingPort(input.to_owned()))?;
                Ok(Self::tcp(host, port))
            }
            other => Err(SocketParseError::UnsupportedScheme(other.to_owned())),
        }
    }
}

/// Shapes a [`SocketEndpoint`] may take in a configuration layer.
#[derive(Deserialize)]
#[serde(untagged)]
enum EndpointSource {
    Url(String),
    Table(EndpointTable),
}

#[derive(Deserialize, Serialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
enum EndpointTable {
    Unix { path: Utf8PathBuf },
    Tcp { host: String, port: u16 },
}

impl From<SocketEndpoint> for EndpointTable {
    fn from(endpoint: SocketEndpoint) -> Self {
        match endpoint {
            SocketEndpoint::Unix { path } => Self::Unix { path },
            SocketEndpoint::Tcp { host, port } => Self::Tcp { host, port },
        }
    }
}

impl TryFrom<EndpointSource> for SocketEndpoint {
    type Error = SocketParseError;

    fn try_from(source: EndpointSource) -> Result<Self, Self::Error> {
        match source {
            EndpointSource::Url(text) => text.parse(),
            EndpointSource::Table(EndpointTable::Unix { path }) => Ok(Self::Unix { path }),
            EndpointSource::Table(EndpointTable::Tcp { host, port }) => {
                Ok(Self::Tcp { host, port })
            }
        }
    }
}

/// Errors encountered while parsing a [`SocketEndpoint`] from text.
#[derive(Debug, Error)]
pub enum SocketParseError {
    /// Scheme was neither `unix` nor `tcp`.
    #[error("unsupported socket scheme '{0}'")]
    UnsupportedScheme(String),
    /// TCP host name was missing.
    #[error("missing TCP host in '{0}'")]
    MissingHost(String),
    /// TCP port was missing.
    #[error("missing TCP port in '{0}'")]
    MissingPort(String),
    /// Unix socket path was absent.
    #[error("missing Unix socket path in '{0}'")]
    MissingUnixPath(String),
    /// Unix socket path did not decode to UTF-8.
    #[error("Unix socket path in '{0}' is not valid UTF-8")]
    NonUtf8Path(String),
    /// Text was not a URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}

/// Errors raised when preparing socket directories.
#[derive(Debug, Error)]
pub enum SocketPreparationError {
    /// The Unix socket path has no parent directory.
    #[error("socket path '{path}' has no parent directory")]
    MissingParent {
        /// Offending socket path.
        path: Utf8PathBuf,
    },
    /// The parent directory could not be created.
    #[error("failed to create socket directory '{path}': {source}")]
    CreateDirectory {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: io::Error,
    },
}
