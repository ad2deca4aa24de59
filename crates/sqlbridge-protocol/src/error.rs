//! The closed set of command failures reported to hosts.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use thiserror::Error;

use crate::ids::ConnectionId;
use crate::value::ValueError;

/// Machine-readable failure category.
///
/// Serialized exactly as the variant name, for example `"ConnectionNotFound"`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum ErrorCode {
    /// The identifier names no open session.
    ConnectionNotFound,
    /// A freshly minted identifier was already bound.
    DuplicateConnection,
    /// The database could not be opened.
    ConnectFailed,
    /// A statement failed to execute.
    ExecuteFailed,
    /// A query failed to run.
    QueryFailed,
    /// Replica synchronisation failed.
    SyncFailed,
    /// Releasing the database failed; the session is gone regardless.
    CloseFailed,
    /// A parameter's payload did not match its tag.
    ValueTypeMismatch,
}

/// Failure outcome of a command: a code plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code}: {message}")]
pub struct CommandError {
    /// Failure category.
    pub code: ErrorCode,
    /// Description, carrying the engine's message for `*Failed` codes.
    pub message: String,
}

impl CommandError {
    /// Creates an error from its parts.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The identifier names no open session.
    #[must_use]
    pub fn connection_not_found(id: &ConnectionId) -> Self {
        Self::new(
            ErrorCode::ConnectionNotFound,
            format!("connection '{id}' not found"),
        )
    }

    /// The identifier is already bound to a session.
    #[must_use]
    pub fn duplicate_connection(id: &ConnectionId) -> Self {
        Self::new(
            ErrorCode::DuplicateConnection,
            format!("connection '{id}' already exists"),
        )
    }

    /// Opening the database failed.
    #[must_use]
    pub fn connect_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConnectFailed, message)
    }

    /// Executing a statement failed.
    #[must_use]
    pub fn execute_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ExecuteFailed, message)
    }

    /// Running a query failed.
    #[must_use]
    pub fn query_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::QueryFailed, message)
    }

    /// Synchronising a replica failed.
    #[must_use]
    pub fn sync_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SyncFailed, message)
    }

    /// Releasing the database failed.
    #[must_use]
    pub fn close_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::CloseFailed, message)
    }

    /// A parameter could not be decoded.
    #[must_use]
    pub fn value_type_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValueTypeMismatch, message)
    }
}

impl From<ValueError> for CommandError {
    fn from(error: ValueError) -> Self {
        Self::value_type_mismatch(error.to_string())
    }
}
