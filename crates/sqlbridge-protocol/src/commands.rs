//! Command names, argument structs and result payloads.
//!
//! Field names follow the host-facing camelCase convention, so
//! `connection_id` is written `connectionId` and `last_insert_rowid` is
//! written `lastInsertRowid`.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::ids::ConnectionId;
use crate::value::{Value, WireValue};

/// The six commands a host can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Command {
    /// Liveness check that echoes its argument.
    Ping,
    /// Open a database and register a session.
    Connect,
    /// Run a statement that returns no rows.
    Execute,
    /// Run a statement and collect its rows.
    Query,
    /// Pull the primary's changes into a local replica.
    Sync,
    /// Close a session.
    Close,
}

/// Arguments of `ping`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingRequest {
    /// Text to echo back.
    #[serde(default)]
    pub value: Option<String>,
}

/// Result of `ping`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingResponse {
    /// The echoed text.
    pub value: Option<String>,
}

/// Arguments of `connect`, forwarded to the database driver untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectOptions {
    /// Database location.
    pub url: String,
    /// Credential for remote databases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    /// Local file backing the database or its replica.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
}

impl ConnectOptions {
    /// Options naming only a database URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: None,
            local_path: None,
        }
    }

    /// Sets the local file path.
    #[must_use]
    pub fn with_local_path(mut self, path: impl Into<String>) -> Self {
        self.local_path = Some(path.into());
        self
    }

    /// Sets the authentication token.
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}

/// Arguments of `execute`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteOptions {
    /// Target session.
    pub connection_id: ConnectionId,
    /// Statement text.
    pub sql: String,
    /// Positional parameters, still undecoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<WireValue>>,
}

/// Arguments of `query`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptions {
    /// Target session.
    pub connection_id: ConnectionId,
    /// Statement text.
    pub sql: String,
    /// Positional parameters, still undecoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<WireValue>>,
}

macro_rules! statement_options {
    ($name:ident) => {
        impl $name {
            /// Options for a statement without parameters.
            #[must_use]
            pub fn new(connection_id: ConnectionId, sql: impl Into<String>) -> Self {
                Self {
                    connection_id,
                    sql: sql.into(),
                    params: None,
                }
            }

            /// Attaches positional parameters.
            #[must_use]
            pub fn with_params(mut self, params: impl IntoIterator<Item = Value>) -> Self {
                self.params = Some(params.into_iter().map(WireValue::from).collect());
                self
            }
        }
    };
}

statement_options!(ExecuteOptions);
statement_options!(QueryOptions);

/// Arguments of `sync`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOptions {
    /// Target session.
    pub connection_id: ConnectionId,
}

/// Arguments of `close`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseOptions {
    /// Target session.
    pub connection_id: ConnectionId,
}

/// Result of `execute`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResult {
    /// Rows changed by the statement.
    pub rows_affected: u64,
    /// Row id of the last insert, when there was one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_insert_rowid: Option<i64>,
}

/// Result of `query`. Every row holds one value per column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names in statement order.
    pub columns: Vec<String>,
    /// Row cells.
    pub rows: Vec<Vec<Value>>,
}
