//! JSON Lines request and response envelopes.
//!
//! Every request is one JSON object on one line:
//!
//! ```json
//! {"id":1,"command":"connect","arguments":{"url":"local"}}
//! ```
//!
//! and is answered by exactly one response line carrying the same `id`:
//!
//! ```json
//! {"kind":"success","id":1,"result":"5f0c2b7e-…"}
//! {"kind":"failure","id":2,"error":{"code":"ConnectionNotFound","message":"…"}}
//! {"kind":"rejected","id":null,"reason":"malformed JSONL: …"}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::CommandError;

/// A command request as sent by a host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation token echoed in the response; any JSON value.
    #[serde(default)]
    pub id: JsonValue,
    /// Command name, matched case-insensitively.
    pub command: String,
    /// Command arguments; may be omitted for `ping`.
    #[serde(default)]
    pub arguments: JsonValue,
}

impl Request {
    /// Builds a request with serialized arguments.
    ///
    /// # Errors
    ///
    /// Returns an error when the arguments cannot be represented as JSON.
    pub fn new<A: Serialize>(
        id: impl Into<JsonValue>,
        command: impl Into<String>,
        arguments: &A,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: id.into(),
            command: command.into(),
            arguments: serde_json::to_value(arguments)?,
        })
    }
}

/// The single reply to a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Response {
    /// The command succeeded.
    Success {
        /// Echoed request id.
        id: JsonValue,
        /// Command result; `null` for `sync` and `close`.
        result: JsonValue,
    },
    /// The command ran and failed.
    Failure {
        /// Echoed request id.
        id: JsonValue,
        /// Failure details.
        error: CommandError,
    },
    /// The request never reached a command: it was malformed, named an
    /// unknown command, carried invalid arguments, or was too large.
    Rejected {
        /// Echoed request id, `null` when it could not be read.
        id: JsonValue,
        /// Human-readable explanation.
        reason: String,
    },
}

impl Response {
    /// Successful reply carrying `result`.
    #[must_use]
    pub fn success(id: JsonValue, result: JsonValue) -> Self {
        Self::Success { id, result }
    }

    /// Failed reply carrying `error`.
    #[must_use]
    pub fn failure(id: JsonValue, error: CommandError) -> Self {
        Self::Failure { id, error }
    }

    /// Rejection explaining why the request was not run.
    #[must_use]
    pub fn rejected(id: JsonValue, reason: impl Into<String>) -> Self {
        Self::Rejected {
            id,
            reason: reason.into(),
        }
    }

    /// The echoed request id.
    #[must_use]
    pub fn id(&self) -> &JsonValue {
        match self {
            Self::Success { id, .. } | Self::Failure { id, .. } | Self::Rejected { id, .. } => id,
        }
    }
}
