//! Error types for request dispatch failures.
//!
//! These cover faults in the request itself, before any command runs. Each is
//! reported to the client as a `rejected` response.

use std::io;

use thiserror::Error;

/// Errors surfaced while reading, decoding or answering a request line.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Request line could not be parsed as JSON.
    #[error("malformed JSONL: {message}")]
    MalformedJsonl {
        /// Parser message.
        message: String,
        /// Underlying parser error, when there was one.
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Request JSON does not match the envelope schema.
    #[error("invalid request structure: {message}")]
    InvalidStructure {
        /// What was wrong with the envelope.
        message: String,
    },

    /// The command field names no known command.
    #[error("unknown command: {command}")]
    UnknownCommand {
        /// Command name as received.
        command: String,
    },

    /// The arguments do not fit the named command.
    #[error("invalid arguments for {command}: {message}")]
    InvalidArguments {
        /// Command whose arguments were rejected.
        command: String,
        /// Decoder message.
        message: String,
    },

    /// Request line exceeds the configured limit.
    #[error("request too large: exceeds {max_size} byte limit")]
    RequestTooLarge {
        /// Configured limit in bytes.
        max_size: usize,
    },

    /// IO error while reading or writing the socket.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Response serialization failed.
    #[error("failed to serialize response: {0}")]
    SerializeResponse(#[source] serde_json::Error),
}

impl DispatchError {
    /// Creates a malformed JSONL error from a serde error.
    pub fn from_json_error(source: serde_json::Error) -> Self {
        Self::MalformedJsonl {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Creates a malformed JSONL error with a custom message.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedJsonl {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Creates an unknown command error.
    pub fn unknown_command(command: impl Into<String>) -> Self {
        Self::UnknownCommand {
            command: command.into(),
        }
    }

    /// Creates an invalid arguments error.
    pub fn invalid_arguments(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Creates a request too large error.
    pub fn request_too_large(max_size: usize) -> Self {
        Self::RequestTooLarge { max_size }
    }
}
