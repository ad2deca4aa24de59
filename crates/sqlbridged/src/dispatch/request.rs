//! Request decoding for the dispatch loop.
//!
//! A line is decoded in stages so that the request `id` survives as many
//! failures as possible: first as plain JSON, then as the envelope, then the
//! command name, and finally the command's own arguments.

use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use sqlbridge_protocol::{
    CloseOptions, Command, ConnectOptions, ConnectionId, ExecuteOptions, PingRequest,
    QueryOptions, Request, SyncOptions,
};

use super::errors::DispatchError;

/// A fully decoded command with typed arguments.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CommandCall {
    Ping(PingRequest),
    Connect(ConnectOptions),
    Execute(ExecuteOptions),
    Query(QueryOptions),
    Sync(SyncOptions),
    Close(CloseOptions),
}

impl CommandCall {
    /// Decodes `arguments` for `command`. `ping` accepts missing arguments.
    pub(crate) fn decode(command: Command, arguments: JsonValue) -> Result<Self, DispatchError> {
        match command {
            Command::Ping if arguments.is_null() => Ok(Self::Ping(PingRequest::default())),
            Command::Ping => arguments_for(command, arguments).map(Self::Ping),
            Command::Connect => arguments_for(command, arguments).map(Self::Connect),
            Command::Execute => arguments_for(command, arguments).map(Self::Execute),
            Command::Query => arguments_for(command, arguments).map(Self::Query),
            Command::Sync => arguments_for(command, arguments).map(Self::Sync),
            Command::Close => arguments_for(command, arguments).map(Self::Close),
        }
    }

    /// The command this call runs.
    pub(crate) const fn command(&self) -> Command {
        match self {
            Self::Ping(_) => Command::Ping,
            Self::Connect(_) => Command::Connect,
            Self::Execute(_) => Command::Execute,
            Self::Query(_) => Command::Query,
            Self::Sync(_) => Command::Sync,
            Self::Close(_) => Command::Close,
        }
    }

    /// Session the call targets, if any.
    pub(crate) fn connection_id(&self) -> Option<&ConnectionId> {
        match self {
            Self::Ping(_) | Self::Connect(_) => None,
            Self::Execute(options) => Some(&options.connection_id),
            Self::Query(options) => Some(&options.connection_id),
            Self::Sync(options) => Some(&options.connection_id),
            Self::Close(options) => Some(&options.connection_id),
        }
    }
}

fn arguments_for<T: DeserializeOwned>(
    command: Command,
    arguments: JsonValue,
) -> Result<T, DispatchError> {
    serde_json::from_value(arguments)
        .map_err(|error| DispatchError::invalid_arguments(command.as_ref(), error.to_string()))
}

/// A request line that decoded into a runnable command.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct IncomingRequest {
    pub(crate) id: JsonValue,
    pub(crate) call: CommandCall,
}

/// A request line that cannot run, with whatever `id` could be recovered.
#[derive(Debug)]
pub(crate) struct Rejection {
    pub(crate) id: JsonValue,
    pub(crate) error: DispatchError,
}

impl Rejection {
    fn new(id: JsonValue, error: DispatchError) -> Self {
        Self { id, error }
    }
}

impl IncomingRequest {
    /// Decodes one JSONL line. Trailing whitespace, including the newline
    /// delimiter, is ignored.
    pub(crate) fn parse(line: &[u8]) -> Result<Self, Rejection> {
        let trimmed = trim_trailing_whitespace(line);
        if trimmed.is_empty() {
            return Err(Rejection::new(
                JsonValue::Null,
                DispatchError::malformed("empty request line"),
            ));
        }

        let value: JsonValue = serde_json::from_slice(trimmed)
            .map_err(|error| Rejection::new(JsonValue::Null, DispatchError::from_json_error(error)))?;
        let JsonValue::Object(fields) = &value else {
            return Err(Rejection::new(
                JsonValue::Null,
                DispatchError::invalid_structure("request must be a JSON object"),
            ));
        };
        let id = fields.get("id").cloned().unwrap_or(JsonValue::Null);

        let request: Request = serde_json::from_value(value).map_err(|error| {
            Rejection::new(id.clone(), DispatchError::invalid_structure(error.to_string()))
        })?;
        let name = request.command.trim();
        let command = Command::from_str(name)
            .map_err(|_| Rejection::new(id.clone(), DispatchError::unknown_command(name)))?;
        let call = CommandCall::decode(command, request.arguments)
            .map_err(|error| Rejection::new(id.clone(), error))?;

        Ok(Self { id, call })
    }
}

/// Whether a line holds nothing but whitespace.
pub(crate) fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}

fn trim_trailing_whitespace(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|byte| !byte.is_ascii_whitespace())
        .map_or(0, |pos| pos + 1);
    &bytes[..end]
}
