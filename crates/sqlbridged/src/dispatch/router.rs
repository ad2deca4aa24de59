//! Runs decoded command calls and shapes their responses.

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::debug;

use sqlbridge_protocol::{CommandError, Response};

use crate::commands::CommandDispatcher;
use crate::database::DatabaseDriver;

use super::errors::DispatchError;
use super::request::CommandCall;

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Runs `call` and wraps its outcome in a response echoing `id`.
pub(crate) fn route<D: DatabaseDriver>(
    dispatcher: &CommandDispatcher<D>,
    id: JsonValue,
    call: CommandCall,
) -> Response {
    let command = call.command();
    debug!(
        target: DISPATCH_TARGET,
        %command,
        connection_id = call.connection_id().map(|id| id.as_str()),
        "dispatching command"
    );

    let outcome = match call {
        CommandCall::Ping(request) => payload(Ok(dispatcher.ping(request))),
        CommandCall::Connect(options) => payload(dispatcher.connect(&options)),
        CommandCall::Execute(options) => payload(dispatcher.execute(options)),
        CommandCall::Query(options) => payload(dispatcher.query(options)),
        CommandCall::Sync(options) => payload(dispatcher.sync(&options)),
        CommandCall::Close(options) => payload(dispatcher.close(&options)),
    };

    match outcome {
        Ok(Ok(result)) => Response::success(id, result),
        Ok(Err(error)) => {
            debug!(
                target: DISPATCH_TARGET,
                %command,
                code = %error.code,
                message = %error.message,
                "command failed"
            );
            Response::failure(id, error)
        }
        Err(error) => Response::rejected(id, error.to_string()),
    }
}

/// Serializes a command result. `()` becomes `null`.
fn payload<T: Serialize>(
    result: Result<T, CommandError>,
) -> Result<Result<JsonValue, CommandError>, DispatchError> {
    match result {
        Ok(value) => serde_json::to_value(value)
            .map(Ok)
            .map_err(DispatchError::SerializeResponse),
        Err(error) => Ok(Err(error)),
    }
}
