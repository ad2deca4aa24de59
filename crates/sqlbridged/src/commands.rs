//! The command dispatcher: one method per protocol command.
//!
//! Each method resolves sessions through the [`SessionRegistry`] before doing
//! any external work, calls the database capability, and folds every outcome
//! into either a payload or a [`CommandError`]. Registry failures always win
//! over parameter and engine failures, so a command naming a closed session
//! reports `ConnectionNotFound` even when its parameters are also invalid.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{info, warn};

use sqlbridge_protocol::{
    CloseOptions, Command, CommandError, ConnectOptions, ConnectionId, ExecuteOptions,
    ExecuteResult, PingRequest, PingResponse, QueryOptions, QueryResult, SyncOptions, Value,
};

use crate::codec;
use crate::database::{DatabaseDriver, DatabaseHandle, EngineError};
use crate::registry::SessionRegistry;

pub(crate) const COMMANDS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::commands");

/// Outcome of closing one session during shutdown.
pub type CloseReport = (ConnectionId, Result<(), CommandError>);

/// Runs protocol commands against sessions opened through a driver.
pub struct CommandDispatcher<D> {
    driver: D,
    sessions: SessionRegistry<dyn DatabaseHandle>,
}

impl<D> CommandDispatcher<D>
where
    D: DatabaseDriver,
{
    /// Creates a dispatcher with an empty session registry.
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            sessions: SessionRegistry::new(),
        }
    }

    /// Number of open sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Echoes the request value. Never touches a session.
    #[must_use]
    pub fn ping(&self, request: PingRequest) -> PingResponse {
        PingResponse {
            value: request.value,
        }
    }

    /// Opens a database and registers a new session for it.
    ///
    /// # Errors
    ///
    /// `ConnectFailed` when the driver cannot open the database;
    /// `DuplicateConnection` if the minted identifier is somehow taken.
    pub fn connect(&self, options: &ConnectOptions) -> Result<ConnectionId, CommandError> {
        let handle = guarded(|| self.driver.open(options))
            .map_err(|error| CommandError::connect_failed(error.to_string()))?;
        let handle: Arc<dyn DatabaseHandle> = Arc::from(handle);

        let id = self.sessions.create();
        if let Err(error) = self.sessions.insert(id.clone(), Arc::clone(&handle)) {
            if let Err(close_error) = handle.close() {
                warn!(
                    target: COMMANDS_TARGET,
                    error = %close_error,
                    "failed to release database after duplicate identifier"
                );
            }
            return Err(error.into());
        }

        info!(
            target: COMMANDS_TARGET,
            command = %Command::Connect,
            connection_id = %id,
            url = %options.url,
            "session opened"
        );
        Ok(id)
    }

    /// Runs a statement on a session.
    ///
    /// # Errors
    ///
    /// `ConnectionNotFound`, then `ValueTypeMismatch`, then `ExecuteFailed`.
    pub fn execute(&self, options: ExecuteOptions) -> Result<ExecuteResult, CommandError> {
        let ExecuteOptions {
            connection_id,
            sql,
            params,
        } = options;
        let handle = self.sessions.lookup(&connection_id)?;
        let params = codec::decode_params(Value::decode_list(params)?);

        guarded(|| handle.execute(&sql, params))
            .map_err(|error| failure(Command::Execute, &connection_id, error))
    }

    /// Runs a query on a session and encodes every cell.
    ///
    /// # Errors
    ///
    /// `ConnectionNotFound`, then `ValueTypeMismatch`, then `QueryFailed`.
    pub fn query(&self, options: QueryOptions) -> Result<QueryResult, CommandError> {
        let QueryOptions {
            connection_id,
            sql,
            params,
        } = options;
        let handle = self.sessions.lookup(&connection_id)?;
        let params = codec::decode_params(Value::decode_list(params)?);

        let rows = guarded(|| handle.query(&sql, params))
            .map_err(|error| failure(Command::Query, &connection_id, error))?;
        Ok(QueryResult {
            columns: rows.columns,
            rows: rows.rows.into_iter().map(codec::encode_row).collect(),
        })
    }

    /// Synchronises a session's replica with its primary.
    ///
    /// # Errors
    ///
    /// `ConnectionNotFound`, then `SyncFailed`.
    pub fn sync(&self, options: &SyncOptions) -> Result<(), CommandError> {
        let handle = self.sessions.lookup(&options.connection_id)?;
        guarded(|| handle.sync())
            .map_err(|error| failure(Command::Sync, &options.connection_id, error))
    }

    /// Removes a session and releases its database.
    ///
    /// The session is unregistered before the database is closed, so it stays
    /// gone even when closing fails, and exactly one of several concurrent
    /// closes succeeds.
    ///
    /// # Errors
    ///
    /// `ConnectionNotFound` when the session is already closed; `CloseFailed`
    /// when the database reports an error while closing.
    pub fn close(&self, options: &CloseOptions) -> Result<(), CommandError> {
        let id = &options.connection_id;
        let handle = self.sessions.remove(id)?;
        let closed = release(&handle);
        info!(
            target: COMMANDS_TARGET,
            command = %Command::Close,
            connection_id = %id,
            success = closed.is_ok(),
            "session closed"
        );
        closed.map_err(|error| CommandError::close_failed(error.to_string()))
    }

    /// Removes and closes every session. Used at shutdown.
    #[must_use]
    pub fn close_all(&self) -> Vec<CloseReport> {
        self.sessions
            .drain()
            .into_iter()
            .map(|(id, handle)| {
                let closed =
                    release(&handle).map_err(|error| CommandError::close_failed(error.to_string()));
                if let Err(error) = &closed {
                    warn!(
                        target: COMMANDS_TARGET,
                        connection_id = %id,
                        %error,
                        "failed to close session during shutdown"
                    );
                }
                (id, closed)
            })
            .collect()
    }
}

/// Closes a handle that has already left the registry. A handle that a racing
/// operation closed first counts as closed.
fn release(handle: &Arc<dyn DatabaseHandle>) -> Result<(), EngineError> {
    match guarded(|| handle.close()) {
        Err(EngineError::Closed) => Ok(()),
        other => other,
    }
}

/// Runs an engine call, turning a panic into [`EngineError::Panicked`].
fn guarded<T>(operation: impl FnOnce() -> Result<T, EngineError>) -> Result<T, EngineError> {
    panic::catch_unwind(AssertUnwindSafe(operation))
        .unwrap_or_else(|payload| Err(EngineError::panicked(payload.as_ref())))
}

/// Maps an engine failure to the command's failure code. A handle closed under
/// a racing command means the session is gone.
fn failure(command: Command, id: &ConnectionId, error: EngineError) -> CommandError {
    let message = error.to_string();
    match (command, error) {
        (_, EngineError::Closed) => CommandError::connection_not_found(id),
        (Command::Query, _) => CommandError::query_failed(message),
        (Command::Sync, _) => CommandError::sync_failed(message),
        (Command::Close, _) => CommandError::close_failed(message),
        (Command::Connect, _) => CommandError::connect_failed(message),
        (Command::Execute | Command::Ping, _) => CommandError::execute_failed(message),
    }
}
