//! Connection handler that dispatches JSONL commands.
//!
//! The connection thread owns the read half of the socket and keeps reading
//! request lines until the peer hangs up. Every command except `ping` is
//! queued on the worker pool; workers write their response through a shared
//! writer guarded by a mutex, so lines from concurrent commands never
//! interleave. Sessions are owned by the dispatcher, not the connection, so a
//! client that disconnects leaves its sessions open.

use std::io::{BufRead, BufReader, Read};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

use sqlbridge_protocol::Response;

use crate::commands::CommandDispatcher;
use crate::database::DatabaseDriver;
use crate::pool::WorkerPool;
use crate::transport::{ConnectionHandler, ConnectionStream};

use super::errors::DispatchError;
use super::request::{CommandCall, IncomingRequest, is_blank};
use super::response::ResponseWriter;
use super::router::{DISPATCH_TARGET, route};

type SharedWriter = Arc<Mutex<ResponseWriter<ConnectionStream>>>;

/// Connection handler that parses and dispatches JSONL commands.
pub(crate) struct DispatchConnectionHandler<D> {
    dispatcher: Arc<CommandDispatcher<D>>,
    pool: Arc<WorkerPool>,
    max_request_bytes: usize,
}

impl<D> DispatchConnectionHandler<D>
where
    D: DatabaseDriver + 'static,
{
    pub(crate) fn new(
        dispatcher: Arc<CommandDispatcher<D>>,
        pool: Arc<WorkerPool>,
        max_request_bytes: usize,
    ) -> Self {
        Self {
            dispatcher,
            pool,
            max_request_bytes,
        }
    }

    fn serve(&self, stream: ConnectionStream) -> Result<(), DispatchError> {
        let writer: SharedWriter = Arc::new(Mutex::new(ResponseWriter::new(stream.try_clone()?)));
        let mut reader = BufReader::new(stream);

        loop {
            let line = match read_request_line(&mut reader, self.max_request_bytes) {
                Ok(Some(line)) => line,
                Ok(None) => return Ok(()),
                Err(error @ DispatchError::RequestTooLarge { .. }) => {
                    warn!(target: DISPATCH_TARGET, %error, "closing connection");
                    let response = Response::rejected(serde_json::Value::Null, error.to_string());
                    write_locked(&writer, &response)?;
                    reader.get_ref().shutdown()?;
                    return Ok(());
                }
                Err(error) => return Err(error),
            };
            if is_blank(&line) {
                continue;
            }

            match IncomingRequest::parse(&line) {
                Ok(IncomingRequest {
                    id,
                    call: CommandCall::Ping(request),
                }) => {
                    let response = route(&self.dispatcher, id, CommandCall::Ping(request));
                    write_locked(&writer, &response)?;
                }
                Ok(IncomingRequest { id, call }) => self.submit(id, call, &writer),
                Err(rejection) => {
                    debug!(target: DISPATCH_TARGET, error = %rejection.error, "request rejected");
                    write_locked(&writer, &Response::from(rejection))?;
                }
            }
        }
    }

    fn submit(&self, id: serde_json::Value, call: CommandCall, writer: &SharedWriter) {
        let dispatcher = Arc::clone(&self.dispatcher);
        let writer = Arc::clone(writer);
        self.pool.spawn(move || {
            let response = route(&dispatcher, id, call);
            if let Err(error) = write_locked(&writer, &response) {
                debug!(
                    target: DISPATCH_TARGET,
                    %error,
                    "dropping response for a departed client"
                );
            }
        });
    }
}

impl<D> ConnectionHandler for DispatchConnectionHandler<D>
where
    D: DatabaseDriver + 'static,
{
    fn handle(&self, stream: ConnectionStream) {
        debug!(target: DISPATCH_TARGET, "client connected");
        match self.serve(stream) {
            Ok(()) => debug!(target: DISPATCH_TARGET, "client disconnected"),
            Err(error) => debug!(target: DISPATCH_TARGET, %error, "client connection ended"),
        }
    }
}

fn write_locked(writer: &SharedWriter, response: &Response) -> Result<(), DispatchError> {
    writer
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .write_response(response)
}

/// Reads one request line of at most `limit` bytes, excluding the newline.
///
/// Returns `Ok(None)` at end of stream. A final line without a newline is
/// still returned.
fn read_request_line<R: Read>(
    reader: &mut BufReader<R>,
    limit: usize,
) -> Result<Option<Vec<u8>>, DispatchError> {
    let mut line = Vec::new();
    let allowance = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    let read = reader.by_ref().take(allowance).read_until(b'\n', &mut line)?;
    if read == 0 {
        return Ok(None);
    }
    if !line.ends_with(b"\n") && line.len() > limit {
        return Err(DispatchError::request_too_large(limit));
    }
    Ok(Some(line))
}
