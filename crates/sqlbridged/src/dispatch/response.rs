//! Response framing for the dispatch loop.

use std::io::Write;

use sqlbridge_protocol::Response;

use super::errors::DispatchError;
use super::request::Rejection;

/// Writer that frames responses as JSONL.
///
/// Each response is serialized to a buffer first and then written with a
/// single `write_all`, so a serialization failure never leaves half a line on
/// the socket.
pub(crate) struct ResponseWriter<W> {
    writer: W,
}

impl<W: Write> ResponseWriter<W> {
    pub(crate) fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes one response line and flushes it to the peer.
    pub(crate) fn write_response(&mut self, response: &Response) -> Result<(), DispatchError> {
        let mut line = serde_json::to_vec(response).map_err(DispatchError::SerializeResponse)?;
        line.push(b'\n');
        self.writer.write_all(&line)?;
        self.writer.flush()?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> W {
        self.writer
    }
}

impl From<Rejection> for Response {
    fn from(rejection: Rejection) -> Self {
        Self::rejected(rejection.id, rejection.error.to_string())
    }
}
