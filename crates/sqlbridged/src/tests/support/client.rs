//! Minimal JSON Lines client used to drive the daemon socket.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpStream};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
#[cfg(unix)]
use std::path::Path;
use std::time::Duration;

use serde_json::{Value as JsonValue, json};

use sqlbridge_protocol::Response;

const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Blocking client that writes requests and reads one response per line.
pub struct JsonlClient<S: Read + Write> {
    stream: BufReader<S>,
}

impl JsonlClient<TcpStream> {
    pub fn connect_tcp(addr: SocketAddr) -> Result<Self, String> {
        let stream = TcpStream::connect(addr).map_err(|error| error.to_string())?;
        stream
            .set_read_timeout(Some(READ_TIMEOUT))
            .map_err(|error| error.to_string())?;
        Ok(Self::new(stream))
    }
}

#[cfg(unix)]
impl JsonlClient<UnixStream> {
    pub fn connect_unix(path: &Path) -> Result<Self, String> {
        let stream = UnixStream::connect(path).map_err(|error| error.to_string())?;
        stream
            .set_read_timeout(Some(READ_TIMEOUT))
            .map_err(|error| error.to_string())?;
        Ok(Self::new(stream))
    }
}

impl<S: Read + Write> JsonlClient<S> {
    fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
        }
    }

    /// Writes raw bytes to the socket.
    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<(), String> {
        let stream = self.stream.get_mut();
        stream.write_all(bytes).map_err(|error| error.to_string())?;
        stream.flush().map_err(|error| error.to_string())
    }

    /// Sends one request envelope without waiting for the reply.
    pub fn send(
        &mut self,
        id: JsonValue,
        command: &str,
        arguments: JsonValue,
    ) -> Result<(), String> {
        let request = json!({"id": id, "command": command, "arguments": arguments});
        self.send_raw(format!("{request}\n").as_bytes())
    }

    /// Reads the next response, or `None` once the daemon hung up.
    pub fn receive(&mut self) -> Result<Option<Response>, String> {
        let mut line = String::new();
        let read = self
            .stream
            .read_line(&mut line)
            .map_err(|error| error.to_string())?;
        if read == 0 {
            return Ok(None);
        }
        serde_json::from_str(&line)
            .map(Some)
            .map_err(|error| format!("invalid response line {line:?}: {error}"))
    }

    /// Sends a request and waits for its reply.
    pub fn request(
        &mut self,
        id: JsonValue,
        command: &str,
        arguments: JsonValue,
    ) -> Result<Response, String> {
        self.send(id, command, arguments)?;
        self.receive()?
            .ok_or_else(|| format!("connection closed before answering {command}"))
    }

    /// Sends a request and returns its result, failing on any other reply.
    pub fn call(
        &mut self,
        id: JsonValue,
        command: &str,
        arguments: JsonValue,
    ) -> Result<JsonValue, String> {
        match self.request(id, command, arguments)? {
            Response::Success { result, .. } => Ok(result),
            other => Err(format!("{command} did not succeed: {other:?}")),
        }
    }
}
