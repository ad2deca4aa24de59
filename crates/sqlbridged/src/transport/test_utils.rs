//! Test helpers for the transport module.

use std::io::{BufRead, BufReader, Write};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use super::{ConnectionHandler, ConnectionStream};

/// Counts connections and echoes the first line back to the client.
pub(crate) struct CountingHandler {
    count: Arc<AtomicUsize>,
}

impl CountingHandler {
    pub(crate) fn new() -> (Arc<AtomicUsize>, Arc<Self>) {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(Self {
            count: Arc::clone(&count),
        });
        (count, handler)
    }
}

impl ConnectionHandler for CountingHandler {
    fn handle(&self, stream: ConnectionStream) {
        self.count.fetch_add(1, Ordering::SeqCst);
        let Ok(mut writer) = stream.try_clone() else {
            return;
        };
        let mut line = Vec::new();
        if BufReader::new(stream).read_until(b'\n', &mut line).is_ok() && !line.is_empty() {
            let _ = writer.write_all(&line);
        }
    }
}
