//! Socket transport for the daemon.
//!
//! The listener binds the configured endpoint and hands every accepted stream
//! to a [`ConnectionHandler`] on its own thread.

mod errors;
mod listener;
mod stream;
#[cfg(test)]
mod test_utils;

pub use self::errors::ListenerError;
#[cfg(test)]
pub(crate) use self::listener::ListenerHandle;
pub(crate) use self::listener::SocketListener;
pub(crate) use self::stream::{ConnectionHandler, ConnectionStream};
#[cfg(test)]
pub(crate) use self::test_utils::CountingHandler;

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
