//! JSONL request dispatch for client sockets.
//!
//! Each connection gets a [`DispatchConnectionHandler`] loop that reads request
//! lines, decodes them into typed command calls, runs them on the worker pool,
//! and writes one response line per request back to the same socket.
//!
//! ## Protocol
//!
//! ```json
//! {"id":1,"command":"connect","arguments":{"url":"local"}}
//! {"kind":"success","id":1,"result":"5f0c2b7e-…"}
//! ```
//!
//! Lines that cannot be read as a request are answered with a `rejected`
//! response. Commands that ran and failed are answered with a `failure`
//! response carrying a closed error code. Several requests may be in flight
//! on one socket; responses carry the request `id` and may arrive in any
//! order, except that `ping` is answered before the next line is read.

mod errors;
mod handler;
mod request;
mod response;
mod router;

pub use self::errors::DispatchError;
pub(crate) use self::handler::DispatchConnectionHandler;
