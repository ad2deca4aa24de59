//! Wire types shared by every sqlbridge host.
//!
//! Hosts exchange six commands with the daemon: `ping`, `connect`, `execute`,
//! `query`, `sync` and `close`. This crate defines their arguments and
//! results, the tagged [`Value`] model used for parameters and cells, the
//! closed [`ErrorCode`] taxonomy, and the JSON Lines envelopes that carry them.
//! Keeping these definitions in one crate gives every host byte-identical
//! payloads.

mod commands;
mod envelope;
mod error;
mod ids;
mod value;

pub use commands::{
    CloseOptions, Command, ConnectOptions, ExecuteOptions, ExecuteResult, PingRequest,
    PingResponse, QueryOptions, QueryResult, SyncOptions,
};
pub use envelope::{Request, Response};
pub use error::{CommandError, ErrorCode};
pub use ids::ConnectionId;
pub use value::{Value, ValueError, WireValue};
