//! Daemon that exposes SQLite and libsql sessions to hosts over JSON Lines.
//!
//! A host connects to the configured socket and sends one request per line.
//! `connect` opens a database and registers it under a fresh connection
//! identifier; `execute`, `query`, `sync` and `close` name that identifier;
//! `ping` checks liveness. Sessions belong to the daemon rather than to the
//! socket that opened them, so any client may use any identifier and a
//! session stays open until it is closed or the daemon shuts down.
//!
//! The moving parts, from the wire inwards:
//!
//! - `transport` accepts Unix or TCP connections and gives each its own
//!   thread.
//! - `dispatch` frames JSONL, decodes requests, and queues commands on a
//!   fixed worker pool.
//! - [`CommandDispatcher`] runs each command against the [`SessionRegistry`]
//!   and folds every outcome into a result or a closed error code.
//! - [`database`] defines the engine capability with a SQLite engine and a
//!   remote libsql engine, and [`codec`] translates between wire values and
//!   engine values.
//!
//! Lifecycle events are reported through a [`HealthReporter`]; the default
//! [`StructuredHealthReporter`] writes them as `tracing` events.

mod bootstrap;
pub mod codec;
mod commands;
pub mod database;
mod dispatch;
mod health;
mod pool;
mod process;
mod registry;
mod telemetry;
mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use commands::{CloseReport, CommandDispatcher};
pub use dispatch::DispatchError;
pub use health::{HealthReporter, StructuredHealthReporter};
pub use pool::PoolError;
pub use process::{LaunchError, ShutdownError, ShutdownSignal, SystemShutdownSignal, run_daemon};
pub use registry::{RegistryError, SessionRegistry};
pub use telemetry::{TelemetryError, TelemetryHandle, initialise as initialise_telemetry};
pub use transport::ListenerError;

#[cfg(test)]
mod tests;
