//! Waiting for the operator to stop the daemon.

use std::ffi::c_int;
use std::io;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use signal_hook::low_level::signal_name;
use thiserror::Error;
use tracing::info;

use super::PROCESS_TARGET;

const TERMINATION_SIGNALS: [c_int; 4] = [SIGTERM, SIGINT, SIGQUIT, SIGHUP];

/// Source of the "time to stop" notification.
pub trait ShutdownSignal: Send + Sync {
    /// Blocks until the daemon should begin shutting down.
    ///
    /// # Errors
    ///
    /// Fails when the notification source cannot be set up.
    fn wait(&self) -> Result<(), ShutdownError>;
}

/// Errors reported while waiting for shutdown.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Signal handlers could not be registered.
    #[error("cannot register termination signal handlers: {source}")]
    Install {
        /// Registration error.
        #[source]
        source: io::Error,
    },
}

/// Waits for SIGTERM, SIGINT, SIGQUIT or SIGHUP.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemShutdownSignal;

impl SystemShutdownSignal {
    /// Builds the process signal listener.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&self) -> Result<(), ShutdownError> {
        let mut signals =
            Signals::new(TERMINATION_SIGNALS).map_err(|source| ShutdownError::Install { source })?;
        if let Some(signal) = signals.forever().next() {
            info!(
                target: PROCESS_TARGET,
                signal = signal_name(signal).unwrap_or("unknown"),
                "termination signal received, draining sessions"
            );
        }
        Ok(())
    }
}
