//! Structured health reporting for daemon lifecycle events.

use std::sync::Arc;

use sqlbridge_config::{Config, SocketEndpoint};

use crate::bootstrap::BootstrapError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked once the listener accepts connections on `endpoint`.
    fn listener_started(&self, endpoint: &SocketEndpoint);

    /// Invoked after the listener stops accepting connections.
    fn listener_stopped(&self);

    /// Invoked after shutdown has closed every remaining session.
    fn sessions_drained(&self, closed: usize, failed: usize);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn listener_started(&self, endpoint: &SocketEndpoint) {
        (**self).listener_started(endpoint);
    }

    fn listener_stopped(&self) {
        (**self).listener_stopped();
    }

    fn sessions_drained(&self, closed: usize, failed: usize) {
        (**self).sessions_drained(closed, failed);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting daemon bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            socket = %config.daemon_socket(),
            log_filter = %config.log_filter(),
            log_format = %config.log_format(),
            worker_threads = config.worker_threads(),
            "daemon bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "daemon bootstrap failed"
        );
    }

    fn listener_started(&self, endpoint: &SocketEndpoint) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "listener_started",
            socket = %endpoint,
            "accepting connections"
        );
    }

    fn listener_stopped(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "listener_stopped",
            "stopped accepting connections"
        );
    }

    fn sessions_drained(&self, closed: usize, failed: usize) {
        if failed == 0 {
            tracing::info!(
                target: HEALTH_TARGET,
                event = "sessions_drained",
                closed,
                failed,
                "closed remaining sessions"
            );
        } else {
            tracing::warn!(
                target: HEALTH_TARGET,
                event = "sessions_drained",
                closed,
                failed,
                "some sessions failed to close cleanly"
            );
        }
    }
}
