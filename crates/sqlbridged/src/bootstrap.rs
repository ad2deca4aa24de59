//! Daemon bootstrap orchestration.

use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;

use sqlbridge_config::{Config, SocketPreparationError};

use crate::commands::CommandDispatcher;
use crate::database::DatabaseDriver;
use crate::health::HealthReporter;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    ///
    /// # Errors
    ///
    /// Returns the layered loader's error when any source is invalid.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader that hands out a configuration resolved earlier.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps an already resolved configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// Socket preparation failed.
    #[error("failed to prepare daemon socket: {source}")]
    Socket {
        /// Filesystem error reported while preparing the socket directory.
        #[source]
        source: SocketPreparationError,
    },
}

/// Result of a successful bootstrap invocation.
pub struct Daemon<D> {
    config: Config,
    dispatcher: Arc<CommandDispatcher<D>>,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
}

impl<D> Daemon<D> {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// The dispatcher that owns every session.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<CommandDispatcher<D>> {
        &self.dispatcher
    }

    /// The reporter that receives lifecycle events.
    #[must_use]
    pub fn reporter(&self) -> &Arc<dyn HealthReporter> {
        &self.reporter
    }
}

/// Bootstraps the daemon using the supplied collaborators.
///
/// Loads configuration, installs telemetry, prepares the socket directory and
/// finally builds the database driver from the resolved configuration.
///
/// # Errors
///
/// Returns the first stage that failed; the reporter sees the same error.
pub fn bootstrap_with<D, F>(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    build_driver: F,
) -> Result<Daemon<D>, BootstrapError>
where
    D: DatabaseDriver,
    F: FnOnce(&Config) -> D,
{
    reporter.bootstrap_starting();

    let config = match loader.load() {
        Ok(config) => config,
        Err(source) => {
            let error = BootstrapError::Configuration { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let telemetry = match telemetry::initialise(&config) {
        Ok(handle) => handle,
        Err(source) => {
            let error = BootstrapError::Telemetry { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    if let Err(source) = config.daemon_socket().prepare_filesystem() {
        let error = BootstrapError::Socket { source };
        reporter.bootstrap_failed(&error);
        return Err(error);
    }

    let dispatcher = Arc::new(CommandDispatcher::new(build_driver(&config)));
    reporter.bootstrap_succeeded(&config);

    Ok(Daemon {
        config,
        dispatcher,
        telemetry,
        reporter,
    })
}
