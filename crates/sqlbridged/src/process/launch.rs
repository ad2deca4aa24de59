//! Supervises daemon launch sequencing and runtime orchestration.

use std::sync::Arc;

use tracing::info;

use sqlbridge_config::Config;

use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::database::{DatabaseDriver, EngineDriver};
use crate::dispatch::DispatchConnectionHandler;
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::pool::WorkerPool;
use crate::transport::SocketListener;

use super::errors::LaunchError;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};
use super::PROCESS_TARGET;

/// Process-level collaborators needed to control daemon lifecycle.
pub(crate) struct ProcessControl<S> {
    pub(crate) shutdown: S,
}

/// Service dependencies required to construct the daemon runtime.
pub(crate) struct ServiceDeps<L, F> {
    pub(crate) loader: L,
    pub(crate) reporter: Arc<dyn HealthReporter>,
    pub(crate) build_driver: F,
}

/// Collaborators required to launch the daemon runtime.
pub(crate) struct LaunchPlan<L, S, F> {
    pub(crate) process: ProcessControl<S>,
    pub(crate) services: ServiceDeps<L, F>,
}

/// Runs the daemon in the foreground until a termination signal arrives.
///
/// # Errors
///
/// Fails when bootstrap, the worker pool, the listener or the signal handler
/// cannot start.
pub fn run_daemon() -> Result<(), LaunchError> {
    let plan = LaunchPlan {
        process: ProcessControl {
            shutdown: SystemShutdownSignal::new(),
        },
        services: ServiceDeps {
            loader: SystemConfigLoader,
            reporter: Arc::new(StructuredHealthReporter::new()),
            build_driver: EngineDriver::from_config,
        },
    };
    run_daemon_with(plan)
}

/// Runs the daemon with injected collaborators.
///
/// Once the shutdown signal fires the listener stops accepting, and every
/// session still registered is closed before returning. Sessions are drained
/// even when waiting for the signal failed.
pub(crate) fn run_daemon_with<L, S, D, F>(plan: LaunchPlan<L, S, F>) -> Result<(), LaunchError>
where
    L: ConfigLoader,
    S: ShutdownSignal,
    D: DatabaseDriver + 'static,
    F: FnOnce(&Config) -> D,
{
    let LaunchPlan { process, services } = plan;
    let ProcessControl { shutdown } = process;
    let ServiceDeps {
        loader,
        reporter,
        build_driver,
    } = services;

    info!(target: PROCESS_TARGET, "starting daemon runtime");
    let daemon = bootstrap_with(&loader, reporter, build_driver)?;
    let config = daemon.config();
    let reporter = Arc::clone(daemon.reporter());
    let dispatcher = Arc::clone(daemon.dispatcher());

    let pool = Arc::new(WorkerPool::new(config.worker_threads())?);
    let listener = SocketListener::bind(config.daemon_socket())?;
    let endpoint = listener.endpoint();
    let handler = Arc::new(DispatchConnectionHandler::new(
        Arc::clone(&dispatcher),
        pool,
        config.max_request_bytes(),
    ));
    let listener_handle = listener.start(handler)?;
    reporter.listener_started(&endpoint);

    let waited = shutdown.wait();
    listener_handle.shutdown();
    let joined = listener_handle.join();
    reporter.listener_stopped();

    let reports = dispatcher.close_all();
    let failed = reports.iter().filter(|(_, result)| result.is_err()).count();
    reporter.sessions_drained(reports.len() - failed, failed);

    waited?;
    joined?;
    info!(target: PROCESS_TARGET, "shutdown sequence completed");
    Ok(())
}
