//! Fixed-size worker pool that runs commands off the connection threads.

use std::any::Any;

use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use thiserror::Error;
use tracing::error;

const POOL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::pool");

/// Errors raised while building the pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The worker threads could not be spawned.
    #[error("failed to start {threads} worker threads: {source}")]
    Build {
        /// Requested pool size.
        threads: usize,
        /// Underlying rayon error.
        #[source]
        source: ThreadPoolBuildError,
    },
}

/// Named worker threads shared by every client connection.
#[derive(Debug)]
pub(crate) struct WorkerPool {
    pool: ThreadPool,
}

impl WorkerPool {
    /// Spawns `threads` workers named `sqlbridged-worker-N`.
    ///
    /// A job that panics is logged and dropped; rayon would otherwise abort
    /// the process.
    pub(crate) fn new(threads: usize) -> Result<Self, PoolError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|index| format!("{}-worker-{index}", env!("CARGO_PKG_NAME")))
            .panic_handler(log_job_panic)
            .build()
            .map_err(|source| PoolError::Build { threads, source })?;
        Ok(Self { pool })
    }

    /// Queues a job; it runs on the first idle worker.
    pub(crate) fn spawn(&self, job: impl FnOnce() + Send + 'static) {
        self.pool.spawn(job);
    }

    #[cfg(test)]
    pub(crate) fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

fn log_job_panic(payload: Box<dyn Any + Send>) {
    let message = payload
        .downcast_ref::<&str>()
        .map(|text| (*text).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| String::from("non-text panic payload"));
    error!(target: POOL_TARGET, panic = %message, "worker job panicked");
}
