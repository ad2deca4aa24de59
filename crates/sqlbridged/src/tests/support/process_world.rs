//! Process supervision test world shared across BDD scenarios.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde_json::json;

use crate::database::SqliteDriver;
use crate::health::HealthReporter;
use crate::process::LaunchError;
use crate::process::launch::{LaunchPlan, ProcessControl, ServiceDeps, run_daemon_with};
use crate::process::shutdown::{ShutdownError, ShutdownSignal};

use super::client::JsonlClient;
use super::config_loader::{FailingConfigLoader, TestConfigLoader};
use super::reporter::RecordingHealthReporter;

pub type StepResult = Result<(), String>;

pub struct ProcessWorld {
    loader: TestConfigLoader,
    pub reporter: Arc<RecordingHealthReporter>,
    client_error: Arc<Mutex<Option<String>>>,
    result: Option<Result<(), LaunchError>>,
}

impl ProcessWorld {
    pub fn new() -> Self {
        Self {
            loader: TestConfigLoader::new(),
            reporter: Arc::new(RecordingHealthReporter::default()),
            client_error: Arc::new(Mutex::new(None)),
            result: None,
        }
    }

    pub fn socket_path(&self) -> PathBuf {
        self.loader.socket_path()
    }

    /// Runs the daemon in the foreground; while it waits for shutdown a client
    /// opens `sessions` sessions and hangs up without closing them.
    pub fn run_with_client(&mut self, sessions: usize) -> StepResult {
        if self.result.is_some() {
            return Err("result already recorded".to_owned());
        }
        let shutdown = ScriptedShutdownSignal {
            socket: self.socket_path(),
            sessions,
            error: Arc::clone(&self.client_error),
        };
        let plan = LaunchPlan {
            process: ProcessControl { shutdown },
            services: ServiceDeps {
                loader: self.loader.clone(),
                reporter: self.reporter.clone() as Arc<dyn HealthReporter>,
                build_driver: SqliteDriver::from_config,
            },
        };
        self.result = Some(run_daemon_with(plan));
        Ok(())
    }

    pub fn run_with_invalid_config(&mut self) -> StepResult {
        if self.result.is_some() {
            return Err("result already recorded".to_owned());
        }
        let plan = LaunchPlan {
            process: ProcessControl {
                shutdown: ScriptedShutdownSignal {
                    socket: self.socket_path(),
                    sessions: 0,
                    error: Arc::clone(&self.client_error),
                },
            },
            services: ServiceDeps {
                loader: FailingConfigLoader,
                reporter: self.reporter.clone() as Arc<dyn HealthReporter>,
                build_driver: SqliteDriver::from_config,
            },
        };
        self.result = Some(run_daemon_with(plan));
        Ok(())
    }

    pub fn last_result(&self) -> Option<&Result<(), LaunchError>> {
        self.result.as_ref()
    }

    pub fn client_error(&self) -> Option<String> {
        self.client_error
            .lock()
            .expect("client error mutex poisoned")
            .clone()
    }
}

impl Default for ProcessWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Shutdown signal that plays a client session against the live socket and
/// then releases the daemon.
struct ScriptedShutdownSignal {
    socket: PathBuf,
    sessions: usize,
    error: Arc<Mutex<Option<String>>>,
}

impl ScriptedShutdownSignal {
    fn drive_client(&self) -> StepResult {
        let mut client = JsonlClient::connect_unix(&self.socket)?;
        client.call(json!(0), "ping", json!(null))?;
        for index in 0..self.sessions {
            let id = client.call(json!(index + 1), "connect", json!({"url": "local"}))?;
            if !id.is_string() {
                return Err(format!("connect returned {id}"));
            }
        }
        Ok(())
    }
}

impl ShutdownSignal for ScriptedShutdownSignal {
    fn wait(&self) -> Result<(), ShutdownError> {
        if let Err(error) = self.drive_client() {
            *self.error.lock().expect("client error mutex poisoned") = Some(error);
        }
        Ok(())
    }
}
