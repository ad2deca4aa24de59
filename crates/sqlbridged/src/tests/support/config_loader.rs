//! Test configuration loaders for scenarios covering success and failure paths.

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use tempfile::TempDir;

use sqlbridge_config::{Config, SocketEndpoint};

use crate::bootstrap::ConfigLoader;

const TEST_WORKER_THREADS: usize = 2;

/// Loader that provisions a Unix socket path under a temporary directory.
#[derive(Clone)]
pub struct TestConfigLoader {
    runtime_dir: Arc<TempDir>,
}

impl TestConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temporary directory for socket");
        Self {
            runtime_dir: Arc::new(dir),
        }
    }

    /// Directory holding the socket and any scenario databases.
    pub fn runtime_dir(&self) -> PathBuf {
        self.runtime_dir.path().to_path_buf()
    }

    pub fn socket_path(&self) -> PathBuf {
        self.runtime_dir().join("sqlbridged.sock")
    }

    fn socket_text(&self) -> String {
        self.socket_path()
            .to_str()
            .expect("temporary socket path was not valid UTF-8")
            .to_owned()
    }
}

impl Default for TestConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(Config {
            daemon_socket: SocketEndpoint::unix(self.socket_text()),
            worker_threads: TEST_WORKER_THREADS,
            ..Config::default()
        })
    }
}

/// Loader that intentionally fails by passing invalid CLI arguments.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("sqlbridged"),
            OsString::from("--daemon-socket"),
            OsString::from("invalid://socket"),
        ];
        Config::load_from_iter(args)
    }
}
