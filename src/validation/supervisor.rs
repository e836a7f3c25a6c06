//! Starting and restarting a local TypeDB server process.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::sleep;

use super::engine::{EngineError, EngineRecovery};
use super::typedb_http::TypeDbHttpEngine;

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const RESTART_PAUSE: Duration = Duration::from_secs(1);

pub struct TypeDbServer {
    binary: PathBuf,
    startup_wait: Duration,
    health: Arc<TypeDbHttpEngine>,
    child: Mutex<Option<Child>>,
}

impl TypeDbServer {
    pub fn new(binary: impl Into<PathBuf>, startup_wait: Duration, health: Arc<TypeDbHttpEngine>) -> Self {
        TypeDbServer {
            binary: binary.into(),
            startup_wait,
            health,
            child: Mutex::new(None),
        }
    }

    /// Start the server unless one is already answering.
    pub async fn ensure_running(&self) -> Result<(), EngineError> {
        if self.health.ping().await {
            log::debug!("TypeDB already running");
            return Ok(());
        }
        self.start().await
    }

    pub async fn start(&self) -> Result<(), EngineError> {
        log::info!("Starting TypeDB server: {}", self.binary.display());
        let child = Command::new(&self.binary)
            .args(["server", "--development-mode.enabled=true"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                EngineError::Connectivity(format!(
                    "failed to start {}: {}",
                    self.binary.display(),
                    e
                ))
            })?;
        *self.child.lock().await = Some(child);
        self.wait_ready().await
    }

    async fn wait_ready(&self) -> Result<(), EngineError> {
        let started = Instant::now();
        while started.elapsed() < self.startup_wait {
            sleep(POLL_INTERVAL).await;
            if self.health.ping().await {
                log::info!("TypeDB ready after {:.1}s", started.elapsed().as_secs_f32());
                return Ok(());
            }
        }
        Err(EngineError::Connectivity(format!(
            "TypeDB not ready after {}s",
            self.startup_wait.as_secs()
        )))
    }

    /// Kill the child this supervisor started, if any.
    pub async fn stop(&self) {
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                log::warn!("Could not stop TypeDB cleanly: {}", e);
            }
        }
    }
}

#[async_trait]
impl EngineRecovery for TypeDbServer {
    async fn restart(&self) -> Result<(), EngineError> {
        log::warn!("Restarting TypeDB server");
        self.stop().await;
        sleep(RESTART_PAUSE).await;
        self.start().await
    }
}
