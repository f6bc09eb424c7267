//! Launches the external prover for a stored witness

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{error, info, warn};

use crate::error::{Result, ServiceError};
use crate::request_id::RequestId;
use crate::store::JobStore;

/// How to invoke the prover binary
#[derive(Clone)]
pub struct ProverSettings {
    pub binary: PathBuf,
    pub system: String,
    pub network: String,
    pub private_key: String,
    pub log_level: String,
}

impl std::fmt::Debug for ProverSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProverSettings")
            .field("binary", &self.binary)
            .field("system", &self.system)
            .field("network", &self.network)
            .field("private_key", &"<redacted>")
            .field("log_level", &self.log_level)
            .finish()
    }
}

/// A started prover process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pub id: RequestId,
    pub pid: Option<u32>,
}

pub struct Dispatcher {
    settings: ProverSettings,
    store: JobStore,
}

impl Dispatcher {
    pub fn new(settings: ProverSettings, store: JobStore) -> Self {
        Self { settings, store }
    }

    /// Start the prover for `id` and return once it is running.
    ///
    /// The prover runs in the data directory so it can find `<id>.json`, and
    /// writes stdout and stderr to `<id>.log`. Credentials go through the
    /// environment only.
    pub fn dispatch(&self, id: &RequestId) -> Result<ProcessHandle> {
        let stdout = self.store.create_log(id)?;
        let stderr = stdout.try_clone().map_err(|e| {
            ServiceError::persistence(self.store.log_path(id).display().to_string(), e)
        })?;

        let id_hex = id.to_hex();
        let mut child = Command::new(&self.settings.binary)
            .arg("--system")
            .arg(&self.settings.system)
            .arg("--input-file-id")
            .arg(&id_hex)
            .current_dir(self.store.root())
            .env("SP1_PROVER", &self.settings.network)
            .env("SP1_PRIVATE_KEY", &self.settings.private_key)
            .env("RUST_LOG", &self.settings.log_level)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(|e| {
                ServiceError::Dispatch(format!("{}: {}", self.settings.binary.display(), e))
            })?;

        let pid = child.id();
        info!("Started prover for {} (pid {:?})", id, pid);

        // Reap the child; its outcome is only observable through the artifacts
        let job = id.to_hex();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => info!("Prover for {} exited", job),
                Ok(status) => warn!("Prover for {} exited with {}", job, status),
                Err(e) => error!("Failed to wait on prover for {}: {}", job, e),
            }
        });

        Ok(ProcessHandle { id: *id, pid })
    }
}
