//! Filesystem-backed job store
//!
//! Every job is a set of files in the data directory, all named after the
//! request id:
//!
//! - `<id>.json`: witness, written once on submission
//! - `<id>-fixture.json`: result, written by the prover on completion
//! - `<id>.log`: combined prover output
//!
//! Job state is inferred from which of these exist.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tracing::debug;

use crate::error::{Result, ServiceError};
use crate::request_id::RequestId;
use crate::types::{ProofResult, Witness};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactState {
    Unknown,
    Processing,
    Completed,
}

#[derive(Debug, Clone)]
pub struct JobStore {
    root: PathBuf,
}

impl JobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the data directory if needed
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| ServiceError::persistence(self.root.display().to_string(), e))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn witness_path(&self, id: &RequestId) -> PathBuf {
        self.root.join(format!("{}.json", id))
    }

    pub fn result_path(&self, id: &RequestId) -> PathBuf {
        self.root.join(format!("{}-fixture.json", id))
    }

    pub fn log_path(&self, id: &RequestId) -> PathBuf {
        self.root.join(format!("{}.log", id))
    }

    /// Persist the witness for `id`. Fails with `Duplicate` if one exists.
    ///
    /// The witness is written to a private temp file and then hard-linked into
    /// place, so the existence check and the write are a single atomic step and
    /// readers never see a partial file.
    pub async fn put_witness(&self, id: &RequestId, witness: &Witness) -> Result<()> {
        let target = self.witness_path(id);
        let temp = self.write_temp(id, "witness", witness).await?;

        let linked = fs::hard_link(&temp, &target).await;
        let _ = fs::remove_file(&temp).await;

        match linked {
            Ok(()) => {
                debug!("Stored witness {}", target.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(ServiceError::Duplicate { id: id.to_string() })
            }
            Err(e) => Err(ServiceError::persistence(target.display().to_string(), e)),
        }
    }

    /// Drop the witness for a job that never started
    pub async fn remove_witness(&self, id: &RequestId) -> Result<()> {
        let path = self.witness_path(id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ServiceError::persistence(path.display().to_string(), e)),
        }
    }

    /// Persist the result for `id`, replacing any previous one
    pub async fn put_result(&self, id: &RequestId, result: &ProofResult) -> Result<()> {
        let target = self.result_path(id);
        let temp = self.write_temp(id, "result", result).await?;

        if let Err(e) = fs::rename(&temp, &target).await {
            let _ = fs::remove_file(&temp).await;
            return Err(ServiceError::persistence(target.display().to_string(), e));
        }
        Ok(())
    }

    /// Create (or truncate) the log file for `id`
    pub fn create_log(&self, id: &RequestId) -> Result<std::fs::File> {
        let path = self.log_path(id);
        std::fs::File::create(&path)
            .map_err(|e| ServiceError::persistence(path.display().to_string(), e))
    }

    /// True if a witness or result exists for `id`
    pub async fn has_artifacts(&self, id: &RequestId) -> bool {
        self.artifact_state(id).await != ArtifactState::Unknown
    }

    pub async fn artifact_state(&self, id: &RequestId) -> ArtifactState {
        if exists(&self.result_path(id)).await {
            ArtifactState::Completed
        } else if exists(&self.witness_path(id)).await {
            ArtifactState::Processing
        } else {
            ArtifactState::Unknown
        }
    }

    pub async fn read_witness(&self, id: &RequestId) -> Result<Witness> {
        read_json(&self.witness_path(id), "witness").await
    }

    pub async fn read_result(&self, id: &RequestId) -> Result<ProofResult> {
        read_json(&self.result_path(id), "result").await
    }

    pub async fn read_log(&self, id: &RequestId) -> Result<Vec<u8>> {
        let path = self.log_path(id);
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(ServiceError::NotFound(format!("log for {}", id)))
            }
            Err(e) => Err(ServiceError::persistence(path.display().to_string(), e)),
        }
    }

    async fn write_temp<T: Serialize>(&self, id: &RequestId, kind: &str, value: &T) -> Result<PathBuf> {
        let bytes = serde_json::to_vec(value)?;
        let temp = self.root.join(format!(
            ".{}.{}.{}-{}.tmp",
            id,
            kind,
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        fs::write(&temp, &bytes)
            .await
            .map_err(|e| ServiceError::persistence(temp.display().to_string(), e))?;
        Ok(temp)
    }
}

async fn exists(path: &Path) -> bool {
    fs::metadata(path).await.is_ok()
}

async fn read_json<T: DeserializeOwned>(path: &Path, artifact: &str) -> Result<T> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ServiceError::NotFound(format!("{} {}", artifact, path.display())))
        }
        Err(e) => return Err(ServiceError::persistence(path.display().to_string(), e)),
    };
    Ok(serde_json::from_slice(&bytes)?)
}
