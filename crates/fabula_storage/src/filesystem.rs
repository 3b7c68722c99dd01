//! Filesystem-backed checkpoint store.

use async_trait::async_trait;
use fabula_core::{PhaseName, RunId};
use fabula_error::{FabulaResult, StorageError, StorageErrorKind};
use fabula_interface::{CheckpointStore, LogEvent};
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Checkpoint store persisting one JSON file per `(run_id, phase)`.
///
/// Layout under the store root:
///
/// ```text
/// <root>/<run_id>/<phase>.json
/// <root>/<run_id>/events.jsonl
/// ```
///
/// Artifact writes go to a temp file first and are renamed into place, so a
/// run cancelled mid-write leaves either the previous artifact or nothing.
#[derive(Debug, Clone)]
pub struct FilesystemStore {
    root: PathBuf,
}

impl FilesystemStore {
    /// Create a store rooted at the given directory, creating it if needed.
    pub fn new(root: impl AsRef<Path>) -> FabulaResult<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.exists() {
            std::fs::create_dir_all(&root).map_err(|e| {
                StorageError::new(StorageErrorKind::InitFailed(format!(
                    "{}: {}",
                    root.display(),
                    e
                )))
            })?;
        }
        debug!(path = %root.display(), "Initialized filesystem checkpoint store");
        Ok(Self { root })
    }

    fn run_dir(&self, run_id: RunId) -> PathBuf {
        self.root.join(run_id.to_string())
    }

    fn artifact_path(&self, run_id: RunId, phase: PhaseName) -> PathBuf {
        let phase_name: &'static str = phase.into();
        self.run_dir(run_id).join(format!("{phase_name}.json"))
    }

    fn ensure_run_dir(&self, run_id: RunId) -> Result<PathBuf, StorageError> {
        let dir = self.run_dir(run_id);
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| {
                StorageError::new(StorageErrorKind::InitFailed(format!(
                    "{}: {}",
                    dir.display(),
                    e
                )))
            })?;
        }
        Ok(dir)
    }
}

#[async_trait]
impl CheckpointStore for FilesystemStore {
    async fn get(&self, run_id: RunId, phase: PhaseName) -> FabulaResult<Option<JsonValue>> {
        let path = self.artifact_path(run_id, phase);
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path).map_err(|e| {
            StorageError::new(StorageErrorKind::ReadFailed {
                run_id: run_id.to_string(),
                phase: phase.to_string(),
                message: e.to_string(),
            })
        })?;

        let artifact = serde_json::from_str(&contents).map_err(|e| {
            StorageError::new(StorageErrorKind::ReadFailed {
                run_id: run_id.to_string(),
                phase: phase.to_string(),
                message: format!("corrupt artifact: {e}"),
            })
        })?;

        debug!(run = %run_id, phase = %phase, "Loaded checkpoint artifact");
        Ok(Some(artifact))
    }

    async fn put(&self, run_id: RunId, phase: PhaseName, artifact: JsonValue) -> FabulaResult<()> {
        let dir = self.ensure_run_dir(run_id)?;
        let path = self.artifact_path(run_id, phase);
        let tmp = dir.join(format!(".{phase}.json.tmp"));

        let write_err = |e: std::io::Error| {
            StorageError::new(StorageErrorKind::WriteFailed {
                run_id: run_id.to_string(),
                phase: phase.to_string(),
                message: e.to_string(),
            })
        };

        let contents = serde_json::to_string_pretty(&artifact).map_err(|e| {
            StorageError::new(StorageErrorKind::WriteFailed {
                run_id: run_id.to_string(),
                phase: phase.to_string(),
                message: e.to_string(),
            })
        })?;

        std::fs::write(&tmp, contents).map_err(write_err)?;
        std::fs::rename(&tmp, &path).map_err(write_err)?;

        debug!(run = %run_id, phase = %phase, "Persisted checkpoint artifact");
        Ok(())
    }

    async fn log_event(&self, run_id: RunId, event: LogEvent) -> FabulaResult<()> {
        use std::io::Write;

        let dir = self.ensure_run_dir(run_id)?;
        let path = dir.join("events.jsonl");

        let line = serde_json::to_string(&event)
            .map_err(|e| StorageError::new(StorageErrorKind::LogFailed(e.to_string())))?;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StorageError::new(StorageErrorKind::LogFailed(e.to_string())))?;
        writeln!(file, "{line}")
            .map_err(|e| StorageError::new(StorageErrorKind::LogFailed(e.to_string())))?;

        Ok(())
    }
}
