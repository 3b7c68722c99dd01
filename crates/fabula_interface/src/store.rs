//! Checkpoint store trait: idempotent phase artifact persistence.

use async_trait::async_trait;
use fabula_core::{PhaseName, RunId};
use fabula_error::FabulaResult;
use serde_json::Value as JsonValue;

/// A structured log entry appended after each phase.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LogEvent {
    /// Phase the event describes
    pub phase: PhaseName,
    /// Wall-clock duration of the phase in milliseconds
    pub duration_ms: u64,
    /// One-line summary of the produced artifact
    pub summary: String,
}

/// Key-value checkpoint store keyed by `(run_id, phase)`.
///
/// Contract backing the orchestrator's resume semantics:
/// - `put` is a last-writer-wins upsert; no run ever mutates another run's
///   artifacts because the run id is part of every key
/// - artifacts are only written after a phase fully completes, so a
///   cancelled run leaves either the previous artifact or nothing
/// - `log_event` is append-only
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Fetch the artifact for a phase, if one was persisted.
    async fn get(&self, run_id: RunId, phase: PhaseName) -> FabulaResult<Option<JsonValue>>;

    /// Upsert the artifact for a phase.
    async fn put(&self, run_id: RunId, phase: PhaseName, artifact: JsonValue) -> FabulaResult<()>;

    /// Append a structured log event for a run.
    async fn log_event(&self, run_id: RunId, event: LogEvent) -> FabulaResult<()>;
}
