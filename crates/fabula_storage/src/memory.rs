//! In-memory checkpoint store.

use async_trait::async_trait;
use fabula_core::{PhaseName, RunId};
use fabula_error::FabulaResult;
use fabula_interface::{CheckpointStore, LogEvent};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Checkpoint store backed by process memory.
///
/// Used by tests and by callers that embed the pipeline without durable
/// storage. Upserts are last-writer-wins per `(run_id, phase)`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    artifacts: Mutex<BTreeMap<(RunId, PhaseName), JsonValue>>,
    events: Mutex<Vec<(RunId, LogEvent)>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// All events logged for a run, in append order.
    pub fn events_for(&self, run_id: RunId) -> Vec<LogEvent> {
        self.events
            .lock()
            .expect("event lock poisoned")
            .iter()
            .filter(|(id, _)| *id == run_id)
            .map(|(_, e)| e.clone())
            .collect()
    }

    /// Number of persisted artifacts across all runs.
    pub fn artifact_count(&self) -> usize {
        self.artifacts.lock().expect("artifact lock poisoned").len()
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn get(&self, run_id: RunId, phase: PhaseName) -> FabulaResult<Option<JsonValue>> {
        let artifacts = self.artifacts.lock().expect("artifact lock poisoned");
        Ok(artifacts.get(&(run_id, phase)).cloned())
    }

    async fn put(&self, run_id: RunId, phase: PhaseName, artifact: JsonValue) -> FabulaResult<()> {
        let mut artifacts = self.artifacts.lock().expect("artifact lock poisoned");
        artifacts.insert((run_id, phase), artifact);
        Ok(())
    }

    async fn log_event(&self, run_id: RunId, event: LogEvent) -> FabulaResult<()> {
        let mut events = self.events.lock().expect("event lock poisoned");
        events.push((run_id, event));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_then_get_round_trip() {
        let store = MemoryStore::new();
        let run = RunId::generate();
        store
            .put(run, PhaseName::Blueprint, serde_json::json!({"scenes": 5}))
            .await
            .unwrap();

        let loaded = store.get(run, PhaseName::Blueprint).await.unwrap();
        assert_eq!(loaded, Some(serde_json::json!({"scenes": 5})));
        assert!(store.get(run, PhaseName::Cast).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_is_last_writer_wins() {
        let store = MemoryStore::new();
        let run = RunId::generate();
        store
            .put(run, PhaseName::Cast, serde_json::json!(1))
            .await
            .unwrap();
        store
            .put(run, PhaseName::Cast, serde_json::json!(2))
            .await
            .unwrap();
        assert_eq!(
            store.get(run, PhaseName::Cast).await.unwrap(),
            Some(serde_json::json!(2))
        );
    }

    #[tokio::test]
    async fn test_runs_are_isolated() {
        let store = MemoryStore::new();
        let a = RunId::generate();
        let b = RunId::generate();
        store
            .put(a, PhaseName::Cast, serde_json::json!("a"))
            .await
            .unwrap();
        assert!(store.get(b, PhaseName::Cast).await.unwrap().is_none());
    }
}
