//! Background write queue for session records
//!
//! Tool calls hand their events and artifacts to a bounded channel and return
//! immediately. A single drain task applies the writes in arrival order, so
//! events of one session keep the order in which their calls completed.

use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::manager::PersistenceManager;
use crate::seaorm::entities::ArtifactKind;
use crate::store::{NewArtifact, NewEvent};

/// Writes that may wait for the store before new ones are dropped
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

enum RecordCommand {
    Event(NewEvent),
    Artifact(NewArtifact),
    Flush(oneshot::Sender<()>),
}

/// Non-blocking front end to a [`PersistenceManager`].
///
/// Records are timestamped when they are queued, not when they are written.
/// A full queue drops the record and counts it as a failed write.
#[derive(Clone)]
pub struct BackgroundRecorder {
    manager: PersistenceManager,
    tx: mpsc::Sender<RecordCommand>,
}

impl BackgroundRecorder {
    /// Start the drain task. Must be called from within a tokio runtime.
    pub fn spawn(manager: PersistenceManager, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<RecordCommand>(capacity.max(1));
        let writer = manager.clone();

        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    RecordCommand::Event(event) => {
                        writer.store_event(event).await;
                    }
                    RecordCommand::Artifact(artifact) => {
                        writer.store_artifact(artifact).await;
                    }
                    RecordCommand::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            debug!("Persistence queue closed");
        });

        Self { manager, tx }
    }

    pub fn manager(&self) -> &PersistenceManager {
        &self.manager
    }

    /// Queue a tool call record
    pub fn record_event(&self, session_id: &str, tool_name: &str, input: &JsonValue, output: &JsonValue) {
        let event = NewEvent::new(session_id, tool_name, input.clone(), output.clone());
        self.enqueue("record_event", session_id, RecordCommand::Event(event));
    }

    /// Queue an artifact record
    pub fn record_artifact(&self, session_id: &str, kind: ArtifactKind, path: &str, metadata: JsonValue) {
        let artifact = NewArtifact::new(session_id, kind, path, metadata);
        self.enqueue("record_artifact", session_id, RecordCommand::Artifact(artifact));
    }

    /// Wait until every record queued before this call has been written
    pub async fn flush(&self) {
        let (done, written) = oneshot::channel();
        if self.tx.send(RecordCommand::Flush(done)).await.is_ok() {
            let _ = written.await;
        }
    }

    fn enqueue(&self, operation: &str, session_id: &str, command: RecordCommand) {
        match self.tx.try_send(command) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.manager.write_dropped(operation, session_id, "queue full");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.manager.write_dropped(operation, session_id, "queue closed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    use crate::error::StorageResult;
    use crate::seaorm::entities::{Artifact, Event, Session};
    use crate::store::{SeaOrmSessionStore, SessionStore};
    use crate::DatabaseConnection;

    async fn memory_store() -> SeaOrmSessionStore {
        let config = quanta_config::DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            ..Default::default()
        };
        SeaOrmSessionStore::new(DatabaseConnection::connect_and_migrate(config).await.unwrap())
    }

    /// Holds every event write until a permit is released
    struct GatedStore {
        inner: SeaOrmSessionStore,
        gate: Arc<Semaphore>,
        written: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SessionStore for GatedStore {
        async fn ensure_session(&self, id: &str) -> StorageResult<Session> {
            self.inner.ensure_session(id).await
        }

        async fn get_session(&self, id: &str) -> StorageResult<Option<Session>> {
            self.inner.get_session(id).await
        }

        async fn recent_sessions(&self, limit: u64) -> StorageResult<Vec<Session>> {
            self.inner.recent_sessions(limit).await
        }

        async fn record_event(&self, event: NewEvent) -> StorageResult<i64> {
            let _permit = self.gate.acquire().await.unwrap();
            self.written.lock().unwrap().push(event.tool_name.clone());
            self.inner.record_event(event).await
        }

        async fn record_artifact(&self, artifact: NewArtifact) -> StorageResult<i64> {
            self.inner.record_artifact(artifact).await
        }

        async fn session_events(&self, session_id: &str) -> StorageResult<Vec<Event>> {
            self.inner.session_events(session_id).await
        }

        async fn session_artifacts(&self, session_id: &str) -> StorageResult<Vec<Artifact>> {
            self.inner.session_artifacts(session_id).await
        }

        async fn health_check(&self) -> StorageResult<()> {
            self.inner.health_check().await
        }
    }

    #[tokio::test]
    async fn test_flush_writes_queued_records_in_order() {
        let manager = PersistenceManager::new(Arc::new(memory_store().await));
        let recorder = BackgroundRecorder::spawn(manager.clone(), DEFAULT_QUEUE_CAPACITY);
        let session = manager.ensure_session(Some("queued")).await;

        for name in ["compute", "plot", "units_convert"] {
            recorder.record_event(&session, name, &json!({}), &json!({"ok": true}));
        }
        recorder.record_artifact(&session, ArtifactKind::Csv, "queued/data.csv", json!({"size": 8}));
        recorder.flush().await;

        let names: Vec<String> = manager
            .get_session_events(&session)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.tool_name)
            .collect();
        assert_eq!(names, vec!["compute", "plot", "units_convert"]);
        assert_eq!(manager.get_session_artifacts(&session).await.unwrap().len(), 1);
        assert_eq!(manager.stats().events_recorded, 3);
    }

    #[tokio::test]
    async fn test_full_queue_drops_instead_of_waiting() {
        let gate = Arc::new(Semaphore::new(0));
        let store = Arc::new(GatedStore {
            inner: memory_store().await,
            gate: gate.clone(),
            written: Mutex::new(Vec::new()),
        });
        let manager = PersistenceManager::new(store.clone());
        let recorder = BackgroundRecorder::spawn(manager.clone(), 1);
        let session = manager.ensure_session(Some("busy")).await;

        // the drain task picks up the first write and blocks on the gate
        recorder.record_event(&session, "first", &json!({}), &json!({}));
        tokio::time::sleep(Duration::from_millis(50)).await;

        recorder.record_event(&session, "second", &json!({}), &json!({}));
        recorder.record_event(&session, "third", &json!({}), &json!({}));
        assert_eq!(manager.stats().failed_writes, 1);

        gate.add_permits(10);
        recorder.flush().await;
        assert_eq!(*store.written.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(manager.stats().events_recorded, 2);
    }

    #[tokio::test]
    async fn test_disabled_manager_accepts_records() {
        let recorder = BackgroundRecorder::spawn(PersistenceManager::disabled(), 4);
        recorder.record_event("s", "compute", &json!({}), &json!({}));
        recorder.flush().await;

        assert!(!recorder.manager().is_enabled());
        assert_eq!(recorder.manager().stats().failed_writes, 0);
    }
}
