//! Best-effort persistence front end used by the request path

use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use quanta_config::DatabaseConfig;

use crate::error::{StorageError, StorageResult};
use crate::seaorm::entities::{Artifact, ArtifactKind, Event, Session};
use crate::store::{NewArtifact, NewEvent, SeaOrmSessionStore, SessionStore};

/// Mint a fresh session identifier of the form `session_<unix seconds>_<8 hex>`
pub fn mint_session_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("session_{}_{}", chrono::Utc::now().timestamp(), &suffix[..8])
}

/// A client supplied identifier is kept verbatim; blank identifiers count as absent
pub fn normalize_session_id(requested: Option<&str>) -> Option<String> {
    requested
        .filter(|id| !id.trim().is_empty())
        .map(str::to_string)
}

/// Counters describing persistence health
#[derive(Debug, Clone, Default, Serialize)]
pub struct PersistenceStats {
    pub enabled: bool,
    pub sessions_ensured: u64,
    pub events_recorded: u64,
    pub artifacts_recorded: u64,
    pub failed_writes: u64,
    pub skipped_writes: u64,
}

#[derive(Default)]
struct Counters {
    sessions_ensured: AtomicU64,
    events_recorded: AtomicU64,
    artifacts_recorded: AtomicU64,
    failed_writes: AtomicU64,
    skipped_writes: AtomicU64,
}

/// Wraps a [`SessionStore`] so that storage failures are logged and counted
/// but never fail the tool call that triggered them.
#[derive(Clone)]
pub struct PersistenceManager {
    store: Option<Arc<dyn SessionStore>>,
    degraded: bool,
    counters: Arc<Counters>,
}

impl PersistenceManager {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store: Some(store),
            degraded: false,
            counters: Arc::new(Counters::default()),
        }
    }

    /// A manager that hands out session ids but records nothing
    pub fn disabled() -> Self {
        Self {
            store: None,
            degraded: false,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Like [`disabled`](Self::disabled), but every skipped write is logged
    /// because a store was wanted and could not be opened.
    pub fn degraded() -> Self {
        Self {
            degraded: true,
            ..Self::disabled()
        }
    }

    /// Open the configured store. An unreachable database degrades to a
    /// disabled manager instead of failing startup.
    pub async fn from_config(config: &DatabaseConfig) -> Self {
        if !config.enabled {
            info!("Session persistence disabled by configuration");
            return Self::disabled();
        }

        match SeaOrmSessionStore::connect(config.clone()).await {
            Ok(store) => {
                info!(url = %config.url, "Session store ready");
                Self::new(Arc::new(store))
            }
            Err(e) => {
                warn!(
                    url = %config.url,
                    error = %e,
                    "Session store unavailable, continuing without persistence"
                );
                Self::degraded()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Resolve the session for a call. A supplied id is returned unchanged
    /// and created on first sight; a missing or blank one is replaced by a
    /// freshly minted id. Never fails.
    pub async fn ensure_session(&self, requested: Option<&str>) -> String {
        let session_id = normalize_session_id(requested).unwrap_or_else(mint_session_id);

        if let Some(store) = &self.store {
            match store.ensure_session(&session_id).await {
                Ok(_) => {
                    self.counters.sessions_ensured.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => self.write_failed("ensure_session", &session_id, &e),
            }
        } else {
            self.write_skipped("ensure_session", &session_id);
        }

        session_id
    }

    /// Record a tool call. Returns the event id, or `None` when nothing was stored.
    pub async fn record_event(
        &self,
        session_id: &str,
        tool_name: &str,
        input: &JsonValue,
        output: &JsonValue,
    ) -> Option<i64> {
        let event = NewEvent::new(session_id, tool_name, input.clone(), output.clone());
        self.store_event(event).await
    }

    pub async fn record_artifact(
        &self,
        session_id: &str,
        kind: ArtifactKind,
        path: &str,
        metadata: JsonValue,
    ) -> Option<i64> {
        let artifact = NewArtifact::new(session_id, kind, path, metadata);
        self.store_artifact(artifact).await
    }

    pub(crate) async fn store_event(&self, event: NewEvent) -> Option<i64> {
        let Some(store) = self.store.as_ref() else {
            self.write_skipped("record_event", &event.session_id);
            return None;
        };
        let session_id = event.session_id.clone();

        match store.record_event(event).await {
            Ok(id) => {
                self.counters.events_recorded.fetch_add(1, Ordering::Relaxed);
                Some(id)
            }
            Err(e) => {
                self.write_failed("record_event", &session_id, &e);
                None
            }
        }
    }

    pub(crate) async fn store_artifact(&self, artifact: NewArtifact) -> Option<i64> {
        let Some(store) = self.store.as_ref() else {
            self.write_skipped("record_artifact", &artifact.session_id);
            return None;
        };
        let session_id = artifact.session_id.clone();

        match store.record_artifact(artifact).await {
            Ok(id) => {
                self.counters.artifacts_recorded.fetch_add(1, Ordering::Relaxed);
                Some(id)
            }
            Err(e) => {
                self.write_failed("record_artifact", &session_id, &e);
                None
            }
        }
    }

    pub async fn get_session(&self, session_id: &str) -> StorageResult<Option<Session>> {
        self.require_store()?.get_session(session_id).await
    }

    pub async fn get_session_events(&self, session_id: &str) -> StorageResult<Vec<Event>> {
        self.require_store()?.session_events(session_id).await
    }

    pub async fn get_session_artifacts(&self, session_id: &str) -> StorageResult<Vec<Artifact>> {
        self.require_store()?.session_artifacts(session_id).await
    }

    pub async fn recent_sessions(&self, limit: u64) -> StorageResult<Vec<Session>> {
        self.require_store()?.recent_sessions(limit).await
    }

    pub async fn health_check(&self) -> StorageResult<()> {
        self.require_store()?.health_check().await
    }

    pub fn stats(&self) -> PersistenceStats {
        PersistenceStats {
            enabled: self.is_enabled(),
            sessions_ensured: self.counters.sessions_ensured.load(Ordering::Relaxed),
            events_recorded: self.counters.events_recorded.load(Ordering::Relaxed),
            artifacts_recorded: self.counters.artifacts_recorded.load(Ordering::Relaxed),
            failed_writes: self.counters.failed_writes.load(Ordering::Relaxed),
            skipped_writes: self.counters.skipped_writes.load(Ordering::Relaxed),
        }
    }

    fn require_store(&self) -> StorageResult<&Arc<dyn SessionStore>> {
        self.store
            .as_ref()
            .ok_or_else(|| StorageError::Unavailable("persistence is disabled".to_string()))
    }

    fn write_skipped(&self, operation: &str, session_id: &str) {
        if self.degraded {
            self.counters.skipped_writes.fetch_add(1, Ordering::Relaxed);
            warn!(operation, session_id, "Session store unavailable, write skipped");
        }
    }

    /// A write that never reached the store because it could not be queued
    pub(crate) fn write_dropped(&self, operation: &str, session_id: &str, reason: &str) {
        self.counters.failed_writes.fetch_add(1, Ordering::Relaxed);
        warn!(operation, session_id, reason, "Persistence write dropped");
    }

    fn write_failed(&self, operation: &str, session_id: &str, error: &StorageError) {
        self.counters.failed_writes.fetch_add(1, Ordering::Relaxed);
        warn!(
            operation,
            session_id,
            error = %error,
            "Failed to persist session data"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minted_id_format() {
        let id = mint_session_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "session");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(mint_session_id(), mint_session_id());
    }

    #[test]
    fn test_normalize_session_id() {
        assert_eq!(normalize_session_id(Some("abc")), Some("abc".to_string()));
        assert_eq!(normalize_session_id(Some(" abc ")), Some(" abc ".to_string()));
        assert_eq!(normalize_session_id(Some("   ")), None);
        assert_eq!(normalize_session_id(Some("")), None);
        assert_eq!(normalize_session_id(None), None);
    }

    #[tokio::test]
    async fn test_disabled_manager_still_issues_ids() {
        let manager = PersistenceManager::disabled();
        assert!(!manager.is_enabled());

        let id = manager.ensure_session(Some("kept")).await;
        assert_eq!(id, "kept");
        assert!(manager.ensure_session(None).await.starts_with("session_"));

        let recorded = manager
            .record_event("kept", "compute", &serde_json::json!({}), &serde_json::json!({}))
            .await;
        assert!(recorded.is_none());
        assert!(matches!(
            manager.get_session_events("kept").await,
            Err(StorageError::Unavailable(_))
        ));
        assert_eq!(manager.stats().failed_writes, 0);
        assert_eq!(manager.stats().skipped_writes, 0);
    }

    #[tokio::test]
    async fn test_degraded_manager_counts_skipped_writes() {
        let manager = PersistenceManager::degraded();
        assert!(manager.is_degraded());

        let id = manager.ensure_session(None).await;
        manager
            .record_event(&id, "plot", &serde_json::json!({}), &serde_json::json!({}))
            .await;
        manager
            .record_artifact(&id, ArtifactKind::Image, "a.png", serde_json::json!({}))
            .await;

        assert_eq!(manager.stats().skipped_writes, 3);
    }
}
