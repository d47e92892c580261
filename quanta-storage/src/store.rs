//! Session store abstraction

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use crate::error::StorageResult;
use crate::seaorm::connection::DatabaseConnection;
use crate::seaorm::entities::{Artifact, ArtifactKind, Event, Session};
use crate::seaorm::repositories::{
    SeaOrmArtifactRepository, SeaOrmEventRepository, SeaOrmSessionRepository,
};

/// An event about to be recorded
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub tool_name: String,
    pub input: JsonValue,
    pub output: JsonValue,
}

impl NewEvent {
    pub fn new(
        session_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: JsonValue,
        output: JsonValue,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            timestamp: Utc::now(),
            tool_name: tool_name.into(),
            input,
            output,
        }
    }
}

/// An artifact about to be recorded
#[derive(Debug, Clone)]
pub struct NewArtifact {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: ArtifactKind,
    pub path: String,
    pub metadata: JsonValue,
}

impl NewArtifact {
    pub fn new(
        session_id: impl Into<String>,
        kind: ArtifactKind,
        path: impl Into<String>,
        metadata: JsonValue,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            timestamp: Utc::now(),
            kind,
            path: path.into(),
            metadata,
        }
    }
}

/// Durable record of sessions, their events, and their artifacts
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create the session if it does not exist. Existing sessions are left untouched.
    async fn ensure_session(&self, id: &str) -> StorageResult<Session>;

    async fn get_session(&self, id: &str) -> StorageResult<Option<Session>>;

    async fn recent_sessions(&self, limit: u64) -> StorageResult<Vec<Session>>;

    async fn record_event(&self, event: NewEvent) -> StorageResult<i64>;

    async fn record_artifact(&self, artifact: NewArtifact) -> StorageResult<i64>;

    /// Events ordered by timestamp ascending
    async fn session_events(&self, session_id: &str) -> StorageResult<Vec<Event>>;

    /// Artifacts ordered by timestamp ascending
    async fn session_artifacts(&self, session_id: &str) -> StorageResult<Vec<Artifact>>;

    async fn health_check(&self) -> StorageResult<()>;
}

/// SQLite-backed session store
#[derive(Clone)]
pub struct SeaOrmSessionStore {
    sessions: SeaOrmSessionRepository,
    events: SeaOrmEventRepository,
    artifacts: SeaOrmArtifactRepository,
}

impl SeaOrmSessionStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            sessions: SeaOrmSessionRepository::new(db.clone()),
            events: SeaOrmEventRepository::new(db.clone()),
            artifacts: SeaOrmArtifactRepository::new(db),
        }
    }

    /// Connect to the configured database and run migrations
    pub async fn connect(config: quanta_config::DatabaseConfig) -> StorageResult<Self> {
        let db = DatabaseConnection::connect_and_migrate(config).await?;
        Ok(Self::new(db))
    }
}

#[async_trait]
impl SessionStore for SeaOrmSessionStore {
    async fn ensure_session(&self, id: &str) -> StorageResult<Session> {
        let (session, created) = self.sessions.ensure(id).await?;
        if created {
            tracing::debug!(session_id = %id, "Created session");
        }
        Ok(session)
    }

    async fn get_session(&self, id: &str) -> StorageResult<Option<Session>> {
        self.sessions.find_by_id(id).await
    }

    async fn recent_sessions(&self, limit: u64) -> StorageResult<Vec<Session>> {
        self.sessions.find_recent(limit).await
    }

    async fn record_event(&self, event: NewEvent) -> StorageResult<i64> {
        self.events.create(&event).await
    }

    async fn record_artifact(&self, artifact: NewArtifact) -> StorageResult<i64> {
        self.artifacts.create(&artifact).await
    }

    async fn session_events(&self, session_id: &str) -> StorageResult<Vec<Event>> {
        self.events.find_by_session(session_id).await
    }

    async fn session_artifacts(&self, session_id: &str) -> StorageResult<Vec<Artifact>> {
        self.artifacts.find_by_session(session_id).await
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.sessions.health_check().await
    }
}
