#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use quanta_config::{ArtifactsConfig, DatabaseConfig, ToolsConfig};
use quanta_execution::{ExecutionError, WorkerBackend};
use quanta_mcp::ToolService;
use quanta_storage::{
    Artifact, Event, PersistenceManager, SeaOrmSessionStore, SessionStore,
};

type Responder = Box<dyn Fn(&str, &Value) -> Result<Value, ExecutionError> + Send + Sync>;

/// One call as the worker saw it
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: String,
    pub params: Value,
    pub timeout: Option<Duration>,
}

/// In-process stand-in for the worker
pub struct MockBackend {
    calls: Mutex<Vec<RecordedCall>>,
    respond: Responder,
}

impl MockBackend {
    pub fn new<F>(respond: F) -> Arc<Self>
    where
        F: Fn(&str, &Value) -> Result<Value, ExecutionError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            respond: Box::new(respond),
        })
    }

    /// Answers every call with `{"method": <canonical method>, "params": <params>}`
    pub fn echo() -> Arc<Self> {
        Self::new(|method, params| {
            Ok(serde_json::json!({"method": method, "params": params}))
        })
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkerBackend for MockBackend {
    async fn call(
        &self,
        method: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, ExecutionError> {
        let response = (self.respond)(method, &params);
        self.calls.lock().unwrap().push(RecordedCall {
            method: method.to_string(),
            params,
            timeout,
        });
        response
    }

    async fn health_check(&self) -> Result<(), ExecutionError> {
        Ok(())
    }

    async fn shutdown(&self, _grace: Duration) -> Result<(), ExecutionError> {
        Ok(())
    }
}

/// A service over a throw-away database and artifact directory
pub struct Harness {
    pub dir: TempDir,
    pub backend: Arc<MockBackend>,
    pub persistence: PersistenceManager,
    pub service: Arc<ToolService>,
}

impl Harness {
    pub async fn new(backend: Arc<MockBackend>) -> Self {
        Self::with_tools(backend, ToolsConfig::default()).await
    }

    pub async fn with_tools(backend: Arc<MockBackend>, tools: ToolsConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let persistence = PersistenceManager::from_config(&database(&dir)).await;
        assert!(persistence.is_enabled());
        Self::assemble(dir, backend, tools, persistence)
    }

    /// Like [`new`](Self::new), with the SQLite store wrapped by `wrap`
    pub async fn with_store<F>(backend: Arc<MockBackend>, wrap: F) -> Self
    where
        F: FnOnce(SeaOrmSessionStore) -> Arc<dyn SessionStore>,
    {
        let dir = tempfile::tempdir().unwrap();
        let store = SeaOrmSessionStore::connect(database(&dir)).await.unwrap();
        let persistence = PersistenceManager::new(wrap(store));
        Self::assemble(dir, backend, ToolsConfig::default(), persistence)
    }

    fn assemble(
        dir: TempDir,
        backend: Arc<MockBackend>,
        tools: ToolsConfig,
        persistence: PersistenceManager,
    ) -> Self {
        let artifacts = ArtifactsConfig {
            enabled: true,
            root: dir.path().join("artifacts"),
            strip_payloads: false,
        };
        let service = Arc::new(ToolService::new(
            tools,
            &artifacts,
            backend.clone(),
            persistence.clone(),
        ));

        Self {
            dir,
            backend,
            persistence,
            service,
        }
    }

    /// Recorded events of a session, once queued writes have landed
    pub async fn events(&self, session_id: &str) -> Vec<Event> {
        self.service.flush_persistence().await;
        self.persistence.get_session_events(session_id).await.unwrap()
    }

    /// Recorded artifacts of a session, once queued writes have landed
    pub async fn artifacts(&self, session_id: &str) -> Vec<Artifact> {
        self.service.flush_persistence().await;
        self.persistence.get_session_artifacts(session_id).await.unwrap()
    }
}

fn database(dir: &TempDir) -> DatabaseConfig {
    DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("quanta.db").display()),
        connection_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}
