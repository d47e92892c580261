//! Session-scoped persistence for Quanta
//!
//! Every tool call is recorded as an event under a session, together with any
//! artifacts its result produced. Records live in an embedded SQLite database
//! managed through SeaORM; the [`PersistenceManager`] wraps the store so that a
//! failing database degrades observability without failing tool calls, and the
//! [`BackgroundRecorder`] keeps those writes off the request path.

pub mod error;
pub mod manager;
pub mod recorder;
pub mod seaorm;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use manager::{mint_session_id, normalize_session_id, PersistenceManager, PersistenceStats};
pub use recorder::{BackgroundRecorder, DEFAULT_QUEUE_CAPACITY};
pub use seaorm::connection::DatabaseConnection;
pub use seaorm::entities::{Artifact, ArtifactKind, Event, Session};
pub use store::{NewArtifact, NewEvent, SeaOrmSessionStore, SessionStore};
