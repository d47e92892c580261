pub mod artifact_repository;
pub mod event_repository;
pub mod session_repository;

pub use artifact_repository::SeaOrmArtifactRepository;
pub use event_repository::SeaOrmEventRepository;
pub use session_repository::SeaOrmSessionRepository;
