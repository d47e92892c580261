//! SeaORM implementation of the session store
//!
//! Entities, migrations, repositories, and connection management.

pub mod connection;
pub mod entities;
pub mod migrations;
pub mod repositories;

pub use connection::DatabaseConnection;
pub use entities::*;

// Re-export common SeaORM types for convenience
pub use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
pub use sea_orm_migration::{MigrationTrait, MigratorTrait, SchemaManager};
