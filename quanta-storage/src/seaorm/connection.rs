use quanta_config::DatabaseConfig;
use sea_orm::{ConnectOptions, Database, DatabaseConnection as SeaConnection};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// Lifetime for the single in-memory connection; recycling it would drop the database
const MEMORY_CONNECTION_LIFETIME: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Database connection wrapper with configuration
#[derive(Clone)]
pub struct DatabaseConnection {
    connection: SeaConnection,
    config: DatabaseConfig,
}

impl DatabaseConnection {
    /// Create a new database connection with configuration
    pub async fn new(config: DatabaseConfig) -> StorageResult<Self> {
        info!("Connecting to session store: {}", config.url);

        let url = Self::prepare_sqlite_url(&config.url)?;
        let in_memory = is_memory_url(&url);

        let mut opts = ConnectOptions::new(url);
        opts.connect_timeout(config.connection_timeout)
            .acquire_timeout(config.connection_timeout)
            .sqlx_logging(true)
            .sqlx_logging_level(log::LevelFilter::Debug);

        if in_memory {
            // Every pooled connection to :memory: would be a separate database
            opts.max_connections(1)
                .min_connections(1)
                .idle_timeout(MEMORY_CONNECTION_LIFETIME)
                .max_lifetime(MEMORY_CONNECTION_LIFETIME);
        } else {
            opts.max_connections(config.max_connections)
                .min_connections(1)
                .idle_timeout(Duration::from_secs(300))
                .max_lifetime(Duration::from_secs(3600));
        }

        let connection = Database::connect(opts).await?;

        debug!(
            "Session store connected with {} max connections",
            if in_memory { 1 } else { config.max_connections }
        );

        Ok(Self { connection, config })
    }

    /// Connect and bring the schema up to date
    pub async fn connect_and_migrate(config: DatabaseConfig) -> StorageResult<Self> {
        let db = Self::new(config).await?;
        db.migrate().await?;
        Ok(db)
    }

    /// Create the parent directory of a file database and make sure SQLite
    /// is allowed to create the file itself.
    fn prepare_sqlite_url(database_url: &str) -> StorageResult<String> {
        if !database_url.starts_with("sqlite:") {
            return Err(StorageError::ConfigError(format!(
                "Unsupported database URL: {}",
                database_url
            )));
        }

        if is_memory_url(database_url) {
            debug!("Using in-memory SQLite database");
            return Ok(database_url.to_string());
        }

        let path = sqlite_file_path(database_url).ok_or_else(|| {
            StorageError::ConfigError(format!("Invalid SQLite URL format: {}", database_url))
        })?;
        let path = Path::new(path);

        if let Some(parent_dir) = path.parent() {
            if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
                info!("Creating database directory: {:?}", parent_dir);
                std::fs::create_dir_all(parent_dir).map_err(|e| {
                    StorageError::ConfigError(format!(
                        "Failed to create database directory {:?}: {}",
                        parent_dir, e
                    ))
                })?;
            }
        }

        if path.exists() {
            debug!("Using existing database file: {:?}", path);
        } else {
            info!("Database file will be created by SQLite: {:?}", path);
        }

        if database_url.contains('?') {
            Ok(database_url.to_string())
        } else {
            Ok(format!("{}?mode=rwc", database_url))
        }
    }

    /// Get the underlying Sea-ORM connection
    pub fn get_connection(&self) -> &SeaConnection {
        &self.connection
    }

    pub fn get_config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Run database migrations
    pub async fn migrate(&self) -> StorageResult<()> {
        use sea_orm_migration::MigratorTrait;

        info!("Running session store migrations");

        super::migrations::Migrator::up(&self.connection, None)
            .await
            .map_err(|e| StorageError::MigrationError(e.to_string()))?;

        debug!("Session store migrations completed");
        Ok(())
    }

    /// Check database connectivity
    pub async fn ping(&self) -> StorageResult<()> {
        self.connection.ping().await.map_err(|e| {
            debug!("Database ping failed: {}", e);
            StorageError::DbError(e)
        })
    }

    /// Close the database connection
    pub async fn close(self) -> StorageResult<()> {
        info!("Closing session store connection");
        self.connection.close().await?;
        Ok(())
    }
}

fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// File path portion of a `sqlite:` URL, without any query string
fn sqlite_file_path(url: &str) -> Option<&str> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() {
        None
    } else {
        Some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::ConnectionTrait;

    fn memory_config() -> DatabaseConfig {
        DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 5,
            connection_timeout: Duration::from_secs(10),
            ..Default::default()
        }
    }

    #[test]
    fn test_sqlite_file_path() {
        assert_eq!(sqlite_file_path("sqlite://quanta.db"), Some("quanta.db"));
        assert_eq!(sqlite_file_path("sqlite:///tmp/q/a.db"), Some("/tmp/q/a.db"));
        assert_eq!(sqlite_file_path("sqlite:data/a.db?mode=rwc"), Some("data/a.db"));
        assert_eq!(sqlite_file_path("sqlite://"), None);
        assert_eq!(sqlite_file_path("postgres://x"), None);
    }

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = DatabaseConnection::new(memory_config()).await.unwrap();
        assert!(db.ping().await.is_ok());
        assert_eq!(
            db.get_connection().get_database_backend(),
            sea_orm::DatabaseBackend::Sqlite
        );
    }

    #[tokio::test]
    async fn test_migration_is_repeatable() {
        let db = DatabaseConnection::new(memory_config()).await.unwrap();
        db.migrate().await.unwrap();
        db.migrate().await.unwrap();
    }

    #[tokio::test]
    async fn test_file_database_directory_creation() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("nested").join("store.db");
        let config = DatabaseConfig {
            url: format!("sqlite://{}", db_path.display()),
            ..memory_config()
        };

        let db = DatabaseConnection::connect_and_migrate(config).await.unwrap();
        assert!(db_path.exists());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_non_sqlite_url() {
        let config = DatabaseConfig {
            url: "postgres://localhost/quanta".to_string(),
            ..memory_config()
        };
        let result = DatabaseConnection::new(config).await;
        assert!(matches!(result, Err(StorageError::ConfigError(_))));
    }
}
