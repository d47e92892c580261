//! Session repository implementation using SeaORM

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{EntityTrait, QueryOrder, QuerySelect, Set};

use crate::error::{StorageError, StorageResult};
use crate::seaorm::{
    connection::DatabaseConnection,
    entities::{sessions, Session, Sessions},
};

#[derive(Clone)]
pub struct SeaOrmSessionRepository {
    pub db: DatabaseConnection,
}

impl SeaOrmSessionRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insert the session if it is unknown. Returns the stored row and whether
    /// this call created it; an existing row is never modified.
    pub async fn ensure(&self, id: &str) -> StorageResult<(Session, bool)> {
        let active_model = sessions::ActiveModel {
            id: Set(id.to_string()),
            created_at: Set(Utc::now()),
        };

        let inserted = Sessions::insert(active_model)
            .on_conflict(
                OnConflict::column(sessions::Column::Id)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.db.get_connection())
            .await?;

        let session = self.find_by_id(id).await?.ok_or_else(|| StorageError::NotFound {
            entity: "session",
            id: id.to_string(),
        })?;

        Ok((session, inserted > 0))
    }

    pub async fn find_by_id(&self, id: &str) -> StorageResult<Option<Session>> {
        Ok(Sessions::find_by_id(id.to_string())
            .one(self.db.get_connection())
            .await?)
    }

    /// Most recently created sessions first
    pub async fn find_recent(&self, limit: u64) -> StorageResult<Vec<Session>> {
        Ok(Sessions::find()
            .order_by_desc(sessions::Column::CreatedAt)
            .order_by_desc(sessions::Column::Id)
            .limit(limit)
            .all(self.db.get_connection())
            .await?)
    }

    pub async fn health_check(&self) -> StorageResult<()> {
        Sessions::find()
            .limit(1)
            .all(self.db.get_connection())
            .await?;
        Ok(())
    }
}
