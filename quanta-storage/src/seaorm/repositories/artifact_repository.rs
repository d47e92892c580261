//! Artifact repository implementation using SeaORM

use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};

use crate::error::StorageResult;
use crate::seaorm::{
    connection::DatabaseConnection,
    entities::{artifacts, Artifact, Artifacts},
};
use crate::store::NewArtifact;

#[derive(Clone)]
pub struct SeaOrmArtifactRepository {
    pub db: DatabaseConnection,
}

impl SeaOrmArtifactRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(&self, artifact: &NewArtifact) -> StorageResult<i64> {
        let active_model = artifacts::ActiveModel {
            id: Default::default(),
            session_id: Set(artifact.session_id.clone()),
            timestamp: Set(artifact.timestamp),
            kind: Set(artifact.kind),
            path: Set(artifact.path.clone()),
            metadata: Set(serde_json::to_string(&artifact.metadata)?),
        };

        let result = Artifacts::insert(active_model)
            .exec(self.db.get_connection())
            .await?;
        Ok(result.last_insert_id)
    }

    pub async fn find_by_session(&self, session_id: &str) -> StorageResult<Vec<Artifact>> {
        Ok(Artifacts::find()
            .filter(artifacts::Column::SessionId.eq(session_id))
            .order_by_asc(artifacts::Column::Timestamp)
            .order_by_asc(artifacts::Column::Id)
            .all(self.db.get_connection())
            .await?)
    }
}
