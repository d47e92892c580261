//! Event repository implementation using SeaORM

use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};

use crate::error::StorageResult;
use crate::seaorm::{
    connection::DatabaseConnection,
    entities::{events, Event, Events},
};
use crate::store::NewEvent;

#[derive(Clone)]
pub struct SeaOrmEventRepository {
    pub db: DatabaseConnection,
}

impl SeaOrmEventRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn to_active_model(event: &NewEvent) -> StorageResult<events::ActiveModel> {
        Ok(events::ActiveModel {
            id: Default::default(), // Auto-generated
            session_id: Set(event.session_id.clone()),
            timestamp: Set(event.timestamp),
            tool_name: Set(event.tool_name.clone()),
            input: Set(serde_json::to_string(&event.input)?),
            output: Set(serde_json::to_string(&event.output)?),
        })
    }

    /// Append an event and return its identifier
    pub async fn create(&self, event: &NewEvent) -> StorageResult<i64> {
        let active_model = Self::to_active_model(event)?;
        let result = Events::insert(active_model)
            .exec(self.db.get_connection())
            .await?;
        Ok(result.last_insert_id)
    }

    /// All events of a session, oldest first. Ties on timestamp fall back to
    /// insertion order.
    pub async fn find_by_session(&self, session_id: &str) -> StorageResult<Vec<Event>> {
        Ok(Events::find()
            .filter(events::Column::SessionId.eq(session_id))
            .order_by_asc(events::Column::Timestamp)
            .order_by_asc(events::Column::Id)
            .all(self.db.get_connection())
            .await?)
    }
}
