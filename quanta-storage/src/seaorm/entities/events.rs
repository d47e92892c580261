use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One tool invocation as the client issued it, with the result it received
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Owning session
    pub session_id: String,

    /// When the call completed
    pub timestamp: DateTimeUtc,

    /// Tool name exactly as the client sent it
    pub tool_name: String,

    /// Serialized call arguments
    #[sea_orm(column_type = "Text")]
    pub input: String,

    /// Serialized result or error payload
    #[sea_orm(column_type = "Text")]
    pub output: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::sessions::Entity",
        from = "Column::SessionId",
        to = "super::sessions::Column::Id",
        on_delete = "Cascade"
    )]
    Session,
}

impl Related<super::sessions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Session.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Parse the stored input back into JSON
    pub fn input_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.input)
    }

    /// Parse the stored output back into JSON
    pub fn output_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.output)
    }
}
