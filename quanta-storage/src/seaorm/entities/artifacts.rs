use sea_orm::entity::prelude::*;
use sea_orm::sea_query::StringLen;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a materialized artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    #[sea_orm(string_value = "image")]
    Image,
    #[sea_orm(string_value = "csv")]
    Csv,
    #[sea_orm(string_value = "vector-graphic")]
    VectorGraphic,
    #[sea_orm(string_value = "document")]
    Document,
    #[sea_orm(string_value = "other")]
    Other,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Image => "image",
            ArtifactKind::Csv => "csv",
            ArtifactKind::VectorGraphic => "vector-graphic",
            ArtifactKind::Document => "document",
            ArtifactKind::Other => "other",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file written to disk from an inline payload in a tool result
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "artifacts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub session_id: String,

    pub timestamp: DateTimeUtc,

    pub kind: ArtifactKind,

    /// Location of the written file
    pub path: String,

    /// Serialized metadata (source field, size, mime type)
    #[sea_orm(column_type = "Text")]
    pub metadata: String,
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
    pub fn metadata_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.metadata)
    }
}
