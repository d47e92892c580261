use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Artifacts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Artifacts::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Artifacts::SessionId).string().not_null())
                    .col(ColumnDef::new(Artifacts::Timestamp).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Artifacts::Kind).string_len(32).not_null())
                    .col(ColumnDef::new(Artifacts::Path).string().not_null())
                    .col(ColumnDef::new(Artifacts::Metadata).text().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_artifacts_session_id")
                            .from(Artifacts::Table, Artifacts::SessionId)
                            .to(Sessions::Table, Sessions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Artifacts::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Artifacts {
    Table,
    Id,
    SessionId,
    Timestamp,
    Kind,
    Path,
    Metadata,
}

#[derive(Iden)]
enum Sessions {
    Table,
    Id,
}
