use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Events::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Events::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Events::SessionId).string().not_null())
                    .col(ColumnDef::new(Events::Timestamp).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Events::ToolName).string().not_null())
                    .col(ColumnDef::new(Events::Input).text().not_null())
                    .col(ColumnDef::new(Events::Output).text().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_events_session_id")
                            .from(Events::Table, Events::SessionId)
                            .to(Sessions::Table, Sessions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Events::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Events {
    Table,
    Id,
    SessionId,
    Timestamp,
    ToolName,
    Input,
    Output,
}

#[derive(Iden)]
enum Sessions {
    Table,
    Id,
}
