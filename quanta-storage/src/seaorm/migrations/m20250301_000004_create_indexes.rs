use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Session history is always read in chronological order
        manager
            .create_index(
                Index::create()
                    .name("idx_events_session_timestamp")
                    .table(Events::Table)
                    .col(Events::SessionId)
                    .col(Events::Timestamp)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_artifacts_session_timestamp")
                    .table(Artifacts::Table)
                    .col(Artifacts::SessionId)
                    .col(Artifacts::Timestamp)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_events_tool_name")
                    .table(Events::Table)
                    .col(Events::ToolName)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for index in [
            "idx_events_tool_name",
            "idx_artifacts_session_timestamp",
            "idx_events_session_timestamp",
        ] {
            manager
                .drop_index(Index::drop().name(index).if_exists().to_owned())
                .await?;
        }
        Ok(())
    }
}

#[derive(Iden)]
enum Events {
    Table,
    SessionId,
    Timestamp,
    ToolName,
}

#[derive(Iden)]
enum Artifacts {
    Table,
    SessionId,
    Timestamp,
}
