//! Create poll and date option tables.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Poll::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Poll::Id)
                            .string_len(36)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Poll::Title).string_len(256).not_null())
                    .col(ColumnDef::new(Poll::Description).text())
                    .col(ColumnDef::new(Poll::Location).string_len(256))
                    .col(ColumnDef::new(Poll::CreatorId).string_len(36).not_null())
                    .col(
                        ColumnDef::new(Poll::AccessCode)
                            .string_len(32)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Poll::ExpiresAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Poll::AllowMultiple)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Poll::AllowMaybe)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Poll::Anonymous)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Poll::LimitVotes)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Poll::MaxVotesPerUser)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(ColumnDef::new(Poll::FinalDate).string_len(36))
                    .col(
                        ColumnDef::new(Poll::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Poll::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_poll_creator")
                            .from(Poll::Table, Poll::CreatorId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_poll_creator_id")
                    .table(Poll::Table)
                    .col(Poll::CreatorId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DateOption::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DateOption::Id)
                            .string_len(36)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DateOption::PollId).string_len(36).not_null())
                    .col(
                        ColumnDef::new(DateOption::StartTime)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DateOption::EndTime).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(DateOption::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_date_option_poll")
                            .from(DateOption::Table, DateOption::PollId)
                            .to(Poll::Table, Poll::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: (poll_id, start_time) for ordered option listing
        manager
            .create_index(
                Index::create()
                    .name("idx_date_option_poll_start")
                    .table(DateOption::Table)
                    .col(DateOption::PollId)
                    .col(DateOption::StartTime)
                    .to_owned(),
            )
            .await?;

        // The final date must point at an existing option; clearing the
        // option clears the choice.
        manager
            .create_foreign_key(
                ForeignKey::create()
                    .name("fk_poll_final_date")
                    .from(Poll::Table, Poll::FinalDate)
                    .to(DateOption::Table, DateOption::Id)
                    .on_delete(ForeignKeyAction::SetNull)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_foreign_key(
                ForeignKey::drop()
                    .name("fk_poll_final_date")
                    .table(Poll::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(DateOption::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Poll::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Poll {
    Table,
    Id,
    Title,
    Description,
    Location,
    CreatorId,
    AccessCode,
    ExpiresAt,
    AllowMultiple,
    AllowMaybe,
    Anonymous,
    LimitVotes,
    MaxVotesPerUser,
    FinalDate,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum DateOption {
    Table,
    Id,
    PollId,
    StartTime,
    EndTime,
    CreatedAt,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
