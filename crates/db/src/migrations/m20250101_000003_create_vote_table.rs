//! Create vote table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Vote::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Vote::Id)
                            .string_len(36)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Vote::PollId).string_len(36).not_null())
                    .col(ColumnDef::new(Vote::DateOptionId).string_len(36).not_null())
                    .col(ColumnDef::new(Vote::UserId).string_len(36))
                    .col(ColumnDef::new(Vote::UserName).string_len(128).not_null())
                    .col(
                        ColumnDef::new(Vote::Response)
                            .string_len(8)
                            .not_null()
                            .check(Expr::col(Vote::Response).is_in(["yes", "no", "maybe"])),
                    )
                    .col(
                        ColumnDef::new(Vote::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_vote_poll")
                            .from(Vote::Table, Vote::PollId)
                            .to(Poll::Table, Poll::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_vote_date_option")
                            .from(Vote::Table, Vote::DateOptionId)
                            .to(DateOption::Table, DateOption::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_vote_user")
                            .from(Vote::Table, Vote::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique: one answer per (poll, option, user). NULL user ids never
        // collide, so anonymous votes are not deduplicated.
        manager
            .create_index(
                Index::create()
                    .name("uq_vote_poll_option_user")
                    .table(Vote::Table)
                    .col(Vote::PollId)
                    .col(Vote::DateOptionId)
                    .col(Vote::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Index: user_id (for a user's votes across polls)
        manager
            .create_index(
                Index::create()
                    .name("idx_vote_user_id")
                    .table(Vote::Table)
                    .col(Vote::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Vote::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Vote {
    Table,
    Id,
    PollId,
    DateOptionId,
    UserId,
    UserName,
    Response,
    CreatedAt,
}

#[derive(Iden)]
enum Poll {
    Table,
    Id,
}

#[derive(Iden)]
enum DateOption {
    Table,
    Id,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
