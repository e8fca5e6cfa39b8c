//! Create notification and notification setting tables.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Notification::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Notification::Id)
                            .string_len(36)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Notification::PollId)
                            .string_len(36)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Notification::UserId).string_len(36))
                    .col(
                        ColumnDef::new(Notification::NotificationType)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Notification::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(Notification::ScheduledAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Notification::SentAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Notification::ErrorMessage).text())
                    .col(
                        ColumnDef::new(Notification::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Notification::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_notification_poll")
                            .from(Notification::Table, Notification::PollId)
                            .to(Poll::Table, Poll::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_notification_user")
                            .from(Notification::Table, Notification::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: (status, scheduled_at) for the dispatcher's due query
        manager
            .create_index(
                Index::create()
                    .name("idx_notification_status_scheduled_at")
                    .table(Notification::Table)
                    .col(Notification::Status)
                    .col(Notification::ScheduledAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(NotificationSetting::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(NotificationSetting::Key)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(NotificationSetting::Value)
                            .string_len(256)
                            .not_null(),
                    )
                    .col(ColumnDef::new(NotificationSetting::Description).text())
                    .col(
                        ColumnDef::new(NotificationSetting::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        let seed = Query::insert()
            .into_table(NotificationSetting::Table)
            .columns([
                NotificationSetting::Key,
                NotificationSetting::Value,
                NotificationSetting::Description,
            ])
            .values_panic([
                "reminder_enabled".into(),
                "true".into(),
                "Send a reminder email before the chosen date".into(),
            ])
            .values_panic([
                "reminder_hours".into(),
                "1".into(),
                "Hours before the event at which the reminder is sent".into(),
            ])
            .values_panic([
                "new_vote_enabled".into(),
                "false".into(),
                "Email the creator when someone votes".into(),
            ])
            .values_panic([
                "new_comment_enabled".into(),
                "false".into(),
                "Email the creator when someone comments".into(),
            ])
            .values_panic([
                "final_date_enabled".into(),
                "false".into(),
                "Email participants when the final date is chosen".into(),
            ])
            .on_conflict(
                OnConflict::column(NotificationSetting::Key)
                    .do_nothing()
                    .to_owned(),
            )
            .to_owned();
        manager.exec_stmt(seed).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(NotificationSetting::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Notification::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Notification {
    Table,
    Id,
    PollId,
    UserId,
    NotificationType,
    Status,
    ScheduledAt,
    SentAt,
    ErrorMessage,
    Attempts,
    CreatedAt,
}

#[derive(Iden)]
enum NotificationSetting {
    Table,
    Key,
    Value,
    Description,
    UpdatedAt,
}

#[derive(Iden)]
enum Poll {
    Table,
    Id,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
