//! Notification repository.

use std::sync::Arc;

use crate::entities::{
    Notification,
    notification::{self, NotificationStatus, NotificationType},
};
use chrono::{DateTime, FixedOffset};
use meetpoll_common::{AppError, AppResult};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Statement, sea_query::Expr,
};

/// A notification to enqueue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub id: String,
    pub poll_id: String,
    pub user_id: Option<String>,
    pub kind: NotificationType,
    pub scheduled_at: DateTime<FixedOffset>,
    pub created_at: DateTime<FixedOffset>,
}

// Conflict target matches the partial index `uq_notification_pending`.
const INSERT_IF_ABSENT: &str = r"
    INSERT INTO notification
        (id, poll_id, user_id, notification_type, status, scheduled_at, attempts, created_at)
    VALUES ($1, $2, $3, $4, 'pending', $5, 0, $6)
    ON CONFLICT (poll_id, user_id, notification_type) WHERE status = 'pending'
    DO NOTHING
";

/// Notification repository for database operations.
#[derive(Clone)]
pub struct NotificationRepository {
    db: Arc<DatabaseConnection>,
}

impl NotificationRepository {
    /// Create a new notification repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a notification by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<notification::Model>> {
        Notification::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// All notifications of a poll, most recently scheduled first.
    pub async fn find_by_poll(&self, poll_id: &str) -> AppResult<Vec<notification::Model>> {
        Notification::find()
            .filter(notification::Column::PollId.eq(poll_id))
            .order_by_desc(notification::Column::ScheduledAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Whether a pending notification of `kind` exists for the recipient.
    pub async fn has_pending(
        &self,
        poll_id: &str,
        user_id: Option<&str>,
        kind: NotificationType,
    ) -> AppResult<bool> {
        let recipient = match user_id {
            Some(id) => notification::Column::UserId.eq(id),
            None => notification::Column::UserId.is_null(),
        };

        let count = Notification::find()
            .filter(notification::Column::PollId.eq(poll_id))
            .filter(recipient)
            .filter(notification::Column::NotificationType.eq(kind.as_str()))
            .filter(notification::Column::Status.eq(NotificationStatus::Pending))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(count > 0)
    }

    /// Insert unless an equivalent pending notification exists.
    ///
    /// Returns `false` when the pending-uniqueness index rejected the row.
    pub async fn insert_if_absent(&self, new: NewNotification) -> AppResult<bool> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            INSERT_IF_ABSENT,
            [
                new.id.into(),
                new.poll_id.into(),
                new.user_id.into(),
                new.kind.as_str().into(),
                new.scheduled_at.into(),
                new.created_at.into(),
            ],
        );

        let result = self
            .db
            .execute(stmt)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected() == 1)
    }

    /// Pending notifications due at `now`, oldest first.
    pub async fn find_due(
        &self,
        now: DateTime<FixedOffset>,
        limit: u64,
    ) -> AppResult<Vec<notification::Model>> {
        Notification::find()
            .filter(notification::Column::Status.eq(NotificationStatus::Pending))
            .filter(notification::Column::ScheduledAt.lte(now))
            .order_by_asc(notification::Column::ScheduledAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Set the terminal status of a notification.
    ///
    /// A failure also counts as a delivery attempt.
    pub async fn update_status(
        &self,
        id: &str,
        status: NotificationStatus,
        sent_at: Option<DateTime<FixedOffset>>,
        error_message: Option<String>,
    ) -> AppResult<()> {
        let mut update = Notification::update_many()
            .filter(notification::Column::Id.eq(id))
            .col_expr(notification::Column::Status, Expr::value(status))
            .col_expr(notification::Column::SentAt, Expr::value(sent_at))
            .col_expr(notification::Column::ErrorMessage, Expr::value(error_message));

        if status == NotificationStatus::Failed {
            update = update.col_expr(
                notification::Column::Attempts,
                Expr::col(notification::Column::Attempts).add(1),
            );
        }

        update
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Keep a notification pending for another attempt at `next_at`.
    pub async fn reschedule(
        &self,
        id: &str,
        next_at: DateTime<FixedOffset>,
        attempts: i32,
        error_message: String,
    ) -> AppResult<()> {
        Notification::update_many()
            .filter(notification::Column::Id.eq(id))
            .col_expr(notification::Column::ScheduledAt, Expr::value(next_at))
            .col_expr(notification::Column::Attempts, Expr::value(attempts))
            .col_expr(
                notification::Column::ErrorMessage,
                Expr::value(Some(error_message)),
            )
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_utils::fixtures;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn new_reminder() -> NewNotification {
        let now = Utc::now().fixed_offset();
        NewNotification {
            id: "n1".to_string(),
            poll_id: "p1".to_string(),
            user_id: Some("u1".to_string()),
            kind: NotificationType::EventReminder,
            scheduled_at: now,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn test_insert_if_absent_inserted() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                .into_connection(),
        );

        let repo = NotificationRepository::new(db);
        assert!(repo.insert_if_absent(new_reminder()).await.unwrap());
    }

    #[tokio::test]
    async fn test_insert_if_absent_conflict() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                }])
                .into_connection(),
        );

        let repo = NotificationRepository::new(db);
        assert!(!repo.insert_if_absent(new_reminder()).await.unwrap());
    }

    #[tokio::test]
    async fn test_has_pending() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[maplit::btreemap! {
                    "num_items" => sea_orm::Value::BigInt(Some(1))
                }]])
                .into_connection(),
        );

        let repo = NotificationRepository::new(db);
        assert!(
            repo.has_pending("p1", Some("u1"), NotificationType::EventReminder)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_find_due() {
        let n1 = fixtures::notification("n1", "p1", Some("u1"), "2025-01-10T07:00:00Z");
        let n2 = fixtures::notification("n2", "p1", None, "2025-01-10T07:30:00Z");

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[n1, n2]])
                .into_connection(),
        );

        let repo = NotificationRepository::new(db);
        let due = repo
            .find_due(fixtures::at("2025-01-10T08:00:00Z"), 100)
            .await
            .unwrap();

        assert_eq!(due.len(), 2);
        assert_eq!(due[0].id, "n1");
    }

    #[tokio::test]
    async fn test_update_status() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                .into_connection(),
        );

        let repo = NotificationRepository::new(db);
        let result = repo
            .update_status(
                "n1",
                NotificationStatus::Failed,
                None,
                Some("recipient not found".to_string()),
            )
            .await;

        assert!(result.is_ok());
    }
}
