//! Notification setting repository.

use std::sync::Arc;

use crate::entities::{NotificationSetting, notification_setting};
use chrono::{DateTime, FixedOffset};
use meetpoll_common::{AppError, AppResult};
use sea_orm::{DatabaseConnection, EntityTrait, QueryOrder, Set, sea_query::OnConflict};

/// Notification setting repository for database operations.
#[derive(Clone)]
pub struct NotificationSettingRepository {
    db: Arc<DatabaseConnection>,
}

impl NotificationSettingRepository {
    /// Create a new notification setting repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Read one setting value. Never cached.
    pub async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let setting = NotificationSetting::find_by_id(key)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(setting.map(|s| s.value))
    }

    /// All settings ordered by key.
    pub async fn list(&self) -> AppResult<Vec<notification_setting::Model>> {
        NotificationSetting::find()
            .order_by_asc(notification_setting::Column::Key)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Insert or overwrite a setting.
    pub async fn upsert(
        &self,
        key: &str,
        value: &str,
        description: Option<String>,
        now: DateTime<FixedOffset>,
    ) -> AppResult<notification_setting::Model> {
        let has_description = description.is_some();
        let model = notification_setting::ActiveModel {
            key: Set(key.to_string()),
            value: Set(value.to_string()),
            description: Set(description),
            updated_at: Set(now),
        };

        let mut on_conflict = OnConflict::column(notification_setting::Column::Key);
        on_conflict.update_columns([
            notification_setting::Column::Value,
            notification_setting::Column::UpdatedAt,
        ]);
        if has_description {
            on_conflict.update_column(notification_setting::Column::Description);
        }

        NotificationSetting::insert(model)
            .on_conflict(on_conflict.to_owned())
            .exec_with_returning(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
