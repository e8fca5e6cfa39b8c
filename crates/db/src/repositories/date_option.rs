//! Date option repository.

use std::sync::Arc;

use crate::entities::{DateOption, date_option};
use meetpoll_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder,
};

/// Date option repository for database operations.
#[derive(Clone)]
pub struct DateOptionRepository {
    db: Arc<DatabaseConnection>,
}

impl DateOptionRepository {
    /// Create a new date option repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a date option by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<date_option::Model>> {
        DateOption::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// All options of a poll, earliest first.
    pub async fn find_by_poll(&self, poll_id: &str) -> AppResult<Vec<date_option::Model>> {
        DateOption::find()
            .filter(date_option::Column::PollId.eq(poll_id))
            .order_by_asc(date_option::Column::StartTime)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Whether `id` is an option of `poll_id`.
    pub async fn belongs_to_poll(&self, id: &str, poll_id: &str) -> AppResult<bool> {
        let count = DateOption::find()
            .filter(date_option::Column::Id.eq(id))
            .filter(date_option::Column::PollId.eq(poll_id))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(count > 0)
    }

    /// Create a new date option.
    pub async fn create(&self, model: date_option::ActiveModel) -> AppResult<date_option::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
