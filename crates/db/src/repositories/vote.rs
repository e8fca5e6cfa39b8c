//! Vote repository.

use std::sync::Arc;

use crate::entities::{Poll, Vote, vote};
use meetpoll_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait, sea_query::OnConflict,
};

/// Vote repository for database operations.
#[derive(Clone)]
pub struct VoteRepository {
    db: Arc<DatabaseConnection>,
}

impl VoteRepository {
    /// Create a new vote repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a vote by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<vote::Model>> {
        Vote::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// All votes of a poll, oldest first.
    pub async fn find_by_poll(&self, poll_id: &str) -> AppResult<Vec<vote::Model>> {
        Vote::find()
            .filter(vote::Column::PollId.eq(poll_id))
            .order_by_asc(vote::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// All votes cast by a user, newest first.
    pub async fn find_by_user(&self, user_id: &str) -> AppResult<Vec<vote::Model>> {
        Vote::find()
            .filter(vote::Column::UserId.eq(user_id))
            .order_by_desc(vote::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Number of votes a user holds on a poll.
    pub async fn count_by_user_and_poll(&self, user_id: &str, poll_id: &str) -> AppResult<u64> {
        Vote::find()
            .filter(vote::Column::UserId.eq(user_id))
            .filter(vote::Column::PollId.eq(poll_id))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Distinct authenticated voters of a poll.
    pub async fn find_distinct_voters(&self, poll_id: &str) -> AppResult<Vec<String>> {
        Vote::find()
            .select_only()
            .column(vote::Column::UserId)
            .distinct()
            .filter(vote::Column::PollId.eq(poll_id))
            .filter(vote::Column::UserId.is_not_null())
            .into_tuple::<String>()
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Write a batch of votes in one transaction.
    ///
    /// Votes with a user id are upserted on (poll, date option, user): an
    /// existing row keeps its id and gets the new response and name. Votes
    /// without a user id are always inserted. Nothing is committed unless
    /// every write succeeds.
    ///
    /// With `max_per_user` set, the poll row is locked for the rest of the
    /// transaction and the voter's existing rows plus the batch must not
    /// exceed it. Concurrent batches on the same poll therefore see each
    /// other's committed rows before counting.
    pub async fn upsert_batch(
        &self,
        votes: Vec<vote::Model>,
        max_per_user: Option<u64>,
    ) -> AppResult<Vec<vote::Model>> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if let Some(max) = max_per_user
            && let Some(first) = votes.first()
            && let Some(user_id) = first.user_id.as_deref()
        {
            Poll::find_by_id(first.poll_id.as_str())
                .lock_exclusive()
                .one(&txn)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;

            let existing = Vote::find()
                .filter(vote::Column::UserId.eq(user_id))
                .filter(vote::Column::PollId.eq(first.poll_id.as_str()))
                .count(&txn)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;

            if existing + votes.len() as u64 > max {
                return Err(AppError::InvalidRequest(format!(
                    "vote limit exceeded: {existing} existing and {} new, maximum {max}",
                    votes.len()
                )));
            }
        }

        let mut stored = Vec::with_capacity(votes.len());
        for model in votes {
            let authenticated = model.user_id.is_some();
            let active: vote::ActiveModel = model.into();

            let saved = if authenticated {
                Vote::insert(active)
                    .on_conflict(
                        OnConflict::columns([
                            vote::Column::PollId,
                            vote::Column::DateOptionId,
                            vote::Column::UserId,
                        ])
                        .update_columns([vote::Column::Response, vote::Column::UserName])
                        .to_owned(),
                    )
                    .exec_with_returning(&txn)
                    .await
            } else {
                active.insert(&txn).await
            };

            // Dropping `txn` on the error path rolls back.
            stored.push(saved.map_err(|e| AppError::Database(e.to_string()))?);
        }

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(stored)
    }

    /// Change the response of an existing vote.
    pub async fn update_response(
        &self,
        vote: vote::Model,
        response: vote::VoteResponse,
    ) -> AppResult<vote::Model> {
        let mut active: vote::ActiveModel = vote.into();
        active.response = Set(response);
        active
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete a vote.
    pub async fn delete(&self, id: &str) -> AppResult<()> {
        Vote::delete_by_id(id)
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
    use crate::entities::vote::VoteResponse;
    use crate::test_utils::fixtures;
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[tokio::test]
    async fn test_count_by_user_and_poll() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[maplit::btreemap! {
                    "num_items" => sea_orm::Value::BigInt(Some(3))
                }]])
                .into_connection(),
        );

        let repo = VoteRepository::new(db);
        assert_eq!(repo.count_by_user_and_poll("u1", "p1").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_find_distinct_voters() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[
                    maplit::btreemap! { "user_id" => sea_orm::Value::from("u1") },
                    maplit::btreemap! { "user_id" => sea_orm::Value::from("u2") },
                ]])
                .into_connection(),
        );

        let repo = VoteRepository::new(db);
        let voters = repo.find_distinct_voters("p1").await.unwrap();

        assert_eq!(voters, vec!["u1".to_string(), "u2".to_string()]);
    }

    #[tokio::test]
    async fn test_upsert_batch_returns_stored_rows() {
        let yes = fixtures::vote("v1", "p1", "d1", Some("u1"), VoteResponse::Yes);
        let no = fixtures::vote("v2", "p1", "d2", Some("u1"), VoteResponse::No);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[yes.clone()], [no.clone()]])
                .into_connection(),
        );

        let repo = VoteRepository::new(db);
        let stored = repo.upsert_batch(vec![yes, no], None).await.unwrap();

        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].id, "v1");
        assert_eq!(stored[1].response, VoteResponse::No);
    }

    #[tokio::test]
    async fn test_upsert_batch_fails_as_a_whole() {
        let yes = fixtures::vote("v1", "p1", "d1", Some("u1"), VoteResponse::Yes);
        let no = fixtures::vote("v2", "p1", "d2", Some("u1"), VoteResponse::No);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[yes.clone()]])
                .append_query_errors([sea_orm::DbErr::Custom("deadlock".to_string())])
                .into_connection(),
        );

        let repo = VoteRepository::new(db);
        let result = repo.upsert_batch(vec![yes, no], None).await;

        assert!(matches!(result, Err(AppError::Database(_))));
    }

    #[tokio::test]
    async fn test_upsert_batch_counts_under_poll_lock() {
        let mut poll = fixtures::poll("p1", "creator");
        poll.limit_votes = true;
        poll.max_votes_per_user = 2;
        let yes = fixtures::vote("v2", "p1", "d2", Some("u1"), VoteResponse::Yes);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[poll]])
                .append_query_results([[maplit::btreemap! {
                    "num_items" => sea_orm::Value::BigInt(Some(1))
                }]])
                .append_query_results([[yes.clone()]])
                .into_connection(),
        );

        let repo = VoteRepository::new(db.clone());
        let stored = repo.upsert_batch(vec![yes], Some(2)).await.unwrap();
        assert_eq!(stored.len(), 1);

        drop(repo);
        let db = Arc::try_unwrap(db).expect("repository dropped");
        let log = format!("{:?}", db.into_transaction_log());
        assert!(log.contains("FOR UPDATE"));
    }

    #[tokio::test]
    async fn test_upsert_batch_rejects_over_limit_inside_transaction() {
        let poll = fixtures::poll("p1", "creator");
        let yes = fixtures::vote("v3", "p1", "d3", Some("u1"), VoteResponse::Yes);

        // A concurrent batch already committed the second row.
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[poll]])
                .append_query_results([[maplit::btreemap! {
                    "num_items" => sea_orm::Value::BigInt(Some(2))
                }]])
                .into_connection(),
        );

        let repo = VoteRepository::new(db);
        let result = repo.upsert_batch(vec![yes], Some(2)).await;

        assert!(
            matches!(result, Err(AppError::InvalidRequest(ref m)) if m.contains("vote limit exceeded"))
        );
    }
}
