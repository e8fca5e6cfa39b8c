//! Persistence seam for the poll services.
//!
//! Services talk to [`PollStore`] instead of individual repositories so the
//! vote, reminder and dispatch logic can be exercised without a database.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use meetpoll_common::{AppResult, with_timeout};
use meetpoll_db::{
    entities::{
        date_option,
        notification::{self, NotificationStatus, NotificationType},
        notification_setting, poll, user,
        vote::{self, VoteResponse},
    },
    repositories::{
        DateOptionRepository, NewNotification, NotificationRepository,
        NotificationSettingRepository, PollRepository, UserRepository, VoteRepository,
    },
};

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryPollStore;

/// Relational operations the poll services rely on.
#[async_trait]
pub trait PollStore: Send + Sync {
    async fn get_poll(&self, id: &str) -> AppResult<Option<poll::Model>>;

    /// Look a poll up by id or public access code.
    async fn find_poll(&self, key: &str) -> AppResult<Option<poll::Model>>;

    async fn set_final_date(
        &self,
        poll: poll::Model,
        date_option_id: &str,
        now: DateTime<FixedOffset>,
    ) -> AppResult<poll::Model>;

    /// Options of a poll ordered by start time.
    async fn get_date_options(&self, poll_id: &str) -> AppResult<Vec<date_option::Model>>;

    async fn get_date_option(&self, id: &str) -> AppResult<Option<date_option::Model>>;

    async fn date_option_belongs_to_poll(&self, id: &str, poll_id: &str) -> AppResult<bool>;

    async fn get_votes(&self, poll_id: &str) -> AppResult<Vec<vote::Model>>;

    async fn get_vote(&self, id: &str) -> AppResult<Option<vote::Model>>;

    async fn get_user_votes(&self, user_id: &str) -> AppResult<Vec<vote::Model>>;

    async fn count_user_votes(&self, poll_id: &str, user_id: &str) -> AppResult<u64>;

    /// Write all votes atomically; see [`VoteRepository::upsert_batch`].
    ///
    /// `max_per_user` is re-checked against the voter's rows inside the same
    /// atomic write.
    async fn upsert_votes(
        &self,
        votes: Vec<vote::Model>,
        max_per_user: Option<u64>,
    ) -> AppResult<Vec<vote::Model>>;

    async fn update_vote_response(
        &self,
        vote: vote::Model,
        response: VoteResponse,
    ) -> AppResult<vote::Model>;

    async fn delete_vote(&self, id: &str) -> AppResult<()>;

    /// Distinct non-null voter ids of a poll.
    async fn get_distinct_voters(&self, poll_id: &str) -> AppResult<Vec<String>>;

    async fn get_user(&self, id: &str) -> AppResult<Option<user::Model>>;

    async fn get_user_by_token(&self, token: &str) -> AppResult<Option<user::Model>>;

    async fn get_setting(&self, key: &str) -> AppResult<Option<String>>;

    async fn list_settings(&self) -> AppResult<Vec<notification_setting::Model>>;

    async fn put_setting(
        &self,
        key: &str,
        value: &str,
        now: DateTime<FixedOffset>,
    ) -> AppResult<notification_setting::Model>;

    async fn has_pending_notification(
        &self,
        poll_id: &str,
        user_id: Option<&str>,
        kind: NotificationType,
    ) -> AppResult<bool>;

    /// Returns `false` if an equivalent pending row already exists.
    async fn insert_notification_if_absent(&self, new: NewNotification) -> AppResult<bool>;

    async fn query_pending_notifications(
        &self,
        now: DateTime<FixedOffset>,
        limit: u64,
    ) -> AppResult<Vec<notification::Model>>;

    async fn update_notification_status(
        &self,
        id: &str,
        status: NotificationStatus,
        sent_at: Option<DateTime<FixedOffset>>,
        error_message: Option<String>,
    ) -> AppResult<()>;

    /// Leave a notification pending with a later `scheduled_at`.
    async fn reschedule_notification(
        &self,
        id: &str,
        next_at: DateTime<FixedOffset>,
        attempts: i32,
        error_message: String,
    ) -> AppResult<()>;
}

/// Shared handle to a [`PollStore`].
pub type PollStoreService = Arc<dyn PollStore>;

/// [`PollStore`] backed by the sea-orm repositories.
///
/// Every call runs under `request_timeout`, except the dispatcher's batch
/// fetch which gets `batch_timeout`.
#[derive(Clone)]
pub struct DbPollStore {
    polls: PollRepository,
    date_options: DateOptionRepository,
    votes: VoteRepository,
    users: UserRepository,
    settings: NotificationSettingRepository,
    notifications: NotificationRepository,
    request_timeout: Duration,
    batch_timeout: Duration,
}

impl DbPollStore {
    #[must_use]
    pub fn new(
        db: Arc<sea_orm::DatabaseConnection>,
        request_timeout: Duration,
        batch_timeout: Duration,
    ) -> Self {
        Self {
            polls: PollRepository::new(db.clone()),
            date_options: DateOptionRepository::new(db.clone()),
            votes: VoteRepository::new(db.clone()),
            users: UserRepository::new(db.clone()),
            settings: NotificationSettingRepository::new(db.clone()),
            notifications: NotificationRepository::new(db),
            request_timeout,
            batch_timeout,
        }
    }
}

#[async_trait]
impl PollStore for DbPollStore {
    async fn get_poll(&self, id: &str) -> AppResult<Option<poll::Model>> {
        with_timeout(self.request_timeout, "get_poll", self.polls.find_by_id(id)).await
    }

    async fn find_poll(&self, key: &str) -> AppResult<Option<poll::Model>> {
        with_timeout(
            self.request_timeout,
            "find_poll",
            self.polls.find_by_id_or_access_code(key),
        )
        .await
    }

    async fn set_final_date(
        &self,
        poll: poll::Model,
        date_option_id: &str,
        now: DateTime<FixedOffset>,
    ) -> AppResult<poll::Model> {
        with_timeout(
            self.request_timeout,
            "set_final_date",
            self.polls.set_final_date(poll, date_option_id, now),
        )
        .await
    }

    async fn get_date_options(&self, poll_id: &str) -> AppResult<Vec<date_option::Model>> {
        with_timeout(
            self.request_timeout,
            "get_date_options",
            self.date_options.find_by_poll(poll_id),
        )
        .await
    }

    async fn get_date_option(&self, id: &str) -> AppResult<Option<date_option::Model>> {
        with_timeout(
            self.request_timeout,
            "get_date_option",
            self.date_options.find_by_id(id),
        )
        .await
    }

    async fn date_option_belongs_to_poll(&self, id: &str, poll_id: &str) -> AppResult<bool> {
        with_timeout(
            self.request_timeout,
            "date_option_belongs_to_poll",
            self.date_options.belongs_to_poll(id, poll_id),
        )
        .await
    }

    async fn get_votes(&self, poll_id: &str) -> AppResult<Vec<vote::Model>> {
        with_timeout(
            self.request_timeout,
            "get_votes",
            self.votes.find_by_poll(poll_id),
        )
        .await
    }

    async fn get_vote(&self, id: &str) -> AppResult<Option<vote::Model>> {
        with_timeout(self.request_timeout, "get_vote", self.votes.find_by_id(id)).await
    }

    async fn get_user_votes(&self, user_id: &str) -> AppResult<Vec<vote::Model>> {
        with_timeout(
            self.request_timeout,
            "get_user_votes",
            self.votes.find_by_user(user_id),
        )
        .await
    }

    async fn count_user_votes(&self, poll_id: &str, user_id: &str) -> AppResult<u64> {
        with_timeout(
            self.request_timeout,
            "count_user_votes",
            self.votes.count_by_user_and_poll(user_id, poll_id),
        )
        .await
    }

    async fn upsert_votes(
        &self,
        votes: Vec<vote::Model>,
        max_per_user: Option<u64>,
    ) -> AppResult<Vec<vote::Model>> {
        with_timeout(
            self.request_timeout,
            "upsert_votes",
            self.votes.upsert_batch(votes, max_per_user),
        )
        .await
    }

    async fn update_vote_response(
        &self,
        vote: vote::Model,
        response: VoteResponse,
    ) -> AppResult<vote::Model> {
        with_timeout(
            self.request_timeout,
            "update_vote_response",
            self.votes.update_response(vote, response),
        )
        .await
    }

    async fn delete_vote(&self, id: &str) -> AppResult<()> {
        with_timeout(self.request_timeout, "delete_vote", self.votes.delete(id)).await
    }

    async fn get_distinct_voters(&self, poll_id: &str) -> AppResult<Vec<String>> {
        with_timeout(
            self.request_timeout,
            "get_distinct_voters",
            self.votes.find_distinct_voters(poll_id),
        )
        .await
    }

    async fn get_user(&self, id: &str) -> AppResult<Option<user::Model>> {
        with_timeout(self.request_timeout, "get_user", self.users.find_by_id(id)).await
    }

    async fn get_user_by_token(&self, token: &str) -> AppResult<Option<user::Model>> {
        with_timeout(
            self.request_timeout,
            "get_user_by_token",
            self.users.find_by_token(token),
        )
        .await
    }

    async fn get_setting(&self, key: &str) -> AppResult<Option<String>> {
        with_timeout(self.request_timeout, "get_setting", self.settings.get(key)).await
    }

    async fn list_settings(&self) -> AppResult<Vec<notification_setting::Model>> {
        with_timeout(self.request_timeout, "list_settings", self.settings.list()).await
    }

    async fn put_setting(
        &self,
        key: &str,
        value: &str,
        now: DateTime<FixedOffset>,
    ) -> AppResult<notification_setting::Model> {
        with_timeout(
            self.request_timeout,
            "put_setting",
            self.settings.upsert(key, value, None, now),
        )
        .await
    }

    async fn has_pending_notification(
        &self,
        poll_id: &str,
        user_id: Option<&str>,
        kind: NotificationType,
    ) -> AppResult<bool> {
        with_timeout(
            self.request_timeout,
            "has_pending_notification",
            self.notifications.has_pending(poll_id, user_id, kind),
        )
        .await
    }

    async fn insert_notification_if_absent(&self, new: NewNotification) -> AppResult<bool> {
        with_timeout(
            self.request_timeout,
            "insert_notification_if_absent",
            self.notifications.insert_if_absent(new),
        )
        .await
    }

    async fn query_pending_notifications(
        &self,
        now: DateTime<FixedOffset>,
        limit: u64,
    ) -> AppResult<Vec<notification::Model>> {
        with_timeout(
            self.batch_timeout,
            "query_pending_notifications",
            self.notifications.find_due(now, limit),
        )
        .await
    }

    async fn update_notification_status(
        &self,
        id: &str,
        status: NotificationStatus,
        sent_at: Option<DateTime<FixedOffset>>,
        error_message: Option<String>,
    ) -> AppResult<()> {
        with_timeout(
            self.request_timeout,
            "update_notification_status",
            self.notifications
                .update_status(id, status, sent_at, error_message),
        )
        .await
    }

    async fn reschedule_notification(
        &self,
        id: &str,
        next_at: DateTime<FixedOffset>,
        attempts: i32,
        error_message: String,
    ) -> AppResult<()> {
        with_timeout(
            self.request_timeout,
            "reschedule_notification",
            self.notifications
                .reschedule(id, next_at, attempts, error_message),
        )
        .await
    }
}
