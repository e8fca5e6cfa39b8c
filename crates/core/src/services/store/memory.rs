//! In-memory [`PollStore`] for tests.
//!
//! Mirrors the database constraints the services depend on: the vote upsert
//! key, the pending-notification uniqueness index, and all-or-nothing vote
//! batches.

use std::{
    collections::{BTreeMap, HashSet},
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use meetpoll_common::{AppError, AppResult};
use meetpoll_db::{
    entities::{
        date_option,
        notification::{self, NotificationStatus, NotificationType},
        notification_setting, poll, user,
        vote::{self, VoteResponse},
    },
    repositories::NewNotification,
};

use super::PollStore;

#[derive(Default)]
struct State {
    users: Vec<user::Model>,
    polls: Vec<poll::Model>,
    date_options: Vec<date_option::Model>,
    votes: Vec<vote::Model>,
    notifications: Vec<notification::Model>,
    settings: BTreeMap<String, String>,
    fail_vote_writes: bool,
    fail_status_updates: bool,
}

/// Thread-safe in-memory store.
#[derive(Default)]
pub struct MemoryPollStore {
    state: Mutex<State>,
}

impl MemoryPollStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_user(&self, user: user::Model) {
        self.state().users.push(user);
    }

    pub fn add_poll(&self, poll: poll::Model) {
        self.state().polls.push(poll);
    }

    pub fn add_date_option(&self, option: date_option::Model) {
        self.state().date_options.push(option);
    }

    pub fn add_vote(&self, vote: vote::Model) {
        self.state().votes.push(vote);
    }

    pub fn add_notification(&self, notification: notification::Model) {
        self.state().notifications.push(notification);
    }

    pub fn set(&self, key: &str, value: &str) {
        self.state()
            .settings
            .insert(key.to_string(), value.to_string());
    }

    /// Make every subsequent vote batch fail before anything is stored.
    pub fn fail_vote_writes(&self, fail: bool) {
        self.state().fail_vote_writes = fail;
    }

    /// Make notification status updates and reschedules fail.
    pub fn fail_status_updates(&self, fail: bool) {
        self.state().fail_status_updates = fail;
    }

    #[must_use]
    pub fn votes(&self) -> Vec<vote::Model> {
        self.state().votes.clone()
    }

    #[must_use]
    pub fn notifications(&self) -> Vec<notification::Model> {
        self.state().notifications.clone()
    }

    #[must_use]
    pub fn poll(&self, id: &str) -> Option<poll::Model> {
        self.state().polls.iter().find(|p| p.id == id).cloned()
    }
}

#[async_trait]
impl PollStore for MemoryPollStore {
    async fn get_poll(&self, id: &str) -> AppResult<Option<poll::Model>> {
        Ok(self.poll(id))
    }

    async fn find_poll(&self, key: &str) -> AppResult<Option<poll::Model>> {
        Ok(self
            .state()
            .polls
            .iter()
            .find(|p| p.id == key || p.access_code == key)
            .cloned())
    }

    async fn set_final_date(
        &self,
        poll: poll::Model,
        date_option_id: &str,
        now: DateTime<FixedOffset>,
    ) -> AppResult<poll::Model> {
        let mut state = self.state();
        let stored = state
            .polls
            .iter_mut()
            .find(|p| p.id == poll.id)
            .ok_or_else(|| AppError::Database("poll row vanished".to_string()))?;
        stored.final_date = Some(date_option_id.to_string());
        stored.updated_at = now;
        Ok(stored.clone())
    }

    async fn get_date_options(&self, poll_id: &str) -> AppResult<Vec<date_option::Model>> {
        let mut options: Vec<_> = self
            .state()
            .date_options
            .iter()
            .filter(|o| o.poll_id == poll_id)
            .cloned()
            .collect();
        options.sort_by_key(|o| o.start_time);
        Ok(options)
    }

    async fn get_date_option(&self, id: &str) -> AppResult<Option<date_option::Model>> {
        Ok(self
            .state()
            .date_options
            .iter()
            .find(|o| o.id == id)
            .cloned())
    }

    async fn date_option_belongs_to_poll(&self, id: &str, poll_id: &str) -> AppResult<bool> {
        Ok(self
            .state()
            .date_options
            .iter()
            .any(|o| o.id == id && o.poll_id == poll_id))
    }

    async fn get_votes(&self, poll_id: &str) -> AppResult<Vec<vote::Model>> {
        Ok(self
            .state()
            .votes
            .iter()
            .filter(|v| v.poll_id == poll_id)
            .cloned()
            .collect())
    }

    async fn get_vote(&self, id: &str) -> AppResult<Option<vote::Model>> {
        Ok(self.state().votes.iter().find(|v| v.id == id).cloned())
    }

    async fn get_user_votes(&self, user_id: &str) -> AppResult<Vec<vote::Model>> {
        Ok(self
            .state()
            .votes
            .iter()
            .filter(|v| v.user_id.as_deref() == Some(user_id))
            .cloned()
            .collect())
    }

    async fn count_user_votes(&self, poll_id: &str, user_id: &str) -> AppResult<u64> {
        Ok(self
            .state()
            .votes
            .iter()
            .filter(|v| v.poll_id == poll_id && v.user_id.as_deref() == Some(user_id))
            .count() as u64)
    }

    async fn upsert_votes(
        &self,
        votes: Vec<vote::Model>,
        max_per_user: Option<u64>,
    ) -> AppResult<Vec<vote::Model>> {
        let mut state = self.state();
        if state.fail_vote_writes {
            return Err(AppError::Database("vote write failed".to_string()));
        }

        if let Some(max) = max_per_user
            && let Some(first) = votes.first()
            && let Some(user_id) = first.user_id.as_deref()
        {
            let existing = state
                .votes
                .iter()
                .filter(|v| v.poll_id == first.poll_id && v.user_id.as_deref() == Some(user_id))
                .count();
            if existing + votes.len() > max as usize {
                return Err(AppError::InvalidRequest(format!(
                    "vote limit exceeded: {existing} existing and {} new, maximum {max}",
                    votes.len()
                )));
            }
        }

        // Stage on a copy so a batch is all-or-nothing.
        let mut staged = state.votes.clone();
        let mut stored = Vec::with_capacity(votes.len());
        for vote in votes {
            let existing = vote.user_id.as_ref().and_then(|uid| {
                staged.iter().position(|v| {
                    v.poll_id == vote.poll_id
                        && v.date_option_id == vote.date_option_id
                        && v.user_id.as_ref() == Some(uid)
                })
            });
            if let Some(idx) = existing {
                let row = &mut staged[idx];
                row.response = vote.response;
                row.user_name = vote.user_name;
                stored.push(row.clone());
            } else {
                staged.push(vote.clone());
                stored.push(vote);
            }
        }
        state.votes = staged;
        Ok(stored)
    }

    async fn update_vote_response(
        &self,
        vote: vote::Model,
        response: VoteResponse,
    ) -> AppResult<vote::Model> {
        let mut state = self.state();
        let row = state
            .votes
            .iter_mut()
            .find(|v| v.id == vote.id)
            .ok_or_else(|| AppError::Database("vote row vanished".to_string()))?;
        row.response = response;
        Ok(row.clone())
    }

    async fn delete_vote(&self, id: &str) -> AppResult<()> {
        self.state().votes.retain(|v| v.id != id);
        Ok(())
    }

    async fn get_distinct_voters(&self, poll_id: &str) -> AppResult<Vec<String>> {
        let state = self.state();
        let mut seen = HashSet::new();
        Ok(state
            .votes
            .iter()
            .filter(|v| v.poll_id == poll_id)
            .filter_map(|v| v.user_id.clone())
            .filter(|uid| seen.insert(uid.clone()))
            .collect())
    }

    async fn get_user(&self, id: &str) -> AppResult<Option<user::Model>> {
        Ok(self.state().users.iter().find(|u| u.id == id).cloned())
    }

    async fn get_user_by_token(&self, token: &str) -> AppResult<Option<user::Model>> {
        Ok(self
            .state()
            .users
            .iter()
            .find(|u| u.token.as_deref() == Some(token))
            .cloned())
    }

    async fn get_setting(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.state().settings.get(key).cloned())
    }

    async fn list_settings(&self) -> AppResult<Vec<notification_setting::Model>> {
        let updated_at = chrono::DateTime::<chrono::Utc>::UNIX_EPOCH.fixed_offset();
        Ok(self
            .state()
            .settings
            .iter()
            .map(|(key, value)| notification_setting::Model {
                key: key.clone(),
                value: value.clone(),
                description: None,
                updated_at,
            })
            .collect())
    }

    async fn put_setting(
        &self,
        key: &str,
        value: &str,
        now: DateTime<FixedOffset>,
    ) -> AppResult<notification_setting::Model> {
        self.set(key, value);
        Ok(notification_setting::Model {
            key: key.to_string(),
            value: value.to_string(),
            description: None,
            updated_at: now,
        })
    }

    async fn has_pending_notification(
        &self,
        poll_id: &str,
        user_id: Option<&str>,
        kind: NotificationType,
    ) -> AppResult<bool> {
        Ok(self.state().notifications.iter().any(|n| {
            n.poll_id == poll_id
                && n.user_id.as_deref() == user_id
                && n.notification_type == kind.as_str()
                && n.status == NotificationStatus::Pending
        }))
    }

    async fn insert_notification_if_absent(&self, new: NewNotification) -> AppResult<bool> {
        let mut state = self.state();
        // Same semantics as the partial unique index: NULL recipients never collide.
        let duplicate = new.user_id.is_some()
            && state.notifications.iter().any(|n| {
                n.poll_id == new.poll_id
                    && n.user_id == new.user_id
                    && n.notification_type == new.kind.as_str()
                    && n.status == NotificationStatus::Pending
            });
        if duplicate {
            return Ok(false);
        }

        state.notifications.push(notification::Model {
            id: new.id,
            poll_id: new.poll_id,
            user_id: new.user_id,
            notification_type: new.kind.as_str().to_string(),
            status: NotificationStatus::Pending,
            scheduled_at: new.scheduled_at,
            sent_at: None,
            error_message: None,
            attempts: 0,
            created_at: new.created_at,
        });
        Ok(true)
    }

    async fn query_pending_notifications(
        &self,
        now: DateTime<FixedOffset>,
        limit: u64,
    ) -> AppResult<Vec<notification::Model>> {
        let mut due: Vec<_> = self
            .state()
            .notifications
            .iter()
            .filter(|n| n.status == NotificationStatus::Pending && n.scheduled_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|n| n.scheduled_at);
        due.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(due)
    }

    async fn update_notification_status(
        &self,
        id: &str,
        status: NotificationStatus,
        sent_at: Option<DateTime<FixedOffset>>,
        error_message: Option<String>,
    ) -> AppResult<()> {
        let mut state = self.state();
        if state.fail_status_updates {
            return Err(AppError::Database("status update failed".to_string()));
        }
        if let Some(row) = state.notifications.iter_mut().find(|n| n.id == id) {
            row.status = status;
            row.sent_at = sent_at;
            row.error_message = error_message;
            if status == NotificationStatus::Failed {
                row.attempts += 1;
            }
        }
        Ok(())
    }

    async fn reschedule_notification(
        &self,
        id: &str,
        next_at: DateTime<FixedOffset>,
        attempts: i32,
        error_message: String,
    ) -> AppResult<()> {
        let mut state = self.state();
        if state.fail_status_updates {
            return Err(AppError::Database("status update failed".to_string()));
        }
        if let Some(row) = state.notifications.iter_mut().find(|n| n.id == id) {
            row.scheduled_at = next_at;
            row.attempts = attempts;
            row.error_message = Some(error_message);
        }
        Ok(())
    }
}
