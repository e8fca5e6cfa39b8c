//! Poll final date and read model.

use chrono::Utc;
use meetpoll_common::{AppError, AppResult, IdGenerator};
use meetpoll_db::{
    entities::{notification::NotificationType, notification_setting, poll, user},
    repositories::NewNotification,
};
use serde::Serialize;

use super::{
    reminder::ReminderScheduler,
    store::PollStoreService,
    tally::{self, DateOptionStats},
};

/// A poll together with its current tallies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollDetail {
    #[serde(flatten)]
    pub poll: poll::Model,
    pub dates: Vec<DateOptionStats>,
}

/// Poll-level operations.
#[derive(Clone)]
pub struct PollService {
    store: PollStoreService,
    reminders: ReminderScheduler,
    id_gen: IdGenerator,
}

impl PollService {
    #[must_use]
    pub const fn new(store: PollStoreService, reminders: ReminderScheduler) -> Self {
        Self {
            store,
            reminders,
            id_gen: IdGenerator::new(),
        }
    }

    /// Look a poll up by id or access code and attach its tallies.
    pub async fn get_poll_detail(&self, id_or_access_code: &str) -> AppResult<PollDetail> {
        let poll = self
            .store
            .find_poll(id_or_access_code)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Poll not found: {id_or_access_code}")))?;

        let options = self.store.get_date_options(&poll.id).await?;
        let votes = self.store.get_votes(&poll.id).await?;

        Ok(PollDetail {
            dates: tally::tally(&options, &votes),
            poll,
        })
    }

    /// Choose the final date of a poll. Creator only.
    ///
    /// Reminders are scheduled in the background. When `final_date_enabled`
    /// is set, every participant also gets a `final_date` email right away.
    pub async fn set_final_date(
        &self,
        poll_id: &str,
        requester: &user::Model,
        date_option_id: &str,
    ) -> AppResult<poll::Model> {
        let poll = self
            .store
            .get_poll(poll_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Poll not found: {poll_id}")))?;

        if poll.creator_id != requester.id {
            return Err(AppError::Forbidden(
                "only the poll creator can set the final date".to_string(),
            ));
        }

        if !self
            .store
            .date_option_belongs_to_poll(date_option_id, poll_id)
            .await?
        {
            return Err(AppError::InvalidRequest(format!(
                "invalid date option {date_option_id}"
            )));
        }

        let now = Utc::now().fixed_offset();
        let updated = self.store.set_final_date(poll, date_option_id, now).await?;
        tracing::info!(poll_id, date_option_id, "Final date set");

        self.reminders.spawn_schedule(poll_id.to_string());

        let announce = self
            .store
            .get_setting(notification_setting::FINAL_DATE_ENABLED)
            .await?;
        if announce.as_deref() == Some("true") {
            let mut queued = 0usize;
            for user_id in self.store.get_distinct_voters(poll_id).await? {
                let inserted = self
                    .store
                    .insert_notification_if_absent(NewNotification {
                        id: self.id_gen.generate(),
                        poll_id: poll_id.to_string(),
                        user_id: Some(user_id),
                        kind: NotificationType::FinalDate,
                        scheduled_at: now,
                        created_at: now,
                    })
                    .await?;
                if inserted {
                    queued += 1;
                }
            }
            tracing::debug!(poll_id, count = queued, "Queued final date notifications");
        }

        Ok(updated)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::store::MemoryPollStore;
    use meetpoll_db::{entities::vote::VoteResponse, test_utils::fixtures};
    use std::sync::Arc;

    fn setup() -> (Arc<MemoryPollStore>, PollService) {
        let store = Arc::new(MemoryPollStore::new());
        store.add_poll(fixtures::poll("p1", "creator"));
        store.add_poll(fixtures::poll("p2", "creator"));
        store.add_date_option(fixtures::date_option("d1", "p1", "2099-03-01T09:00:00Z"));
        store.add_date_option(fixtures::date_option("d2", "p1", "2099-03-02T09:00:00Z"));
        store.add_date_option(fixtures::date_option("x1", "p2", "2099-03-01T09:00:00Z"));
        store.add_vote(fixtures::vote("v1", "p1", "d1", Some("u1"), VoteResponse::Yes));
        store.add_vote(fixtures::vote("v2", "p1", "d2", Some("u2"), VoteResponse::No));
        let service = PollService::new(store.clone(), ReminderScheduler::new(store.clone()));
        (store, service)
    }

    #[tokio::test]
    async fn test_detail_by_access_code_includes_tallies() {
        let (_, service) = setup();

        let detail = service.get_poll_detail("code-p1").await.unwrap();

        assert_eq!(detail.poll.id, "p1");
        assert_eq!(detail.dates.len(), 2);
        assert_eq!(detail.dates[0].id, "d1");
        assert_eq!(detail.dates[0].yes_count, 1);
        assert_eq!(detail.dates[1].no_count, 1);
    }

    #[tokio::test]
    async fn test_detail_unknown_poll() {
        let (_, service) = setup();
        assert!(matches!(
            service.get_poll_detail("missing").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_only_creator_sets_final_date() {
        let (store, service) = setup();
        let stranger = fixtures::user("u1", "Ann");

        let result = service.set_final_date("p1", &stranger, "d1").await;

        assert!(matches!(result, Err(AppError::Forbidden(_))));
        assert!(store.poll("p1").unwrap().final_date.is_none());
    }

    #[tokio::test]
    async fn test_final_date_must_belong_to_poll() {
        let (_, service) = setup();
        let creator = fixtures::user("creator", "Cat");

        let result = service.set_final_date("p1", &creator, "x1").await;
        assert!(matches!(result, Err(AppError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_set_final_date_schedules_reminders() {
        let (store, service) = setup();
        store.set(notification_setting::REMINDER_ENABLED, "true");
        let creator = fixtures::user("creator", "Cat");

        let updated = service.set_final_date("p1", &creator, "d1").await.unwrap();
        assert_eq!(updated.final_date.as_deref(), Some("d1"));

        // Nothing but the task spawned by `set_final_date` writes reminders here.
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while store.notifications().len() < 2 {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let rows = store.notifications();
        assert_eq!(rows.len(), 2);
        for row in rows {
            assert_eq!(row.notification_type, "event_reminder");
            assert_eq!(row.scheduled_at, fixtures::at("2099-03-01T08:00:00Z"));
        }
    }

    #[tokio::test]
    async fn test_final_date_announcement_when_enabled() {
        let (store, service) = setup();
        store.set(notification_setting::FINAL_DATE_ENABLED, "true");
        let creator = fixtures::user("creator", "Cat");

        service.set_final_date("p1", &creator, "d2").await.unwrap();

        let announced: Vec<_> = store
            .notifications()
            .into_iter()
            .filter(|n| n.notification_type == "final_date")
            .collect();
        assert_eq!(announced.len(), 2);
    }
}
