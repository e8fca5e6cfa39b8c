//! Event reminder scheduling.

use chrono::{DateTime, Duration, FixedOffset, Utc};
use meetpoll_common::{AppError, AppResult, IdGenerator};
use meetpoll_db::{
    entities::{notification::NotificationType, notification_setting},
    repositories::NewNotification,
};

use super::store::PollStoreService;

/// Hours before the event used when `reminder_hours` is unset or unparseable.
pub const DEFAULT_REMINDER_HOURS: i64 = 1;

/// Largest accepted `reminder_hours` (one year).
pub const MAX_REMINDER_HOURS: i64 = 24 * 366;

/// Enqueues one `event_reminder` per participant once a poll has a final date.
#[derive(Clone)]
pub struct ReminderScheduler {
    store: PollStoreService,
    id_gen: IdGenerator,
}

impl ReminderScheduler {
    #[must_use]
    pub const fn new(store: PollStoreService) -> Self {
        Self {
            store,
            id_gen: IdGenerator::new(),
        }
    }

    /// Schedule reminders for a poll relative to the current time.
    pub async fn schedule_reminders(&self, poll_id: &str) -> AppResult<usize> {
        self.schedule_reminders_at(poll_id, Utc::now().fixed_offset())
            .await
    }

    /// Schedule reminders as if the current time were `now`.
    ///
    /// Returns how many reminders were inserted. Calling it again for the same
    /// poll inserts nothing while the earlier reminders are still pending.
    pub async fn schedule_reminders_at(
        &self,
        poll_id: &str,
        now: DateTime<FixedOffset>,
    ) -> AppResult<usize> {
        let enabled = self
            .store
            .get_setting(notification_setting::REMINDER_ENABLED)
            .await?;
        if enabled.as_deref() != Some("true") {
            tracing::debug!(poll_id, "Reminders disabled");
            return Ok(0);
        }

        let hours = self
            .store
            .get_setting(notification_setting::REMINDER_HOURS)
            .await?
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|h| (0..=MAX_REMINDER_HOURS).contains(h))
            .unwrap_or(DEFAULT_REMINDER_HOURS);

        let poll = self
            .store
            .get_poll(poll_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Poll not found: {poll_id}")))?;

        let Some(final_option_id) = poll.final_date else {
            return Ok(0);
        };

        let Some(option) = self.store.get_date_option(&final_option_id).await? else {
            tracing::warn!(poll_id, date_option_id = %final_option_id, "Final date option missing");
            return Ok(0);
        };

        let Some(reminder_at) = Duration::try_hours(hours)
            .and_then(|offset| option.start_time.checked_sub_signed(offset))
        else {
            tracing::warn!(poll_id, hours, start_time = %option.start_time, "Reminder time out of range");
            return Ok(0);
        };
        if reminder_at <= now {
            tracing::debug!(poll_id, %reminder_at, "Reminder time already passed");
            return Ok(0);
        }

        let participants = self.store.get_distinct_voters(poll_id).await?;
        let mut inserted = 0;
        for user_id in participants {
            if self
                .store
                .has_pending_notification(poll_id, Some(&user_id), NotificationType::EventReminder)
                .await?
            {
                continue;
            }

            let created = self
                .store
                .insert_notification_if_absent(NewNotification {
                    id: self.id_gen.generate(),
                    poll_id: poll_id.to_string(),
                    user_id: Some(user_id),
                    kind: NotificationType::EventReminder,
                    scheduled_at: reminder_at,
                    created_at: now,
                })
                .await?;
            if created {
                inserted += 1;
            }
        }

        tracing::info!(poll_id, count = inserted, %reminder_at, "Scheduled event reminders");
        Ok(inserted)
    }

    /// Schedule reminders in the background, logging instead of returning errors.
    pub fn spawn_schedule(&self, poll_id: String) -> tokio::task::JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            if let Err(e) = scheduler.schedule_reminders(&poll_id).await {
                tracing::error!(error = %e, poll_id = %poll_id, "Failed to schedule reminders");
            }
        })
    }
}
