//! Background delivery of due notifications.
//!
//! The dispatcher is a single long-lived task. Each tick it fetches a batch of
//! pending notifications whose `scheduled_at` has passed, resolves the
//! recipient, renders the email and hands it to the [`EmailGateway`]. One
//! notification failing never aborts the rest of the batch.
//!
//! Failures come in two kinds. A missing poll or recipient will not fix itself
//! and marks the notification `failed` at once. A send or lookup error is
//! retried with backoff until [`RetryPolicy::max_attempts`] is reached.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use chrono_tz::Tz;
use meetpoll_common::{AppResult, Config};
use meetpoll_db::entities::notification::{self, NotificationStatus};
use serde::Serialize;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};

use super::{
    email::EmailService,
    retry::RetryPolicy,
    store::PollStoreService,
    templates::{self, TemplateContext},
};

/// Dispatcher tuning.
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub interval: Duration,
    pub batch_size: u64,
    pub frontend_url: String,
    pub timezone: Tz,
    pub retry: RetryPolicy,
}

impl DispatcherSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.notifications.interval(),
            batch_size: config.notifications.batch_size,
            frontend_url: config.server.frontend_url.clone(),
            timezone: config.notifications.tz(),
            retry: RetryPolicy::from(&config.notifications),
        }
    }
}

/// Outcome counts of one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub fetched: usize,
    pub sent: usize,
    pub failed: usize,
    pub retried: usize,
    /// Outcomes that could not be written back. Those rows stay pending and
    /// are fetched again by a later batch.
    pub unrecorded: usize,
}

enum Delivery {
    Sent,
    Permanent(String),
    Transient(String),
}

enum Retry {
    Rescheduled,
    GaveUp,
    NotWritten,
}

/// Sends due notifications by email.
#[derive(Clone)]
pub struct NotificationDispatcher {
    store: PollStoreService,
    email: EmailService,
    settings: DispatcherSettings,
}

/// Handle to a running dispatcher task.
pub struct DispatcherHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl DispatcherHandle {
    /// Signal the loop to stop and wait for it.
    ///
    /// A batch in flight runs to completion first.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Notification dispatcher task panicked");
        }
    }
}

impl NotificationDispatcher {
    #[must_use]
    pub const fn new(
        store: PollStoreService,
        email: EmailService,
        settings: DispatcherSettings,
    ) -> Self {
        Self {
            store,
            email,
            settings,
        }
    }

    /// Spawn the dispatch loop. The first batch runs immediately.
    #[must_use]
    pub fn start(self) -> DispatcherHandle {
        let (stop, mut stop_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            tracing::info!(
                interval_secs = self.settings.interval.as_secs(),
                batch_size = self.settings.batch_size,
                "Notification dispatcher started"
            );

            let mut ticker = interval(self.settings.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stop_rx.changed() => break,
                }

                match self.process_due().await {
                    Ok(report) => {
                        if report.fetched > 0 {
                            tracing::info!(
                                fetched = report.fetched,
                                sent = report.sent,
                                failed = report.failed,
                                retried = report.retried,
                                unrecorded = report.unrecorded,
                                "Processed notification batch"
                            );
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to fetch due notifications");
                    }
                }
            }

            tracing::info!("Notification dispatcher stopped");
        });

        DispatcherHandle { stop, task }
    }

    /// Process one batch of notifications due now.
    pub async fn process_due(&self) -> AppResult<DispatchReport> {
        self.process_due_at(Utc::now().fixed_offset()).await
    }

    /// Process one batch of notifications due at `now`.
    ///
    /// Only the batch fetch can fail the call; per-notification errors are
    /// recorded on the notification and counted in the report.
    pub async fn process_due_at(&self, now: DateTime<FixedOffset>) -> AppResult<DispatchReport> {
        let due = self
            .store
            .query_pending_notifications(now, self.settings.batch_size)
            .await?;

        let mut report = DispatchReport {
            fetched: due.len(),
            ..DispatchReport::default()
        };

        for notification in due {
            match self.deliver(&notification).await {
                Delivery::Sent => {
                    report.sent += 1;
                    if !self
                        .record(&notification, NotificationStatus::Sent, Some(now), None)
                        .await
                    {
                        report.unrecorded += 1;
                    }
                }
                Delivery::Permanent(reason) => {
                    tracing::warn!(id = %notification.id, reason = %reason, "Notification failed");
                    if self
                        .record(&notification, NotificationStatus::Failed, None, Some(reason))
                        .await
                    {
                        report.failed += 1;
                    } else {
                        report.unrecorded += 1;
                    }
                }
                Delivery::Transient(reason) => match self.retry(&notification, now, reason).await {
                    Retry::Rescheduled => report.retried += 1,
                    Retry::GaveUp => report.failed += 1,
                    Retry::NotWritten => report.unrecorded += 1,
                },
            }
        }

        Ok(report)
    }

    async fn deliver(&self, notification: &notification::Model) -> Delivery {
        let poll = match self.store.get_poll(&notification.poll_id).await {
            Ok(Some(poll)) => poll,
            Ok(None) => return Delivery::Permanent(format!("poll {} not found", notification.poll_id)),
            Err(e) => return Delivery::Transient(e.to_string()),
        };

        let recipient_id = notification
            .user_id
            .clone()
            .unwrap_or_else(|| poll.creator_id.clone());
        let recipient = match self.store.get_user(&recipient_id).await {
            Ok(Some(user)) => user,
            Ok(None) => return Delivery::Permanent(format!("recipient {recipient_id} not found")),
            Err(e) => return Delivery::Transient(e.to_string()),
        };
        if recipient.email.trim().is_empty() {
            return Delivery::Permanent(format!("recipient {recipient_id} has no email address"));
        }

        let final_date = match &poll.final_date {
            Some(option_id) => match self.store.get_date_option(option_id).await {
                Ok(option) => {
                    option.map(|o| templates::format_date(o.start_time, self.settings.timezone))
                }
                Err(e) => return Delivery::Transient(e.to_string()),
            },
            None => None,
        };

        let kind = notification.kind();
        if kind.is_none() {
            tracing::warn!(
                id = %notification.id,
                notification_type = %notification.notification_type,
                "Unknown notification type, sending empty body"
            );
        }

        let context = TemplateContext {
            poll_title: poll.title,
            recipient_name: recipient
                .name
                .unwrap_or_else(|| recipient.email.clone()),
            poll_url: templates::poll_url(&self.settings.frontend_url, &poll.access_code),
            final_date,
        };
        let rendered = templates::render(kind, &context);

        match self
            .email
            .send(&[recipient.email], &rendered.subject, &rendered.html)
            .await
        {
            Ok(()) => {
                tracing::debug!(id = %notification.id, recipient = %recipient_id, "Notification sent");
                Delivery::Sent
            }
            Err(e) => Delivery::Transient(e.to_string()),
        }
    }

    /// Reschedule after a transient failure, or mark failed once attempts
    /// run out.
    async fn retry(
        &self,
        notification: &notification::Model,
        now: DateTime<FixedOffset>,
        reason: String,
    ) -> Retry {
        let failed_attempts = u32::try_from(notification.attempts.saturating_add(1)).unwrap_or(0);
        let policy = &self.settings.retry;

        if !policy.should_retry(failed_attempts) {
            tracing::warn!(
                id = %notification.id,
                attempts = failed_attempts,
                reason = %reason,
                "Notification failed after final attempt"
            );
            return if self
                .record(notification, NotificationStatus::Failed, None, Some(reason))
                .await
            {
                Retry::GaveUp
            } else {
                Retry::NotWritten
            };
        }

        let delay = policy.delay_after(failed_attempts);
        let next_at = now
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::hours(6));
        tracing::info!(
            id = %notification.id,
            attempts = failed_attempts,
            next_at = %next_at,
            reason = %reason,
            "Notification delivery failed, will retry"
        );

        match self
            .store
            .reschedule_notification(
                &notification.id,
                next_at,
                notification.attempts.saturating_add(1),
                reason,
            )
            .await
        {
            Ok(()) => Retry::Rescheduled,
            Err(e) => {
                tracing::error!(error = %e, id = %notification.id, "Failed to reschedule notification");
                Retry::NotWritten
            }
        }
    }

    async fn record(
        &self,
        notification: &notification::Model,
        status: NotificationStatus,
        sent_at: Option<DateTime<FixedOffset>>,
        error_message: Option<String>,
    ) -> bool {
        match self
            .store
            .update_notification_status(&notification.id, status, sent_at, error_message)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    id = %notification.id,
                    status = ?status,
                    "Failed to record notification status"
                );
                false
            }
        }
    }
}
