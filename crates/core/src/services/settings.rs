//! Admin-managed notification settings.

use chrono::Utc;
use meetpoll_common::{AppError, AppResult};
use meetpoll_db::entities::{notification_setting, user};

use super::{reminder::MAX_REMINDER_HOURS, store::PollStoreService};

/// Reads and updates the global notification settings.
#[derive(Clone)]
pub struct SettingsService {
    store: PollStoreService,
}

fn validate(key: &str, value: &str) -> AppResult<()> {
    if !notification_setting::KNOWN_KEYS.contains(&key) {
        return Err(AppError::InvalidRequest(format!("unknown setting {key}")));
    }

    if key == notification_setting::REMINDER_HOURS {
        return match value.parse::<i64>() {
            Ok(hours) if (0..=MAX_REMINDER_HOURS).contains(&hours) => Ok(()),
            _ => Err(AppError::InvalidRequest(format!(
                "{key} must be an integer between 0 and {MAX_REMINDER_HOURS}"
            ))),
        };
    }

    match value {
        "true" | "false" => Ok(()),
        _ => Err(AppError::InvalidRequest(format!(
            "{key} must be true or false"
        ))),
    }
}

impl SettingsService {
    #[must_use]
    pub const fn new(store: PollStoreService) -> Self {
        Self { store }
    }

    pub async fn list(&self, requester: &user::Model) -> AppResult<Vec<notification_setting::Model>> {
        require_admin(requester)?;
        self.store.list_settings().await
    }

    /// Set one setting. Admin only.
    pub async fn update(
        &self,
        requester: &user::Model,
        key: &str,
        value: &str,
    ) -> AppResult<notification_setting::Model> {
        require_admin(requester)?;
        let value = value.trim();
        validate(key, value)?;

        let saved = self
            .store
            .put_setting(key, value, Utc::now().fixed_offset())
            .await?;
        tracing::info!(key, value, by = %requester.id, "Notification setting updated");
        Ok(saved)
    }
}

fn require_admin(requester: &user::Model) -> AppResult<()> {
    if requester.is_admin {
        Ok(())
    } else {
        Err(AppError::Forbidden("admin access required".to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::store::MemoryPollStore;
    use meetpoll_db::test_utils::fixtures;
    use std::sync::Arc;

    fn admin() -> user::Model {
        let mut user = fixtures::user("admin", "Root");
        user.is_admin = true;
        user
    }

    #[tokio::test]
    async fn test_non_admin_forbidden() {
        let service = SettingsService::new(Arc::new(MemoryPollStore::new()));
        let user = fixtures::user("u1", "Ann");

        assert!(matches!(service.list(&user).await, Err(AppError::Forbidden(_))));
        assert!(matches!(
            service
                .update(&user, notification_setting::REMINDER_ENABLED, "true")
                .await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_update_and_list() {
        let store = Arc::new(MemoryPollStore::new());
        let service = SettingsService::new(store.clone());

        service
            .update(&admin(), notification_setting::REMINDER_HOURS, " 24 ")
            .await
            .unwrap();

        let settings = service.list(&admin()).await.unwrap();
        let hours = settings
            .iter()
            .find(|s| s.key == notification_setting::REMINDER_HOURS)
            .unwrap();
        assert_eq!(hours.value, "24");
    }

    #[tokio::test]
    async fn test_huge_reminder_hours_rejected() {
        let service = SettingsService::new(Arc::new(MemoryPollStore::new()));

        let result = service
            .update(&admin(), notification_setting::REMINDER_HOURS, "4294967295")
            .await;

        assert!(matches!(result, Err(AppError::InvalidRequest(_))));
        assert!(service.list(&admin()).await.unwrap().is_empty());
    }

    #[test]
    fn test_validation() {
        assert!(validate(notification_setting::REMINDER_ENABLED, "false").is_ok());
        assert!(validate(notification_setting::REMINDER_ENABLED, "yes").is_err());
        assert!(validate(notification_setting::REMINDER_HOURS, "0").is_ok());
        assert!(validate(notification_setting::REMINDER_HOURS, "-1").is_err());
        assert!(validate(notification_setting::REMINDER_HOURS, "8784").is_ok());
        assert!(validate(notification_setting::REMINDER_HOURS, "8785").is_err());
        assert!(validate("theme", "dark").is_err());
    }
}
