//! Notification entity: one email queued for delivery.

use std::{fmt, str::FromStr};

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Delivery status of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "sent")]
    Sent,
    #[sea_orm(string_value = "failed")]
    Failed,
}

/// Known notification kinds.
///
/// The column is stored as free text so that rows written by other services
/// with a kind this build does not know still load; see [`Model::kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    EventReminder,
    NewVote,
    NewComment,
    FinalDate,
}

impl NotificationType {
    /// Stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EventReminder => "event_reminder",
            Self::NewVote => "new_vote",
            Self::NewComment => "new_comment",
            Self::FinalDate => "final_date",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "event_reminder" => Ok(Self::EventReminder),
            "new_vote" => Ok(Self::NewVote),
            "new_comment" => Ok(Self::NewComment),
            "final_date" => Ok(Self::FinalDate),
            other => Err(format!("unknown notification type: {other}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notification")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub poll_id: String,

    /// Recipient (null means the poll creator)
    #[sea_orm(nullable)]
    pub user_id: Option<String>,

    pub notification_type: String,

    pub status: NotificationStatus,

    /// Not delivered before this instant
    pub scheduled_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub sent_at: Option<DateTimeWithTimeZone>,

    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,

    /// Failed delivery attempts so far
    #[sea_orm(default_value = 0)]
    pub attempts: i32,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    /// Parsed notification kind, `None` if the stored value is unknown.
    #[must_use]
    pub fn kind(&self) -> Option<NotificationType> {
        self.notification_type.parse().ok()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::poll::Entity",
        from = "Column::PollId",
        to = "super::poll::Column::Id",
        on_delete = "Cascade"
    )]
    Poll,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    User,
}

impl Related<super::poll::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Poll.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_round_trips_through_str() {
        for kind in [
            NotificationType::EventReminder,
            NotificationType::NewVote,
            NotificationType::NewComment,
            NotificationType::FinalDate,
        ] {
            assert_eq!(kind.as_str().parse::<NotificationType>(), Ok(kind));
        }
        assert!("digest".parse::<NotificationType>().is_err());
    }
}
