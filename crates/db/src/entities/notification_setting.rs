//! Global key/value settings controlling notification behavior.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Whether event reminders are scheduled when a final date is set.
pub const REMINDER_ENABLED: &str = "reminder_enabled";
/// Hours before the event at which the reminder is sent.
pub const REMINDER_HOURS: &str = "reminder_hours";
/// Whether creators are told about new votes.
pub const NEW_VOTE_ENABLED: &str = "new_vote_enabled";
/// Whether creators are told about new comments.
pub const NEW_COMMENT_ENABLED: &str = "new_comment_enabled";
/// Whether participants are told when the final date is chosen.
pub const FINAL_DATE_ENABLED: &str = "final_date_enabled";

/// Every key the service understands.
pub const KNOWN_KEYS: [&str; 5] = [
    REMINDER_ENABLED,
    REMINDER_HOURS,
    NEW_VOTE_ENABLED,
    NEW_COMMENT_ENABLED,
    FINAL_DATE_ENABLED,
];

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notification_setting")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub key: String,

    pub value: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
