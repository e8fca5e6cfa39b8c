//! Database entities.

pub mod comment;
pub mod date_option;
pub mod notification;
pub mod notification_setting;
pub mod poll;
pub mod user;
pub mod vote;

pub use comment::Entity as Comment;
pub use date_option::Entity as DateOption;
pub use notification::Entity as Notification;
pub use notification_setting::Entity as NotificationSetting;
pub use poll::Entity as Poll;
pub use user::Entity as User;
pub use vote::Entity as Vote;
