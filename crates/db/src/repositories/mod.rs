//! Repositories wrapping sea-orm queries per table.

pub mod date_option;
pub mod notification;
pub mod notification_setting;
pub mod poll;
pub mod user;
pub mod vote;

pub use date_option::DateOptionRepository;
pub use notification::{NewNotification, NotificationRepository};
pub use notification_setting::NotificationSettingRepository;
pub use poll::PollRepository;
pub use user::UserRepository;
pub use vote::VoteRepository;
