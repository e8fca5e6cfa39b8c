//! Business logic services.

#![allow(missing_docs)]

pub mod dispatcher;
pub mod email;
pub mod poll;
pub mod reminder;
pub mod retry;
pub mod settings;
pub mod store;
pub mod tally;
pub mod templates;
pub mod user;
pub mod vote;

pub use dispatcher::{DispatchReport, DispatcherHandle, DispatcherSettings, NotificationDispatcher};
pub use email::{EmailGateway, EmailService, LogEmailGateway, SendError, SmtpEmailGateway};
#[cfg(any(test, feature = "test-utils"))]
pub use email::{RecordingEmailGateway, SentEmail};
pub use poll::{PollDetail, PollService};
pub use reminder::ReminderScheduler;
pub use retry::RetryPolicy;
pub use settings::SettingsService;
pub use store::{DbPollStore, PollStore, PollStoreService};
#[cfg(any(test, feature = "test-utils"))]
pub use store::MemoryPollStore;
pub use tally::{DateOptionStats, TallyService};
pub use user::UserService;
pub use vote::{PollVotes, VoteItem, VoteService};
