//! Core business logic for meetpoll.
//!
//! Vote aggregation, tallies, reminder scheduling and notification dispatch.
//! Persistence is reached through [`PollStore`] and email through
//! [`EmailGateway`], so every service can run against in-memory fakes.

pub mod services;

pub use services::*;
