//! Common utilities and shared types for meetpoll.
//!
//! This crate provides foundational components used across all meetpoll crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **ID Generation**: UUID-based identifiers via [`IdGenerator`]
//! - **Timeouts**: Bounded persistence calls via [`with_timeout`]
//!
//! # Example
//!
//! ```no_run
//! use meetpoll_common::{Config, IdGenerator, AppResult};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     let id_gen = IdGenerator::new();
//!     let id = id_gen.generate();
//!     println!("Listening on {}:{}, first id {id}", config.server.host, config.server.port);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod id;
pub mod timeout;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use id::IdGenerator;
pub use timeout::with_timeout;
