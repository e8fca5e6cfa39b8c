//! Application configuration.

use serde::Deserialize;
use std::{path::Path, time::Duration};

/// Application configuration.
///
/// Built once at startup and handed to each component constructor.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// SMTP configuration. Absent means emails are only logged.
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
    /// Notification worker configuration.
    #[serde(default)]
    pub notifications: NotificationConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public URL of the web frontend, used to build poll links in emails.
    pub frontend_url: String,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Upper bound for a single request-path database call, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// SMTP relay configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    /// Relay host.
    pub host: String,
    /// Relay port.
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    /// Login user name.
    #[serde(default)]
    pub username: Option<String>,
    /// Login password.
    #[serde(default)]
    pub password: Option<String>,
    /// Sender address, e.g. `Meetpoll <noreply@example.com>`.
    pub from: String,
    /// Upgrade the connection with STARTTLS.
    #[serde(default = "default_true")]
    pub starttls: bool,
}

/// Notification scheduling and dispatch configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// Seconds between dispatcher batches.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Maximum notifications fetched per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    /// Upper bound for the batch fetch, in seconds.
    #[serde(default = "default_batch_fetch_timeout_secs")]
    pub batch_fetch_timeout_secs: u64,
    /// Delivery attempts before a notification is marked failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry, in seconds.
    #[serde(default = "default_retry_initial_delay_secs")]
    pub retry_initial_delay_secs: u64,
    /// Upper bound for the retry delay, in seconds.
    #[serde(default = "default_retry_max_delay_secs")]
    pub retry_max_delay_secs: u64,
    /// IANA time zone used when printing dates in emails.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            batch_size: default_batch_size(),
            batch_fetch_timeout_secs: default_batch_fetch_timeout_secs(),
            max_attempts: default_max_attempts(),
            retry_initial_delay_secs: default_retry_initial_delay_secs(),
            retry_max_delay_secs: default_retry_max_delay_secs(),
            timezone: default_timezone(),
        }
    }
}

impl DatabaseConfig {
    /// Request-path timeout as a [`Duration`].
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl NotificationConfig {
    /// Dispatcher tick as a [`Duration`].
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Batch fetch timeout as a [`Duration`].
    #[must_use]
    pub const fn batch_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_fetch_timeout_secs)
    }

    /// Parse the configured time zone, falling back to UTC.
    #[must_use]
    pub fn tz(&self) -> chrono_tz::Tz {
        self.timezone.parse().unwrap_or_else(|_| {
            tracing::warn!(timezone = %self.timezone, "Unknown time zone, using UTC");
            chrono_tz::UTC
        })
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    8080
}

const fn default_max_connections() -> u32 {
    20
}

const fn default_min_connections() -> u32 {
    2
}

const fn default_request_timeout_secs() -> u64 {
    5
}

const fn default_smtp_port() -> u16 {
    587
}

const fn default_true() -> bool {
    true
}

const fn default_interval_secs() -> u64 {
    300
}

const fn default_batch_size() -> u64 {
    100
}

const fn default_batch_fetch_timeout_secs() -> u64 {
    30
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_retry_initial_delay_secs() -> u64 {
    300
}

const fn default_retry_max_delay_secs() -> u64 {
    6 * 3600
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `.env` (if present, via dotenvy)
    /// 2. `config/default.toml`
    /// 3. `config/{environment}.toml` (based on `MEETPOLL_ENV`)
    /// 4. Environment variables with `MEETPOLL__` prefix, e.g. `MEETPOLL__SMTP__HOST`
    pub fn load() -> Result<Self, config::ConfigError> {
        let _ = dotenvy::dotenv();
        let env = std::env::var("MEETPOLL_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("MEETPOLL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("MEETPOLL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
