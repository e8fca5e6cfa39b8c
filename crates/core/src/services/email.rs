//! Email gateway.
//!
//! Services send mail through [`EmailGateway`]; the server picks
//! [`SmtpEmailGateway`] when SMTP is configured and [`LogEmailGateway`]
//! otherwise.

use std::sync::Arc;

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use meetpoll_common::{AppError, config::SmtpConfig};
use thiserror::Error;

/// Delivery failure for a single message.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("no recipients")]
    NoRecipients,

    #[error("invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl From<SendError> for AppError {
    fn from(err: SendError) -> Self {
        Self::SendFailure(err.to_string())
    }
}

/// Sends one HTML email to a list of recipients.
#[async_trait]
pub trait EmailGateway: Send + Sync {
    /// The first address is the visible recipient, the rest are Bcc'd.
    async fn send(&self, to: &[String], subject: &str, html_body: &str) -> Result<(), SendError>;
}

/// Shared handle to an [`EmailGateway`].
pub type EmailService = Arc<dyn EmailGateway>;

fn mailbox(address: &str) -> Result<Mailbox, SendError> {
    address.parse().map_err(|e: lettre::address::AddressError| SendError::InvalidAddress {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

/// Build the MIME message for [`EmailGateway::send`].
pub fn build_message(
    from: &Mailbox,
    to: &[String],
    subject: &str,
    html_body: &str,
) -> Result<Message, SendError> {
    let (first, rest) = to.split_first().ok_or(SendError::NoRecipients)?;

    let mut builder = Message::builder()
        .from(from.clone())
        .to(mailbox(first)?)
        .subject(subject)
        .header(ContentType::TEXT_HTML);
    for address in rest {
        builder = builder.bcc(mailbox(address)?);
    }

    builder
        .body(html_body.to_string())
        .map_err(|e| SendError::Build(e.to_string()))
}

/// SMTP delivery through lettre.
#[derive(Clone)]
pub struct SmtpEmailGateway {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpEmailGateway {
    /// Create a gateway from SMTP settings.
    pub fn new(config: &SmtpConfig) -> Result<Self, AppError> {
        let mut builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| AppError::Config(format!("invalid SMTP relay: {e}")))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };
        builder = builder.port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let from = mailbox(&config.from)
            .map_err(|e| AppError::Config(format!("invalid SMTP sender: {e}")))?;

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl EmailGateway for SmtpEmailGateway {
    async fn send(&self, to: &[String], subject: &str, html_body: &str) -> Result<(), SendError> {
        let message = build_message(&self.from, to, subject, html_body)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;

        tracing::debug!(recipients = to.len(), subject, "Email sent");
        Ok(())
    }
}

/// Gateway that only logs; used when SMTP is not configured.
#[derive(Debug, Clone, Default)]
pub struct LogEmailGateway;

#[async_trait]
impl EmailGateway for LogEmailGateway {
    async fn send(&self, to: &[String], subject: &str, html_body: &str) -> Result<(), SendError> {
        if to.is_empty() {
            return Err(SendError::NoRecipients);
        }
        tracing::info!(
            to = ?to,
            subject,
            body_len = html_body.len(),
            "SMTP not configured, email logged instead of sent"
        );
        Ok(())
    }
}

/// Gateway that records messages, for tests.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct RecordingEmailGateway {
    sent: std::sync::Mutex<Vec<SentEmail>>,
    fail_for: std::sync::Mutex<Vec<String>>,
}

/// A message captured by [`RecordingEmailGateway`].
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub to: Vec<String>,
    pub subject: String,
    pub html_body: String,
}

#[cfg(any(test, feature = "test-utils"))]
impl RecordingEmailGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every send addressed to `address`.
    pub fn fail_for(&self, address: &str) {
        self.fail_for
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(address.to_string());
    }

    #[must_use]
    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl EmailGateway for RecordingEmailGateway {
    async fn send(&self, to: &[String], subject: &str, html_body: &str) -> Result<(), SendError> {
        if to.is_empty() {
            return Err(SendError::NoRecipients);
        }
        let failing = self
            .fail_for
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .any(|address| to.contains(address));
        if failing {
            return Err(SendError::Transport("connection refused".to_string()));
        }

        self.sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(SentEmail {
                to: to.to_vec(),
                subject: subject.to_string(),
                html_body: html_body.to_string(),
            });
        Ok(())
    }
}
