//! Notifications
//!
//! Email is a fire-and-forget sink. Workflows call [`send_best_effort`] so a
//! provider outage never fails a payment confirmation or a payout.

mod memory;

pub use memory::MemoryNotifier;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Notification errors
#[derive(Error, Debug, Clone)]
pub enum NotifyError {
    #[error("Email provider error ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("Email provider unreachable: {0}")]
    Network(String),

    #[error("Invalid message: {0}")]
    Invalid(String),
}

/// An outgoing email
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

impl EmailMessage {
    pub fn new(
        to: impl Into<String>,
        subject: impl Into<String>,
        html: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            html: html.into(),
            text: text.into(),
        }
    }
}

/// Notification sink
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Send and swallow failures. Returns whether the message was accepted.
pub async fn send_best_effort(notifier: &dyn Notifier, message: &EmailMessage) -> bool {
    if message.to.trim().is_empty() {
        tracing::debug!(subject = %message.subject, "No recipient; skipping email");
        return false;
    }

    match notifier.send(message).await {
        Ok(()) => {
            tracing::debug!(notifier = notifier.name(), subject = %message.subject, "Email sent");
            true
        }
        Err(e) => {
            tracing::warn!(
                notifier = notifier.name(),
                subject = %message.subject,
                error = %e,
                "Email failed; continuing"
            );
            false
        }
    }
}

/// Notifier used when no email provider is configured
#[derive(Clone, Debug, Default)]
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        tracing::info!(subject = %message.subject, "Email disabled; message dropped");
        Ok(())
    }

    fn name(&self) -> &str {
        "disabled"
    }
}
