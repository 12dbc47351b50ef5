//! Webhook Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, WebhookError>;

/// Webhook verification and decoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WebhookError {
    /// No signature header on the request
    #[error("Missing signature header")]
    MissingSignature,

    /// Header timestamp is not a number
    #[error("Malformed signature header")]
    MalformedHeader,

    /// Timestamp outside the tolerance window
    #[error("Signature timestamp outside tolerance ({age_secs}s)")]
    Expired { age_secs: i64 },

    /// Signature absent from the header or not matching the body
    #[error("Signature mismatch")]
    SignatureMismatch,

    /// Verified body is not a valid event
    #[error("Webhook payload invalid: {0}")]
    Payload(String),

    /// Webhook secret not configured
    #[error("Configuration error: {0}")]
    Config(String),
}

impl WebhookError {
    /// Configuration problems are server faults; everything else is the sender's
    pub fn status_code(&self) -> u16 {
        match self {
            WebhookError::Config(_) => 500,
            _ => 400,
        }
    }
}
