//! Error Types

use serde_json::Value;
use thiserror::Error;

use crate::credential::CredentialError;
use crate::ledger::LedgerError;
use crate::store::StoreError;

/// Result type alias for marketplace operations
pub type Result<T> = std::result::Result<T, MarketError>;

/// Marketplace error types
#[derive(Error, Debug)]
pub enum MarketError {
    /// Malformed input
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Caller may not perform this action on this listing
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Unknown listing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Listing is in the wrong state for the request; `detail` carries the
    /// current state so the caller can reconcile
    #[error("Conflict: {message}")]
    Conflict { message: String, detail: Value },

    /// Attempted status change not in the transition table
    #[error("Illegal transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    /// Record store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Ledger failure
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Webhook signature rejected
    #[error("Signature verification failed: {0}")]
    Signature(String),

    /// Server misconfigured
    #[error("Configuration error: {0}")]
    Config(String),
}

impl MarketError {
    pub fn conflict(message: impl Into<String>, detail: Value) -> Self {
        MarketError::Conflict {
            message: message.into(),
            detail,
        }
    }

    /// HTTP status for this error
    pub fn status_code(&self) -> u16 {
        match self {
            MarketError::BadRequest(_) | MarketError::Signature(_) => 400,
            MarketError::Unauthorized(_) => 401,
            MarketError::Forbidden(_) => 403,
            MarketError::NotFound(_) | MarketError::Store(StoreError::NotFound(_)) => 404,
            MarketError::Conflict { .. } | MarketError::IllegalTransition { .. } => 409,
            MarketError::Store(_) | MarketError::Ledger(_) | MarketError::Config(_) => 500,
        }
    }

    /// Short machine-readable code for response envelopes
    pub fn code(&self) -> &'static str {
        match self {
            MarketError::BadRequest(_) => "bad_request",
            MarketError::Unauthorized(_) => "unauthorized",
            MarketError::Forbidden(_) => "forbidden",
            MarketError::NotFound(_) | MarketError::Store(StoreError::NotFound(_)) => "not_found",
            MarketError::Conflict { .. } => "conflict",
            MarketError::IllegalTransition { .. } => "illegal_transition",
            MarketError::Store(_) => "store_error",
            MarketError::Ledger(_) => "ledger_error",
            MarketError::Signature(_) => "invalid_signature",
            MarketError::Config(_) => "config_error",
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            MarketError::Store(e) => e.is_retryable(),
            MarketError::Ledger(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Message safe to show buyers and sellers; never echoes upstream bodies
    pub fn user_message(&self) -> String {
        match self {
            MarketError::BadRequest(msg) | MarketError::Forbidden(msg) => msg.clone(),
            MarketError::Conflict { message, .. } => message.clone(),
            MarketError::Unauthorized(_) => "Unauthorized.".into(),
            MarketError::NotFound(_) | MarketError::Store(StoreError::NotFound(_)) => "Listing not found.".into(),
            MarketError::IllegalTransition { .. } => "Item not available.".into(),
            MarketError::Signature(_) => "Invalid signature.".into(),
            _ => "Something went wrong. Please try again.".into(),
        }
    }

    /// Structured detail for conflict responses
    pub fn detail(&self) -> Option<&Value> {
        match self {
            MarketError::Conflict { detail, .. } => Some(detail),
            _ => None,
        }
    }
}

impl From<CredentialError> for MarketError {
    fn from(err: CredentialError) -> Self {
        MarketError::BadRequest(format!("Invalid pickup code: {err}"))
    }
}
