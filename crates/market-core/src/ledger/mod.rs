//! Ledger
//!
//! Contract for the payments provider: hosted checkout, transfers to seller
//! accounts, connected-account onboarding, and the decoded webhook events.

mod event;
mod memory;

pub use event::{CompletedCheckout, DisputeEvent, DisputePhase, LedgerEvent, LedgerEventKind, RefundEvent};
pub use memory::MemoryLedger;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for ledger operations
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Ledger errors
#[derive(Error, Debug, Clone)]
pub enum LedgerError {
    /// Provider returned an error response
    #[error("Ledger API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Provider refused the request (invalid parameters, account not ready, etc.)
    #[error("Ledger rejected request: {0}")]
    Rejected(String),

    /// Transport failure
    #[error("Ledger unreachable: {0}")]
    Network(String),

    /// Request exceeded its deadline
    #[error("Ledger timed out after {0}s")]
    Timeout(u64),

    /// Adapter misconfigured
    #[error("Ledger configuration error: {0}")]
    Config(String),
}

impl LedgerError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::Api { status, .. } => *status >= 500 || *status == 429,
            LedgerError::Network(_) | LedgerError::Timeout(_) => true,
            LedgerError::Rejected(_) | LedgerError::Config(_) => false,
        }
    }
}

/// A single purchasable item
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutItem {
    pub name: String,
    pub description: Option<String>,
    /// Price in minor units (cents)
    pub unit_amount: i64,
    pub currency: String,
}

/// Request to open a hosted checkout session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub item: CheckoutItem,
    pub success_url: String,
    pub cancel_url: String,
    /// Round-tripped on the completed-payment event (`listingId` lives here)
    pub metadata: BTreeMap<String, String>,
}

/// An open checkout session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    /// URL to redirect the buyer to
    pub url: String,
}

/// Request to move funds to a connected account
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Amount in minor units
    pub amount: i64,
    pub currency: String,
    pub destination: String,
    /// Identical keys collapse to a single transfer at the provider
    pub idempotency_key: String,
    pub transfer_group: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

/// An executed transfer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub destination: Option<String>,
    pub transfer_group: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedAccount {
    pub id: String,
}

/// Hosted onboarding link for a connected account
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountLink {
    pub url: String,
    /// Unix seconds
    pub expires_at: Option<i64>,
}

/// Ledger trait
///
/// Implement this for each payments backend.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> LedgerResult<CheckoutSession>;

    /// Create a transfer; must honor `request.idempotency_key`
    async fn create_transfer(&self, request: &TransferRequest) -> LedgerResult<Transfer>;

    /// Create an express connected account that can receive transfers
    async fn create_connected_account(
        &self,
        email: Option<&str>,
        display_name: Option<&str>,
    ) -> LedgerResult<ConnectedAccount>;

    async fn create_account_link(
        &self,
        account_id: &str,
        refresh_url: &str,
        return_url: &str,
    ) -> LedgerResult<AccountLink>;

    /// Transfers tagged with a transfer group
    async fn list_transfers_by_group(&self, group: &str) -> LedgerResult<Vec<Transfer>>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Idempotency key for a payout. Retrying with the same inputs yields the same key.
pub fn transfer_idempotency_key(listing_id: &str, destination: &str, amount_minor: i64) -> String {
    format!("payout_{listing_id}_{destination}_{amount_minor}")
}

/// Transfer group tagging every payout for a listing
pub fn transfer_group(listing_id: &str) -> String {
    format!("listing_{listing_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotency_key_is_deterministic() {
        let a = transfer_idempotency_key("L1", "acct_1", 80_000);
        let b = transfer_idempotency_key("L1", "acct_1", 80_000);
        assert_eq!(a, b);
        assert_eq!(a, "payout_L1_acct_1_80000");
        assert_ne!(a, transfer_idempotency_key("L1", "acct_1", 80_001));
        assert_ne!(a, transfer_idempotency_key("L1", "acct_2", 80_000));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(LedgerError::Api { status: 503, message: String::new() }.is_retryable());
        assert!(LedgerError::Timeout(20).is_retryable());
        assert!(!LedgerError::Api { status: 400, message: String::new() }.is_retryable());
        assert!(!LedgerError::Rejected("insufficient funds".into()).is_retryable());
    }
}
