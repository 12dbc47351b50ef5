//! Decoded ledger webhook events
//!
//! Only the fields the workflows read are kept. Decoding from the provider's
//! wire format lives with the provider adapter.

use serde::{Deserialize, Serialize};

/// A verified webhook event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub id: String,
    /// Provider event type, e.g. `checkout.session.completed`
    pub event_type: String,
    pub kind: LedgerEventKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerEventKind {
    CheckoutCompleted(CompletedCheckout),
    Dispute(DisputeEvent),
    Refund(RefundEvent),
    /// Recognized but ignored
    Other,
}

/// A completed hosted checkout
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedCheckout {
    pub session_id: String,
    pub listing_id: Option<String>,
    pub payment_intent: Option<String>,
    pub buyer_email: Option<String>,
    /// `paid`, `unpaid` or `no_payment_required`
    pub payment_status: Option<String>,
    pub amount_total: Option<i64>,
}

impl CompletedCheckout {
    /// Delayed payment methods complete the session before funds arrive
    pub fn is_paid(&self) -> bool {
        !matches!(self.payment_status.as_deref(), Some("unpaid"))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputePhase {
    Created,
    Updated,
    Closed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeEvent {
    pub dispute_id: String,
    pub phase: DisputePhase,
    /// Provider status: `needs_response`, `under_review`, `won`, `lost`, ...
    pub status: String,
    pub payment_intent: Option<String>,
    pub charge_id: Option<String>,
    pub reason: Option<String>,
    pub amount: Option<i64>,
}

impl DisputeEvent {
    /// Only a dispute resolved in the seller's favor releases the freeze
    pub fn is_won(&self) -> bool {
        self.status.eq_ignore_ascii_case("won")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundEvent {
    /// Charge or refund object id
    pub object_id: String,
    pub payment_intent: Option<String>,
    pub amount: Option<i64>,
}

impl LedgerEventKind {
    /// Payment intent the event refers to, used to locate the listing
    pub fn payment_intent(&self) -> Option<&str> {
        match self {
            LedgerEventKind::CheckoutCompleted(c) => c.payment_intent.as_deref(),
            LedgerEventKind::Dispute(d) => d.payment_intent.as_deref(),
            LedgerEventKind::Refund(r) => r.payment_intent.as_deref(),
            LedgerEventKind::Other => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispute(status: &str) -> DisputeEvent {
        DisputeEvent {
            dispute_id: "dp_1".into(),
            phase: DisputePhase::Closed,
            status: status.into(),
            payment_intent: Some("pi_1".into()),
            charge_id: None,
            reason: None,
            amount: None,
        }
    }

    #[test]
    fn test_only_won_releases() {
        assert!(dispute("won").is_won());
        assert!(!dispute("lost").is_won());
        assert!(!dispute("under_review").is_won());
        assert!(!dispute("warning_closed").is_won());
    }

    #[test]
    fn test_unpaid_checkout() {
        let mut checkout = CompletedCheckout {
            session_id: "cs_1".into(),
            ..Default::default()
        };
        assert!(checkout.is_paid());
        checkout.payment_status = Some("unpaid".into());
        assert!(!checkout.is_paid());
    }
}
