//! Ledger event dispatch
//!
//! Routes a verified, decoded event to the workflow that owns it. Event types
//! nobody handles are acknowledged so the provider stops redelivering them.

use market_core::{LedgerEvent, LedgerEventKind, Result};
use serde::Serialize;

use crate::MarketContext;
use crate::dispute::{self, DisputeOutcome};
use crate::payment::{self, PaymentOutcome};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "handled", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Payment { result: PaymentOutcome },
    Dispute { result: DisputeOutcome },
    Ignored { event_type: String },
}

/// Handle a verified ledger event
pub async fn handle_event(ctx: &MarketContext, event: &LedgerEvent) -> Result<WebhookOutcome> {
    tracing::info!(event_id = %event.id, event_type = %event.event_type, "Ledger event received");

    let outcome = match &event.kind {
        LedgerEventKind::CheckoutCompleted(checkout) => WebhookOutcome::Payment {
            result: payment::confirm_payment(ctx, checkout).await?,
        },
        LedgerEventKind::Dispute(dispute) => WebhookOutcome::Dispute {
            result: dispute::handle_dispute(ctx, dispute).await?,
        },
        LedgerEventKind::Refund(refund) => WebhookOutcome::Dispute {
            result: dispute::handle_refund(ctx, refund).await?,
        },
        LedgerEventKind::Other => {
            tracing::debug!(event_type = %event.event_type, "Ignoring ledger event");
            WebhookOutcome::Ignored {
                event_type: event.event_type.clone(),
            }
        }
    };

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use assert_matches::assert_matches;
    use market_core::ledger::CompletedCheckout;
    use serde_json::json;

    #[tokio::test]
    async fn test_checkout_routed_to_payment() {
        let h = Harness::new();
        h.store.insert("L1", json!({ "status": "Active" })).await;

        let event = LedgerEvent {
            id: "evt_1".into(),
            event_type: "checkout.session.completed".into(),
            kind: LedgerEventKind::CheckoutCompleted(CompletedCheckout {
                session_id: "cs_1".into(),
                listing_id: Some("L1".into()),
                ..CompletedCheckout::default()
            }),
        };

        let outcome = handle_event(&h.ctx, &event).await.unwrap();
        assert_matches!(
            outcome,
            WebhookOutcome::Payment {
                result: PaymentOutcome::Confirmed { .. }
            }
        );
    }

    #[tokio::test]
    async fn test_other_events_ignored() {
        let h = Harness::new();
        let event = LedgerEvent {
            id: "evt_2".into(),
            event_type: "customer.created".into(),
            kind: LedgerEventKind::Other,
        };

        let outcome = handle_event(&h.ctx, &event).await.unwrap();
        assert_eq!(
            outcome,
            WebhookOutcome::Ignored {
                event_type: "customer.created".into()
            }
        );
        assert_eq!(h.store.patch_count(), 0);
    }
}
