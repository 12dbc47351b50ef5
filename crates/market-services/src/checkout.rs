//! Checkout initiation
//!
//! Opens a hosted checkout session for an `Active` listing. The listing is not
//! mutated here; reservation happens only when the payment webhook arrives.

use std::collections::BTreeMap;

use market_core::ledger::{CheckoutItem, CheckoutRequest};
use market_core::model::to_minor_units;
use market_core::{ListingStatus, MarketError, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;

use crate::MarketContext;

/// Metadata key carrying the listing id through the ledger
pub const LISTING_ID_METADATA: &str = "listingId";

/// Result of a checkout request
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CheckoutStarted {
    pub session_id: String,
    pub url: String,
}

/// Create a checkout session for a listing
pub async fn start_checkout(ctx: &MarketContext, listing_id: &str) -> Result<CheckoutStarted> {
    let listing_id = listing_id.trim();
    if listing_id.is_empty() {
        return Err(MarketError::BadRequest("Missing listingId".into()));
    }

    let listing = ctx.load_listing(listing_id).await?;

    if listing.locked {
        tracing::info!(listing_id, "Checkout refused: listing locked");
        return Err(MarketError::Forbidden("Listing under review.".into()));
    }

    if listing.status != ListingStatus::Active {
        tracing::info!(listing_id, status = %listing.status, "Checkout refused: listing not active");
        return Err(MarketError::conflict(
            "Item not available.",
            json!({ "status": listing.raw_status }),
        ));
    }

    let unit_amount = listing
        .price
        .filter(|p| *p > Decimal::ZERO)
        .and_then(to_minor_units)
        .filter(|cents| *cents > 0)
        .ok_or_else(|| {
            tracing::warn!(listing_id, price = ?listing.price, "Checkout refused: invalid price");
            MarketError::conflict("Item not available.", json!({ "reason": "invalid price" }))
        })?;

    let request = CheckoutRequest {
        item: CheckoutItem {
            name: listing.display_title().to_string(),
            description: None,
            unit_amount,
            currency: ctx.settings.currency.clone(),
        },
        success_url: ctx.settings.checkout_success_url(),
        cancel_url: ctx.settings.checkout_cancel_url(),
        metadata: BTreeMap::from([(LISTING_ID_METADATA.to_string(), listing.id.clone())]),
    };

    let session = ctx.ledger.create_checkout_session(&request).await?;
    tracing::info!(listing_id, session_id = %session.id, unit_amount, "Checkout session created");

    Ok(CheckoutStarted {
        session_id: session.id,
        url: session.url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_active_listing_opens_session() {
        let h = Harness::new();
        h.store
            .insert("L1", json!({ "status": "Active", "price": 1000.0, "title": "Oak Table" }))
            .await;

        let started = start_checkout(&h.ctx, "L1").await.unwrap();
        assert!(started.url.starts_with("https://checkout.test/pay/"));

        let sessions = h.ledger.sessions().await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].item.unit_amount, 100_000);
        assert_eq!(sessions[0].item.name, "Oak Table");
        assert_eq!(sessions[0].metadata.get("listingId").map(String::as_str), Some("L1"));
        assert_eq!(sessions[0].success_url, "https://showroommarket.com/success.html");

        // No reservation until payment
        assert_eq!(h.store.patch_count(), 0);
    }

    #[tokio::test]
    async fn test_locked_listing_forbidden() {
        let h = Harness::new();
        h.store
            .insert("L1", json!({ "status": "Active", "price": 10, "locked": true }))
            .await;

        let err = start_checkout(&h.ctx, "L1").await.unwrap_err();
        assert_eq!(err.status_code(), 403);
        assert!(h.ledger.sessions().await.is_empty());
    }

    #[tokio::test]
    async fn test_sold_listing_conflicts() {
        let h = Harness::new();
        h.store
            .insert("L1", json!({ "status": "Paid – Pending Pickup", "price": 10 }))
            .await;

        let err = start_checkout(&h.ctx, "L1").await.unwrap_err();
        assert_matches!(err, MarketError::Conflict { .. });
        assert_eq!(err.user_message(), "Item not available.");
    }

    #[tokio::test]
    async fn test_missing_and_unknown_listing() {
        let h = Harness::new();
        assert_eq!(start_checkout(&h.ctx, " ").await.unwrap_err().status_code(), 400);
        assert_eq!(start_checkout(&h.ctx, "nope").await.unwrap_err().status_code(), 404);
    }

    #[tokio::test]
    async fn test_zero_price_rejected() {
        let h = Harness::new();
        h.store.insert("L1", json!({ "status": "Active", "price": 0 })).await;

        let err = start_checkout(&h.ctx, "L1").await.unwrap_err();
        assert_eq!(err.status_code(), 409);
        assert!(h.ledger.sessions().await.is_empty());
    }
}
