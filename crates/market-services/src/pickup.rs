//! Pickup verification
//!
//! Checks a scanned pickup code against its listing and records the pickup.
//! Each credential confirms exactly once: a repeat scan reports the existing
//! confirmation as a conflict and never rewrites it.

use chrono::{DateTime, Utc};
use market_core::model::fields;
use market_core::store::ListingPatch;
use market_core::{ListingStatus, MarketError, Result, ScannedCredential};
use serde::Serialize;
use serde_json::json;

use crate::MarketContext;
use crate::settlement::{self, SettlementOutcome};

/// A recorded pickup
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PickupConfirmed {
    pub listing_id: String,
    pub pickup_confirmed_at: DateTime<Utc>,
    pub status: String,
}

/// Pickup plus the payout attempt that followed it
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PickupReport {
    #[serde(flatten)]
    pub pickup: PickupConfirmed,
    pub payout_attempted: bool,
    /// Absent when the attempt itself errored
    pub payout: Option<SettlementOutcome>,
    pub payout_error: Option<String>,
}

/// Verify a scanned payload and mark the listing picked up
pub async fn verify_pickup(ctx: &MarketContext, scanned: &str) -> Result<PickupConfirmed> {
    let credential = ScannedCredential::parse(scanned).map_err(|e| {
        tracing::info!(error = %e, "Malformed pickup code");
        MarketError::from(e)
    })?;
    let listing = ctx.load_listing(&credential.listing_id).await?;

    if listing.pickup_confirmed {
        tracing::info!(listing_id = %listing.id, "Repeat pickup scan");
        return Err(MarketError::conflict(
            "Pickup already confirmed",
            json!({
                "pickup_confirmed_at": listing.pickup_confirmed_at,
                "seller_payout_status": listing.seller_payout_status.as_ref().map(|s| s.as_str().to_string()),
                "status": listing.raw_status,
            }),
        ));
    }

    if !credential.matches(&listing) {
        tracing::warn!(listing_id = %listing.id, "Pickup code mismatch");
        return Err(MarketError::Unauthorized("Pickup code does not match".into()));
    }

    if listing.status != ListingStatus::PaidPendingPickup {
        tracing::info!(listing_id = %listing.id, status = %listing.status, "Pickup scan for unpaid listing");
        return Err(MarketError::conflict(
            "Listing is not awaiting pickup",
            json!({ "status": listing.raw_status }),
        ));
    }

    let now = Utc::now();
    let patch = ListingPatch::new()
        .transition(&listing.status, ListingStatus::PickedUp)?
        .set(fields::PICKUP_CONFIRMED, true)
        .timestamp(fields::PICKUP_CONFIRMED_AT, now);
    let updated = ctx.patch_listing(&listing.id, &patch).await?;

    tracing::info!(listing_id = %listing.id, "Pickup confirmed");

    Ok(PickupConfirmed {
        listing_id: updated.id,
        pickup_confirmed_at: updated.pickup_confirmed_at.unwrap_or(now),
        status: updated.raw_status,
    })
}

/// Confirm pickup, then try the payout against a fresh copy of the listing.
///
/// A failed payout does not undo or hide the pickup; it is reported alongside.
pub async fn verify_pickup_and_payout(ctx: &MarketContext, scanned: &str) -> Result<PickupReport> {
    let pickup = verify_pickup(ctx, scanned).await?;

    let report = match settlement::settle_listing(ctx, &pickup.listing_id).await {
        Ok(outcome) => PickupReport {
            payout_attempted: outcome.payout_attempted(),
            payout_error: match &outcome {
                SettlementOutcome::Failed { error, .. } => Some(error.clone()),
                _ => None,
            },
            payout: Some(outcome),
            pickup,
        },
        Err(e) => {
            tracing::error!(listing_id = %pickup.listing_id, error = %e, "Payout after pickup errored");
            PickupReport {
                payout_attempted: false,
                payout: None,
                payout_error: Some(e.to_string()),
                pickup,
            }
        }
    };

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use assert_matches::assert_matches;
    use chrono::Duration;

    async fn seed_paid(h: &Harness) {
        h.store
            .insert(
                "L1",
                json!({
                    "status": "Paid – Pending Pickup",
                    "seller_payout_amount": 800.0,
                    "stripe_account_id": "acct_seller",
                    "seller_payout_status": "Pending",
                    "pickup_qr_token": "abcdef12",
                    "pickup_qr_payload": "MKT|L1|abcdef12",
                    "payout_eligible_at": (Utc::now() + Duration::hours(20)).to_rfc3339(),
                }),
            )
            .await;
    }

    #[tokio::test]
    async fn test_valid_scan_confirms() {
        let h = Harness::new();
        seed_paid(&h).await;

        let confirmed = verify_pickup(&h.ctx, "MKT|L1|abcdef12").await.unwrap();
        assert_eq!(confirmed.listing_id, "L1");
        assert_eq!(confirmed.status, "Picked Up");
        assert_eq!(h.field("L1", "pickup_confirmed").await, Some(json!(true)));
    }

    #[tokio::test]
    async fn test_second_scan_conflicts_without_rewrite() {
        let h = Harness::new();
        seed_paid(&h).await;

        verify_pickup(&h.ctx, "MKT|L1|abcdef12").await.unwrap();
        let first_at = h.field("L1", "pickup_confirmed_at").await;

        for payload in ["MKT|L1|abcdef12", "MKT|L1|WRONGTOKEN"] {
            let err = verify_pickup(&h.ctx, payload).await.unwrap_err();
            assert_eq!(err.status_code(), 409);
            assert!(err.detail().is_some_and(|d| d.get("pickup_confirmed_at").is_some()));
        }

        assert_eq!(h.field("L1", "pickup_confirmed_at").await, first_at);
        assert_eq!(h.store.patch_count(), 1);
    }

    #[tokio::test]
    async fn test_wrong_token_unauthorized() {
        let h = Harness::new();
        seed_paid(&h).await;
        let before = h.store.fields("L1").await;

        let err = verify_pickup(&h.ctx, "MKT|L1|WRONGTOKEN").await.unwrap_err();
        assert_matches!(err, MarketError::Unauthorized(_));
        assert_eq!(err.status_code(), 401);
        assert_eq!(h.store.fields("L1").await, before);
    }

    #[tokio::test]
    async fn test_malformed_payloads_rejected_before_lookup() {
        let h = Harness::new();
        seed_paid(&h).await;

        for payload in ["", "MKT|L1", "XYZ|L1|abcdef12", "MKT||abcdef12", "MKT|L1|short"] {
            let err = verify_pickup(&h.ctx, payload).await.unwrap_err();
            assert_eq!(err.status_code(), 400, "{payload:?}");
        }
        assert_eq!(h.store.patch_count(), 0);
    }

    #[tokio::test]
    async fn test_percent_encoded_scan_accepted() {
        let h = Harness::new();
        seed_paid(&h).await;

        assert!(verify_pickup(&h.ctx, "MKT%7CL1%7Cabcdef12").await.is_ok());
    }

    #[tokio::test]
    async fn test_unpaid_listing_conflicts() {
        let h = Harness::new();
        h.store
            .insert("L1", json!({ "status": "Active", "pickup_qr_token": "abcdef12" }))
            .await;

        let err = verify_pickup(&h.ctx, "MKT|L1|abcdef12").await.unwrap_err();
        assert_eq!(err.status_code(), 409);
        assert_eq!(h.store.patch_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_listing_not_found() {
        let h = Harness::new();
        let err = verify_pickup(&h.ctx, "MKT|L9|abcdef12").await.unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_pickup_inside_hold_reports_skip() {
        let h = Harness::new();
        seed_paid(&h).await;

        let report = verify_pickup_and_payout(&h.ctx, "MKT|L1|abcdef12").await.unwrap();
        assert!(!report.payout_attempted);
        assert_eq!(
            report.payout,
            Some(SettlementOutcome::Skipped {
                reason: "Hold window not complete".into()
            })
        );
        assert_eq!(h.ledger.transfer_calls(), 0);
    }

    #[tokio::test]
    async fn test_payout_failure_keeps_pickup() {
        let h = Harness::new();
        seed_paid(&h).await;
        h.store
            .insert("L1", {
                let mut f = serde_json::Value::Object(h.store.fields("L1").await.unwrap_or_default());
                f["payout_eligible_at"] = json!((Utc::now() - Duration::hours(1)).to_rfc3339());
                f
            })
            .await;
        h.ledger.set_fail_transfers(true);

        let report = verify_pickup_and_payout(&h.ctx, "MKT|L1|abcdef12").await.unwrap();
        assert!(report.payout_attempted);
        assert!(report.payout_error.is_some());
        assert_eq!(h.field("L1", "status").await, Some(json!("Picked Up")));
        assert_eq!(h.field("L1", "pickup_confirmed").await, Some(json!(true)));
    }
}
