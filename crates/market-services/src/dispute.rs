//! Disputes and chargebacks
//!
//! Any open, lost or refunded payment freezes the seller payout; only a won
//! dispute or an operator resolution lifts the freeze. Listings are matched by
//! the payment intent stored at payment time.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use market_core::ledger::{DisputeEvent, RefundEvent};
use market_core::model::fields;
use market_core::store::{ListingPatch, RecordFilter, RecordQuery};
use market_core::{Listing, MarketError, PayoutStatus, Result};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{MarketContext, notices};

/// What a dispute or refund event did
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DisputeOutcome {
    /// No listing carries the payment intent; operator alerted
    Unmatched { payment_intent: Option<String> },
    /// Payout blocked; `payout_risk` when funds already left
    Frozen { listing_id: String, payout_risk: bool },
    /// Won dispute lifted the freeze
    Released {
        listing_id: String,
        seller_payout_status: String,
    },
    /// Won dispute on a listing that was never frozen
    Unchanged { listing_id: String },
}

/// Apply a dispute event
pub async fn handle_dispute(ctx: &MarketContext, event: &DisputeEvent) -> Result<DisputeOutcome> {
    let details = vec![
        ("Dispute", event.dispute_id.clone()),
        ("Phase", format!("{:?}", event.phase)),
        ("Status", event.status.clone()),
        ("Reason", event.reason.clone().unwrap_or_default()),
        ("Payment intent", event.payment_intent.clone().unwrap_or_default()),
        ("Amount", event.amount.map(|a| a.to_string()).unwrap_or_default()),
    ];

    let Some(listing) = find_by_payment_intent(ctx, event.payment_intent.as_deref()).await? else {
        tracing::warn!(dispute_id = %event.dispute_id, payment_intent = ?event.payment_intent, "Dispute matches no listing");
        ctx.alert_operator("Dispute for unknown payment", &details).await;
        return Ok(DisputeOutcome::Unmatched {
            payment_intent: event.payment_intent.clone(),
        });
    };

    let outcome = if event.is_won() {
        release(ctx, &listing, "won").await?
    } else {
        freeze(ctx, &listing, &event.status).await?
    };

    let mut details = details;
    details.insert(0, ("Listing", listing.id.clone()));
    ctx.alert_operator(&format!("Dispute {}", event.status), &details).await;

    Ok(outcome)
}

/// Apply a refund event; refunds always freeze
pub async fn handle_refund(ctx: &MarketContext, event: &RefundEvent) -> Result<DisputeOutcome> {
    let details = vec![
        ("Object", event.object_id.clone()),
        ("Payment intent", event.payment_intent.clone().unwrap_or_default()),
        ("Amount", event.amount.map(|a| a.to_string()).unwrap_or_default()),
    ];

    let Some(listing) = find_by_payment_intent(ctx, event.payment_intent.as_deref()).await? else {
        tracing::warn!(object_id = %event.object_id, payment_intent = ?event.payment_intent, "Refund matches no listing");
        ctx.alert_operator("Refund for unknown payment", &details).await;
        return Ok(DisputeOutcome::Unmatched {
            payment_intent: event.payment_intent.clone(),
        });
    };

    let outcome = freeze(ctx, &listing, "refunded").await?;

    let mut details = details;
    details.insert(0, ("Listing", listing.id.clone()));
    ctx.alert_operator("Payment refunded", &details).await;

    Ok(outcome)
}

async fn find_by_payment_intent(ctx: &MarketContext, payment_intent: Option<&str>) -> Result<Option<Listing>> {
    let Some(intent) = payment_intent.map(str::trim).filter(|p| !p.is_empty()) else {
        return Ok(None);
    };

    let query = RecordQuery::new(RecordFilter::eq(fields::STRIPE_PAYMENT_INTENT, intent)).limit(1);
    let records = ctx.store.query(&query).await?;
    Ok(records.first().map(Listing::from_record))
}

async fn freeze(ctx: &MarketContext, listing: &Listing, dispute_status: &str) -> Result<DisputeOutcome> {
    let payout_risk = listing.stripe_transfer_id.is_some();

    let mut patch = ListingPatch::new()
        .set(fields::CHARGEBACK_FLAG, true)
        .payout_status(&PayoutStatus::Blocked)
        .set(fields::DISPUTE_STATUS, dispute_status)
        .timestamp(fields::DISPUTE_UPDATED_AT, Utc::now());
    if payout_risk {
        patch = patch.set(fields::PAYOUT_RISK, true);
    }
    ctx.patch_listing(&listing.id, &patch).await?;

    if payout_risk {
        tracing::warn!(
            listing_id = %listing.id,
            transfer_id = ?listing.stripe_transfer_id,
            "Dispute on listing already paid out; manual review needed"
        );
    } else {
        tracing::info!(listing_id = %listing.id, dispute_status, "Payout frozen");
    }

    Ok(DisputeOutcome::Frozen {
        listing_id: listing.id.clone(),
        payout_risk,
    })
}

async fn release(ctx: &MarketContext, listing: &Listing, dispute_status: &str) -> Result<DisputeOutcome> {
    let frozen = listing.chargeback_flag || listing.seller_payout_status == Some(PayoutStatus::Blocked);
    if !frozen {
        return Ok(DisputeOutcome::Unchanged {
            listing_id: listing.id.clone(),
        });
    }

    let restored = restored_payout_status(listing);
    let patch = ListingPatch::new()
        .set(fields::CHARGEBACK_FLAG, false)
        .payout_status(&restored)
        .set(fields::DISPUTE_STATUS, dispute_status)
        .timestamp(fields::DISPUTE_UPDATED_AT, Utc::now());
    ctx.patch_listing(&listing.id, &patch).await?;

    tracing::info!(listing_id = %listing.id, payout_status = %restored, "Payout freeze lifted");
    Ok(DisputeOutcome::Released {
        listing_id: listing.id.clone(),
        seller_payout_status: restored.as_str().to_string(),
    })
}

fn restored_payout_status(listing: &Listing) -> PayoutStatus {
    if listing.stripe_transfer_id.is_some() {
        PayoutStatus::Paid
    } else {
        PayoutStatus::Pending
    }
}

/// Listing with an active dispute, for the operator console
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DisputeSummary {
    pub id: String,
    pub title: String,
    pub buyer_email: Option<String>,
    pub seller_email: Option<String>,
    pub price: Option<Decimal>,
    pub stripe_session_id: Option<String>,
    pub stripe_payment_intent: Option<String>,
    pub dispute_status: String,
    pub seller_payout_status: Option<String>,
    pub payout_risk: bool,
    pub seller_risk_flag: bool,
    pub pickup_confirmed: bool,
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<&Listing> for DisputeSummary {
    fn from(listing: &Listing) -> Self {
        Self {
            id: listing.id.clone(),
            title: listing.display_title().to_string(),
            buyer_email: listing.buyer_email.clone(),
            seller_email: listing.seller_email.clone(),
            price: listing.price,
            stripe_session_id: listing.stripe_session_id.clone(),
            stripe_payment_intent: listing.stripe_payment_intent.clone(),
            dispute_status: listing.dispute_status.clone().unwrap_or_else(|| "open".into()),
            seller_payout_status: listing.seller_payout_status.as_ref().map(|s| s.as_str().to_string()),
            payout_risk: listing.payout_risk,
            seller_risk_flag: listing.seller_risk_flag,
            pickup_confirmed: listing.pickup_confirmed,
            paid_at: listing.paid_at,
        }
    }
}

/// Listings whose payout is frozen by a dispute
pub async fn list_disputes(ctx: &MarketContext) -> Result<Vec<DisputeSummary>> {
    let records = ctx
        .store
        .query(&RecordQuery::new(RecordFilter::is_true(fields::CHARGEBACK_FLAG)))
        .await?;

    Ok(records
        .iter()
        .map(|r| DisputeSummary::from(&Listing::from_record(r)))
        .collect())
}

/// Chargebacks per seller at which every disputed listing of theirs is flagged
pub const RISKY_SELLER_THRESHOLD: usize = 2;

/// Result of a seller risk scan
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RiskScan {
    /// Listings with an active chargeback
    pub scanned: usize,
    pub risky_sellers: Vec<String>,
    /// Listings newly marked with `seller_risk_flag`
    pub flagged: Vec<String>,
}

/// Flag every disputed listing whose seller has repeated chargebacks.
///
/// Sellers are keyed by email, case-insensitively; listings without one
/// share the `unknown` bucket.
pub async fn flag_risky_sellers(ctx: &MarketContext) -> Result<RiskScan> {
    let records = ctx
        .store
        .query(&RecordQuery::new(RecordFilter::is_true(fields::CHARGEBACK_FLAG)))
        .await?;
    let listings: Vec<Listing> = records.iter().map(Listing::from_record).collect();

    let seller_of = |listing: &Listing| {
        listing
            .seller_email
            .as_deref()
            .map_or_else(|| "unknown".to_string(), str::to_lowercase)
    };

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for listing in &listings {
        *counts.entry(seller_of(listing)).or_default() += 1;
    }

    let mut scan = RiskScan {
        scanned: listings.len(),
        risky_sellers: counts
            .iter()
            .filter(|(_, n)| **n >= RISKY_SELLER_THRESHOLD)
            .map(|(seller, _)| seller.clone())
            .collect(),
        flagged: Vec::new(),
    };

    for listing in &listings {
        let seller = seller_of(listing);
        let count = counts.get(&seller).copied().unwrap_or_default();
        if listing.seller_risk_flag || count < RISKY_SELLER_THRESHOLD {
            continue;
        }

        ctx.patch_listing(&listing.id, &ListingPatch::new().set(fields::SELLER_RISK_FLAG, true))
            .await?;
        tracing::warn!(listing_id = %listing.id, seller = %seller, "Flagged risky seller");
        scan.flagged.push(listing.id.clone());
    }

    tracing::info!(
        scanned = scan.scanned,
        risky_sellers = scan.risky_sellers.len(),
        flagged = scan.flagged.len(),
        "Seller risk scan complete"
    );
    Ok(scan)
}

/// Result of an operator resolution
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DisputeResolution {
    pub listing_id: String,
    pub seller_payout_status: String,
    pub seller_notified: bool,
}

/// Operator resolution: lift the freeze and tell the seller
pub async fn resolve_dispute(ctx: &MarketContext, listing_id: &str) -> Result<DisputeResolution> {
    let listing = ctx.load_listing(listing_id).await?;

    if !listing.chargeback_flag {
        return Err(MarketError::BadRequest("No active dispute".into()));
    }

    let restored = restored_payout_status(&listing);
    let patch = ListingPatch::new()
        .set(fields::CHARGEBACK_FLAG, false)
        .set(fields::DISPUTE_STATUS, "resolved")
        .payout_status(&restored)
        .timestamp(fields::DISPUTE_RESOLVED_AT, Utc::now());
    let updated = ctx.patch_listing(&listing.id, &patch).await?;

    tracing::info!(listing_id = %listing.id, payout_status = %restored, "Dispute resolved by operator");
    let seller_notified = ctx.notify(notices::dispute_resolved(&ctx.settings, &updated)).await;

    Ok(DisputeResolution {
        listing_id: listing.id,
        seller_payout_status: restored.as_str().to_string(),
        seller_notified,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settlement::{self, SettlementOutcome};
    use crate::testing::{Harness, OPERATOR};
    use assert_matches::assert_matches;
    use chrono::Duration;
    use market_core::ledger::DisputePhase;
    use serde_json::json;

    fn dispute(status: &str, phase: DisputePhase) -> DisputeEvent {
        DisputeEvent {
            dispute_id: "dp_1".into(),
            phase,
            status: status.into(),
            payment_intent: Some("pi_1".into()),
            charge_id: Some("ch_1".into()),
            reason: Some("fraudulent".into()),
            amount: Some(100_000),
        }
    }

    async fn seed_paid_out(h: &Harness) {
        h.store
            .insert(
                "L1",
                json!({
                    "status": "Payout Sent",
                    "stripe_payment_intent": "pi_1",
                    "stripe_transfer_id": "tr_1",
                    "seller_payout_status": "Paid",
                    "seller_email": "seller@example.com",
                }),
            )
            .await;
    }

    async fn seed_awaiting_payout(h: &Harness) {
        h.store
            .insert(
                "L1",
                json!({
                    "status": "Picked Up",
                    "stripe_payment_intent": "pi_1",
                    "seller_payout_amount": 800.0,
                    "stripe_account_id": "acct_seller",
                    "pickup_confirmed": true,
                    "seller_payout_status": "Pending",
                    "payout_eligible_at": (Utc::now() - Duration::hours(1)).to_rfc3339(),
                    "seller_email": "seller@example.com",
                }),
            )
            .await;
    }

    #[tokio::test]
    async fn test_chargeback_after_payout_flags_risk() {
        let h = Harness::new();
        seed_paid_out(&h).await;

        let outcome = handle_dispute(&h.ctx, &dispute("needs_response", DisputePhase::Created))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            DisputeOutcome::Frozen {
                listing_id: "L1".into(),
                payout_risk: true
            }
        );

        let f = h.store.fields("L1").await.unwrap();
        assert_eq!(f["chargeback_flag"], json!(true));
        assert_eq!(f["seller_payout_status"], json!("Blocked"));
        assert_eq!(f["payout_risk"], json!(true));
        assert_eq!(f["dispute_status"], json!("needs_response"));
        assert_eq!(h.notifier.sent_to(OPERATOR).await.len(), 1);
    }

    #[tokio::test]
    async fn test_freeze_blocks_later_settlement() {
        let h = Harness::new();
        seed_awaiting_payout(&h).await;

        handle_dispute(&h.ctx, &dispute("under_review", DisputePhase::Updated))
            .await
            .unwrap();
        assert_eq!(h.field("L1", "payout_risk").await, None);

        let outcome = settlement::settle_listing(&h.ctx, "L1").await.unwrap();
        assert_matches!(outcome, SettlementOutcome::Skipped { .. });
        assert_eq!(h.ledger.transfer_calls(), 0);
    }

    #[tokio::test]
    async fn test_won_dispute_releases() {
        let h = Harness::new();
        seed_awaiting_payout(&h).await;

        handle_dispute(&h.ctx, &dispute("needs_response", DisputePhase::Created))
            .await
            .unwrap();
        let outcome = handle_dispute(&h.ctx, &dispute("won", DisputePhase::Closed)).await.unwrap();

        assert_eq!(
            outcome,
            DisputeOutcome::Released {
                listing_id: "L1".into(),
                seller_payout_status: "Pending".into()
            }
        );
        assert_eq!(h.field("L1", "chargeback_flag").await, Some(json!(false)));

        let settled = settlement::settle_listing(&h.ctx, "L1").await.unwrap();
        assert_matches!(settled, SettlementOutcome::Paid { .. });
    }

    #[tokio::test]
    async fn test_won_after_payout_restores_paid() {
        let h = Harness::new();
        seed_paid_out(&h).await;

        handle_dispute(&h.ctx, &dispute("needs_response", DisputePhase::Created))
            .await
            .unwrap();
        handle_dispute(&h.ctx, &dispute("won", DisputePhase::Closed)).await.unwrap();

        assert_eq!(h.field("L1", "seller_payout_status").await, Some(json!("Paid")));
    }

    #[tokio::test]
    async fn test_lost_dispute_stays_frozen() {
        let h = Harness::new();
        seed_awaiting_payout(&h).await;

        let outcome = handle_dispute(&h.ctx, &dispute("lost", DisputePhase::Closed)).await.unwrap();
        assert_matches!(outcome, DisputeOutcome::Frozen { payout_risk: false, .. });
        assert_eq!(h.field("L1", "seller_payout_status").await, Some(json!("Blocked")));
    }

    #[tokio::test]
    async fn test_unmatched_dispute_alerts_without_mutation() {
        let h = Harness::new();
        seed_paid_out(&h).await;

        let mut event = dispute("needs_response", DisputePhase::Created);
        event.payment_intent = Some("pi_other".into());

        let outcome = handle_dispute(&h.ctx, &event).await.unwrap();
        assert_matches!(outcome, DisputeOutcome::Unmatched { .. });
        assert_eq!(h.store.patch_count(), 0);
        assert_eq!(h.notifier.sent_to(OPERATOR).await.len(), 1);
    }

    #[tokio::test]
    async fn test_refund_freezes() {
        let h = Harness::new();
        seed_awaiting_payout(&h).await;

        let outcome = handle_refund(
            &h.ctx,
            &RefundEvent {
                object_id: "ch_1".into(),
                payment_intent: Some("pi_1".into()),
                amount: Some(100_000),
            },
        )
        .await
        .unwrap();

        assert_matches!(outcome, DisputeOutcome::Frozen { .. });
        assert_eq!(h.field("L1", "dispute_status").await, Some(json!("refunded")));
        assert_eq!(h.field("L1", "chargeback_flag").await, Some(json!(true)));
    }

    #[tokio::test]
    async fn test_list_and_resolve() {
        let h = Harness::new();
        seed_awaiting_payout(&h).await;
        h.store.insert("L2", json!({ "status": "Active" })).await;

        handle_dispute(&h.ctx, &dispute("needs_response", DisputePhase::Created))
            .await
            .unwrap();

        let open = list_disputes(&h.ctx).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, "L1");
        assert_eq!(open[0].dispute_status, "needs_response");

        let resolution = resolve_dispute(&h.ctx, "L1").await.unwrap();
        assert_eq!(resolution.seller_payout_status, "Pending");
        assert!(resolution.seller_notified);
        assert_eq!(h.field("L1", "dispute_status").await, Some(json!("resolved")));
        assert!(h.field("L1", "dispute_resolved_at").await.is_some());
        assert!(list_disputes(&h.ctx).await.unwrap().is_empty());

        let seller_mail = h.notifier.sent_to("seller@example.com").await;
        assert_eq!(seller_mail.last().map(|m| m.subject.as_str()), Some("Dispute Resolved — Payout Reinstated"));
    }

    #[tokio::test]
    async fn test_resolve_without_dispute_is_bad_request() {
        let h = Harness::new();
        h.store.insert("L1", json!({ "status": "Picked Up" })).await;

        let err = resolve_dispute(&h.ctx, "L1").await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.user_message(), "No active dispute");
    }

    #[tokio::test]
    async fn test_repeat_chargeback_seller_flagged() {
        let h = Harness::new();
        h.store
            .insert("a", json!({ "chargeback_flag": true, "seller_email": "Repeat@Example.com" }))
            .await;
        h.store
            .insert("b", json!({ "chargeback_flag": true, "showroom_email": "repeat@example.com" }))
            .await;
        h.store
            .insert("c", json!({ "chargeback_flag": true, "seller_email": "once@example.com" }))
            .await;
        h.store
            .insert("d", json!({ "chargeback_flag": false, "seller_email": "once@example.com" }))
            .await;

        let scan = flag_risky_sellers(&h.ctx).await.unwrap();
        assert_eq!(scan.scanned, 3);
        assert_eq!(scan.risky_sellers, ["repeat@example.com"]);

        let mut flagged = scan.flagged.clone();
        flagged.sort();
        assert_eq!(flagged, ["a", "b"]);
        assert_eq!(h.field("c", "seller_risk_flag").await, None);
        assert_eq!(h.field("d", "seller_risk_flag").await, None);

        let disputes = list_disputes(&h.ctx).await.unwrap();
        let risky: Vec<_> = disputes.iter().filter(|d| d.seller_risk_flag).map(|d| d.id.as_str()).collect();
        assert_eq!(risky.len(), 2);

        // Already-flagged listings are not rewritten
        let patches = h.store.patch_count();
        let again = flag_risky_sellers(&h.ctx).await.unwrap();
        assert!(again.flagged.is_empty());
        assert_eq!(h.store.patch_count(), patches);
    }
}
