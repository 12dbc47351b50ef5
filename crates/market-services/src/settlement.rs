//! Payout settlement
//!
//! Moves the seller's share to their connected account once a listing is
//! picked up, out of its hold window, and free of disputes. The same
//! per-listing routine backs the post-pickup attempt, the operator retry and
//! the scheduled sweep.
//!
//! At most one transfer per listing is guaranteed by two layers:
//!
//! 1. A stored transfer id or `Paid` payout status short-circuits before any
//!    ledger call, and a transfer already tagged with the listing's group is
//!    adopted instead of created (heal).
//! 2. The transfer's idempotency key is derived from listing, destination
//!    and amount, so concurrent attempts collapse at the ledger.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use market_core::ledger::{Transfer, TransferRequest, transfer_group, transfer_idempotency_key};
use market_core::model::{fields, to_minor_units};
use market_core::store::{ListingPatch, RecordFilter, RecordQuery};
use market_core::{Listing, ListingStatus, MarketError, PayoutStatus, Result, can_transition, is_payout_allowed};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;

use crate::{MarketContext, notices};

/// Where a failed attempt stopped
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// Amount or destination unusable; recorded on the listing
    Validation,
    /// Existing-transfer lookup failed; nothing written
    Lookup,
    /// Could not mark the listing as processing; ledger not called
    Marking,
    /// Ledger refused or failed the transfer; recorded on the listing
    Transfer,
}

/// Result of settling one listing
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SettlementOutcome {
    Paid {
        transfer_id: String,
        amount: Decimal,
        destination: String,
    },
    /// A transfer from an interrupted attempt was found and adopted
    Healed { transfer_id: String },
    AlreadySettled { transfer_id: Option<String> },
    Skipped { reason: String },
    Failed { stage: FailureStage, error: String },
}

impl SettlementOutcome {
    /// Whether this attempt reached the ledger's transfer call
    pub fn payout_attempted(&self) -> bool {
        matches!(
            self,
            SettlementOutcome::Paid { .. }
                | SettlementOutcome::Failed {
                    stage: FailureStage::Transfer,
                    ..
                }
        )
    }

    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            SettlementOutcome::Paid { .. } | SettlementOutcome::Healed { .. } | SettlementOutcome::AlreadySettled { .. }
        )
    }
}

/// Aggregate result of a sweep
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub processed: usize,
    pub healed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total_candidates: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Reload a listing and settle it
pub async fn settle_listing(ctx: &MarketContext, listing_id: &str) -> Result<SettlementOutcome> {
    let listing = ctx.load_listing(listing_id).await?;
    settle(ctx, &listing, Utc::now()).await
}

/// Operator retry. Only listings with no payout in flight or a failed one may
/// be retried; `Paid` and `Processing` are refused.
pub async fn retry_payout(ctx: &MarketContext, listing_id: &str) -> Result<SettlementOutcome> {
    let listing = ctx.load_listing(listing_id).await?;

    let retryable = matches!(
        listing.seller_payout_status,
        None | Some(PayoutStatus::Pending | PayoutStatus::Ready | PayoutStatus::Failed)
    );
    if !retryable || listing.stripe_transfer_id.is_some() {
        tracing::info!(
            listing_id = %listing.id,
            payout_status = ?listing.seller_payout_status,
            "Payout retry refused"
        );
        return Err(MarketError::conflict(
            "Payout is not retryable in its current state",
            json!({
                "seller_payout_status": listing.seller_payout_status.as_ref().map(PayoutStatus::as_str),
                "stripe_transfer_id": listing.stripe_transfer_id,
                "status": listing.raw_status,
            }),
        ));
    }

    settle(ctx, &listing, Utc::now()).await
}

/// Settle every listing that is picked up with a payout pending.
///
/// Candidates are independent: a failure on one is counted and the sweep
/// moves on.
pub async fn run_sweep(ctx: &MarketContext) -> Result<SweepReport> {
    let started_at = Utc::now();

    let query = RecordQuery::new(RecordFilter::And(vec![
        RecordFilter::is_true(fields::PICKUP_CONFIRMED),
        RecordFilter::Or(vec![
            RecordFilter::eq(fields::SELLER_PAYOUT_STATUS, PayoutStatus::Pending.as_str()),
            RecordFilter::eq(fields::SELLER_PAYOUT_STATUS, PayoutStatus::Ready.as_str()),
            RecordFilter::eq(fields::SELLER_PAYOUT_STATUS, PayoutStatus::Processing.as_str()),
        ]),
    ]));
    let candidates = ctx.store.query(&query).await?;

    let mut report = SweepReport {
        processed: 0,
        healed: 0,
        skipped: 0,
        failed: 0,
        total_candidates: candidates.len(),
        started_at,
        finished_at: started_at,
    };

    tracing::info!(candidates = candidates.len(), "Payout sweep started");

    for record in &candidates {
        let listing = Listing::from_record(record);
        match settle(ctx, &listing, Utc::now()).await {
            Ok(SettlementOutcome::Paid { .. }) => report.processed += 1,
            Ok(SettlementOutcome::Healed { .. }) => report.healed += 1,
            Ok(SettlementOutcome::AlreadySettled { .. } | SettlementOutcome::Skipped { .. }) => report.skipped += 1,
            Ok(SettlementOutcome::Failed { .. }) => report.failed += 1,
            Err(e) => {
                tracing::error!(listing_id = %listing.id, error = %e, "Sweep candidate errored");
                report.failed += 1;
            }
        }
    }

    report.finished_at = Utc::now();
    tracing::info!(
        processed = report.processed,
        healed = report.healed,
        skipped = report.skipped,
        failed = report.failed,
        "Payout sweep finished"
    );
    Ok(report)
}

/// Settle a single listing as of `now`
pub async fn settle(ctx: &MarketContext, listing: &Listing, now: DateTime<Utc>) -> Result<SettlementOutcome> {
    let listing_id = listing.id.as_str();

    let plan = match gate(ctx, listing, now).await? {
        Gate::Pay(plan) => plan,
        Gate::Stop(outcome) => return Ok(outcome),
    };

    let group = transfer_group(listing_id);
    let existing = match ctx.ledger.list_transfers_by_group(&group).await {
        Ok(transfers) => transfers,
        Err(e) => {
            tracing::warn!(listing_id, error = %e, "Existing-transfer lookup failed; not paying");
            return Ok(SettlementOutcome::Failed {
                stage: FailureStage::Lookup,
                error: e.to_string(),
            });
        }
    };
    if let Some(found) = pick_existing(&existing, &plan.destination) {
        commit_payout(ctx, listing_id, &found.id, now).await?;
        tracing::info!(listing_id, transfer_id = %found.id, "Adopted transfer from interrupted payout");
        return Ok(SettlementOutcome::Healed {
            transfer_id: found.id.clone(),
        });
    }

    // A dispute may have landed since `listing` was read
    let fresh = match ctx.load_listing(listing_id).await {
        Ok(fresh) => fresh,
        Err(e) => {
            return Ok(SettlementOutcome::Failed {
                stage: FailureStage::Marking,
                error: e.to_string(),
            });
        }
    };
    let plan = match gate(ctx, &fresh, now).await? {
        Gate::Pay(plan) => plan,
        Gate::Stop(outcome) => return Ok(outcome),
    };

    let marking = ListingPatch::new()
        .payout_status(&PayoutStatus::Processing)
        .timestamp(fields::PAYOUT_ATTEMPTED_AT, now)
        .clear(fields::PAYOUT_ERROR);
    let marked = match ctx.patch_listing(listing_id, &marking).await {
        Ok(marked) => marked,
        Err(e) => {
            return Ok(SettlementOutcome::Failed {
                stage: FailureStage::Marking,
                error: e.to_string(),
            });
        }
    };
    if let Err(block) = is_payout_allowed(&marked, now) {
        return unmark(ctx, &fresh, &marked, block.reason()).await;
    }

    let PayoutPlan {
        amount,
        amount_minor,
        destination,
    } = plan;
    let request = TransferRequest {
        amount: amount_minor,
        currency: ctx.settings.currency.clone(),
        destination: destination.clone(),
        idempotency_key: transfer_idempotency_key(listing_id, &destination, amount_minor),
        transfer_group: Some(group),
        metadata: BTreeMap::from([
            ("listingId".to_string(), listing_id.to_string()),
            ("type".to_string(), "seller_payout".to_string()),
        ]),
    };

    let transfer = match ctx.ledger.create_transfer(&request).await {
        Ok(transfer) => transfer,
        Err(e) => {
            tracing::warn!(listing_id, error = %e, retryable = e.is_retryable(), "Transfer failed");
            return record_failure(ctx, listing_id, FailureStage::Transfer, &e.to_string()).await;
        }
    };

    let frozen = match commit_payout(ctx, listing_id, &transfer.id, now).await {
        Ok(frozen) => frozen,
        Err(e) => {
            // The money moved; the next sweep adopts the transfer through its group
            tracing::error!(listing_id, transfer_id = %transfer.id, error = %e, "Transfer created but listing not updated");
            return Err(e);
        }
    };

    tracing::info!(listing_id, transfer_id = %transfer.id, amount_minor, destination = %destination, "Payout sent");
    if !frozen {
        ctx.notify(notices::payout_sent(&ctx.settings, &fresh, amount, &transfer.id))
            .await;
    }

    Ok(SettlementOutcome::Paid {
        transfer_id: transfer.id,
        amount,
        destination,
    })
}

struct PayoutPlan {
    amount: Decimal,
    amount_minor: i64,
    destination: String,
}

enum Gate {
    Pay(PayoutPlan),
    Stop(SettlementOutcome),
}

/// Everything that must hold before the ledger is touched, in order:
/// settled, frozen, valid amount and destination, eligible, transition allowed.
async fn gate(ctx: &MarketContext, listing: &Listing, now: DateTime<Utc>) -> Result<Gate> {
    let listing_id = listing.id.as_str();

    if listing.stripe_transfer_id.is_some() || listing.seller_payout_status == Some(PayoutStatus::Paid) {
        tracing::debug!(listing_id, "Payout already settled");
        return Ok(Gate::Stop(SettlementOutcome::AlreadySettled {
            transfer_id: listing.stripe_transfer_id.clone(),
        }));
    }

    if let Some(status @ (PayoutStatus::Blocked | PayoutStatus::Refunded)) = &listing.seller_payout_status {
        return Ok(Gate::Stop(skip(listing_id, format!("Payout {}", status.as_str().to_lowercase()))));
    }
    if listing.chargeback_flag {
        return Ok(Gate::Stop(skip(listing_id, "Chargeback exists")));
    }

    let amount = listing.seller_payout_amount.filter(|a| *a > Decimal::ZERO);
    let amount_minor = amount.and_then(to_minor_units).filter(|m| *m > 0);
    let (Some(amount), Some(amount_minor)) = (amount, amount_minor) else {
        let failed = record_failure(ctx, listing_id, FailureStage::Validation, "Invalid seller_payout_amount").await?;
        return Ok(Gate::Stop(failed));
    };
    let Some(destination) = listing.stripe_account_id.clone() else {
        let failed = record_failure(ctx, listing_id, FailureStage::Validation, "Missing stripe_account_id").await?;
        return Ok(Gate::Stop(failed));
    };

    if let Err(block) = is_payout_allowed(listing, now) {
        return Ok(Gate::Stop(skip(listing_id, block.reason())));
    }

    if !can_transition(&listing.status, &ListingStatus::PayoutSent) {
        return Ok(Gate::Stop(skip(
            listing_id,
            format!("Status {} cannot move to {}", listing.status, ListingStatus::PayoutSent),
        )));
    }

    Ok(Gate::Pay(PayoutPlan {
        amount,
        amount_minor,
        destination,
    }))
}

/// Undo the processing marker after a freeze raced it. A chargeback
/// restores `Blocked`; anything else restores the prior payout status.
async fn unmark(ctx: &MarketContext, before: &Listing, marked: &Listing, reason: &str) -> Result<SettlementOutcome> {
    let undo = match (marked.chargeback_flag, &before.seller_payout_status) {
        (true, _) => ListingPatch::new().payout_status(&PayoutStatus::Blocked),
        (false, Some(status)) => ListingPatch::new().payout_status(status),
        (false, None) => ListingPatch::new().clear(fields::SELLER_PAYOUT_STATUS),
    };
    if let Err(e) = ctx.patch_listing(&marked.id, &undo).await {
        tracing::error!(listing_id = %marked.id, error = %e, "Could not restore payout status after freeze");
    }
    Ok(skip(&marked.id, reason))
}

fn skip(listing_id: &str, reason: impl Into<String>) -> SettlementOutcome {
    let reason = reason.into();
    tracing::info!(listing_id, reason = %reason, "Payout skipped");
    SettlementOutcome::Skipped { reason }
}

/// Prefer a transfer to the current destination; otherwise any in the group
fn pick_existing<'a>(transfers: &'a [Transfer], destination: &str) -> Option<&'a Transfer> {
    transfers
        .iter()
        .find(|t| t.destination.as_deref() == Some(destination))
        .or_else(|| transfers.first())
}

/// Record a transfer against the freshest copy of the listing.
///
/// Returns `true` when a dispute froze the payout while the transfer was in
/// flight: the freeze is kept, `payout_risk` is set and the operator alerted.
async fn commit_payout(ctx: &MarketContext, listing_id: &str, transfer_id: &str, now: DateTime<Utc>) -> Result<bool> {
    let fresh = ctx.load_listing(listing_id).await?;
    let frozen = fresh.chargeback_flag
        || matches!(
            fresh.seller_payout_status,
            Some(PayoutStatus::Blocked | PayoutStatus::Refunded)
        );

    let mut patch = ListingPatch::new()
        .set(fields::STRIPE_TRANSFER_ID, transfer_id)
        .timestamp(fields::PAYOUT_SENT_AT, now)
        .clear(fields::PAYOUT_ERROR);

    if frozen {
        patch = patch
            .payout_status(&PayoutStatus::Blocked)
            .set(fields::PAYOUT_RISK, true);
    } else {
        if fresh.status != ListingStatus::PayoutSent {
            patch = patch.transition(&fresh.status, ListingStatus::PayoutSent)?;
        }
        patch = patch.payout_status(&PayoutStatus::Paid);
    }
    ctx.patch_listing(listing_id, &patch).await?;

    if frozen {
        tracing::warn!(listing_id, transfer_id, "Transfer completed on a disputed listing; manual review needed");
        ctx.alert_operator(
            "Payout sent on disputed listing",
            &[
                ("Listing", listing_id.to_string()),
                ("Transfer", transfer_id.to_string()),
                ("Dispute status", fresh.dispute_status.clone().unwrap_or_default()),
            ],
        )
        .await;
    }

    Ok(frozen)
}

async fn record_failure(
    ctx: &MarketContext,
    listing_id: &str,
    stage: FailureStage,
    error: &str,
) -> Result<SettlementOutcome> {
    tracing::warn!(listing_id, stage = ?stage, error, "Payout failed");

    let patch = ListingPatch::new()
        .payout_status(&PayoutStatus::Failed)
        .set(fields::PAYOUT_ERROR, error);
    if let Err(e) = ctx.patch_listing(listing_id, &patch).await {
        tracing::warn!(listing_id, error = %e, "Could not record payout failure");
    }

    Ok(SettlementOutcome::Failed {
        stage,
        error: error.to_string(),
    })
}
