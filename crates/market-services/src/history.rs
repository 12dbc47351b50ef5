//! Payout history for the operator console

use std::str::FromStr;

use chrono::{DateTime, Utc};
use market_core::model::fields;
use market_core::store::{RecordFilter, RecordQuery, Sort};
use market_core::{Listing, MarketError, PayoutStatus, Result};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::MarketContext;

pub const DEFAULT_LIMIT: usize = 50;
pub const MAX_LIMIT: usize = 200;

/// Which payouts to list
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryFilter {
    #[default]
    Paid,
    Failed,
    /// Picked up, payout not yet started
    Pending,
    All,
}

impl FromStr for HistoryFilter {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "paid" => Ok(HistoryFilter::Paid),
            "failed" => Ok(HistoryFilter::Failed),
            "pending" => Ok(HistoryFilter::Pending),
            "all" => Ok(HistoryFilter::All),
            other => Err(MarketError::BadRequest(format!("Unknown payout status filter: {other}"))),
        }
    }
}

impl HistoryFilter {
    fn to_filter(self) -> RecordFilter {
        let payout = |status: PayoutStatus| RecordFilter::eq(fields::SELLER_PAYOUT_STATUS, status.as_str());

        match self {
            HistoryFilter::Paid => payout(PayoutStatus::Paid),
            HistoryFilter::Failed => payout(PayoutStatus::Failed),
            HistoryFilter::Pending => RecordFilter::And(vec![
                RecordFilter::is_true(fields::PICKUP_CONFIRMED),
                RecordFilter::Or(vec![
                    RecordFilter::blank(fields::SELLER_PAYOUT_STATUS),
                    payout(PayoutStatus::Pending),
                    payout(PayoutStatus::Ready),
                ]),
            ]),
            HistoryFilter::All => RecordFilter::All,
        }
    }
}

/// One row of payout history
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PayoutSummary {
    pub id: String,
    pub seller_name: Option<String>,
    pub seller_email: Option<String>,
    pub item_title: String,
    pub status: String,
    pub pickup_confirmed: bool,
    pub pickup_confirmed_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub seller_payout_status: Option<String>,
    pub seller_payout_amount: Option<Decimal>,
    pub payout_sent_at: Option<DateTime<Utc>>,
    pub payout_error: Option<String>,
    pub stripe_transfer_id: Option<String>,
    pub stripe_account_id: Option<String>,
}

impl From<Listing> for PayoutSummary {
    fn from(listing: Listing) -> Self {
        Self {
            item_title: listing.display_title().to_string(),
            seller_payout_status: listing.seller_payout_status.as_ref().map(|s| s.as_str().to_string()),
            id: listing.id,
            seller_name: listing.seller_name,
            seller_email: listing.seller_email,
            status: listing.raw_status,
            pickup_confirmed: listing.pickup_confirmed,
            pickup_confirmed_at: listing.pickup_confirmed_at,
            paid_at: listing.paid_at,
            seller_payout_amount: listing.seller_payout_amount,
            payout_sent_at: listing.payout_sent_at,
            payout_error: listing.payout_error,
            stripe_transfer_id: listing.stripe_transfer_id,
            stripe_account_id: listing.stripe_account_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PayoutHistory {
    pub status: HistoryFilter,
    pub count: usize,
    pub records: Vec<PayoutSummary>,
}

/// Most recent payouts first, at most `limit` (clamped to 1..=200)
pub async fn get_payout_history(
    ctx: &MarketContext,
    filter: HistoryFilter,
    limit: Option<usize>,
) -> Result<PayoutHistory> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let query = RecordQuery::new(filter.to_filter())
        .sorted_by(Sort::desc(fields::PAYOUT_SENT_AT))
        .limit(limit);

    let records: Vec<PayoutSummary> = ctx
        .store
        .query(&query)
        .await?
        .iter()
        .map(|r| PayoutSummary::from(Listing::from_record(r)))
        .collect();

    Ok(PayoutHistory {
        status: filter,
        count: records.len(),
        records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use serde_json::json;

    async fn seed(h: &Harness) {
        h.store
            .insert(
                "old",
                json!({ "seller_payout_status": "Paid", "payout_sent_at": "2026-01-01T00:00:00.000Z", "pickup_confirmed": true }),
            )
            .await;
        h.store
            .insert(
                "new",
                json!({ "seller_payout_status": "Paid", "payout_sent_at": "2026-03-01T00:00:00.000Z", "pickup_confirmed": true }),
            )
            .await;
        h.store
            .insert("fail", json!({ "seller_payout_status": "Failed", "payout_error": "boom" }))
            .await;
        h.store.insert("wait", json!({ "pickup_confirmed": true })).await;
        h.store
            .insert("ready", json!({ "pickup_confirmed": true, "seller_payout_status": "Ready" }))
            .await;
        h.store.insert("unsold", json!({ "status": "Active" })).await;
    }

    #[tokio::test]
    async fn test_paid_sorted_newest_first() {
        let h = Harness::new();
        seed(&h).await;

        let history = get_payout_history(&h.ctx, HistoryFilter::Paid, None).await.unwrap();
        let ids: Vec<_> = history.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["new", "old"]);
        assert_eq!(history.count, 2);
    }

    #[tokio::test]
    async fn test_pending_includes_blank_and_ready() {
        let h = Harness::new();
        seed(&h).await;

        let history = get_payout_history(&h.ctx, HistoryFilter::Pending, None).await.unwrap();
        let mut ids: Vec<_> = history.records.iter().map(|r| r.id.clone()).collect();
        ids.sort();
        assert_eq!(ids, ["ready", "wait"]);
    }

    #[tokio::test]
    async fn test_limit_is_clamped() {
        let h = Harness::new();
        seed(&h).await;

        let history = get_payout_history(&h.ctx, HistoryFilter::All, Some(0)).await.unwrap();
        assert_eq!(history.count, 1);

        let history = get_payout_history(&h.ctx, HistoryFilter::All, Some(10_000)).await.unwrap();
        assert_eq!(history.count, 6);
    }

    #[test]
    fn test_filter_parsing() {
        assert_eq!("FAILED".parse::<HistoryFilter>().unwrap(), HistoryFilter::Failed);
        assert_eq!("".parse::<HistoryFilter>().unwrap(), HistoryFilter::Paid);
        assert!("sideways".parse::<HistoryFilter>().is_err());
    }
}
