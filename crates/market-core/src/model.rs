//! Listing Model
//!
//! Typed view over a listing record. Upstream status text is historical and
//! inconsistently cased, so it is normalized to enums once, here, and every
//! other module works on the enums.
//! Uses `rust_decimal` for all currency amounts.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::{Map, Value};

use crate::store::Record;

/// Record-store field names
pub mod fields {
    pub const STATUS: &str = "status";
    pub const TITLE: &str = "title";
    pub const PRICE: &str = "price";
    pub const SELLER_PAYOUT_AMOUNT: &str = "seller_payout_amount";
    pub const LOCKED: &str = "locked";
    pub const CHARGEBACK_FLAG: &str = "chargeback_flag";
    pub const PICKUP_QR_TOKEN: &str = "pickup_qr_token";
    pub const PICKUP_QR_PAYLOAD: &str = "pickup_qr_payload";
    pub const PICKUP_CONFIRMED: &str = "pickup_confirmed";
    pub const PICKUP_CONFIRMED_AT: &str = "pickup_confirmed_at";
    pub const PAID_AT: &str = "paid_at";
    pub const PAYOUT_ELIGIBLE_AT: &str = "payout_eligible_at";
    pub const PAYOUT_ATTEMPTED_AT: &str = "payout_attempted_at";
    pub const PAYOUT_SENT_AT: &str = "payout_sent_at";
    pub const SELLER_PAYOUT_STATUS: &str = "seller_payout_status";
    pub const STRIPE_ACCOUNT_ID: &str = "stripe_account_id";
    pub const STRIPE_ONBOARDING_STATUS: &str = "stripe_onboarding_status";
    pub const STRIPE_TRANSFER_ID: &str = "stripe_transfer_id";
    pub const STRIPE_SESSION_ID: &str = "stripe_session_id";
    pub const STRIPE_PAYMENT_INTENT: &str = "stripe_payment_intent";
    pub const PAYOUT_ERROR: &str = "payout_error";
    pub const PAYOUT_RISK: &str = "payout_risk";
    pub const SELLER_RISK_FLAG: &str = "seller_risk_flag";
    pub const DISPUTE_STATUS: &str = "dispute_status";
    pub const DISPUTE_UPDATED_AT: &str = "dispute_updated_at";
    pub const DISPUTE_RESOLVED_AT: &str = "dispute_resolved_at";
    pub const BUYER_EMAIL: &str = "buyer_email";
    pub const SELLER_EMAIL: &str = "seller_email";
    pub const SELLER_NAME: &str = "seller_name";
    pub const PICKUP_ADDRESS: &str = "pickup_address";
    pub const PICKUP_WINDOW_START: &str = "pickup_window_start";
    pub const PICKUP_WINDOW_END: &str = "pickup_window_end";
}

/// Primary workflow stage of a listing
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ListingStatus {
    Active,
    Reserved,
    PaidPendingPickup,
    PickedUp,
    PayoutSent,
    Refunded,
    /// Status text that matches no known stage (kept verbatim)
    Unknown(String),
}

impl ListingStatus {
    /// Canonical text written to the record store
    pub fn as_str(&self) -> &str {
        match self {
            ListingStatus::Active => "Active",
            ListingStatus::Reserved => "Reserved",
            ListingStatus::PaidPendingPickup => "Paid – Pending Pickup",
            ListingStatus::PickedUp => "Picked Up",
            ListingStatus::PayoutSent => "Payout Sent",
            ListingStatus::Refunded => "Refunded",
            ListingStatus::Unknown(raw) => raw,
        }
    }

    /// Parse upstream status text.
    ///
    /// Tolerant of case, dash style and legacy wording: anything containing
    /// "paid" or "pending pickup" (other than "payout sent") is treated as
    /// paid and awaiting pickup.
    pub fn parse(raw: &str) -> Self {
        let lowered = raw.trim().to_lowercase().replace(['–', '—', '-'], " ");
        let norm = lowered.split_whitespace().collect::<Vec<_>>().join(" ");

        match norm.as_str() {
            "active" => ListingStatus::Active,
            "reserved" => ListingStatus::Reserved,
            "payout sent" => ListingStatus::PayoutSent,
            "picked up" | "pickup confirmed" | "picked up pending payout" => ListingStatus::PickedUp,
            s if s.contains("refund") => ListingStatus::Refunded,
            s if s.contains("paid") || s.contains("pending pickup") => ListingStatus::PaidPendingPickup,
            _ => ListingStatus::Unknown(raw.trim().to_string()),
        }
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Seller payout sub-status, independent of [`ListingStatus`]
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PayoutStatus {
    Pending,
    /// Legacy marker written by older pickup tooling; equivalent to Pending
    Ready,
    Processing,
    Paid,
    Failed,
    Blocked,
    Refunded,
    Other(String),
}

impl PayoutStatus {
    pub fn as_str(&self) -> &str {
        match self {
            PayoutStatus::Pending => "Pending",
            PayoutStatus::Ready => "Ready",
            PayoutStatus::Processing => "Processing",
            PayoutStatus::Paid => "Paid",
            PayoutStatus::Failed => "Failed",
            PayoutStatus::Blocked => "Blocked",
            PayoutStatus::Refunded => "Refunded",
            PayoutStatus::Other(raw) => raw,
        }
    }

    /// Parse upstream text; blank means "no payout status yet"
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let status = match trimmed.to_lowercase().as_str() {
            "" => return None,
            "pending" => PayoutStatus::Pending,
            "ready" => PayoutStatus::Ready,
            "processing" => PayoutStatus::Processing,
            "paid" => PayoutStatus::Paid,
            "failed" => PayoutStatus::Failed,
            "blocked" => PayoutStatus::Blocked,
            "refunded" => PayoutStatus::Refunded,
            _ => PayoutStatus::Other(trimmed.to_string()),
        };
        Some(status)
    }
}

impl fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A marketplace listing, normalized from its record
#[derive(Clone, Debug)]
pub struct Listing {
    /// Opaque record identifier
    pub id: String,

    /// Normalized workflow stage
    pub status: ListingStatus,

    /// Status text as stored upstream
    pub raw_status: String,

    pub title: Option<String>,

    /// Buyer price in major units
    pub price: Option<Decimal>,

    /// Amount owed to the seller in major units
    pub seller_payout_amount: Option<Decimal>,

    /// Risk hold; blocks checkout regardless of status
    pub locked: bool,

    /// Blocks payout regardless of other eligibility
    pub chargeback_flag: bool,

    pub pickup_qr_token: Option<String>,
    pub pickup_qr_payload: Option<String>,
    pub pickup_confirmed: bool,
    pub pickup_confirmed_at: Option<DateTime<Utc>>,

    pub paid_at: Option<DateTime<Utc>>,

    /// End of the fraud-prevention hold window
    pub payout_eligible_at: Option<DateTime<Utc>>,
    pub payout_sent_at: Option<DateTime<Utc>>,
    pub seller_payout_status: Option<PayoutStatus>,

    /// Seller's connected payout account
    pub stripe_account_id: Option<String>,

    /// Proof a transfer was executed; outranks `seller_payout_status`
    pub stripe_transfer_id: Option<String>,
    pub stripe_session_id: Option<String>,
    pub stripe_payment_intent: Option<String>,

    pub payout_error: Option<String>,
    pub payout_risk: bool,
    /// Seller has repeated chargebacks
    pub seller_risk_flag: bool,
    pub dispute_status: Option<String>,

    pub buyer_email: Option<String>,
    pub seller_email: Option<String>,
    pub seller_name: Option<String>,
    pub pickup_address: Option<String>,
    pub pickup_window_start: Option<String>,
    pub pickup_window_end: Option<String>,
}

impl Listing {
    /// Build a typed listing from a raw record
    pub fn from_record(record: &Record) -> Self {
        let f = &record.fields;
        let raw_status = text(f, &[fields::STATUS]).unwrap_or_default();

        Self {
            id: record.id.clone(),
            status: ListingStatus::parse(&raw_status),
            raw_status,
            title: text(f, &[fields::TITLE, "product_title", "displayName"]),
            price: decimal(f, fields::PRICE),
            seller_payout_amount: decimal(f, fields::SELLER_PAYOUT_AMOUNT),
            locked: flag(f, fields::LOCKED),
            chargeback_flag: flag(f, fields::CHARGEBACK_FLAG),
            pickup_qr_token: text(f, &[fields::PICKUP_QR_TOKEN]),
            pickup_qr_payload: text(f, &[fields::PICKUP_QR_PAYLOAD]),
            pickup_confirmed: flag(f, fields::PICKUP_CONFIRMED),
            pickup_confirmed_at: timestamp(f, fields::PICKUP_CONFIRMED_AT),
            paid_at: timestamp(f, fields::PAID_AT),
            payout_eligible_at: timestamp(f, fields::PAYOUT_ELIGIBLE_AT),
            payout_sent_at: timestamp(f, fields::PAYOUT_SENT_AT),
            seller_payout_status: text(f, &[fields::SELLER_PAYOUT_STATUS])
                .and_then(|s| PayoutStatus::parse(&s)),
            stripe_account_id: text(f, &[fields::STRIPE_ACCOUNT_ID]),
            stripe_transfer_id: text(f, &[fields::STRIPE_TRANSFER_ID]),
            stripe_session_id: text(f, &[fields::STRIPE_SESSION_ID]),
            stripe_payment_intent: text(f, &[fields::STRIPE_PAYMENT_INTENT]),
            payout_error: text(f, &[fields::PAYOUT_ERROR]),
            payout_risk: flag(f, fields::PAYOUT_RISK),
            seller_risk_flag: flag(f, fields::SELLER_RISK_FLAG),
            dispute_status: text(f, &[fields::DISPUTE_STATUS]),
            buyer_email: text(f, &[fields::BUYER_EMAIL]),
            seller_email: text(f, &[fields::SELLER_EMAIL, "showroom_email"]),
            seller_name: text(f, &[fields::SELLER_NAME, "sellerName"]),
            pickup_address: text(f, &[fields::PICKUP_ADDRESS, "pickupLocation"]),
            pickup_window_start: text(f, &[fields::PICKUP_WINDOW_START]),
            pickup_window_end: text(f, &[fields::PICKUP_WINDOW_END]),
        }
    }

    /// Title for emails and checkout line items
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("Showroom Listing")
    }
}

/// Convert a major-unit amount to integer minor units (cents).
///
/// Rounds half away from zero. Returns `None` for amounts that do not fit.
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// Record-store timestamp format (UTC, millisecond precision)
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

// First non-blank value among `names`, stringified
fn text(fields: &Map<String, Value>, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| match fields.get(*name)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

fn flag(fields: &Map<String, Value>, name: &str) -> bool {
    match fields.get(name) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "1"),
        _ => false,
    }
}

fn decimal(fields: &Map<String, Value>, name: &str) -> Option<Decimal> {
    match fields.get(name)? {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Value::String(s) => Decimal::from_str(s.trim().trim_start_matches('$')).ok(),
        _ => None,
    }
}

fn timestamp(fields: &Map<String, Value>, name: &str) -> Option<DateTime<Utc>> {
    match fields.get(name)? {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn record(fields: Value) -> Record {
        Record::new("rec1", fields.as_object().cloned().unwrap_or_default())
    }

    #[test]
    fn test_status_parsing_is_tolerant() {
        assert_eq!(ListingStatus::parse("Active"), ListingStatus::Active);
        assert_eq!(ListingStatus::parse("  active "), ListingStatus::Active);
        assert_eq!(ListingStatus::parse("Paid – Pending Pickup"), ListingStatus::PaidPendingPickup);
        assert_eq!(ListingStatus::parse("paid - pending pickup"), ListingStatus::PaidPendingPickup);
        assert_eq!(ListingStatus::parse("PAID"), ListingStatus::PaidPendingPickup);
        assert_eq!(ListingStatus::parse("Pickup Confirmed"), ListingStatus::PickedUp);
        assert_eq!(ListingStatus::parse("Payout Sent"), ListingStatus::PayoutSent);
        assert_eq!(ListingStatus::parse("Refunded"), ListingStatus::Refunded);
        assert_eq!(
            ListingStatus::parse("Archived"),
            ListingStatus::Unknown("Archived".into())
        );
    }

    #[test]
    fn test_payout_status_blank_is_none() {
        assert_eq!(PayoutStatus::parse(""), None);
        assert_eq!(PayoutStatus::parse("  "), None);
        assert_eq!(PayoutStatus::parse("paid"), Some(PayoutStatus::Paid));
        assert_eq!(PayoutStatus::parse("Ready"), Some(PayoutStatus::Ready));
    }

    #[test]
    fn test_listing_from_record() {
        let listing = Listing::from_record(&record(json!({
            "status": "Paid – Pending Pickup",
            "price": 1000.0,
            "seller_payout_amount": "800.00",
            "pickup_confirmed": true,
            "payout_eligible_at": "2026-01-02T03:04:05.000Z",
            "seller_payout_status": "Pending",
            "stripe_account_id": "  ",
            "showroom_email": "seller@example.com"
        })));

        assert_eq!(listing.status, ListingStatus::PaidPendingPickup);
        assert_eq!(listing.price, Some(dec!(1000)));
        assert_eq!(listing.seller_payout_amount, Some(dec!(800.00)));
        assert!(listing.pickup_confirmed);
        assert!(listing.payout_eligible_at.is_some());
        assert_eq!(listing.seller_payout_status, Some(PayoutStatus::Pending));
        assert_eq!(listing.stripe_account_id, None);
        assert_eq!(listing.seller_email.as_deref(), Some("seller@example.com"));
        assert!(!listing.chargeback_flag);
    }

    #[test]
    fn test_minor_units_rounding() {
        assert_eq!(to_minor_units(dec!(1000.00)), Some(100_000));
        assert_eq!(to_minor_units(dec!(19.995)), Some(2000));
        assert_eq!(to_minor_units(dec!(0.004)), Some(0));
    }
}
