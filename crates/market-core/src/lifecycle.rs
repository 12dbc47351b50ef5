//! Listing Lifecycle Rules
//!
//! The transition table and the payout eligibility predicate. Both are pure
//! functions; every service that mutates a listing goes through them.
//!
//! ```text
//! Active ──▶ Reserved ──▶ Paid – Pending Pickup ──▶ Picked Up ──▶ Payout Sent
//! ```

use std::fmt;

use chrono::{DateTime, Utc};

use crate::model::{Listing, ListingStatus};

/// Check whether `from -> to` is an edge of the transition table.
///
/// Any pair not listed, including self-loops, is rejected.
pub fn can_transition(from: &ListingStatus, to: &ListingStatus) -> bool {
    use ListingStatus::{Active, PaidPendingPickup, PayoutSent, PickedUp, Reserved};

    matches!(
        (from, to),
        (Active, Reserved)
            | (Reserved, PaidPendingPickup)
            | (PaidPendingPickup, PickedUp)
            | (PickedUp, PayoutSent)
    )
}

/// Check that every hop along `path` is an allowed edge, starting at `from`
pub fn can_advance(from: &ListingStatus, path: &[ListingStatus]) -> bool {
    let mut current = from;
    for next in path {
        if !can_transition(current, next) {
            return false;
        }
        current = next;
    }
    !path.is_empty()
}

/// Why a payout is not allowed yet
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PayoutBlock {
    ChargebackExists,
    PickupNotConfirmed,
    MissingHoldDate,
    HoldWindowNotComplete { eligible_at: DateTime<Utc> },
}

impl PayoutBlock {
    pub fn reason(&self) -> &'static str {
        match self {
            PayoutBlock::ChargebackExists => "Chargeback exists",
            PayoutBlock::PickupNotConfirmed => "Pickup not confirmed",
            PayoutBlock::MissingHoldDate => "Missing payout hold date",
            PayoutBlock::HoldWindowNotComplete { .. } => "Hold window not complete",
        }
    }
}

impl fmt::Display for PayoutBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// Payout eligibility, evaluated independently of the transition table.
///
/// Conditions are checked in a fixed order so the reported reason is stable:
/// chargeback, pickup, hold date, hold window.
pub fn is_payout_allowed(listing: &Listing, now: DateTime<Utc>) -> Result<(), PayoutBlock> {
    if listing.chargeback_flag {
        return Err(PayoutBlock::ChargebackExists);
    }

    if !listing.pickup_confirmed {
        return Err(PayoutBlock::PickupNotConfirmed);
    }

    let eligible_at = listing.payout_eligible_at.ok_or(PayoutBlock::MissingHoldDate)?;
    if now < eligible_at {
        return Err(PayoutBlock::HoldWindowNotComplete { eligible_at });
    }

    Ok(())
}
