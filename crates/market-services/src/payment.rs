//! Payment confirmation
//!
//! Applies a verified "checkout completed" event to its listing. Safe under
//! redelivery: timestamps and the pickup credential are written only when
//! missing, and emails go out only on the first confirmation.

use chrono::Utc;
use market_core::ledger::CompletedCheckout;
use market_core::model::fields;
use market_core::store::ListingPatch;
use market_core::{ListingStatus, MarketError, PayoutStatus, PickupCredential, Result};
use serde::Serialize;

use crate::{MarketContext, notices};

/// What a payment event did to its listing
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PaymentOutcome {
    /// Event metadata had no listing id
    MissingListingId,
    /// Session completed but funds have not arrived
    NotPaid { listing_id: String },
    ListingNotFound { listing_id: String },
    /// Listing moved to paid and the credential is in place
    Confirmed {
        listing_id: String,
        credential_issued: bool,
        buyer_notified: bool,
    },
    /// Redelivery for a listing already paid; only missing fields were filled
    AlreadyPaid { listing_id: String },
    /// Listing is past payment; nothing written
    AlreadyProgressed { listing_id: String, status: String },
    /// Listing is in a state payment cannot apply to
    Rejected { listing_id: String, status: String },
}

/// Apply a completed checkout to its listing
pub async fn confirm_payment(ctx: &MarketContext, checkout: &CompletedCheckout) -> Result<PaymentOutcome> {
    let Some(listing_id) = checkout
        .listing_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
    else {
        tracing::warn!(session_id = %checkout.session_id, "Completed checkout without listing id");
        ctx.alert_operator(
            "Payment received without listing id",
            &[
                ("Session", checkout.session_id.clone()),
                ("Payment intent", checkout.payment_intent.clone().unwrap_or_default()),
            ],
        )
        .await;
        return Ok(PaymentOutcome::MissingListingId);
    };
    let listing_id = listing_id.to_string();

    if !checkout.is_paid() {
        tracing::info!(listing_id = %listing_id, "Checkout completed but payment pending; waiting");
        return Ok(PaymentOutcome::NotPaid { listing_id });
    }

    let listing = match ctx.load_listing(&listing_id).await {
        Ok(listing) => listing,
        Err(MarketError::NotFound(_)) => {
            tracing::warn!(listing_id = %listing_id, session_id = %checkout.session_id, "Paid listing not found");
            ctx.alert_operator(
                "Payment received for unknown listing",
                &[("Listing", listing_id.clone()), ("Session", checkout.session_id.clone())],
            )
            .await;
            return Ok(PaymentOutcome::ListingNotFound { listing_id });
        }
        Err(e) => return Err(e),
    };

    let patch = ListingPatch::new();
    let (mut patch, first_confirmation) = match &listing.status {
        ListingStatus::Active => (
            patch.advance(
                &listing.status,
                &[ListingStatus::Reserved, ListingStatus::PaidPendingPickup],
            )?,
            true,
        ),
        ListingStatus::Reserved => (
            patch.transition(&listing.status, ListingStatus::PaidPendingPickup)?,
            true,
        ),
        ListingStatus::PaidPendingPickup => (patch, false),
        ListingStatus::PickedUp | ListingStatus::PayoutSent => {
            tracing::info!(listing_id = %listing_id, status = %listing.status, "Payment redelivered after pickup; ignoring");
            return Ok(PaymentOutcome::AlreadyProgressed {
                listing_id,
                status: listing.raw_status,
            });
        }
        other => {
            tracing::warn!(listing_id = %listing_id, status = %other, "Payment for listing in unexpected state");
            ctx.alert_operator(
                "Payment received for listing in unexpected state",
                &[("Listing", listing_id.clone()), ("Status", listing.raw_status.clone())],
            )
            .await;
            return Ok(PaymentOutcome::Rejected {
                listing_id,
                status: listing.raw_status,
            });
        }
    };

    let now = Utc::now();

    let (credential, credential_issued) = match listing.pickup_qr_token.as_deref() {
        Some(token) => (PickupCredential::from_token(&listing.id, token), false),
        None => {
            let credential = PickupCredential::issue(&listing.id);
            patch = patch.set(fields::PICKUP_QR_TOKEN, credential.token.clone());
            (credential, true)
        }
    };
    if credential_issued || listing.pickup_qr_payload.is_none() {
        patch = patch.set(fields::PICKUP_QR_PAYLOAD, credential.payload());
    }

    let paid_at = listing.paid_at.unwrap_or(now);
    if listing.paid_at.is_none() {
        patch = patch.timestamp(fields::PAID_AT, paid_at);
    }
    if listing.payout_eligible_at.is_none() {
        patch = patch.timestamp(fields::PAYOUT_ELIGIBLE_AT, paid_at + ctx.settings.payout_hold);
    }
    if listing.seller_payout_status.is_none() {
        patch = patch.payout_status(&PayoutStatus::Pending);
    }
    if listing.stripe_session_id.is_none() && !checkout.session_id.is_empty() {
        patch = patch.set(fields::STRIPE_SESSION_ID, checkout.session_id.clone());
    }
    if let (None, Some(intent)) = (&listing.stripe_payment_intent, &checkout.payment_intent) {
        patch = patch.set(fields::STRIPE_PAYMENT_INTENT, intent.clone());
    }
    if let (None, Some(email)) = (&listing.buyer_email, &checkout.buyer_email) {
        patch = patch.set(fields::BUYER_EMAIL, email.clone());
    }

    let updated = if patch.is_empty() {
        listing
    } else {
        ctx.patch_listing(&listing_id, &patch).await?
    };

    if !first_confirmation {
        tracing::info!(listing_id = %listing_id, "Payment redelivered; listing already paid");
        return Ok(PaymentOutcome::AlreadyPaid { listing_id });
    }

    tracing::info!(
        listing_id = %listing_id,
        session_id = %checkout.session_id,
        credential_issued,
        "Listing marked paid"
    );

    let buyer_notified = ctx
        .notify(notices::pickup_instructions(&ctx.settings, &updated, &credential))
        .await;
    if !buyer_notified {
        tracing::warn!(listing_id = %listing_id, "Buyer pickup instructions not delivered");
    }
    ctx.notify(notices::item_sold(&ctx.settings, &updated)).await;

    Ok(PaymentOutcome::Confirmed {
        listing_id,
        credential_issued,
        buyer_notified,
    })
}
