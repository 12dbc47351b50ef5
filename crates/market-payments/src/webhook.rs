//! Stripe Webhook Verification
//!
//! [`Webhook::construct_event`] checks the `Stripe-Signature` header against
//! the raw body before anything in the body is deserialized; the typed event
//! is then mapped to a core [`LedgerEvent`].
//!
//! ```text
//! Stripe-Signature: t=<unix seconds>,v1=<hex hmac-sha256("<t>.<body>")>
//! ```

use std::fmt;

use chrono::Utc;
use hmac::{Hmac, Mac};
use market_core::ledger::{CompletedCheckout, DisputeEvent, DisputePhase, LedgerEvent, LedgerEventKind, RefundEvent};
use sha2::Sha256;
use stripe::{Event, EventObject, EventType, Webhook};

use crate::error::{Result, WebhookError};

type HmacSha256 = Hmac<Sha256>;

/// Request header carrying the signature
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Verifies and decodes Stripe webhook deliveries
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
}

impl fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }

    /// Create from `STRIPE_WEBHOOK_SECRET`
    pub fn from_env() -> Result<Self> {
        std::env::var("STRIPE_WEBHOOK_SECRET")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(Self::new)
            .ok_or_else(|| WebhookError::Config("STRIPE_WEBHOOK_SECRET not set".into()))
    }

    /// Verify the signature, then decode the event
    pub fn verify(&self, payload: &str, signature_header: Option<&str>) -> Result<LedgerEvent> {
        let header = required(signature_header)?;
        let event = Webhook::construct_event(payload, header, &self.secret)
            .map_err(|e| rejection(e, Utc::now().timestamp()))?;
        to_ledger_event(&event)
    }

    /// [`WebhookVerifier::verify`] against an explicit clock
    pub fn verify_at(&self, payload: &str, signature_header: Option<&str>, now: i64) -> Result<LedgerEvent> {
        let header = required(signature_header)?;
        let event = Webhook::construct_event_with_timestamp(payload, header, &self.secret, now)
            .map_err(|e| rejection(e, now))?;
        to_ledger_event(&event)
    }

    /// Build a valid signature header for `payload`
    pub fn sign(&self, payload: &str, timestamp: i64) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| WebhookError::Config("Invalid webhook secret".into()))?;
        mac.update(format!("{timestamp}.{payload}").as_bytes());
        Ok(format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes())))
    }
}

fn required(signature_header: Option<&str>) -> Result<&str> {
    signature_header
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or(WebhookError::MissingSignature)
}

fn rejection(err: stripe::WebhookError, now: i64) -> WebhookError {
    match err {
        stripe::WebhookError::BadKey => WebhookError::Config("Invalid webhook secret".into()),
        stripe::WebhookError::BadHeader(_) => WebhookError::MalformedHeader,
        stripe::WebhookError::BadSignature => WebhookError::SignatureMismatch,
        stripe::WebhookError::BadTimestamp(signed_at) => WebhookError::Expired {
            age_secs: now - signed_at,
        },
        stripe::WebhookError::BadParse(e) => WebhookError::Payload(e.to_string()),
    }
}

/// Map a verified Stripe event to a core event
fn to_ledger_event(event: &Event) -> Result<LedgerEvent> {
    let object = &event.data.object;

    let kind = match event.type_ {
        EventType::CheckoutSessionCompleted | EventType::CheckoutSessionAsyncPaymentSucceeded => {
            let EventObject::CheckoutSession(session) = object else {
                return Err(mismatch(event));
            };
            let metadata = session.metadata.as_ref();
            LedgerEventKind::CheckoutCompleted(CompletedCheckout {
                session_id: session.id.to_string(),
                listing_id: metadata
                    .and_then(|m| m.get("listingId").or_else(|| m.get("listing_id")))
                    .map(String::as_str)
                    .and_then(non_empty),
                payment_intent: session.payment_intent.as_ref().map(|pi| pi.id().to_string()),
                buyer_email: session
                    .customer_details
                    .as_ref()
                    .and_then(|d| d.email.as_deref())
                    .or(session.customer_email.as_deref())
                    .and_then(non_empty),
                payment_status: Some(session.payment_status.as_str().to_string()),
                amount_total: session.amount_total,
            })
        }
        EventType::ChargeDisputeCreated | EventType::ChargeDisputeUpdated | EventType::ChargeDisputeClosed => {
            let EventObject::Dispute(dispute) = object else {
                return Err(mismatch(event));
            };
            let phase = match event.type_ {
                EventType::ChargeDisputeCreated => DisputePhase::Created,
                EventType::ChargeDisputeClosed => DisputePhase::Closed,
                _ => DisputePhase::Updated,
            };
            LedgerEventKind::Dispute(DisputeEvent {
                dispute_id: dispute.id.to_string(),
                phase,
                status: dispute.status.as_str().to_string(),
                payment_intent: dispute.payment_intent.as_ref().map(|pi| pi.id().to_string()),
                charge_id: Some(dispute.charge.id().to_string()),
                reason: non_empty(&dispute.reason),
                amount: Some(dispute.amount),
            })
        }
        EventType::ChargeRefunded => {
            let EventObject::Charge(charge) = object else {
                return Err(mismatch(event));
            };
            LedgerEventKind::Refund(RefundEvent {
                object_id: charge.id.to_string(),
                payment_intent: charge.payment_intent.as_ref().map(|pi| pi.id().to_string()),
                amount: Some(charge.amount_refunded),
            })
        }
        EventType::RefundCreated => {
            let EventObject::Refund(refund) = object else {
                return Err(mismatch(event));
            };
            LedgerEventKind::Refund(RefundEvent {
                object_id: refund.id.to_string(),
                payment_intent: refund.payment_intent.as_ref().map(|pi| pi.id().to_string()),
                amount: Some(refund.amount),
            })
        }
        _ => LedgerEventKind::Other,
    };

    Ok(LedgerEvent {
        id: event.id.to_string(),
        event_type: event.type_.to_string(),
        kind,
    })
}

fn mismatch(event: &Event) -> WebhookError {
    WebhookError::Payload(format!("Unexpected object for {}", event.type_))
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}
