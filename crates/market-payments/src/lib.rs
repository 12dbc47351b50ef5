//! # market-payments
//!
//! Stripe integration for the showroom marketplace.
//!
//! ## Money flow
//!
//! ```text
//! ┌─────────┐  Checkout  ┌──────────────┐  Transfer  ┌──────────────────┐
//! │  Buyer  │───────────▶│  Platform    │───────────▶│ Seller (Express  │
//! │         │            │  balance     │  after     │ connected acct)  │
//! └─────────┘            └──────────────┘  pickup    └──────────────────┘
//! ```
//!
//! Buyers pay through hosted Stripe Checkout. Funds stay on the platform
//! until pickup is confirmed and the hold window has passed; the payout is then
//! a separate transfer to the seller's connected account, tagged with the
//! listing's transfer group and an idempotency key.
//!
//! Webhooks are verified with async-stripe's `Webhook::construct_event` and the
//! typed events are mapped to core [`LedgerEvent`](market_core::LedgerEvent)s.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use market_payments::{StripeLedger, WebhookVerifier};
//!
//! let ledger = StripeLedger::from_env()?;
//! let verifier = WebhookVerifier::from_env()?;
//!
//! let event = verifier.verify(&raw_body, signature_header)?;
//! ```

mod error;
mod ledger;
mod webhook;

pub use error::{Result, WebhookError};
pub use ledger::{StripeConfig, StripeLedger};
pub use webhook::{SIGNATURE_HEADER, WebhookVerifier};
