//! # market-services
//!
//! Marketplace workflows over the adapter traits in `market-core`.
//!
//! ## Listing flow
//!
//! ```text
//! start_checkout ──▶ ledger checkout ──▶ handle_event (payment)
//!                                               │
//!                                   credential + pickup email
//!                                               │
//!                      verify_pickup ◀──────────┘
//!                            │
//!                 settle (after pickup / retry / sweep) ──▶ transfer
//!
//! handle_event (dispute, refund) ──▶ freeze or release payout
//! ```
//!
//! Every function takes a [`MarketContext`]; none keeps state between calls.

pub mod checkout;
pub mod context;
pub mod dispute;
pub mod history;
pub mod notices;
pub mod onboarding;
pub mod payment;
pub mod pickup;
pub mod settlement;
pub mod webhook;

#[cfg(test)]
mod testing;

pub use checkout::{CheckoutStarted, start_checkout};
pub use context::MarketContext;
pub use dispute::{
    DisputeOutcome, DisputeResolution, DisputeSummary, RiskScan, flag_risky_sellers, handle_dispute, handle_refund,
    list_disputes, resolve_dispute,
};
pub use history::{HistoryFilter, PayoutHistory, PayoutSummary, get_payout_history};
pub use onboarding::{OnboardingLink, OnboardingRequest, start_onboarding};
pub use payment::{PaymentOutcome, confirm_payment};
pub use pickup::{PickupConfirmed, PickupReport, verify_pickup, verify_pickup_and_payout};
pub use settlement::{FailureStage, SettlementOutcome, SweepReport, retry_payout, run_sweep, settle, settle_listing};
pub use webhook::{WebhookOutcome, handle_event};
