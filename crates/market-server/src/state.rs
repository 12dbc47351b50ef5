//! Application State

use std::sync::Arc;

use market_payments::WebhookVerifier;
use market_services::MarketContext;

use crate::auth::AdminAuth;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Store, ledger and mailer wiring (None if the store or Stripe is not configured)
    pub market: Option<Arc<MarketContext>>,

    /// Webhook signature verifier (None if the secret is not configured)
    pub webhook: Option<WebhookVerifier>,

    /// Admin credentials
    pub auth: Arc<AdminAuth>,
}
