//! Router

use axum::{
    Router,
    http::{HeaderValue, header::CACHE_CONTROL},
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use crate::handlers::{admin_payouts, admin_token, checkout, health, pickup_verify, stripe_webhook, sweep};
use crate::state::AppState;

/// Build the application router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(health))
        // Buyer
        .route("/api/checkout", post(checkout))
        .route("/webhook/stripe", post(stripe_webhook))
        // Operator
        .route("/api/pickup/verify", post(pickup_verify))
        .route("/api/admin/payouts", post(admin_payouts))
        .route("/api/admin/payouts/sweep", post(sweep))
        .route("/api/admin/token", post(admin_token))
        .layer(SetResponseHeaderLayer::overriding(
            CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
