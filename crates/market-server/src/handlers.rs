//! HTTP Handlers
//!
//! Every response uses the `{ok: true, ...}` / `{ok: false, error, code}`
//! envelope. Public endpoints only ever return [`MarketError::user_message`];
//! admin endpoints get the full error text.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};

use market_core::MarketError;
use market_payments::SIGNATURE_HEADER;
use market_services::{
    HistoryFilter, MarketContext, OnboardingRequest, SettlementOutcome, flag_risky_sellers, get_payout_history,
    handle_event, list_disputes, resolve_dispute, retry_payout, run_sweep, start_checkout, start_onboarding,
    verify_pickup_and_payout,
};

use crate::auth::AuthError;
use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub store: Option<String>,
    pub ledger: Option<String>,
    pub notifier: Option<String>,
    pub webhook_configured: bool,
    pub admin_configured: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);
pub type ApiResult = Result<Json<Value>, ApiError>;

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub listing_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PickupRequest {
    pub payload: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TokenRequest {
    pub passcode: String,
}

/// Body of `/api/admin/payouts`
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdminPayoutRequest {
    pub action: String,
    pub record_id: Option<String>,
    pub listing_id: Option<String>,
    pub payload: Option<String>,
    pub status: Option<String>,
    pub limit: Option<usize>,
    pub seller_email: Option<String>,
    pub seller_name: Option<String>,
}

impl AdminPayoutRequest {
    fn record_id(&self) -> String {
        self.record_id
            .clone()
            .or_else(|| self.listing_id.clone())
            .unwrap_or_default()
    }
}

// ============================================================================
// Envelope helpers
// ============================================================================

fn error_response(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            ok: false,
            error: error.into(),
            code: code.into(),
            detail: None,
        }),
    )
}

/// Map a service error; `expose` selects the full message over the user-safe one
fn market_error(err: &MarketError, expose: bool) -> ApiError {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::error!(error = %err, "Request failed");
    }

    let message = if expose { err.to_string() } else { err.user_message() };
    (
        status,
        Json(ErrorResponse {
            ok: false,
            error: message,
            code: err.code().into(),
            detail: err.detail().cloned(),
        }),
    )
}

fn auth_error(err: &AuthError) -> ApiError {
    if matches!(err, AuthError::NotConfigured) {
        tracing::error!("Admin request rejected: admin secrets not configured");
    }
    error_response(err.status_code(), err.to_string(), err.code())
}

/// Serialize `value` and merge `ok: true` into it
fn ok_body<T: Serialize>(value: &T) -> ApiResult {
    let value = serde_json::to_value(value).map_err(|e| {
        tracing::error!(error = %e, "Response serialization failed");
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong.", "internal")
    })?;

    let body = match value {
        Value::Object(mut map) => {
            map.insert("ok".into(), Value::Bool(true));
            Value::Object(map)
        }
        other => json!({ "ok": true, "result": other }),
    };
    Ok(Json(body))
}

/// Parse a JSON body; an empty body reads as `{}`
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    let raw: &[u8] = if body.iter().all(u8::is_ascii_whitespace) { b"{}" } else { &body[..] };
    serde_json::from_slice(raw)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, format!("Invalid JSON body: {e}"), "bad_request"))
}

fn market(state: &AppState) -> Result<&Arc<MarketContext>, ApiError> {
    state.market.as_ref().ok_or_else(|| {
        tracing::error!("Marketplace adapters not configured");
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Server not configured.",
            "config_error",
        )
    })
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    state.auth.authorize(headers).map_err(|e| {
        tracing::warn!(error = %e, "Admin authorization failed");
        auth_error(&e)
    })
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let market = state.market.as_deref();

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        store: market.map(|m| m.store.name().to_string()),
        ledger: market.map(|m| m.ledger.name().to_string()),
        notifier: market.map(|m| m.notifier.name().to_string()),
        webhook_configured: state.webhook.is_some(),
        admin_configured: state.auth.is_configured(),
    })
}

/// Open a hosted checkout for a listing
pub async fn checkout(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let request: CheckoutRequest = parse_body(&body)?;
    let ctx = market(&state)?;

    let started = start_checkout(ctx, &request.listing_id)
        .await
        .map_err(|e| market_error(&e, false))?;
    ok_body(&started)
}

/// Stripe webhook receiver
///
/// Signature failures are 400. Business errors are acknowledged with 200;
/// only server faults return 500.
pub async fn stripe_webhook(State(state): State<AppState>, headers: HeaderMap, body: String) -> ApiResult {
    let verifier = state.webhook.as_ref().ok_or_else(|| {
        tracing::error!("Webhook received but STRIPE_WEBHOOK_SECRET is not set");
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Webhook not configured.", "config_error")
    })?;

    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let event = verifier.verify(&body, signature).map_err(|e| {
        tracing::warn!(error = %e, "Webhook rejected");
        let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::BAD_REQUEST);
        error_response(status, e.to_string(), "invalid_signature")
    })?;

    let ctx = market(&state)?;
    match handle_event(ctx, &event).await {
        Ok(outcome) => ok_body(&json!({ "received": true, "event_id": event.id, "outcome": outcome })),
        Err(e) if e.status_code() >= 500 => Err(market_error(&e, true)),
        Err(e) => {
            tracing::warn!(event_id = %event.id, error = %e, "Webhook event not applied");
            ok_body(&json!({ "received": true, "event_id": event.id, "ignored": e.user_message() }))
        }
    }
}

/// Pickup desk scan
pub async fn pickup_verify(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> ApiResult {
    require_admin(&state, &headers)?;
    let request: PickupRequest = parse_body(&body)?;
    let ctx = market(&state)?;

    let report = verify_pickup_and_payout(ctx, &request.payload)
        .await
        .map_err(|e| market_error(&e, true))?;
    ok_body(&report)
}

/// Operator payout console
pub async fn admin_payouts(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> ApiResult {
    require_admin(&state, &headers)?;
    let request: AdminPayoutRequest = parse_body(&body)?;
    let ctx = market(&state)?;
    let fail = |e: MarketError| market_error(&e, true);

    tracing::info!(action = %request.action, "Admin payout action");

    match request.action.trim() {
        "verify_pickup_and_payout" => {
            let payload = request.payload.clone().unwrap_or_default();
            ok_body(&verify_pickup_and_payout(ctx, &payload).await.map_err(fail)?)
        }
        "get_payout_history" => {
            let filter: HistoryFilter = request.status.as_deref().unwrap_or_default().parse().map_err(fail)?;
            ok_body(&get_payout_history(ctx, filter, request.limit).await.map_err(fail)?)
        }
        "retry_payout" => {
            let outcome = retry_payout(ctx, &request.record_id()).await.map_err(fail)?;
            settlement_response(&request.record_id(), &outcome)
        }
        "start_onboarding" => {
            let onboarding = OnboardingRequest {
                record_id: request.record_id(),
                seller_email: request.seller_email.clone(),
                seller_name: request.seller_name.clone(),
            };
            ok_body(&start_onboarding(ctx, &onboarding).await.map_err(fail)?)
        }
        "list_disputes" => {
            let disputes = list_disputes(ctx).await.map_err(fail)?;
            ok_body(&json!({ "count": disputes.len(), "records": disputes }))
        }
        "flag_risky_sellers" => ok_body(&flag_risky_sellers(ctx).await.map_err(fail)?),
        "resolve_dispute" => ok_body(&resolve_dispute(ctx, &request.record_id()).await.map_err(fail)?),
        "" => Err(error_response(StatusCode::BAD_REQUEST, "Missing action", "bad_request")),
        other => Err(error_response(
            StatusCode::BAD_REQUEST,
            format!("Unknown action: {other}"),
            "bad_request",
        )),
    }
}

// A skipped retry is a state conflict; a failed one is an upstream fault
fn settlement_response(listing_id: &str, outcome: &SettlementOutcome) -> ApiResult {
    match outcome {
        SettlementOutcome::Skipped { reason } => Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                ok: false,
                error: reason.clone(),
                code: "conflict".into(),
                detail: Some(json!({ "listing_id": listing_id })),
            }),
        )),
        SettlementOutcome::Failed { stage, error } => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                ok: false,
                error: error.clone(),
                code: "payout_failed".into(),
                detail: Some(json!({ "listing_id": listing_id, "stage": stage })),
            }),
        )),
        _ => ok_body(&json!({ "listing_id": listing_id, "payout": outcome })),
    }
}

/// Settle every eligible listing
pub async fn sweep(State(state): State<AppState>, headers: HeaderMap) -> ApiResult {
    require_admin(&state, &headers)?;
    let ctx = market(&state)?;

    let report = run_sweep(ctx).await.map_err(|e| market_error(&e, true))?;
    ok_body(&report)
}

/// Exchange the login passcode for a signed admin token
pub async fn admin_token(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let request: TokenRequest = parse_body(&body)?;

    let issued = state.auth.issue_token(&request.passcode).map_err(|e| {
        tracing::warn!(error = %e, "Admin token request rejected");
        auth_error(&e)
    })?;
    ok_body(&issued)
}
