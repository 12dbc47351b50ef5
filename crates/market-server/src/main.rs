//! Showroom Market HTTP Server
//!
//! Axum-based server for checkout, Stripe webhooks, pickup scans and the
//! operator payout console. Optionally runs the payout sweep on a timer.

mod auth;
mod handlers;
mod routes;
mod state;

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use market_core::{DisabledNotifier, Ledger, MarketSettings, Notifier, RecordStore};
use market_payments::{StripeLedger, WebhookVerifier};
use market_runtime::{AirtableStore, MailerSendConfig, MailerSendNotifier};
use market_services::{MarketContext, flag_risky_sellers, run_sweep};

use crate::auth::AdminAuth;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let settings = MarketSettings::from_env()?;
    tracing::info!(
        site_url = %settings.site_url,
        hold_hours = settings.payout_hold.num_hours(),
        currency = %settings.currency,
        "Settings loaded"
    );

    // Record store
    let store: Option<Arc<dyn RecordStore>> = match AirtableStore::from_env() {
        Ok(store) => {
            tracing::info!("✓ Airtable configured");
            Some(Arc::new(store))
        }
        Err(e) => {
            tracing::warn!("⚠ Airtable not configured - marketplace endpoints disabled");
            tracing::warn!("  {}", e);
            None
        }
    };

    // Payments
    let ledger: Option<Arc<dyn Ledger>> = match StripeLedger::from_env() {
        Ok(ledger) => {
            tracing::info!("✓ Stripe configured");
            Some(Arc::new(ledger))
        }
        Err(e) => {
            tracing::warn!("⚠ Stripe not configured - payments disabled");
            tracing::warn!("  {}", e);
            None
        }
    };

    let webhook = WebhookVerifier::from_env().ok();
    if webhook.is_none() {
        tracing::warn!("⚠ STRIPE_WEBHOOK_SECRET not set - webhooks will be rejected");
    }

    // Email
    let notifier: Arc<dyn Notifier> = match MailerSendConfig::from_env().map(MailerSendNotifier::new) {
        Some(Ok(mailer)) => {
            tracing::info!("✓ MailerSend configured");
            Arc::new(mailer)
        }
        Some(Err(e)) => {
            tracing::warn!("⚠ MailerSend client failed to build - email disabled: {}", e);
            Arc::new(DisabledNotifier)
        }
        None => {
            tracing::warn!("⚠ MailerSend not configured - email disabled");
            Arc::new(DisabledNotifier)
        }
    };

    let market = match (store, ledger) {
        (Some(store), Some(ledger)) => Some(Arc::new(MarketContext::new(store, ledger, notifier, settings))),
        _ => None,
    };

    let auth = AdminAuth::from_env();
    if !auth.is_configured() {
        tracing::warn!("⚠ ADMIN_SECRET_TOKEN / ADMIN_TOKEN_SIGNING_SECRET not set - admin endpoints disabled");
    }

    // Background payout sweep
    let sweep_interval = std::env::var("PAYOUT_SWEEP_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0);
    if let (Some(secs), Some(ctx)) = (sweep_interval, market.clone()) {
        tracing::info!("Payout sweep every {}s", secs);
        tokio::spawn(sweep_loop(ctx, Duration::from_secs(secs)));
    }

    let state = AppState {
        market,
        webhook,
        auth: Arc::new(auth),
    };
    let app = routes::router(state);

    // Start server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 market-server running on http://{}", addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                   - Health check");
    tracing::info!("  POST /api/checkout             - Create Stripe checkout");
    tracing::info!("  POST /webhook/stripe           - Stripe webhook");
    tracing::info!("  POST /api/pickup/verify        - Scan pickup QR (admin)");
    tracing::info!("  POST /api/admin/payouts        - Payout console (admin)");
    tracing::info!("  POST /api/admin/payouts/sweep  - Settle eligible payouts (admin)");
    tracing::info!("  POST /api/admin/token          - Issue admin token");
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}

async fn sweep_loop(ctx: Arc<MarketContext>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        match run_sweep(&ctx).await {
            Ok(report) => tracing::info!(
                processed = report.processed,
                healed = report.healed,
                skipped = report.skipped,
                failed = report.failed,
                "Scheduled sweep finished"
            ),
            Err(e) => tracing::error!(error = %e, "Scheduled sweep failed"),
        }
        if let Err(e) = flag_risky_sellers(&ctx).await {
            tracing::error!(error = %e, "Seller risk scan failed");
        }
    }
}
