//! subscription-server
//!
//! Axum server exposing subscription creation and the Stripe webhook that
//! keeps local subscription records in sync.

mod app;
mod handlers;
mod state;

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use subscription_sync::{
    AppConfig, Reconciler, StripeClient, SubscriptionWriter, SupabaseClient, Tier, WebhookVerifier,
};

use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!(supabase_url = %config.supabase.url, "Configuration loaded");

    for tier in Tier::ALL {
        if config.prices.price_for(tier).is_err() {
            tracing::warn!(tier = %tier, "No Stripe price configured - requests for this tier will fail");
        }
    }

    let supabase = Arc::new(SupabaseClient::new(&config.supabase));
    let stripe = Arc::new(StripeClient::new(&config.stripe));

    let writer = SubscriptionWriter::new(
        supabase.clone(),
        supabase.clone(),
        supabase.clone(),
        stripe.clone(),
        config.prices.clone(),
    );
    let reconciler = Reconciler::new(
        supabase,
        stripe,
        config.prices.clone(),
        WebhookVerifier::new(&config.stripe.webhook_secret, config.stripe.webhook_tolerance_secs),
    );

    let state = AppState {
        writer: Arc::new(writer),
        reconciler: Arc::new(reconciler),
    };

    let app = app::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("subscription-server listening on http://{}", config.bind_addr);
    tracing::info!("  GET  /health            - Health check");
    tracing::info!("  POST /api/subscriptions - Create subscription");
    tracing::info!("  POST /webhook/stripe    - Stripe webhook");

    axum::serve(listener, app).await?;

    Ok(())
}
