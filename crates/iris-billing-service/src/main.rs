//! iris-billing service - Stripe entitlement reconciliation over HTTP.
//!
//! This is the main entry point for the iris-billing service.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iris_billing_service::{create_router, AppState, ServiceConfig, StripeClient};
use iris_billing_store::{MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,iris_billing=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting iris-billing service");

    // Load configuration from environment
    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        database_configured = %config.database_url.is_some(),
        webhook_secret_configured = %config.stripe_webhook_secret.is_some(),
        prices_configured = %config.price_map().len(),
        "Service configuration loaded"
    );

    let Some(stripe_key) = config.stripe_secret_key.as_deref() else {
        tracing::error!("STRIPE_SECRET_KEY is not set");
        return Err("STRIPE_SECRET_KEY is not set".into());
    };
    let billing = Arc::new(StripeClient::with_base_url(
        stripe_key,
        config.stripe_api_base.as_str(),
    )?);

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to PostgreSQL");
            let store = PgStore::connect(url).await?;
            store.migrate().await?;
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set - using in-memory store, state is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    // Build app state
    let state = AppState::new(config.clone(), store, billing);

    // Create the router
    let app = create_router(state);

    // Start HTTP server
    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
