//! Billing ledger server.
//!
//! Serves the HTTP API and runs the reconciliation scheduler until ctrl-c.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use billing_api::{AppState, WebhookSettings, create_router};
use billing_core::ledger::{LedgerService, LedgerStore};
use billing_core::ports::{IdentityProvider, PaymentProvider};
use billing_core::reconcile::{ReconcileScheduler, Reconciler, ScheduleConfig};
use billing_db::{SeaOrmLedgerStore, connect_with};
use billing_integrations::{HttpIdentityClient, StripeClient};
use billing_shared::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "billing=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;

    let db = connect_with(&config.database).await?;
    info!(
        max_connections = config.database.max_connections,
        "Connected to database"
    );
    let store: Arc<dyn LedgerStore> = Arc::new(SeaOrmLedgerStore::new(db));

    let provider: Arc<dyn PaymentProvider> =
        Arc::new(StripeClient::from_config(&config.payment_provider)?);
    let identity: Arc<dyn IdentityProvider> =
        Arc::new(HttpIdentityClient::from_config(&config.identity)?);
    info!(
        api_base = %config.payment_provider.api_base,
        identity = %config.identity.base_url,
        currency = %config.billing.currency,
        "External services configured"
    );

    // Background reconciliation
    let stale_claim_age = chrono::Duration::from_std(config.reconciler.stale_claim_age())
        .context("stale claim age out of range")?;
    let reconciler = Arc::new(Reconciler::new(
        LedgerService::new(store.clone()),
        provider.clone(),
        stale_claim_age,
    ));
    let scheduler = ReconcileScheduler::spawn(
        reconciler,
        ScheduleConfig {
            payment_check_interval: config.reconciler.payment_check_interval(),
            stale_sweep_interval: config.reconciler.stale_sweep_interval(),
        },
    );

    let state = AppState::new(
        store,
        identity,
        provider,
        &config.billing,
        WebhookSettings::from(&config.payment_provider),
    );
    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped, waiting for reconciliation tasks");
    scheduler.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
    }
}
