//! HTTP API layer with Axum routes.
//!
//! This crate provides:
//! - REST routes over the ledger, payment and ingest services
//! - The payment-provider webhook endpoint with signature verification
//! - JSON error responses

pub mod error;
pub mod routes;
pub mod signature;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use billing_core::ingest::EventIngest;
use billing_core::ledger::{AccountResolver, LedgerService, LedgerStore};
use billing_core::payment::PaymentService;
use billing_core::ports::{IdentityProvider, PaymentProvider};
use billing_shared::config::{BillingConfig, PaymentProviderConfig};
use billing_shared::types::Currency;

/// Settings for verifying provider webhooks.
#[derive(Debug, Clone)]
pub struct WebhookSettings {
    /// Endpoint signing secret. Deliveries are refused while it is empty.
    pub secret: String,
    /// Maximum age of a delivery, in seconds.
    pub tolerance_secs: u64,
}

impl From<&PaymentProviderConfig> for WebhookSettings {
    fn from(config: &PaymentProviderConfig) -> Self {
        Self {
            secret: config.webhook_secret.clone(),
            tolerance_secs: config.webhook_tolerance_secs,
        }
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Ledger reads and transitions.
    pub ledger: LedgerService,
    /// Get-or-create for accounts.
    pub resolver: AccountResolver,
    /// Payment initiation and webhook settlement.
    pub payments: PaymentService,
    /// Usage and validation event consumer.
    pub ingest: EventIngest,
    /// Currency balances are reported in.
    pub currency: Currency,
    /// Webhook verification settings.
    pub webhook: WebhookSettings,
}

impl AppState {
    /// Wires the services over one store and the external providers.
    pub fn new(
        store: Arc<dyn LedgerStore>,
        identity: Arc<dyn IdentityProvider>,
        provider: Arc<dyn PaymentProvider>,
        billing: &BillingConfig,
        webhook: WebhookSettings,
    ) -> Self {
        let ledger = LedgerService::new(store.clone());
        let resolver = AccountResolver::new(store, identity);
        let payments = PaymentService::new(
            ledger.clone(),
            resolver.clone(),
            provider,
            billing.currency,
        );
        let ingest = EventIngest::new(
            ledger.clone(),
            resolver.clone(),
            billing.currency,
            billing.initial_credit_minor,
        );
        Self {
            ledger,
            resolver,
            payments,
            ingest,
            currency: billing.currency,
            webhook,
        }
    }
}

/// Creates the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
