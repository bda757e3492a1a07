//! API route definitions.

use axum::Router;

use crate::AppState;

pub mod accounts;
pub mod charges;
pub mod events;
pub mod health;
pub mod payments;
pub mod transactions;
pub mod webhooks;

/// Creates the API router with all routes.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(accounts::routes())
        .merge(charges::routes())
        .merge(payments::routes())
        .merge(transactions::routes())
        .merge(webhooks::routes())
        .merge(events::routes())
}
