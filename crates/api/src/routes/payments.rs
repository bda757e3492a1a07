//! Payment initiation.

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use serde::{Deserialize, Serialize};
use tracing::info;

use billing_core::ledger::{PaymentIntentStatus, TransactionStatus};
use billing_shared::types::TransactionId;

use crate::AppState;
use crate::error::ApiResult;

/// Creates the payment routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/payments", post(initiate_payment))
}

/// Request body for starting a payment.
#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    /// External user id to credit.
    pub user_id: String,
    /// Amount in minor units.
    pub amount: i64,
}

/// A started payment.
#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    /// The recorded payment transaction.
    pub transaction_id: TransactionId,
    /// Ledger status, `processing` until the provider settles.
    pub status: TransactionStatus,
    /// Provider intent id.
    pub payment_intent_id: Option<String>,
    /// Provider intent status at creation.
    pub payment_status: Option<PaymentIntentStatus>,
    /// Secret the client confirms the intent with.
    pub client_secret: String,
    /// Amount in minor units.
    pub amount: i64,
}

/// POST `/payments` - Create a provider intent and record it as processing.
async fn initiate_payment(
    State(state): State<AppState>,
    Json(request): Json<PaymentRequest>,
) -> ApiResult<(StatusCode, Json<PaymentResponse>)> {
    let initiated = state
        .payments
        .initiate_payment(&request.user_id, request.amount)
        .await?;
    let tx = initiated.transaction;
    info!(tx_id = %tx.id, user_id = %request.user_id, amount = tx.amount, "payment initiated");

    Ok((
        StatusCode::CREATED,
        Json(PaymentResponse {
            transaction_id: tx.id,
            status: tx.status,
            payment_intent_id: tx.payment.intent_id,
            payment_status: tx.payment.status,
            client_secret: initiated.client_secret,
            amount: tx.amount,
        }),
    ))
}
