//! Transaction lookup and manual transitions.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use billing_core::ledger::{CorrelationKey, Transaction, TransitionOutcome, Transitioned};
use billing_shared::types::TransactionId;

use crate::AppState;
use crate::error::{ApiError, ApiResult};

/// Creates the transaction routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/transactions/lookup", get(lookup_transaction))
        .route("/transactions/{id}/succeed", post(succeed_transaction))
        .route("/transactions/{id}/cancel", post(cancel_transaction))
        .route("/transactions/{id}/fail", post(fail_transaction))
}

/// Query parameters for lookup. Exactly one identifier must be given;
/// `stream_contract_address` and `chunk_num` count as one.
#[derive(Debug, Default, Deserialize)]
pub struct LookupQuery {
    /// Payment-provider intent id.
    pub payment_intent_id: Option<String>,
    /// Checkout-session id.
    pub checkout_session_id: Option<String>,
    /// Stream contract address of a usage debit.
    pub stream_contract_address: Option<String>,
    /// Chunk number of a usage debit.
    pub chunk_num: Option<i64>,
}

impl LookupQuery {
    fn into_key(self) -> Result<CorrelationKey, ApiError> {
        match self {
            Self {
                payment_intent_id: Some(id),
                checkout_session_id: None,
                stream_contract_address: None,
                chunk_num: None,
            } => Ok(CorrelationKey::PaymentIntent(id)),
            Self {
                payment_intent_id: None,
                checkout_session_id: Some(id),
                stream_contract_address: None,
                chunk_num: None,
            } => Ok(CorrelationKey::CheckoutSession(id)),
            Self {
                payment_intent_id: None,
                checkout_session_id: None,
                stream_contract_address: Some(contract_address),
                chunk_num: Some(chunk_num),
            } => Ok(CorrelationKey::StreamChunk {
                contract_address,
                chunk_num,
            }),
            _ => Err(ApiError::validation(
                "give exactly one of payment_intent_id, checkout_session_id, \
                 or stream_contract_address with chunk_num",
            )),
        }
    }
}

/// A transaction after a transition request.
#[derive(Debug, Serialize)]
pub struct TransitionResponse {
    /// The transaction as stored.
    pub transaction: Transaction,
    /// Whether the request changed anything.
    pub outcome: TransitionOutcome,
}

impl From<Transitioned> for TransitionResponse {
    fn from(result: Transitioned) -> Self {
        Self {
            transaction: result.transaction,
            outcome: result.outcome,
        }
    }
}

fn parse_id(raw: &str) -> Result<TransactionId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::validation(format!("invalid transaction id: {raw}")))
}

/// GET `/transactions/lookup` - Find a transaction by an external identifier.
async fn lookup_transaction(
    State(state): State<AppState>,
    Query(query): Query<LookupQuery>,
) -> ApiResult<Json<Transaction>> {
    let key = query.into_key()?;
    let transaction = state.ledger.transaction_by_correlation_key(&key).await?;
    Ok(Json(transaction))
}

/// POST `/transactions/{id}/succeed`
async fn succeed_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TransitionResponse>> {
    let result = state.ledger.mark_succeeded(parse_id(&id)?).await?;
    Ok(Json(result.into()))
}

/// POST `/transactions/{id}/cancel`
async fn cancel_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TransitionResponse>> {
    let result = state.ledger.mark_canceled(parse_id(&id)?).await?;
    Ok(Json(result.into()))
}

/// POST `/transactions/{id}/fail`
async fn fail_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TransitionResponse>> {
    let result = state.ledger.mark_failed(parse_id(&id)?).await?;
    Ok(Json(result.into()))
}
