//! Ledger-wide charge listing.

use axum::{Json, Router, extract::State, routing::get};
use serde_json::{Value, json};

use crate::AppState;
use crate::error::ApiResult;

/// Creates the charge routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/charges", get(list_all_charges))
}

/// GET `/charges` - Settled usage of every account grouped by day and stream.
async fn list_all_charges(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let charges = state.ledger.all_charges().await?;
    Ok(Json(json!({ "charges": charges })))
}
