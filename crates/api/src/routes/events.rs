//! Billing event ingest.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::post,
};

use billing_core::ingest::IngestOutcome;

use crate::AppState;

/// Creates the event routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/events", post(ingest_event))
}

/// POST `/events` - Apply one usage, validation or provisioning event.
///
/// Answers 200 for handled and skipped events, 422 when the event could
/// not be applied. Redelivering a 200 event is harmless.
async fn ingest_event(
    State(state): State<AppState>,
    body: Bytes,
) -> (StatusCode, Json<IngestOutcome>) {
    let outcome = state.ingest.handle_payload(&body).await;
    let status = match outcome {
        IngestOutcome::Failed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::OK,
    };
    (status, Json(outcome))
}
