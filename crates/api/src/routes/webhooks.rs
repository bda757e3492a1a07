//! Payment-provider webhook.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::AppState;
use crate::error::{ApiError, ApiResult};
use crate::signature;

/// Header carrying the delivery signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

const INTENT_SUCCEEDED: &str = "payment_intent.succeeded";

/// Creates the webhook routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/webhooks/payments", post(payment_webhook))
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: WebhookData,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    object: WebhookObject,
}

#[derive(Debug, Deserialize)]
struct WebhookObject {
    id: String,
}

/// POST `/webhooks/payments` - Verify and apply a provider event.
///
/// Unknown intents and unhandled event types are acknowledged so the
/// provider stops retrying them.
async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    if state.webhook.secret.is_empty() {
        error!("Webhook secret is not configured; refusing delivery");
        return Err(ApiError::unauthorized("webhook signing is not configured"));
    }

    let header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("missing signature header"))?;

    signature::verify(
        header,
        &body,
        &state.webhook.secret,
        state.webhook.tolerance_secs,
        Utc::now().timestamp(),
    )
    .map_err(|e| {
        warn!(error = %e, "Rejected webhook delivery");
        ApiError::unauthorized(e.to_string())
    })?;

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::validation(format!("invalid webhook payload: {e}")))?;

    if event.event_type != INTENT_SUCCEEDED {
        debug!(event_type = %event.event_type, "Ignoring webhook event");
        return Ok(Json(json!({ "received": true })));
    }

    let intent_id = event.data.object.id;
    let settled = state.payments.handle_intent_succeeded(&intent_id).await?;
    if let Some(result) = &settled {
        info!(
            tx_id = %result.transaction.id,
            intent_id = %intent_id,
            applied = result.outcome.is_applied(),
            "Payment settled from webhook"
        );
    }

    Ok(Json(json!({
        "received": true,
        "transaction_id": settled.map(|r| r.transaction.id),
    })))
}
