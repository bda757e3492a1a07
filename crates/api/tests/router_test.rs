//! End-to-end tests driving the router over the in-memory store.

#![allow(clippy::uninlined_format_args)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use http_body_util::BodyExt;
use rstest::rstest;
use serde_json::{Value, json};
use tower::ServiceExt;

use billing_api::routes::webhooks::SIGNATURE_HEADER;
use billing_api::{AppState, WebhookSettings, create_router, signature};
use billing_core::ledger::InMemoryLedgerStore;
use billing_core::testing::{ScriptedPaymentProvider, StaticIdentityProvider};
use billing_shared::config::BillingConfig;

const WEBHOOK_SECRET: &str = "whsec_router_test";

fn app() -> Router {
    let store = Arc::new(InMemoryLedgerStore::new());
    let identity = Arc::new(
        StaticIdentityProvider::new()
            .with_user("u1", "u1@example.com")
            .with_user("payer", "payer@example.com")
            .with_user("payee", "payee@example.com"),
    );
    let provider = Arc::new(ScriptedPaymentProvider::new());
    let state = AppState::new(
        store,
        identity,
        provider,
        &BillingConfig::default(),
        WebhookSettings {
            secret: WEBHOOK_SECRET.to_string(),
            tolerance_secs: 300,
        },
    );
    create_router(state)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn post_json(app: &Router, uri: &str, body: &Value) -> (StatusCode, Value) {
    let request = Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

async fn post_webhook(app: &Router, payload: &str, header: &str) -> (StatusCode, Value) {
    let request = Request::post("/api/v1/webhooks/payments")
        .header(SIGNATURE_HEADER, header)
        .body(Body::from(payload.to_string()))
        .unwrap();
    send(app, request).await
}

fn intent_succeeded(intent_id: &str) -> String {
    json!({
        "id": "evt_1",
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": intent_id, "object": "payment_intent" } }
    })
    .to_string()
}

async fn start_payment(app: &Router, amount: i64) -> Value {
    let (status, body) = post_json(
        app,
        "/api/v1/payments",
        &json!({ "user_id": "u1", "amount": amount }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body
}

#[tokio::test]
async fn test_health() {
    let (status, body) = get(&app(), "/api/v1/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_get_or_create_account_is_stable() {
    let app = app();
    let (status, first) = post_json(&app, "/api/v1/accounts", &json!({ "user_id": "u1" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["email"], "u1@example.com");

    let (_, second) = post_json(&app, "/api/v1/accounts", &json!({ "user_id": "u1" })).await;
    assert_eq!(first["id"], second["id"]);
}

#[tokio::test]
async fn test_account_errors_map_to_status_codes() {
    let app = app();
    let (status, body) =
        post_json(&app, "/api/v1/accounts", &json!({ "user_id": "ghost" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NOT_FOUND");

    let (status, body) = post_json(&app, "/api/v1/accounts", &json!({ "user_id": " " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_balance_of_unknown_user_is_zero() {
    let (status, body) = get(&app(), "/api/v1/accounts/nobody/balance").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance"], 0);
    assert_eq!(body["currency"], "USD");
}

#[tokio::test]
async fn test_payment_settles_through_signed_webhook() {
    let app = app();
    let payment = start_payment(&app, 1000).await;
    assert_eq!(payment["status"], "processing");
    assert_eq!(payment["payment_status"], "requires_payment_method");
    let intent_id = payment["payment_intent_id"].as_str().unwrap().to_string();
    assert_eq!(payment["client_secret"], format!("{intent_id}_secret"));

    let (_, body) = get(&app, "/api/v1/accounts/u1/balance").await;
    assert_eq!(body["balance"], 0);

    let payload = intent_succeeded(&intent_id);
    let header = signature::sign(payload.as_bytes(), WEBHOOK_SECRET, Utc::now().timestamp());
    let (status, body) = post_webhook(&app, &payload, &header).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["transaction_id"], payment["transaction_id"]);

    let (_, body) = get(&app, "/api/v1/accounts/u1/balance").await;
    assert_eq!(body["balance"], 1000);
    assert_eq!(body["balance_major"], "10.00");

    let (status, body) = get(
        &app,
        &format!("/api/v1/transactions/lookup?payment_intent_id={intent_id}"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["payment"]["status"], "succeeded");

    let (_, body) = get(&app, "/api/v1/accounts/u1/transactions").await;
    assert_eq!(body["transactions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_non_positive_payment_is_rejected() {
    let (status, body) = post_json(
        &app(),
        "/api/v1/payments",
        &json!({ "user_id": "u1", "amount": 0 }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_webhook_rejects_bad_signature() {
    let app = app();
    let payload = intent_succeeded("pi_1");
    let header = signature::sign(payload.as_bytes(), "whsec_wrong", Utc::now().timestamp());

    let (status, body) = post_webhook(&app, &payload, &header).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_webhook_acknowledges_unknown_intent_and_other_events() {
    let app = app();
    let now = Utc::now().timestamp();

    let payload = intent_succeeded("pi_unknown");
    let header = signature::sign(payload.as_bytes(), WEBHOOK_SECRET, now);
    let (status, body) = post_webhook(&app, &payload, &header).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["transaction_id"], Value::Null);

    let payload = json!({
        "type": "customer.created",
        "data": { "object": { "id": "cus_1" } }
    })
    .to_string();
    let header = signature::sign(payload.as_bytes(), WEBHOOK_SECRET, now);
    let (status, body) = post_webhook(&app, &payload, &header).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);
}

#[rstest]
#[case("succeed", "success")]
#[case("cancel", "canceled")]
#[case("fail", "failed")]
#[tokio::test]
async fn test_manual_transitions(#[case] action: &str, #[case] expected: &str) {
    let app = app();
    let payment = start_payment(&app, 500).await;
    let id = payment["transaction_id"].as_str().unwrap();
    let uri = format!("/api/v1/transactions/{id}/{action}");

    let (status, body) = post_json(&app, &uri, &Value::Null).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["transaction"]["status"], expected);
    assert_eq!(body["outcome"]["result"], "applied");

    let (status, body) = post_json(&app, &uri, &Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"]["result"], "unchanged");
}

#[tokio::test]
async fn test_transition_of_bad_or_unknown_id() {
    let app = app();
    let (status, _) = post_json(
        &app,
        "/api/v1/transactions/not-a-uuid/succeed",
        &Value::Null,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post_json(
        &app,
        "/api/v1/transactions/0192f5c0-0000-7000-8000-000000000000/succeed",
        &Value::Null,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NOT_FOUND");
}

#[tokio::test]
async fn test_usage_events_flow_into_charges() {
    let app = app();
    let usage = json!({
        "type": "usage_completed",
        "user_id": "payer",
        "client_user_id": "payee",
        "stream_id": "s1",
        "stream_name": "Launch",
        "stream_contract_address": "0xabc",
        "stream_is_live": true,
        "chunk_num": 3,
        "duration": 10,
        "price": "0.05",
    });

    let (status, body) = post_json(&app, "/api/v1/events", &usage).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "recorded");

    let (status, body) = post_json(&app, "/api/v1/events", &usage).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "skipped");

    let (status, body) = get(
        &app,
        "/api/v1/transactions/lookup?stream_contract_address=0xabc&chunk_num=3",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["amount"], 50);

    let validated = json!({
        "type": "validation_succeeded",
        "stream_contract_address": "0xabc",
        "chunk_num": 3,
    });
    let (status, body) = post_json(&app, "/api/v1/events", &validated).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "transitioned");
    assert_eq!(body["transition"]["result"], "applied");

    let (_, body) = get(&app, "/api/v1/accounts/payer/balance").await;
    assert_eq!(body["balance"], -50);
    let (_, body) = get(&app, "/api/v1/accounts/payee/balance").await;
    assert_eq!(body["balance"], 50);

    let (_, body) = get(&app, "/api/v1/accounts/payer/charges").await;
    let charges = body["charges"].as_array().unwrap();
    assert_eq!(charges.len(), 1);
    assert_eq!(charges[0]["total_cost"], 50);

    let (_, body) = get(&app, "/api/v1/charges").await;
    assert_eq!(body["charges"].as_array().unwrap().len(), 1);

    let (status, body) = get(&app, "/api/v1/accounts/payer/charges/chart").await;
    assert_eq!(status, StatusCode::OK);
    let chart = body["chart"].as_array().unwrap();
    assert!(!chart.is_empty());
    let total_live: i64 = chart.iter().map(|p| p["live"].as_i64().unwrap()).sum();
    assert_eq!(total_live, 50);
}

#[tokio::test]
async fn test_malformed_event_is_unprocessable() {
    let request = Request::post("/api/v1/events")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app(), request).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["outcome"], "failed");
}

#[tokio::test]
async fn test_lookup_requires_one_identifier() {
    let (status, body) = get(&app(), "/api/v1/transactions/lookup").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");
}
