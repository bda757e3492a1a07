//! Account, balance and per-user history routes.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use billing_core::charges::{ChartPoint, DailyCharge};
use billing_core::ledger::Account;
use billing_shared::types::{Currency, Money};

use crate::AppState;
use crate::error::{ApiError, ApiResult};

/// Creates the account routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/accounts", post(get_or_create_account))
        .route("/accounts/{user_id}/balance", get(get_balance))
        .route("/accounts/{user_id}/charges", get(list_charges))
        .route("/accounts/{user_id}/charges/chart", get(charge_chart))
        .route("/accounts/{user_id}/transactions", get(list_deposits))
}

/// Request body for get-or-create.
#[derive(Debug, Deserialize)]
pub struct AccountRequest {
    /// External user id.
    pub user_id: String,
}

/// Balance of a user.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// External user id.
    pub user_id: String,
    /// Balance in minor units.
    pub balance: i64,
    /// Balance in major units, as a decimal string.
    pub balance_major: Decimal,
    /// Currency of the balance.
    pub currency: Currency,
}

/// Query parameters for the chart.
#[derive(Debug, Deserialize)]
pub struct ChartQuery {
    /// Any day in the month to chart. Defaults to today (UTC).
    pub date: Option<NaiveDate>,
}

/// POST `/accounts` - Return the user's account, creating it on first use.
async fn get_or_create_account(
    State(state): State<AppState>,
    Json(request): Json<AccountRequest>,
) -> ApiResult<Json<Account>> {
    let account = state.resolver.get_or_create(&request.user_id).await?;
    info!(account_id = %account.id, user_id = %account.user_id, "account resolved");
    Ok(Json(account))
}

/// GET `/accounts/{user_id}/balance` - Settled balance; zero without an account.
async fn get_balance(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<BalanceResponse>> {
    let balance = state.ledger.balance_for_user(&user_id).await?;
    Ok(Json(BalanceResponse {
        user_id,
        balance,
        balance_major: Money::new(balance, state.currency).to_major(),
        currency: state.currency,
    }))
}

/// GET `/accounts/{user_id}/charges` - Settled usage grouped by day and stream.
async fn list_charges(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let charges: Vec<DailyCharge> = state.ledger.charges_for_user(&user_id).await?;
    Ok(Json(json!({ "charges": charges })))
}

/// GET `/accounts/{user_id}/charges/chart` - Live and on-demand cost per day of a month.
async fn charge_chart(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<ChartQuery>,
) -> ApiResult<Json<Value>> {
    let today = query.date.unwrap_or_else(|| Utc::now().date_naive());
    let points: Vec<ChartPoint> = state
        .ledger
        .charge_chart_for_user(&user_id, today)
        .await?;
    Ok(Json(json!({ "chart": points })))
}

/// GET `/accounts/{user_id}/transactions` - Deposits and payments to the user.
async fn list_deposits(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Value>> {
    if user_id.trim().is_empty() {
        return Err(ApiError::validation("user_id must not be empty"));
    }
    let transactions = state.ledger.deposits_for_user(&user_id).await?;
    Ok(Json(json!({ "transactions": transactions })))
}
