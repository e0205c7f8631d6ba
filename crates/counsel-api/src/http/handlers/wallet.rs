//! Wallet and advisor-rate HTTP handlers.
//!
//! Endpoints:
//! - GET  /api/v1/wallets/{id}          - Current balance
//! - POST /api/v1/wallets/{id}/deposit  - Add funds
//! - PUT  /api/v1/advisors/{id}/rate    - Set an advisor's per-minute rate

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, State};
use counsel_core::wallet::Wallet;
use serde::Deserialize;
use uuid::Uuid;

use counsel_types::money::Amount;

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Request body for a deposit.
#[derive(Debug, Deserialize)]
pub struct DepositBody {
    pub amount_cents: u64,
}

/// Request body for setting an advisor rate.
#[derive(Debug, Deserialize)]
pub struct RateBody {
    pub rate_per_minute_cents: u64,
}

fn parse_uuid(s: &str) -> Result<Uuid, AppError> {
    s.parse::<Uuid>()
        .map_err(|_| AppError::Validation(format!("Invalid UUID: {s}")))
}

/// GET /api/v1/wallets/{id} - Current balance for an account.
pub async fn get_balance(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let aid = parse_uuid(&account_id)?;
    let balance = state.wallet.balance(&aid).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let resp = ApiResponse::success(
        serde_json::json!({
            "account_id": aid,
            "balance_cents": balance.cents(),
            "balance": balance.to_string(),
        }),
        request_id,
        elapsed,
    )
    .with_link("self", &format!("/api/v1/wallets/{aid}"));

    Ok(Json(resp))
}

/// POST /api/v1/wallets/{id}/deposit - Add funds to an account.
pub async fn deposit(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    Json(body): Json<DepositBody>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    if body.amount_cents == 0 {
        return Err(AppError::Validation(
            "Deposit amount must be positive".to_string(),
        ));
    }

    let aid = parse_uuid(&account_id)?;
    let amount = Amount::from_cents(body.amount_cents);
    state.wallet.deposit(&aid, amount).await?;
    let balance = state.wallet.balance(&aid).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let resp = ApiResponse::success(
        serde_json::json!({
            "account_id": aid,
            "deposited_cents": amount.cents(),
            "balance_cents": balance.cents(),
        }),
        request_id,
        elapsed,
    )
    .with_link("self", &format!("/api/v1/wallets/{aid}"));

    Ok(Json(resp))
}

/// PUT /api/v1/advisors/{id}/rate - Set an advisor's per-minute rate.
///
/// Affects future accepts only; already-running sessions keep the rate
/// snapshotted when they were accepted.
pub async fn set_rate(
    State(state): State<AppState>,
    Path(advisor_id): Path<String>,
    Json(body): Json<RateBody>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    if body.rate_per_minute_cents == 0 {
        return Err(AppError::Validation(
            "Rate must be positive".to_string(),
        ));
    }

    let aid = parse_uuid(&advisor_id)?;
    let rate = Amount::from_cents(body.rate_per_minute_cents);
    state.rates.set_rate(&aid, rate).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let resp = ApiResponse::success(
        serde_json::json!({
            "advisor_id": aid,
            "rate_per_minute_cents": rate.cents(),
        }),
        request_id,
        elapsed,
    );

    Ok(Json(resp))
}
