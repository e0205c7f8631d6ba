//! Session lifecycle HTTP handlers.
//!
//! Endpoints:
//! - POST /api/v1/sessions                    - Request a session
//! - GET  /api/v1/sessions/{id}               - Get a session
//! - POST /api/v1/sessions/{id}/accept        - Advisor accepts
//! - POST /api/v1/sessions/{id}/decline       - Advisor declines / client cancels
//! - POST /api/v1/sessions/{id}/end           - Participant ends the session
//! - POST /api/v1/sessions/{id}/mute          - Silence the pending alert
//! - GET  /api/v1/sessions/{id}/transactions  - Ledger entries for a session

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use uuid::Uuid;

use counsel_types::session::{DeclineReason, Modality, Session, Transaction};

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Request body for creating a session.
#[derive(Debug, Deserialize)]
pub struct RequestSessionBody {
    pub client_id: Uuid,
    pub advisor_id: Uuid,
    #[serde(default)]
    pub modality: Modality,
}

/// Request body for declining a session.
#[derive(Debug, Deserialize, Default)]
pub struct DeclineBody {
    #[serde(default)]
    pub reason: Option<DeclineReason>,
}

/// Request body for ending a session.
#[derive(Debug, Deserialize)]
pub struct EndBody {
    /// The participant requesting the end.
    pub actor_id: Uuid,
}

/// Parse a UUID from a path parameter, returning a 400 error on invalid format.
fn parse_uuid(s: &str) -> Result<Uuid, AppError> {
    s.parse::<Uuid>()
        .map_err(|_| AppError::Validation(format!("Invalid UUID: {s}")))
}

/// POST /api/v1/sessions - Request a new session.
///
/// Runs the admission check and, on success, announces the pending session
/// to the advisor.
pub async fn request_session(
    State(state): State<AppState>,
    Json(body): Json<RequestSessionBody>,
) -> Result<Json<ApiResponse<Session>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let session = state
        .controller
        .request_session(body.client_id, body.advisor_id, body.modality)
        .await?;

    state.coordinator.announce(&session).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let resp = ApiResponse::success(session.clone(), request_id, elapsed)
        .with_link("self", &format!("/api/v1/sessions/{}", session.id))
        .with_link("accept", &format!("/api/v1/sessions/{}/accept", session.id))
        .with_link(
            "decline",
            &format!("/api/v1/sessions/{}/decline", session.id),
        );

    Ok(Json(resp))
}

/// GET /api/v1/sessions/{id} - Get a session by ID.
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<Session>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let sid = parse_uuid(&session_id)?;
    let session = state.controller.get_session(&sid).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let resp = ApiResponse::success(session, request_id, elapsed)
        .with_link("self", &format!("/api/v1/sessions/{sid}"))
        .with_link(
            "transactions",
            &format!("/api/v1/sessions/{sid}/transactions"),
        );

    Ok(Json(resp))
}

/// POST /api/v1/sessions/{id}/accept - Advisor accepts a pending session.
///
/// A stale-state outcome (someone else resolved the session first) surfaces
/// as 409; a drained client balance converts to an auto-decline and
/// surfaces as 402.
pub async fn accept_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<Session>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let sid = parse_uuid(&session_id)?;
    let session = state.coordinator.accept(sid).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let resp = ApiResponse::success(session, request_id, elapsed)
        .with_link("self", &format!("/api/v1/sessions/{sid}"))
        .with_link("end", &format!("/api/v1/sessions/{sid}/end"));

    Ok(Json(resp))
}

/// POST /api/v1/sessions/{id}/decline - Decline a pending session.
pub async fn decline_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Option<Json<DeclineBody>>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let sid = parse_uuid(&session_id)?;
    let reason = body.and_then(|Json(b)| b.reason);
    state.coordinator.decline(sid, reason).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let resp = ApiResponse::success(
        serde_json::json!({"declined": true, "session_id": sid}),
        request_id,
        elapsed,
    );

    Ok(Json(resp))
}

/// POST /api/v1/sessions/{id}/end - A participant ends the session.
pub async fn end_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<EndBody>,
) -> Result<Json<ApiResponse<Session>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let sid = parse_uuid(&session_id)?;
    state.controller.end_session(sid, body.actor_id).await?;
    let session = state.controller.get_session(&sid).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let resp = ApiResponse::success(session, request_id, elapsed)
        .with_link("self", &format!("/api/v1/sessions/{sid}"))
        .with_link(
            "transactions",
            &format!("/api/v1/sessions/{sid}/transactions"),
        );

    Ok(Json(resp))
}

/// POST /api/v1/sessions/{id}/mute - Silence the pending-session alert.
pub async fn mute_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let sid = parse_uuid(&session_id)?;
    state.coordinator.mute(&sid);

    let elapsed = start.elapsed().as_millis() as u64;
    let resp = ApiResponse::success(
        serde_json::json!({"muted": true, "session_id": sid}),
        request_id,
        elapsed,
    );

    Ok(Json(resp))
}

/// GET /api/v1/sessions/{id}/transactions - Ledger entries for a session.
pub async fn get_transactions(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<Transaction>>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let sid = parse_uuid(&session_id)?;
    let transactions = state.wallet.transactions_for_session(&sid).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let resp = ApiResponse::success(transactions, request_id, elapsed)
        .with_link("self", &format!("/api/v1/sessions/{sid}/transactions"))
        .with_link("session", &format!("/api/v1/sessions/{sid}"));

    Ok(Json(resp))
}
