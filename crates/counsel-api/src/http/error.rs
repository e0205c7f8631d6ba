//! Application error type mapping to HTTP status codes and envelope format.
//!
//! The interesting mappings follow the session error taxonomy: a stale-state
//! race surfaces as 409 "no longer available" (an expected outcome, not a
//! server fault), insufficient funds as 402, and a non-participant actor
//! as 403.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use counsel_types::error::{RepositoryError, SessionError};

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Session lifecycle and billing errors.
    Session(SessionError),
    /// Repository failures outside the session error taxonomy.
    Repository(RepositoryError),
    /// Validation error.
    Validation(String),
    /// Generic internal error.
    Internal(String),
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        AppError::Session(e)
    }
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        AppError::Repository(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Session(SessionError::Validation(msg)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Session(SessionError::Unauthorized) => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "Actor is not a participant of this session".to_string(),
            ),
            AppError::Session(SessionError::StaleState { actual, .. }) => (
                StatusCode::CONFLICT,
                "STALE_STATE",
                format!("Session no longer available (currently {actual})"),
            ),
            AppError::Session(SessionError::InsufficientFunds {
                required,
                available,
            }) => (
                StatusCode::PAYMENT_REQUIRED,
                "INSUFFICIENT_FUNDS",
                format!("Balance {available} does not cover required {required}"),
            ),
            AppError::Session(SessionError::Persistence(msg)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "PERSISTENCE_ERROR",
                msg.clone(),
            ),
            AppError::Session(SessionError::Transport(msg)) => {
                (StatusCode::BAD_GATEWAY, "TRANSPORT_ERROR", msg.clone())
            }
            AppError::Repository(RepositoryError::NotFound) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                "Resource not found".to_string(),
            ),
            AppError::Repository(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "PERSISTENCE_ERROR",
                e.to_string(),
            ),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone())
            }
        };

        let body = json!({
            "data": null,
            "meta": {
                "request_id": "",
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "response_time_ms": 0
            },
            "errors": [{
                "code": code,
                "message": message,
            }]
        });

        (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}
