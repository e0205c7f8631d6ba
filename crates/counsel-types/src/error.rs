use thiserror::Error;

use crate::money::Amount;
use crate::session::SessionStatus;

/// Errors from session lifecycle and billing operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("actor is not a participant of this session")]
    Unauthorized,

    #[error("session is no longer {expected} (currently {actual})")]
    StaleState {
        expected: SessionStatus,
        actual: SessionStatus,
    },

    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Amount, available: Amount },

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl SessionError {
    /// Whether this error is the expected outcome of an accept/decline or
    /// end/force-end race. Callers swallow these as no-ops with a warning
    /// rather than surfacing a hard failure.
    pub fn is_stale(&self) -> bool {
        matches!(self, SessionError::StaleState { .. })
    }
}

impl From<RepositoryError> for SessionError {
    fn from(e: RepositoryError) -> Self {
        SessionError::Persistence(e.to_string())
    }
}

/// Errors from repository operations (used by trait definitions in counsel-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_state_display() {
        let err = SessionError::StaleState {
            expected: SessionStatus::PendingApproval,
            actual: SessionStatus::Cancelled,
        };
        assert_eq!(
            err.to_string(),
            "session is no longer pending_approval (currently cancelled)"
        );
        assert!(err.is_stale());
    }

    #[test]
    fn test_insufficient_funds_display() {
        let err = SessionError::InsufficientFunds {
            required: Amount::from_units(6),
            available: Amount::from_units(1),
        };
        assert!(err.to_string().contains("$6.00"));
        assert!(err.to_string().contains("$1.00"));
        assert!(!err.is_stale());
    }

    #[test]
    fn test_repository_error_converts_to_persistence() {
        let err: SessionError = RepositoryError::Query("syntax error".to_string()).into();
        assert!(matches!(err, SessionError::Persistence(_)));
    }
}
