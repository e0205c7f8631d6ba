//! Event types for the Counsel realtime channel.
//!
//! `SessionEvent` is the unified event type broadcast during session
//! lifecycle and billing. All variants are Clone + Send + Sync for use with
//! tokio broadcast channels.
//!
//! The realtime channel is at-least-once and best-effort: consumers must
//! deduplicate by (session_id, variant) and treat persisted session/wallet
//! state as authoritative, never the event stream.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::Amount;
use crate::session::{DeclineReason, EndedBy};

/// Events emitted during session lifecycle and billing.
///
/// Used by the event bus to notify participants (advisor alerting, client
/// balance display, session teardown). Events are notifications only --
/// they never roll back or drive billing state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A client requested a session; surfaced to the advisor exactly once
    /// by the notification coordinator.
    SessionRequested {
        session_id: Uuid,
        client_id: Uuid,
        advisor_id: Uuid,
    },

    /// The advisor answered the request.
    ChatResponse { session_id: Uuid, accepted: bool },

    /// A pending request was declined or auto-declined.
    ChatRejected {
        session_id: Uuid,
        reason: Option<DeclineReason>,
    },

    /// Metering started for an accepted session.
    BillingStart {
        session_id: Uuid,
        advisor_id: Uuid,
        client_id: Uuid,
    },

    /// Periodic billing snapshot. Idempotent: last value wins.
    BillingUpdate {
        session_id: Uuid,
        duration_seconds: u64,
        amount_billed: Amount,
        current_balance: Amount,
    },

    /// Metering stopped for a session.
    BillingStop { session_id: Uuid },

    /// A billing cycle could not be covered; the session is being force-ended.
    InsufficientFunds { session_id: Uuid },

    /// The session reached a terminal state.
    SessionEnded { session_id: Uuid, ended_by: EndedBy },
}

impl SessionEvent {
    /// The session this event concerns.
    pub fn session_id(&self) -> Uuid {
        match self {
            SessionEvent::SessionRequested { session_id, .. }
            | SessionEvent::ChatResponse { session_id, .. }
            | SessionEvent::ChatRejected { session_id, .. }
            | SessionEvent::BillingStart { session_id, .. }
            | SessionEvent::BillingUpdate { session_id, .. }
            | SessionEvent::BillingStop { session_id }
            | SessionEvent::InsufficientFunds { session_id }
            | SessionEvent::SessionEnded { session_id, .. } => *session_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = SessionEvent::InsufficientFunds {
            session_id: Uuid::now_v7(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"insufficient_funds\""));
    }

    #[test]
    fn test_billing_update_roundtrip() {
        let event = SessionEvent::BillingUpdate {
            session_id: Uuid::now_v7(),
            duration_seconds: 61,
            amount_billed: Amount::from_units(4),
            current_balance: Amount::from_units(1),
        };
        let json = serde_json::to_string(&event).unwrap();
        let parsed: SessionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_session_id_accessor() {
        let id = Uuid::now_v7();
        let event = SessionEvent::SessionEnded {
            session_id: id,
            ended_by: EndedBy::System,
        };
        assert_eq!(event.session_id(), id);
    }

    #[test]
    fn test_rejected_reason_serde() {
        let event = SessionEvent::ChatRejected {
            session_id: Uuid::now_v7(),
            reason: Some(DeclineReason::InsufficientFunds),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"reason\":\"insufficient_funds\""));
    }
}
