//! Session, transaction, and participant types for Counsel.
//!
//! A session is one billable interaction between a client and an advisor.
//! Sessions are owned by the session store and mutated only through
//! lifecycle controller transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

use crate::money::Amount;

/// Lifecycle status of a session.
///
/// Maps to the CHECK constraint in the SQLite schema:
/// `CHECK (status IN ('pending_approval', 'in_progress', 'completed', 'cancelled'))`
///
/// Transitions are monotone toward a terminal state:
/// `pending_approval -> {in_progress, cancelled}`,
/// `in_progress -> {completed, cancelled}`. A terminal session is never
/// resurrected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    PendingApproval,
    InProgress,
    Completed,
    Cancelled,
}

impl SessionStatus {
    /// Whether this status is terminal (no further transitions allowed).
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::PendingApproval => write!(f, "pending_approval"),
            SessionStatus::InProgress => write!(f, "in_progress"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending_approval" => Ok(SessionStatus::PendingApproval),
            "in_progress" => Ok(SessionStatus::InProgress),
            "completed" => Ok(SessionStatus::Completed),
            "cancelled" => Ok(SessionStatus::Cancelled),
            other => Err(format!("invalid session status: '{other}'")),
        }
    }
}

impl Default for SessionStatus {
    fn default() -> Self {
        SessionStatus::PendingApproval
    }
}

/// Communication modality of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Chat,
    Voice,
    Video,
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modality::Chat => write!(f, "chat"),
            Modality::Voice => write!(f, "voice"),
            Modality::Video => write!(f, "video"),
        }
    }
}

impl FromStr for Modality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chat" => Ok(Modality::Chat),
            "voice" => Ok(Modality::Voice),
            "video" => Ok(Modality::Video),
            other => Err(format!("invalid modality: '{other}'")),
        }
    }
}

impl Default for Modality {
    fn default() -> Self {
        Modality::Chat
    }
}

/// Which actor ended a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndedBy {
    Client,
    Advisor,
    /// Forced termination (insufficient funds mid-session).
    System,
}

impl fmt::Display for EndedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndedBy::Client => write!(f, "client"),
            EndedBy::Advisor => write!(f, "advisor"),
            EndedBy::System => write!(f, "system"),
        }
    }
}

/// Why a pending session was declined or cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclineReason {
    InsufficientFunds,
    AdvisorDeclined,
    ClientCancelled,
}

impl fmt::Display for DeclineReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclineReason::InsufficientFunds => write!(f, "insufficient_funds"),
            DeclineReason::AdvisorDeclined => write!(f, "advisor_declined"),
            DeclineReason::ClientCancelled => write!(f, "client_cancelled"),
        }
    }
}

/// One billable interaction between a client and an advisor.
///
/// `rate_per_minute` is None until the advisor accepts; at accept time the
/// advisor's current rate is snapshotted and is immutable thereafter.
/// `duration_minutes` and `amount_billed` are written exactly once, at
/// finalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub client_id: Uuid,
    pub advisor_id: Uuid,
    pub modality: Modality,
    pub status: SessionStatus,
    /// Per-minute rate snapshotted when the advisor accepts.
    pub rate_per_minute: Option<Amount>,
    pub requested_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Final duration in whole minutes (rounded up), set at finalization.
    pub duration_minutes: Option<u32>,
    /// Final billed amount, set at finalization.
    pub amount_billed: Option<Amount>,
}

impl Session {
    /// Create a new pending session request.
    pub fn request(client_id: Uuid, advisor_id: Uuid, modality: Modality) -> Self {
        Self {
            id: Uuid::now_v7(),
            client_id,
            advisor_id,
            modality,
            status: SessionStatus::PendingApproval,
            rate_per_minute: None,
            requested_at: Utc::now(),
            started_at: None,
            ended_at: None,
            duration_minutes: None,
            amount_billed: None,
        }
    }

    /// Whether the given user is a participant of this session.
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.client_id == user_id || self.advisor_id == user_id
    }

    /// Which role the given participant plays, if any.
    pub fn role_of(&self, user_id: Uuid) -> Option<EndedBy> {
        if user_id == self.client_id {
            Some(EndedBy::Client)
        } else if user_id == self.advisor_id {
            Some(EndedBy::Advisor)
        } else {
            None
        }
    }
}

/// Which side of a ledger movement an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Funds leaving the client's wallet.
    Debit,
    /// Earnings credited to the advisor.
    Credit,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Debit => write!(f, "debit"),
            EntryKind::Credit => write!(f, "credit"),
        }
    }
}

impl FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "debit" => Ok(EntryKind::Debit),
            "credit" => Ok(EntryKind::Credit),
            other => Err(format!("invalid entry kind: '{other}'")),
        }
    }
}

/// An immutable ledger entry produced by a committed charge or adjustment.
///
/// Append-only: transactions are never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub session_id: Uuid,
    pub account_id: Uuid,
    pub kind: EntryKind,
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_status_roundtrip() {
        for status in [
            SessionStatus::PendingApproval,
            SessionStatus::InProgress,
            SessionStatus::Completed,
            SessionStatus::Cancelled,
        ] {
            let s = status.to_string();
            let parsed: SessionStatus = s.parse().unwrap();
            assert_eq!(status, parsed);
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!SessionStatus::PendingApproval.is_terminal());
        assert!(!SessionStatus::InProgress.is_terminal());
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_session_status_serde() {
        let json = serde_json::to_string(&SessionStatus::PendingApproval).unwrap();
        assert_eq!(json, "\"pending_approval\"");
        let parsed: SessionStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, SessionStatus::PendingApproval);
    }

    #[test]
    fn test_modality_roundtrip() {
        for modality in [Modality::Chat, Modality::Voice, Modality::Video] {
            let parsed: Modality = modality.to_string().parse().unwrap();
            assert_eq!(modality, parsed);
        }
    }

    #[test]
    fn test_new_request_is_pending_without_rate() {
        let session = Session::request(Uuid::now_v7(), Uuid::now_v7(), Modality::Chat);
        assert_eq!(session.status, SessionStatus::PendingApproval);
        assert!(session.rate_per_minute.is_none());
        assert!(session.started_at.is_none());
        assert!(session.ended_at.is_none());
    }

    #[test]
    fn test_participant_roles() {
        let client = Uuid::now_v7();
        let advisor = Uuid::now_v7();
        let session = Session::request(client, advisor, Modality::Chat);

        assert!(session.is_participant(client));
        assert!(session.is_participant(advisor));
        assert!(!session.is_participant(Uuid::now_v7()));

        assert_eq!(session.role_of(client), Some(EndedBy::Client));
        assert_eq!(session.role_of(advisor), Some(EndedBy::Advisor));
        assert_eq!(session.role_of(Uuid::now_v7()), None);
    }

    #[test]
    fn test_decline_reason_display() {
        assert_eq!(
            DeclineReason::InsufficientFunds.to_string(),
            "insufficient_funds"
        );
        assert_eq!(DeclineReason::AdvisorDeclined.to_string(), "advisor_declined");
    }
}
