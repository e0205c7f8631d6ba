//! SessionStore trait definition.
//!
//! The store holds the durable record of each session and is the sole
//! arbiter of transition races: `transition` is a compare-and-swap on the
//! status column, and whichever caller commits first wins. A caller whose
//! expected status no longer matches gets `TransitionError::Stale`.

use counsel_types::error::RepositoryError;
use counsel_types::money::Amount;
use counsel_types::session::{Session, SessionStatus};
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Failure modes of a compare-and-swap status transition.
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("session not found")]
    NotFound,

    /// The session's current status did not match the expected one.
    /// This is the expected outcome of accept/decline and end/force-end
    /// races, not a bug.
    #[error("stale transition: expected {expected}, session is {actual}")]
    Stale {
        expected: SessionStatus,
        actual: SessionStatus,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Repository trait for durable session records.
///
/// Implementations live in counsel-infra (e.g., `SqliteSessionStore`) or
/// in-process for tests (`InMemorySessionStore`). Uses native async fn in
/// traits (RPITIT, Rust 2024 edition).
pub trait SessionStore: Send + Sync {
    /// Persist a new session record.
    fn create(
        &self,
        session: &Session,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Fetch a session by id.
    fn get(
        &self,
        session_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Session>, RepositoryError>> + Send;

    /// Compare-and-swap the status: succeeds only if the current status
    /// equals `from`. This is how stale-state races are detected.
    fn transition(
        &self,
        session_id: &Uuid,
        from: SessionStatus,
        to: SessionStatus,
    ) -> impl std::future::Future<Output = Result<(), TransitionError>> + Send;

    /// Record the rate snapshot and start time after a won accept transition.
    ///
    /// Only ever called by the accept winner, so no guard is needed here;
    /// the CAS in `transition` already serialized the race.
    fn snapshot_rate(
        &self,
        session_id: &Uuid,
        rate_per_minute: Amount,
        started_at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Write the final duration, amount, and end timestamp.
    ///
    /// `ended_at` is set exactly once: implementations must refuse to
    /// overwrite an existing end timestamp.
    fn finalize(
        &self,
        session_id: &Uuid,
        duration_minutes: u32,
        amount: Amount,
        ended_at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
