//! In-memory session store implementation.
//!
//! Used by core tests and local demo wiring. The CAS semantics of
//! `transition` are preserved under a single mutex, matching what the SQLite
//! implementation gets from a conditional UPDATE.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use counsel_types::error::RepositoryError;
use counsel_types::money::Amount;
use counsel_types::session::{Session, SessionStatus};
use uuid::Uuid;

use super::store::{SessionStore, TransitionError};

/// In-memory `SessionStore` backed by a mutex-guarded map.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<Uuid, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    async fn create(&self, session: &Session) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.lock().expect("store lock poisoned");
        if sessions.contains_key(&session.id) {
            return Err(RepositoryError::Conflict(format!(
                "session {} already exists",
                session.id
            )));
        }
        sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn get(&self, session_id: &Uuid) -> Result<Option<Session>, RepositoryError> {
        let sessions = self.sessions.lock().expect("store lock poisoned");
        Ok(sessions.get(session_id).cloned())
    }

    async fn transition(
        &self,
        session_id: &Uuid,
        from: SessionStatus,
        to: SessionStatus,
    ) -> Result<(), TransitionError> {
        let mut sessions = self.sessions.lock().expect("store lock poisoned");
        let session = sessions.get_mut(session_id).ok_or(TransitionError::NotFound)?;
        if session.status != from {
            return Err(TransitionError::Stale {
                expected: from,
                actual: session.status,
            });
        }
        session.status = to;
        Ok(())
    }

    async fn snapshot_rate(
        &self,
        session_id: &Uuid,
        rate_per_minute: Amount,
        started_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.lock().expect("store lock poisoned");
        let session = sessions.get_mut(session_id).ok_or(RepositoryError::NotFound)?;
        session.rate_per_minute = Some(rate_per_minute);
        session.started_at = Some(started_at);
        Ok(())
    }

    async fn finalize(
        &self,
        session_id: &Uuid,
        duration_minutes: u32,
        amount: Amount,
        ended_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.lock().expect("store lock poisoned");
        let session = sessions.get_mut(session_id).ok_or(RepositoryError::NotFound)?;
        if session.ended_at.is_some() {
            return Err(RepositoryError::Conflict(format!(
                "session {session_id} already finalized"
            )));
        }
        session.duration_minutes = Some(duration_minutes);
        session.amount_billed = Some(amount);
        session.ended_at = Some(ended_at);
        Ok(())
    }
}
