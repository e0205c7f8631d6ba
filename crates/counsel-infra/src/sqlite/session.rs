//! SQLite session store implementation.
//!
//! Implements `SessionStore` from `counsel-core` using sqlx with split
//! read/write pools. The status transition is a compare-and-swap expressed
//! in SQL: the expected status lives in the WHERE clause, so two racing
//! transitions serialize on the single writer connection and only one can
//! match.

use chrono::{DateTime, Utc};
use counsel_core::session::store::{SessionStore, TransitionError};
use counsel_types::error::RepositoryError;
use counsel_types::money::Amount;
use counsel_types::session::{Modality, Session, SessionStatus};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `SessionStore`.
pub struct SqliteSessionStore {
    pool: DatabasePool,
}

impl SqliteSessionStore {
    /// Create a new store backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn current_status(
        &self,
        session_id: &Uuid,
    ) -> Result<Option<SessionStatus>, RepositoryError> {
        let row = sqlx::query("SELECT status FROM sessions WHERE id = ?")
            .bind(session_id.to_string())
            .fetch_optional(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let status: String = row
                    .try_get("status")
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(status.parse().map_err(RepositoryError::Query)?))
            }
            None => Ok(None),
        }
    }
}

/// Internal row type for mapping SQLite rows to domain Session.
struct SessionRow {
    id: String,
    client_id: String,
    advisor_id: String,
    modality: String,
    status: String,
    rate_per_minute_cents: Option<i64>,
    requested_at: String,
    started_at: Option<String>,
    ended_at: Option<String>,
    duration_minutes: Option<i64>,
    amount_billed_cents: Option<i64>,
}

impl SessionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            client_id: row.try_get("client_id")?,
            advisor_id: row.try_get("advisor_id")?,
            modality: row.try_get("modality")?,
            status: row.try_get("status")?,
            rate_per_minute_cents: row.try_get("rate_per_minute_cents")?,
            requested_at: row.try_get("requested_at")?,
            started_at: row.try_get("started_at")?,
            ended_at: row.try_get("ended_at")?,
            duration_minutes: row.try_get("duration_minutes")?,
            amount_billed_cents: row.try_get("amount_billed_cents")?,
        })
    }

    fn into_session(self) -> Result<Session, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid session id: {e}")))?;
        let client_id = Uuid::parse_str(&self.client_id)
            .map_err(|e| RepositoryError::Query(format!("invalid client_id: {e}")))?;
        let advisor_id = Uuid::parse_str(&self.advisor_id)
            .map_err(|e| RepositoryError::Query(format!("invalid advisor_id: {e}")))?;
        let modality: Modality = self.modality.parse().map_err(RepositoryError::Query)?;
        let status: SessionStatus = self.status.parse().map_err(RepositoryError::Query)?;
        let requested_at = parse_datetime(&self.requested_at)?;
        let started_at = self.started_at.as_deref().map(parse_datetime).transpose()?;
        let ended_at = self.ended_at.as_deref().map(parse_datetime).transpose()?;

        Ok(Session {
            id,
            client_id,
            advisor_id,
            modality,
            status,
            rate_per_minute: self
                .rate_per_minute_cents
                .map(|c| Amount::from_cents(c.max(0) as u64)),
            requested_at,
            started_at,
            ended_at,
            duration_minutes: self.duration_minutes.map(|m| m.max(0) as u32),
            amount_billed: self
                .amount_billed_cents
                .map(|c| Amount::from_cents(c.max(0) as u64)),
        })
    }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

impl SessionStore for SqliteSessionStore {
    async fn create(&self, session: &Session) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO sessions (id, client_id, advisor_id, modality, status, rate_per_minute_cents,
                                     requested_at, started_at, ended_at, duration_minutes, amount_billed_cents)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(session.id.to_string())
        .bind(session.client_id.to_string())
        .bind(session.advisor_id.to_string())
        .bind(session.modality.to_string())
        .bind(session.status.to_string())
        .bind(session.rate_per_minute.map(|r| r.cents() as i64))
        .bind(format_datetime(&session.requested_at))
        .bind(session.started_at.as_ref().map(format_datetime))
        .bind(session.ended_at.as_ref().map(format_datetime))
        .bind(session.duration_minutes.map(|m| m as i64))
        .bind(session.amount_billed.map(|a| a.cents() as i64))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn get(&self, session_id: &Uuid) -> Result<Option<Session>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?")
            .bind(session_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let session_row =
                    SessionRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(session_row.into_session()?))
            }
            None => Ok(None),
        }
    }

    async fn transition(
        &self,
        session_id: &Uuid,
        from: SessionStatus,
        to: SessionStatus,
    ) -> Result<(), TransitionError> {
        let result = sqlx::query("UPDATE sessions SET status = ? WHERE id = ? AND status = ?")
            .bind(to.to_string())
            .bind(session_id.to_string())
            .bind(from.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return match self.current_status(session_id).await? {
                Some(actual) => Err(TransitionError::Stale {
                    expected: from,
                    actual,
                }),
                None => Err(TransitionError::NotFound),
            };
        }

        Ok(())
    }

    async fn snapshot_rate(
        &self,
        session_id: &Uuid,
        rate_per_minute: Amount,
        started_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE sessions SET rate_per_minute_cents = ?, started_at = ? WHERE id = ?",
        )
        .bind(rate_per_minute.cents() as i64)
        .bind(format_datetime(&started_at))
        .bind(session_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn finalize(
        &self,
        session_id: &Uuid,
        duration_minutes: u32,
        amount: Amount,
        ended_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        // ended_at is written exactly once: the IS NULL guard refuses a
        // second finalize.
        let result = sqlx::query(
            r#"UPDATE sessions SET duration_minutes = ?, amount_billed_cents = ?, ended_at = ?
               WHERE id = ? AND ended_at IS NULL"#,
        )
        .bind(duration_minutes as i64)
        .bind(amount.cents() as i64)
        .bind(format_datetime(&ended_at))
        .bind(session_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return match self.current_status(session_id).await? {
                Some(_) => Err(RepositoryError::Conflict(format!(
                    "session {session_id} already finalized"
                ))),
                None => Err(RepositoryError::NotFound),
            };
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::pool::DatabasePool;

    async fn test_pool() -> DatabasePool {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        // Leak tempdir so it lives for the test
        std::mem::forget(dir);
        DatabasePool::new(&url).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get_session() {
        let pool = test_pool().await;
        let store = SqliteSessionStore::new(pool);

        let session = Session::request(Uuid::now_v7(), Uuid::now_v7(), Modality::Chat);
        store.create(&session).await.unwrap();

        let found = store.get(&session.id).await.unwrap().unwrap();
        assert_eq!(found.id, session.id);
        assert_eq!(found.client_id, session.client_id);
        assert_eq!(found.status, SessionStatus::PendingApproval);
        assert!(found.rate_per_minute.is_none());
        assert!(found.ended_at.is_none());
    }

    #[tokio::test]
    async fn test_get_missing_session_is_none() {
        let pool = test_pool().await;
        let store = SqliteSessionStore::new(pool);
        assert!(store.get(&Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transition_cas_succeeds_once() {
        let pool = test_pool().await;
        let store = SqliteSessionStore::new(pool);

        let session = Session::request(Uuid::now_v7(), Uuid::now_v7(), Modality::Chat);
        store.create(&session).await.unwrap();

        store
            .transition(
                &session.id,
                SessionStatus::PendingApproval,
                SessionStatus::InProgress,
            )
            .await
            .unwrap();

        // A second transition with the same expectation sees the new status
        let err = store
            .transition(
                &session.id,
                SessionStatus::PendingApproval,
                SessionStatus::InProgress,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransitionError::Stale {
                expected: SessionStatus::PendingApproval,
                actual: SessionStatus::InProgress,
            }
        ));
    }

    #[tokio::test]
    async fn test_transition_unknown_session_is_not_found() {
        let pool = test_pool().await;
        let store = SqliteSessionStore::new(pool);

        let err = store
            .transition(
                &Uuid::now_v7(),
                SessionStatus::PendingApproval,
                SessionStatus::Cancelled,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TransitionError::NotFound));
    }

    #[tokio::test]
    async fn test_snapshot_rate_sets_rate_and_start() {
        let pool = test_pool().await;
        let store = SqliteSessionStore::new(pool);

        let session = Session::request(Uuid::now_v7(), Uuid::now_v7(), Modality::Voice);
        store.create(&session).await.unwrap();

        let started_at = Utc::now();
        store
            .snapshot_rate(&session.id, Amount::from_units(2), started_at)
            .await
            .unwrap();

        let found = store.get(&session.id).await.unwrap().unwrap();
        assert_eq!(found.rate_per_minute, Some(Amount::from_units(2)));
        assert!(found.started_at.is_some());
        assert_eq!(found.modality, Modality::Voice);
    }

    #[tokio::test]
    async fn test_finalize_writes_once() {
        let pool = test_pool().await;
        let store = SqliteSessionStore::new(pool);

        let session = Session::request(Uuid::now_v7(), Uuid::now_v7(), Modality::Chat);
        store.create(&session).await.unwrap();

        store
            .finalize(&session.id, 2, Amount::from_units(4), Utc::now())
            .await
            .unwrap();

        let err = store
            .finalize(&session.id, 3, Amount::from_units(6), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));

        // First write stands
        let found = store.get(&session.id).await.unwrap().unwrap();
        assert_eq!(found.duration_minutes, Some(2));
        assert_eq!(found.amount_billed, Some(Amount::from_units(4)));
    }

    #[tokio::test]
    async fn test_finalize_unknown_session_is_not_found() {
        let pool = test_pool().await;
        let store = SqliteSessionStore::new(pool);

        let err = store
            .finalize(&Uuid::now_v7(), 1, Amount::from_units(2), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }
}
