//! SQLite rate card implementation.

use chrono::Utc;
use counsel_core::session::rates::RateCard;
use counsel_types::error::RepositoryError;
use counsel_types::money::Amount;
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `RateCard`.
pub struct SqliteRateCard {
    pool: DatabasePool,
}

impl SqliteRateCard {
    /// Create a new rate card backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Set or update an advisor's per-minute rate.
    pub async fn set_rate(
        &self,
        advisor_id: &Uuid,
        rate_per_minute: Amount,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO advisors (id, rate_per_minute_cents, updated_at) VALUES (?, ?, ?)
               ON CONFLICT(id) DO UPDATE
               SET rate_per_minute_cents = excluded.rate_per_minute_cents,
                   updated_at = excluded.updated_at"#,
        )
        .bind(advisor_id.to_string())
        .bind(rate_per_minute.cents() as i64)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }
}

impl RateCard for SqliteRateCard {
    async fn rate_per_minute(&self, advisor_id: &Uuid) -> Result<Amount, RepositoryError> {
        let row = sqlx::query("SELECT rate_per_minute_cents FROM advisors WHERE id = ?")
            .bind(advisor_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let cents: i64 = row
                    .try_get("rate_per_minute_cents")
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Amount::from_cents(cents.max(0) as u64))
            }
            None => Err(RepositoryError::NotFound),
        }
    }
}
