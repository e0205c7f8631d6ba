//! SQLite wallet implementation.
//!
//! Implements `Wallet` from `counsel-core` using sqlx with split read/write
//! pools. The charge is a single transaction on the writer pool whose debit
//! is guarded in SQL (`balance_cents >= amount`), so the conditional check
//! and the write are one atomic step -- never a read followed by a write.

use chrono::{DateTime, Utc};
use counsel_core::wallet::{ChargeOutcome, Wallet};
use counsel_types::error::RepositoryError;
use counsel_types::money::Amount;
use counsel_types::session::{EntryKind, Transaction};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `Wallet`.
pub struct SqliteWallet {
    pool: DatabasePool,
}

impl SqliteWallet {
    /// Create a new wallet backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Add funds to an account, creating the wallet row if needed.
    pub async fn deposit(&self, account_id: &Uuid, amount: Amount) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO wallets (account_id, balance_cents, updated_at) VALUES (?, ?, ?)
               ON CONFLICT(account_id) DO UPDATE
               SET balance_cents = balance_cents + excluded.balance_cents,
                   updated_at = excluded.updated_at"#,
        )
        .bind(account_id.to_string())
        .bind(amount.cents() as i64)
        .bind(format_datetime(&Utc::now()))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    /// Ledger entries recorded for a session, oldest first.
    pub async fn transactions_for_session(
        &self,
        session_id: &Uuid,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM transactions WHERE session_id = ? ORDER BY created_at ASC, id ASC")
            .bind(session_id.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut transactions = Vec::with_capacity(rows.len());
        for row in &rows {
            let tx_row =
                TransactionRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            transactions.push(tx_row.into_transaction()?);
        }

        Ok(transactions)
    }

    async fn balance_on_writer(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        account_id: &Uuid,
    ) -> Result<Amount, RepositoryError> {
        let row = sqlx::query("SELECT balance_cents FROM wallets WHERE account_id = ?")
            .bind(account_id.to_string())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let cents: i64 = row
                    .try_get("balance_cents")
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Amount::from_cents(cents.max(0) as u64))
            }
            None => Ok(Amount::ZERO),
        }
    }

    fn insert_ledger_entry<'q>(
        session_id: &Uuid,
        account_id: &Uuid,
        kind: EntryKind,
        amount: Amount,
        created_at: &DateTime<Utc>,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        sqlx::query(
            r#"INSERT INTO transactions (id, session_id, account_id, kind, amount_cents, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(Uuid::now_v7().to_string())
        .bind(session_id.to_string())
        .bind(account_id.to_string())
        .bind(kind.to_string())
        .bind(amount.cents() as i64)
        .bind(format_datetime(created_at))
    }
}

/// Internal row type for mapping SQLite rows to domain Transaction.
struct TransactionRow {
    id: String,
    session_id: String,
    account_id: String,
    kind: String,
    amount_cents: i64,
    created_at: String,
}

impl TransactionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            session_id: row.try_get("session_id")?,
            account_id: row.try_get("account_id")?,
            kind: row.try_get("kind")?,
            amount_cents: row.try_get("amount_cents")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_transaction(self) -> Result<Transaction, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid transaction id: {e}")))?;
        let session_id = Uuid::parse_str(&self.session_id)
            .map_err(|e| RepositoryError::Query(format!("invalid session_id: {e}")))?;
        let account_id = Uuid::parse_str(&self.account_id)
            .map_err(|e| RepositoryError::Query(format!("invalid account_id: {e}")))?;
        let kind: EntryKind = self.kind.parse().map_err(RepositoryError::Query)?;
        let created_at = parse_datetime(&self.created_at)?;

        Ok(Transaction {
            id,
            session_id,
            account_id,
            kind,
            amount: Amount::from_cents(self.amount_cents.max(0) as u64),
            created_at,
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

impl Wallet for SqliteWallet {
    async fn balance(&self, user_id: &Uuid) -> Result<Amount, RepositoryError> {
        let row = sqlx::query("SELECT balance_cents FROM wallets WHERE account_id = ?")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let cents: i64 = row
                    .try_get("balance_cents")
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Amount::from_cents(cents.max(0) as u64))
            }
            None => Ok(Amount::ZERO),
        }
    }

    async fn apply_charge(
        &self,
        session_id: &Uuid,
        client_id: &Uuid,
        advisor_id: &Uuid,
        amount: Amount,
    ) -> Result<ChargeOutcome, RepositoryError> {
        let mut tx = self
            .pool
            .writer
            .begin()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let now = Utc::now();

        // The balance guard lives in the WHERE clause: zero rows affected
        // means the balance did not cover the amount and nothing moved.
        let debit = sqlx::query(
            r#"UPDATE wallets SET balance_cents = balance_cents - ?1, updated_at = ?2
               WHERE account_id = ?3 AND balance_cents >= ?1"#,
        )
        .bind(amount.cents() as i64)
        .bind(format_datetime(&now))
        .bind(client_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if debit.rows_affected() == 0 {
            let balance_after = Self::balance_on_writer(&mut tx, client_id).await?;
            tx.rollback()
                .await
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            return Ok(ChargeOutcome {
                committed: false,
                balance_after,
            });
        }

        sqlx::query(
            r#"INSERT INTO wallets (account_id, balance_cents, updated_at) VALUES (?, ?, ?)
               ON CONFLICT(account_id) DO UPDATE
               SET balance_cents = balance_cents + excluded.balance_cents,
                   updated_at = excluded.updated_at"#,
        )
        .bind(advisor_id.to_string())
        .bind(amount.cents() as i64)
        .bind(format_datetime(&now))
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Self::insert_ledger_entry(session_id, client_id, EntryKind::Debit, amount, &now)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Self::insert_ledger_entry(session_id, advisor_id, EntryKind::Credit, amount, &now)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let balance_after = Self::balance_on_writer(&mut tx, client_id).await?;

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(ChargeOutcome {
            committed: true,
            balance_after,
        })
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

    async fn seed_session(pool: &DatabasePool, client: &Uuid, advisor: &Uuid) -> Uuid {
        let id = Uuid::now_v7();
        sqlx::query(
            r#"INSERT INTO sessions (id, client_id, advisor_id, modality, status, requested_at)
               VALUES (?, ?, ?, 'chat', 'in_progress', ?)"#,
        )
        .bind(id.to_string())
        .bind(client.to_string())
        .bind(advisor.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&pool.writer)
        .await
        .unwrap();
        id
    }

    #[tokio::test]
    async fn test_unknown_account_has_zero_balance() {
        let pool = test_pool().await;
        let wallet = SqliteWallet::new(pool);

        let balance = wallet.balance(&Uuid::now_v7()).await.unwrap();
        assert_eq!(balance, Amount::ZERO);
    }

    #[tokio::test]
    async fn test_deposit_accumulates() {
        let pool = test_pool().await;
        let wallet = SqliteWallet::new(pool);
        let account = Uuid::now_v7();

        wallet.deposit(&account, Amount::from_units(3)).await.unwrap();
        wallet.deposit(&account, Amount::from_cents(50)).await.unwrap();

        assert_eq!(
            wallet.balance(&account).await.unwrap(),
            Amount::from_cents(350)
        );
    }

    #[tokio::test]
    async fn test_covered_charge_moves_funds_and_records_ledger() {
        let pool = test_pool().await;
        let wallet = SqliteWallet::new(pool.clone());
        let client = Uuid::now_v7();
        let advisor = Uuid::now_v7();
        let session_id = seed_session(&pool, &client, &advisor).await;

        wallet.deposit(&client, Amount::from_units(5)).await.unwrap();

        let outcome = wallet
            .apply_charge(&session_id, &client, &advisor, Amount::from_units(4))
            .await
            .unwrap();

        assert!(outcome.committed);
        assert_eq!(outcome.balance_after, Amount::from_units(1));
        assert_eq!(
            wallet.balance(&client).await.unwrap(),
            Amount::from_units(1)
        );
        assert_eq!(
            wallet.balance(&advisor).await.unwrap(),
            Amount::from_units(4)
        );

        let ledger = wallet.transactions_for_session(&session_id).await.unwrap();
        assert_eq!(ledger.len(), 2);
        assert!(ledger
            .iter()
            .any(|t| t.kind == EntryKind::Debit && t.account_id == client));
        assert!(ledger
            .iter()
            .any(|t| t.kind == EntryKind::Credit && t.account_id == advisor));
    }

    #[tokio::test]
    async fn test_uncovered_charge_moves_nothing() {
        let pool = test_pool().await;
        let wallet = SqliteWallet::new(pool.clone());
        let client = Uuid::now_v7();
        let advisor = Uuid::now_v7();
        let session_id = seed_session(&pool, &client, &advisor).await;

        wallet.deposit(&client, Amount::from_units(1)).await.unwrap();

        let outcome = wallet
            .apply_charge(&session_id, &client, &advisor, Amount::from_units(6))
            .await
            .unwrap();

        assert!(!outcome.committed);
        assert_eq!(outcome.balance_after, Amount::from_units(1));
        assert_eq!(
            wallet.balance(&client).await.unwrap(),
            Amount::from_units(1)
        );
        assert_eq!(wallet.balance(&advisor).await.unwrap(), Amount::ZERO);
        assert!(wallet
            .transactions_for_session(&session_id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_charge_against_missing_wallet_is_not_committed() {
        let pool = test_pool().await;
        let wallet = SqliteWallet::new(pool.clone());
        let client = Uuid::now_v7();
        let advisor = Uuid::now_v7();
        let session_id = seed_session(&pool, &client, &advisor).await;

        let outcome = wallet
            .apply_charge(&session_id, &client, &advisor, Amount::from_units(2))
            .await
            .unwrap();

        assert!(!outcome.committed);
        assert_eq!(outcome.balance_after, Amount::ZERO);
    }

    #[tokio::test]
    async fn test_balance_never_goes_negative() {
        let pool = test_pool().await;
        let wallet = SqliteWallet::new(pool.clone());
        let client = Uuid::now_v7();
        let advisor = Uuid::now_v7();
        let session_id = seed_session(&pool, &client, &advisor).await;

        wallet.deposit(&client, Amount::from_units(5)).await.unwrap();

        // First charge drains most of the balance, second cannot be covered
        let first = wallet
            .apply_charge(&session_id, &client, &advisor, Amount::from_units(4))
            .await
            .unwrap();
        assert!(first.committed);

        let second = wallet
            .apply_charge(&session_id, &client, &advisor, Amount::from_units(4))
            .await
            .unwrap();
        assert!(!second.committed);
        assert_eq!(
            wallet.balance(&client).await.unwrap(),
            Amount::from_units(1)
        );
    }
}
