//! In-memory wallet implementation.
//!
//! Used by core tests and local demo wiring. Balances live in a mutex-guarded
//! map; `apply_charge` performs the conditional debit and the advisor credit
//! under a single lock, giving the same atomicity the SQLite implementation
//! gets from a write transaction.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use counsel_types::error::RepositoryError;
use counsel_types::money::Amount;
use counsel_types::session::{EntryKind, Transaction};
use uuid::Uuid;

use super::{ChargeOutcome, Wallet};

/// In-memory `Wallet` backed by a `HashMap` of balances and an append-only
/// transaction log.
#[derive(Debug, Default)]
pub struct InMemoryWallet {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    balances: HashMap<Uuid, Amount>,
    ledger: Vec<Transaction>,
}

impl InMemoryWallet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit a user's balance directly (top-up path, outside session billing).
    pub fn deposit(&self, user_id: Uuid, amount: Amount) {
        let mut inner = self.inner.lock().expect("wallet lock poisoned");
        let balance = inner.balances.entry(user_id).or_insert(Amount::ZERO);
        *balance += amount;
    }

    /// Snapshot of the transaction log, oldest first.
    pub fn transactions(&self) -> Vec<Transaction> {
        self.inner.lock().expect("wallet lock poisoned").ledger.clone()
    }

    /// Sum of committed debits recorded against a session.
    pub fn debited_for_session(&self, session_id: &Uuid) -> Amount {
        let inner = self.inner.lock().expect("wallet lock poisoned");
        inner
            .ledger
            .iter()
            .filter(|t| t.session_id == *session_id && t.kind == EntryKind::Debit)
            .fold(Amount::ZERO, |acc, t| acc + t.amount)
    }
}

impl Wallet for InMemoryWallet {
    async fn balance(&self, user_id: &Uuid) -> Result<Amount, RepositoryError> {
        let inner = self.inner.lock().expect("wallet lock poisoned");
        Ok(inner.balances.get(user_id).copied().unwrap_or(Amount::ZERO))
    }

    async fn apply_charge(
        &self,
        session_id: &Uuid,
        client_id: &Uuid,
        advisor_id: &Uuid,
        amount: Amount,
    ) -> Result<ChargeOutcome, RepositoryError> {
        let mut inner = self.inner.lock().expect("wallet lock poisoned");

        let balance = inner
            .balances
            .get(client_id)
            .copied()
            .unwrap_or(Amount::ZERO);

        let Some(remaining) = balance.checked_sub(amount) else {
            return Ok(ChargeOutcome {
                committed: false,
                balance_after: balance,
            });
        };

        inner.balances.insert(*client_id, remaining);
        let advisor_balance = inner.balances.entry(*advisor_id).or_insert(Amount::ZERO);
        *advisor_balance += amount;

        let now = Utc::now();
        inner.ledger.push(Transaction {
            id: Uuid::now_v7(),
            session_id: *session_id,
            account_id: *client_id,
            kind: EntryKind::Debit,
            amount,
            created_at: now,
        });
        inner.ledger.push(Transaction {
            id: Uuid::now_v7(),
            session_id: *session_id,
            account_id: *advisor_id,
            kind: EntryKind::Credit,
            amount,
            created_at: now,
        });

        Ok(ChargeOutcome {
            committed: true,
            balance_after: remaining,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn balance_of_unknown_user_is_zero() {
        let wallet = InMemoryWallet::new();
        assert_eq!(wallet.balance(&Uuid::now_v7()).await.unwrap(), Amount::ZERO);
    }

    #[tokio::test]
    async fn charge_commits_when_balance_covers() {
        let wallet = InMemoryWallet::new();
        let client = Uuid::now_v7();
        let advisor = Uuid::now_v7();
        let session = Uuid::now_v7();
        wallet.deposit(client, Amount::from_units(5));

        let outcome = wallet
            .apply_charge(&session, &client, &advisor, Amount::from_units(4))
            .await
            .unwrap();

        assert!(outcome.committed);
        assert_eq!(outcome.balance_after, Amount::from_units(1));
        assert_eq!(wallet.balance(&advisor).await.unwrap(), Amount::from_units(4));
        assert_eq!(wallet.transactions().len(), 2);
    }

    #[tokio::test]
    async fn charge_refuses_when_balance_short() {
        let wallet = InMemoryWallet::new();
        let client = Uuid::now_v7();
        let advisor = Uuid::now_v7();
        let session = Uuid::now_v7();
        wallet.deposit(client, Amount::from_units(1));

        let outcome = wallet
            .apply_charge(&session, &client, &advisor, Amount::from_units(6))
            .await
            .unwrap();

        assert!(!outcome.committed);
        // Nothing moved, no ledger entries
        assert_eq!(outcome.balance_after, Amount::from_units(1));
        assert_eq!(wallet.balance(&client).await.unwrap(), Amount::from_units(1));
        assert_eq!(wallet.balance(&advisor).await.unwrap(), Amount::ZERO);
        assert!(wallet.transactions().is_empty());
    }

    #[tokio::test]
    async fn debited_for_session_sums_only_that_session() {
        let wallet = InMemoryWallet::new();
        let client = Uuid::now_v7();
        let advisor = Uuid::now_v7();
        let session_a = Uuid::now_v7();
        let session_b = Uuid::now_v7();
        wallet.deposit(client, Amount::from_units(10));

        wallet
            .apply_charge(&session_a, &client, &advisor, Amount::from_units(4))
            .await
            .unwrap();
        wallet
            .apply_charge(&session_b, &client, &advisor, Amount::from_units(2))
            .await
            .unwrap();

        assert_eq!(wallet.debited_for_session(&session_a), Amount::from_units(4));
        assert_eq!(wallet.debited_for_session(&session_b), Amount::from_units(2));
    }
}
