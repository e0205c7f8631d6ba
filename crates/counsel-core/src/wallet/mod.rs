//! Wallet port: the externally-owned balance collaborator.
//!
//! The wallet is the single truly shared resource in the system. All
//! session-related debits and credits go through `apply_charge`, an atomic
//! conditional operation ("debit only if balance >= amount"). The core never
//! implements this as a separate read followed by a write -- that window is
//! exactly where a double-charge or negative-balance bug would live.

pub mod memory;

use counsel_types::error::RepositoryError;
use counsel_types::money::Amount;
use uuid::Uuid;

pub use memory::InMemoryWallet;

/// Result of an atomic charge attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChargeOutcome {
    /// Whether the debit+credit committed. `false` means the client balance
    /// did not cover the amount; nothing was moved.
    pub committed: bool,
    /// The client's balance after the attempt (unchanged when not committed).
    pub balance_after: Amount,
}

/// Port for the wallet/ledger collaborator.
///
/// Implementations live in counsel-infra (e.g., `SqliteWallet`) or in-process
/// for tests (`InMemoryWallet`). Uses native async fn in traits (RPITIT,
/// Rust 2024 edition).
pub trait Wallet: Send + Sync {
    /// Current balance for a user. Unknown users report a zero balance.
    fn balance(
        &self,
        user_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Amount, RepositoryError>> + Send;

    /// Atomically debit the client and credit the advisor's earnings as one
    /// logical operation, guarded by `balance >= amount`.
    ///
    /// On success both ledger entries are recorded against `session_id`.
    /// On insufficient balance the outcome has `committed: false` and no
    /// state is mutated. Idempotency-safe under retry: a retried cycle
    /// re-attempts against the post-commit balance, never replays blindly.
    fn apply_charge(
        &self,
        session_id: &Uuid,
        client_id: &Uuid,
        advisor_id: &Uuid,
        amount: Amount,
    ) -> impl std::future::Future<Output = Result<ChargeOutcome, RepositoryError>> + Send;
}
