//! SQLite storage layer.
//!
//! Port implementations backed by SQLite with WAL mode and split
//! read/write connection pools.

pub mod pool;
pub mod rates;
pub mod session;
pub mod wallet;

pub use pool::DatabasePool;
pub use rates::SqliteRateCard;
pub use session::SqliteSessionStore;
pub use wallet::SqliteWallet;
