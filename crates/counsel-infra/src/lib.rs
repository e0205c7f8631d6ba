//! Infrastructure implementations for Counsel.
//!
//! Durable implementations of the counsel-core ports: SQLite-backed wallet,
//! session store, and advisor rate card.

pub mod sqlite;
