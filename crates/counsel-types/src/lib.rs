//! Shared domain types for Counsel.
//!
//! This crate contains the core domain types used across the Counsel platform:
//! Session, Amount, Transaction, SessionEvent, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod money;
pub mod session;
