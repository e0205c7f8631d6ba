//! Business logic and collaborator trait definitions for Counsel.
//!
//! This crate defines the "ports" (wallet, session store, rate card) that the
//! infrastructure layer implements, plus the session lifecycle controller,
//! the per-session billing engine, and the advisor notification coordinator.
//! It depends only on `counsel-types` -- never on `counsel-infra` or any
//! database/IO crate.

pub mod billing;
pub mod event;
pub mod notify;
pub mod session;
pub mod wallet;
