//! HTTP request handlers.

pub mod session;
pub mod wallet;
pub mod ws;
