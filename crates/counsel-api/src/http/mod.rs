//! REST API layer: router, handlers, error mapping, and response envelope.

pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
