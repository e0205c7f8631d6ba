//! Observability setup for Counsel: tracing subscriber initialization.

pub mod tracing_setup;
