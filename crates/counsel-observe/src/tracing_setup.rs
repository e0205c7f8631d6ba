//! Tracing subscriber initialization with structured logging.
//!
//! # Usage
//!
//! ```no_run
//! // Structured text output, filter from RUST_LOG
//! counsel_observe::tracing_setup::init_tracing(None, false).unwrap();
//!
//! // Explicit filter, JSON output (for log shippers)
//! counsel_observe::tracing_setup::init_tracing(Some("counsel=debug"), true).unwrap();
//! ```

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize the global tracing subscriber.
///
/// - Installs a structured `fmt` layer with target visibility and span
///   close timing; `json` switches the output format for log shippers.
/// - `directives` overrides the filter; otherwise `RUST_LOG` applies, with
///   `info` as the fallback.
///
/// # Errors
///
/// Returns an error if the global subscriber has already been set or the
/// filter directives do not parse.
pub fn init_tracing(
    directives: Option<&str>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = match directives {
        Some(directives) => EnvFilter::try_new(directives)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    if json {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    }

    Ok(())
}
