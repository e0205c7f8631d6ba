//! Axum router configuration with middleware.
//!
//! All routes are under `/api/v1/`.
//! Middleware: CORS, tracing.

use axum::Router;
use axum::routing::{get, post, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Session lifecycle
        .route("/sessions", post(handlers::session::request_session))
        .route("/sessions/{id}", get(handlers::session::get_session))
        .route(
            "/sessions/{id}/accept",
            post(handlers::session::accept_session),
        )
        .route(
            "/sessions/{id}/decline",
            post(handlers::session::decline_session),
        )
        .route("/sessions/{id}/end", post(handlers::session::end_session))
        .route("/sessions/{id}/mute", post(handlers::session::mute_session))
        .route(
            "/sessions/{id}/transactions",
            get(handlers::session::get_transactions),
        )
        // Wallets and advisors
        .route("/wallets/{id}", get(handlers::wallet::get_balance))
        .route("/wallets/{id}/deposit", post(handlers::wallet::deposit))
        .route("/advisors/{id}/rate", put(handlers::wallet::set_rate));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/ws/events", get(handlers::ws::ws_handler))
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Simple health check endpoint.
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
