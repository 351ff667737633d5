//! MarketPulse web application library.
//!
//! Exposes the router so the binary and the integration tests build the
//! exact same application.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod identity;
pub mod middleware;
pub mod models;
pub mod roles;
pub mod routes;
pub mod services;
pub mod state;
pub mod validation;

use axum::{Router, middleware::from_fn, routing::get};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use state::AppState;

/// Static assets shipped with the crate.
const STATIC_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/static");

/// Build the application router.
///
/// Sentry layers are added by the binary, outermost, after this.
pub fn app(state: AppState) -> Router {
    let session_layer = middleware::create_session_layer(state.config());

    Router::new()
        .route("/health", get(health))
        .merge(routes::routes())
        .nest_service("/static", ServeDir::new(STATIC_DIR))
        .layer(from_fn(middleware::security_headers_middleware))
        .layer(session_layer)
        .layer(from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}
