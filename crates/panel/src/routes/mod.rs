//! HTTP route handlers for the panel.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Liveness check
//! GET  /health/ready           - Readiness check (database ping)
//!
//! # ZenoPay top-ups
//! POST /zeno/pay               - Start a top-up (HTMX fragment, requires auth)
//! GET  /zeno/balance           - Balance and recent ledger entries (fragment, requires auth)
//! POST /zeno/zenopay-webhook   - Gateway payment notifications (always 200)
//! ```

pub mod zeno;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};

use crate::state::AppState;

/// Create the ZenoPay routes router.
pub fn zeno_routes() -> Router<AppState> {
    Router::new()
        .route("/pay", post(zeno::pay))
        .route("/balance", get(zeno::balance))
        .route("/zenopay-webhook", post(zeno::webhook))
}

/// Create all routes for the panel.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .nest("/zeno", zeno_routes())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the database is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match sqlx::query("SELECT 1").fetch_one(state.pool()).await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
