//! API module for the exchange server

pub mod error;
pub mod handlers;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use handlers::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Liveness endpoint
///
/// GET /health/live
pub async fn live() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

/// Readiness endpoint, 503 once shutdown has begun
///
/// GET /health/ready
pub async fn ready(State(ready): State<Arc<AtomicBool>>) -> (StatusCode, Json<HealthResponse>) {
    let (status, label) = if ready.load(Ordering::SeqCst) {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "shutting_down")
    };

    (
        status,
        Json(HealthResponse {
            status: label.into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }),
    )
}

/// Create the exchange API router, served over mTLS
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/exchange", post(handlers::exchange))
        .route("/.well-known/jwks.json", get(handlers::jwks))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Create the health router, served in plaintext on its own listener
pub fn health_router(ready_flag: Arc<AtomicBool>) -> Router {
    Router::new()
        .route("/health/live", get(live))
        .route("/health/ready", get(ready))
        .with_state(ready_flag)
}
