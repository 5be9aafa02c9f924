//! Verification Key Handler
//!
//! Publishes the token signing key so targets can verify tokens offline.

use axum::{extract::State, Json};
use std::sync::Arc;

use svid_exchange_core::JwkSet;

use crate::api::handlers::exchange::AppState;

/// Get the token verification key as a JWK set
///
/// GET /.well-known/jwks.json
pub async fn jwks(State(state): State<Arc<AppState>>) -> Json<JwkSet> {
    Json(state.registry.jwks())
}
