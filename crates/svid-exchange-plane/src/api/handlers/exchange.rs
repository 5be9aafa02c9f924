//! Token Exchange Handler
//!
//! Exchanges the caller's mTLS identity for a short-lived, scoped token.

use axum::{
    extract::{rejection::JsonRejection, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use svid_exchange_identity::TransportSession;

use crate::api::error::ApiError;
use crate::core::ExchangeService;
use crate::keys::KeyRegistry;

/// Application state shared across handlers
pub struct AppState {
    /// The exchange pipeline
    pub exchange: ExchangeService,
    /// Signing key, for publishing the verification key
    pub registry: KeyRegistry,
}

/// Request to exchange the caller identity for a token
#[derive(Debug, Default, Deserialize)]
pub struct ExchangeRequest {
    /// Service the token will be presented to
    #[serde(default)]
    pub target_service: String,

    /// Requested scopes, in order of preference
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Requested lifetime in seconds; zero or negative asks for the maximum
    #[serde(default)]
    pub ttl_seconds: i32,
}

/// Response from a successful exchange
#[derive(Debug, Serialize, Deserialize)]
pub struct ExchangeResponse {
    /// Compact JWS
    pub token: String,

    /// Expiry as unix seconds
    pub expires_at: i64,

    /// Scopes actually granted
    pub granted_scopes: Vec<String>,

    /// Token ID (`jti` claim)
    pub token_id: String,
}

/// Exchange the caller's identity for a scoped token
///
/// POST /v1/exchange
///
/// The caller is identified from the mTLS session only. The body is not
/// looked at until identity has been established, so a malformed body from
/// an unauthenticated caller is still reported as unauthenticated.
pub async fn exchange(
    State(state): State<Arc<AppState>>,
    session: Option<Extension<TransportSession>>,
    payload: Result<Json<ExchangeRequest>, JsonRejection>,
) -> Result<Json<ExchangeResponse>, ApiError> {
    let session = session.as_ref().map(|Extension(s)| s);

    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            state.exchange.authenticate(session)?;
            return Err(ApiError::InvalidArgument(rejection.body_text()));
        }
    };

    let minted = state.exchange.exchange(
        session,
        &request.target_service,
        &request.scopes,
        request.ttl_seconds,
    )?;

    Ok(Json(ExchangeResponse {
        token: minted.token,
        expires_at: minted.expires_at.timestamp(),
        granted_scopes: minted.granted_scopes,
        token_id: minted.token_id,
    }))
}
