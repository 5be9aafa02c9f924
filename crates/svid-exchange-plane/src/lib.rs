//! SVID Exchange Server
//!
//! Exchanges a workload's SPIFFE identity, proven by its mTLS client
//! certificate, for a short-lived ES256 token scoped to one downstream
//! service. What a caller receives is decided entirely by a static policy
//! loaded at startup.
//!
//! ## Exchange Invariants
//!
//! 1. **AUTHENTICATED**: identity comes only from the verified peer
//!    certificate, never from the request body
//! 2. **CONTAINED**: granted scopes are the requested scopes the matching
//!    rule allows, in request order
//! 3. **BOUNDED**: `0 < ttl ≤ rule.max_ttl`, and never above the global cap
//!
//! ## API Endpoints
//!
//! ### Exchange listener (mTLS, TLS 1.3 only)
//! - `POST /v1/exchange` - Exchange caller identity for a scoped token
//! - `GET /.well-known/jwks.json` - Token verification key
//!
//! ### Health listener (plaintext)
//! - `GET /health/live` - Liveness check
//! - `GET /health/ready` - Readiness check, 503 once shutdown has begun

pub mod api;
pub mod config;
pub mod core;
pub mod keys;
pub mod server;
pub mod transport;

pub use api::handlers::{AppState, ExchangeRequest, ExchangeResponse};
pub use api::{create_router, health_router};
pub use config::{ConfigError, ServerConfig, TlsFiles};
pub use crate::core::{ExchangeFailure, ExchangeService};
pub use keys::KeyRegistry;
pub use server::{Server, ServerError};
