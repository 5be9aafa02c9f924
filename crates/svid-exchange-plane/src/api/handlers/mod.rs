//! API request handlers

pub mod exchange;
pub mod keys;

pub use exchange::{exchange, AppState, ExchangeRequest, ExchangeResponse};
pub use keys::jwks;
