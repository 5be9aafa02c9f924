//! Core logic for the exchange server

mod exchange;

pub use exchange::{ExchangeFailure, ExchangeService};
