//! Identity extractors for different transports

pub mod mock;
pub mod spiffe;

pub use mock::FixedExtractor;
pub use spiffe::{extract_from_certificate, SpiffeExtractor};
