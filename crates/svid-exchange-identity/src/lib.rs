//! Caller Identity
//!
//! Establishes who is calling the exchange from nothing but the transport:
//! the verified client certificate of the mTLS session. Request bodies never
//! contribute to identity.
//!
//! ## Architecture
//!
//! The server attaches a [`TransportSession`] to each request. An
//! [`IdentityExtractor`] turns that session into a [`SpiffeId`] or an
//! [`IdentityError`] explaining why it could not:
//!
//! - **SPIFFE**: first `spiffe://` URI SAN on the leaf certificate
//! - **Fixed**: preset outcome, for tests
//!
//! ## Usage
//!
//! ```ignore
//! use svid_exchange_identity::{handlers::SpiffeExtractor, IdentityExtractor, TransportSession};
//!
//! let session = TransportSession::from_server_connection(&conn);
//! let caller = SpiffeExtractor::new().extract(Some(&session))?;
//! println!("Caller: {}", caller);
//! ```
//!
//! [`SpiffeId`]: svid_exchange_core::SpiffeId

pub mod error;
pub mod extractor;
pub mod handlers;
pub mod types;

pub use error::{IdentityError, Result};
pub use extractor::IdentityExtractor;
pub use types::{TlsAuthInfo, TransportSession};
