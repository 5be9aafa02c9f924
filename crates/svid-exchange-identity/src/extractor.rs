//! Identity extraction seam between the transport and the exchange

use svid_exchange_core::SpiffeId;

use crate::error::Result;
use crate::types::TransportSession;

/// Turns transport session metadata into a verified caller identity
///
/// Implementations must be pure with respect to the session: the same
/// session always yields the same identity or the same error. They are
/// called once per request, before any request field is looked at.
pub trait IdentityExtractor: Send + Sync {
    /// Extract the caller identity from the session
    ///
    /// # Arguments
    /// * `session` - Transport metadata, `None` if the request carried none
    ///
    /// # Returns
    /// * `Ok(SpiffeId)` - The authenticated caller
    /// * `Err(IdentityError)` - Why no identity could be established
    fn extract(&self, session: Option<&TransportSession>) -> Result<SpiffeId>;

    /// Get a description of this extractor (for logging)
    fn description(&self) -> &str {
        "identity extractor"
    }
}
