//! Fixed Identity Extractor
//!
//! For testing purposes: ignores the session and returns a preset outcome.

use svid_exchange_core::SpiffeId;

use crate::error::{IdentityError, Result};
use crate::extractor::IdentityExtractor;
use crate::types::TransportSession;

/// Identity extractor that always yields the same result
///
/// Lets exchange tests run without building certificates.
#[derive(Debug, Clone)]
pub struct FixedExtractor {
    outcome: Result<SpiffeId>,
}

impl FixedExtractor {
    /// Always authenticate as `id`
    pub fn identity(id: SpiffeId) -> Self {
        Self { outcome: Ok(id) }
    }

    /// Always fail with `error`
    pub fn failing(error: IdentityError) -> Self {
        Self { outcome: Err(error) }
    }
}

impl IdentityExtractor for FixedExtractor {
    fn extract(&self, _session: Option<&TransportSession>) -> Result<SpiffeId> {
        self.outcome.clone()
    }

    fn description(&self) -> &str {
        "fixed identity extractor"
    }
}
