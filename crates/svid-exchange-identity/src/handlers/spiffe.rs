//! SPIFFE Identity Extractor
//!
//! Reads the caller's SPIFFE ID from the URI SANs of the leaf certificate
//! presented during the mTLS handshake.
//!
//! ## Trust Model
//!
//! Certificate authenticity is established by the transport: only chains
//! that verify against the configured CA bundle complete the handshake and
//! reach this extractor. Extraction is structural only. It finds the first
//! URI SAN whose scheme is `spiffe` and checks that it names a trust domain.

use rustls::pki_types::CertificateDer;
use svid_exchange_core::{SpiffeId, SPIFFE_SCHEME};
use tracing::debug;
use x509_parser::extensions::GeneralName;

use crate::error::{IdentityError, Result};
use crate::extractor::IdentityExtractor;
use crate::types::TransportSession;

/// Extracts SPIFFE IDs from mTLS peer certificates
#[derive(Debug, Clone, Copy, Default)]
pub struct SpiffeExtractor;

impl SpiffeExtractor {
    /// Create a new SPIFFE extractor
    pub fn new() -> Self {
        Self
    }
}

impl IdentityExtractor for SpiffeExtractor {
    fn extract(&self, session: Option<&TransportSession>) -> Result<SpiffeId> {
        let session = session.ok_or(IdentityError::NoPeerInfo)?;
        let auth = session.auth.as_ref().ok_or(IdentityError::NoTlsInfo)?;
        let leaf = auth
            .peer_certificates
            .first()
            .ok_or(IdentityError::NoCertificates)?;

        let id = extract_from_certificate(leaf)?;
        debug!(spiffe_id = %id, "Extracted caller identity");
        Ok(id)
    }

    fn description(&self) -> &str {
        "SPIFFE URI SAN extractor"
    }
}

/// Extract the SPIFFE ID from a single DER-encoded certificate
///
/// Only the first URI SAN with the `spiffe` scheme is considered. Later
/// SPIFFE URIs are ignored even when the first one is invalid.
pub fn extract_from_certificate(cert: &CertificateDer<'_>) -> Result<SpiffeId> {
    let (_, parsed) = x509_parser::parse_x509_certificate(cert.as_ref())
        .map_err(|e| IdentityError::MalformedCertificate(e.to_string()))?;

    let san = parsed
        .subject_alternative_name()
        .map_err(|e| IdentityError::MalformedCertificate(e.to_string()))?
        .ok_or(IdentityError::NoSpiffeId)?;

    let uri = san
        .value
        .general_names
        .iter()
        .find_map(|name| match name {
            GeneralName::URI(uri) if SpiffeId::has_scheme(uri, SPIFFE_SCHEME) => Some(*uri),
            _ => None,
        })
        .ok_or(IdentityError::NoSpiffeId)?;

    SpiffeId::parse(uri).map_err(|_| IdentityError::MissingTrustDomain(uri.to_string()))
}
