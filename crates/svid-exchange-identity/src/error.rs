//! Error types for identity extraction

use thiserror::Error;

/// Result type for identity extraction
pub type Result<T> = std::result::Result<T, IdentityError>;

/// Reasons a caller identity could not be established
///
/// Every variant means the same thing to a client: the request is
/// unauthenticated. The variants exist so operators can tell from the logs
/// which layer gave up.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// The request carried no transport session at all
    #[error("no peer information in request")]
    NoPeerInfo,

    /// The transport session is not a TLS session
    #[error("peer connection is not TLS")]
    NoTlsInfo,

    /// TLS completed without the client presenting a certificate
    #[error("no client certificate presented")]
    NoCertificates,

    /// The leaf certificate could not be decoded
    #[error("malformed client certificate: {0}")]
    MalformedCertificate(String),

    /// The leaf certificate has no URI SAN with the expected scheme
    #[error("no SPIFFE ID in client certificate")]
    NoSpiffeId,

    /// A SPIFFE URI was found but its authority is empty or unusable
    #[error("SPIFFE ID '{0}' is missing a trust domain")]
    MissingTrustDomain(String),
}
