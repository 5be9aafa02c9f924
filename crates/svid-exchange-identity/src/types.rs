//! Transport session metadata handed to identity extractors

use rustls::pki_types::CertificateDer;

/// What the transport knows about an established connection
///
/// The server attaches one of these to every request it accepts. A session
/// whose `auth` is `None` came in over a transport that carries no TLS
/// state, which never happens on the mTLS listener but is representable so
/// extractors can reject it explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportSession {
    /// TLS authentication state, if the connection is TLS
    pub auth: Option<TlsAuthInfo>,
}

/// Certificates the peer presented during the TLS handshake
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsAuthInfo {
    /// Verified peer chain, leaf first
    pub peer_certificates: Vec<CertificateDer<'static>>,
}

impl TransportSession {
    /// A TLS session with the given verified peer chain (leaf first)
    pub fn tls(peer_certificates: Vec<CertificateDer<'static>>) -> Self {
        Self {
            auth: Some(TlsAuthInfo { peer_certificates }),
        }
    }

    /// A session with no TLS state
    pub fn unauthenticated() -> Self {
        Self { auth: None }
    }

    /// Capture the peer chain of a completed server-side handshake
    pub fn from_server_connection(conn: &rustls::ServerConnection) -> Self {
        let peer_certificates = conn
            .peer_certificates()
            .map(|certs| certs.iter().map(|c| c.clone().into_owned()).collect())
            .unwrap_or_default();
        Self::tls(peer_certificates)
    }

    /// The leaf certificate, if the peer presented one
    pub fn leaf_certificate(&self) -> Option<&CertificateDer<'static>> {
        self.auth.as_ref()?.peer_certificates.first()
    }
}
