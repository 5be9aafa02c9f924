//! mTLS transport for the exchange API
//!
//! The listener requires every client to present a certificate that chains
//! to the configured CA bundle, and only negotiates TLS 1.3. Each accepted
//! connection gets its verified peer chain attached to every request as a
//! [`TransportSession`] extension, which is the only input identity
//! extraction trusts.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{Extension, Router};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::RootCertStore;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

use svid_exchange_identity::TransportSession;

use crate::config::TlsFiles;

/// Upper bound on a single TLS handshake
pub const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause after a failed `accept()` before retrying
pub const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Errors building the TLS server configuration
#[derive(Error, Debug)]
pub enum TlsError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Certificate error: {0}")]
    Certificate(String),

    #[error("Private key error: {0}")]
    PrivateKey(String),

    #[error("TLS configuration error: {0}")]
    Config(String),
}

/// Build the mTLS server configuration from PEM files on disk
pub fn load_mtls_config(files: &TlsFiles) -> Result<rustls::ServerConfig, TlsError> {
    let cert_pem = read_file(&files.cert_file)?;
    let key_pem = read_file(&files.key_file)?;
    let ca_pem = read_file(&files.ca_file)?;
    build_mtls_config(&cert_pem, &key_pem, &ca_pem)
}

/// Build the mTLS server configuration from PEM documents
///
/// Client certificates are required and verified against `ca_pem`.
pub fn build_mtls_config(
    cert_pem: &[u8],
    key_pem: &[u8],
    ca_pem: &[u8],
) -> Result<rustls::ServerConfig, TlsError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    // Client CA bundle
    let ca_certs = parse_certificates(ca_pem)?;
    if ca_certs.is_empty() {
        return Err(TlsError::Certificate(
            "no valid CA certificates found".into(),
        ));
    }
    let mut roots = RootCertStore::empty();
    for cert in ca_certs {
        roots
            .add(cert)
            .map_err(|e| TlsError::Certificate(format!("failed to add CA certificate: {}", e)))?;
    }

    // Server identity
    let server_certs = parse_certificates(cert_pem)?;
    if server_certs.is_empty() {
        return Err(TlsError::Certificate(
            "no server certificates found".into(),
        ));
    }
    let server_key = PrivateKeyDer::from_pem_slice(key_pem)
        .map_err(|e| TlsError::PrivateKey(format!("failed to parse private key: {}", e)))?;

    let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
        .build()
        .map_err(|e| TlsError::Config(format!("client verifier error: {}", e)))?;

    let mut config = rustls::ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(|e| TlsError::Config(e.to_string()))?
        .with_client_cert_verifier(verifier)
        .with_single_cert(server_certs, server_key)
        .map_err(|e| TlsError::Config(format!("server config error: {}", e)))?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(config)
}

fn read_file(path: &Path) -> Result<Vec<u8>, TlsError> {
    std::fs::read(path).map_err(|source| TlsError::Read {
        path: path.display().to_string(),
        source,
    })
}

fn parse_certificates(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    CertificateDer::pem_slice_iter(pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::Certificate(format!("failed to parse certificates: {}", e)))
}

/// Serve `app` over mTLS until `shutdown` changes or its sender is dropped
///
/// On shutdown the listener stops accepting, in-flight connections are
/// asked to finish their current requests, and the future resolves once
/// every connection has closed.
pub async fn serve_mtls(
    listener: TcpListener,
    tls_config: Arc<rustls::ServerConfig>,
    app: Router,
    mut shutdown: watch::Receiver<bool>,
) {
    let acceptor = TlsAcceptor::from(tls_config);
    let conn_shutdown = shutdown.clone();
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        back_off_after_accept_error(&e).await;
                        continue;
                    }
                };
                connections.spawn(serve_connection(
                    acceptor.clone(),
                    stream,
                    peer,
                    app.clone(),
                    conn_shutdown.clone(),
                ));
            }
            _ = shutdown.changed() => break,
        }

        // Reap finished connections
        while connections.try_join_next().is_some() {}
    }

    drop(listener);
    info!(in_flight = connections.len(), "Draining exchange connections");
    while connections.join_next().await.is_some() {}
}

async fn serve_connection(
    acceptor: TlsAcceptor,
    stream: TcpStream,
    peer: SocketAddr,
    app: Router,
    mut shutdown: watch::Receiver<bool>,
) {
    let tls = match tokio::time::timeout(TLS_HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
        Ok(Ok(tls)) => tls,
        Ok(Err(e)) => {
            warn!(peer = %peer, error = %e, "TLS handshake failed");
            return;
        }
        Err(_) => {
            warn!(peer = %peer, "TLS handshake timed out");
            return;
        }
    };

    let session = TransportSession::from_server_connection(tls.get_ref().1);
    debug!(peer = %peer, "mTLS connection established");

    let service = TowerToHyperService::new(app.layer(Extension(session)));
    let builder = auto::Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection(TokioIo::new(tls), service);
    tokio::pin!(conn);

    let mut draining = false;
    loop {
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(e) = result {
                    debug!(peer = %peer, error = %e, "Connection closed with error");
                }
                break;
            }
            _ = shutdown.changed(), if !draining => {
                draining = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }
}

async fn back_off_after_accept_error(err: &std::io::Error) {
    warn!(error = %err, "Failed to accept connection");
    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
}
