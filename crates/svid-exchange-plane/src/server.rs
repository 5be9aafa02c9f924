//! Server lifecycle: startup wiring, listeners, graceful shutdown

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use svid_exchange_core::{ExchangeError, JsonAuditSink, PolicyStore};
use svid_exchange_identity::handlers::SpiffeExtractor;

use crate::api::handlers::AppState;
use crate::api::{create_router, health_router};
use crate::config::{ConfigError, ServerConfig};
use crate::core::ExchangeService;
use crate::keys::KeyRegistry;
use crate::transport::{self, TlsError};

/// Startup and runtime failures
#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to load policy: {0}")]
    Policy(#[source] ExchangeError),

    #[error("Failed to initialize signing key: {0}")]
    SigningKey(#[source] ExchangeError),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// A fully initialized server with bound listeners, not yet serving
pub struct Server {
    listener: TcpListener,
    health_listener: TcpListener,
    tls_config: Arc<rustls::ServerConfig>,
    state: Arc<AppState>,
    audit_task: JoinHandle<tokio::io::Stdout>,
    ready: Arc<AtomicBool>,
}

impl Server {
    /// Load policy, signing key and TLS material, then bind both listeners
    ///
    /// Any failure here is fatal; the process never serves with a partial
    /// configuration.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let policy = PolicyStore::load_file(&config.policy_file).map_err(ServerError::Policy)?;
        info!(
            path = %config.policy_file.display(),
            rules = policy.len(),
            "Policy loaded"
        );

        let registry = match &config.signing_key_file {
            Some(path) => KeyRegistry::from_pem_file(&config.signing_key_id, path),
            None => {
                warn!("SIGNING_KEY_FILE not set, generating ephemeral signing key");
                KeyRegistry::generate(&config.signing_key_id)
            }
        }
        .map_err(ServerError::SigningKey)?;

        let tls_config = Arc::new(transport::load_mtls_config(&config.tls)?);
        info!("mTLS enabled");

        let listener = bind(config.listen_addr).await?;
        let health_listener = bind(config.health_addr).await?;

        let (audit, audit_task) = JsonAuditSink::stdout();
        let exchange = ExchangeService::new(
            Arc::new(SpiffeExtractor::new()),
            Arc::new(policy),
            registry.minter(),
            Arc::new(audit),
        );

        Ok(Self {
            listener,
            health_listener,
            tls_config,
            state: Arc::new(AppState { exchange, registry }),
            audit_task,
            ready: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Address of the mTLS exchange listener
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Address of the plaintext health listener
    pub fn health_addr(&self) -> std::io::Result<SocketAddr> {
        self.health_listener.local_addr()
    }

    /// Serve until `signal` resolves, then shut down gracefully
    ///
    /// Shutdown order: readiness goes false, the exchange listener stops
    /// accepting and drains, the health listener stops, and finally the
    /// audit writer flushes every queued record.
    pub async fn serve<F>(self, signal: F)
    where
        F: Future<Output = ()> + Send,
    {
        let Server {
            listener,
            health_listener,
            tls_config,
            state,
            audit_task,
            ready,
        } = self;

        let kid = state.registry.kid().to_string();
        let (exchange_tx, exchange_rx) = watch::channel(false);
        let (health_tx, mut health_rx) = watch::channel(false);

        let exchange_addr = listener.local_addr().ok();
        let exchange_task = tokio::spawn(transport::serve_mtls(
            listener,
            tls_config,
            create_router(state),
            exchange_rx,
        ));
        info!(addr = ?exchange_addr, kid = %kid, "Exchange API listening");

        let health_addr = health_listener.local_addr().ok();
        let health = axum::serve(health_listener, health_router(ready.clone()))
            .with_graceful_shutdown(async move {
                let _ = health_rx.changed().await;
            });
        let health_task = tokio::spawn(async move { health.await });
        info!(addr = ?health_addr, "Health endpoints listening");

        signal.await;

        info!("Shutting down");
        ready.store(false, Ordering::SeqCst);

        let _ = exchange_tx.send(true);
        if let Err(e) = exchange_task.await {
            error!(error = %e, "Exchange listener task failed");
        }

        let _ = health_tx.send(true);
        match health_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Health server error"),
            Err(e) => error!(error = %e, "Health listener task failed"),
        }

        // Router and its state are gone, so the audit channel is closed
        if let Err(e) = audit_task.await {
            error!(error = %e, "Audit writer task failed");
        }

        info!("Stopped");
    }
}

async fn bind(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}
