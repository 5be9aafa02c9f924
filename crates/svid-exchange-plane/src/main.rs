//! SVID Exchange Server Binary
//!
//! Runs the mTLS token exchange API and its health endpoints.
//! Operational logs go to stderr; stdout carries only the audit stream.

use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

use svid_exchange_plane::config::log_level_from_env;
use svid_exchange_plane::{Server, ServerConfig, ServerError};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level_from_env())
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return ExitCode::FAILURE;
    }

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "svid-exchange failed to start");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), ServerError> {
    let config = ServerConfig::from_env()?;

    info!(
        policy_file = %config.policy_file.display(),
        listen_addr = %config.listen_addr,
        health_addr = %config.health_addr,
        kid = %config.signing_key_id,
        "Starting svid-exchange"
    );

    let server = Server::bind(config).await?;
    server.serve(shutdown_signal()).await;
    Ok(())
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
