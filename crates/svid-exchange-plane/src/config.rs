//! Server configuration from environment variables
//!
//! | variable | default |
//! |---|---|
//! | `POLICY_FILE` | `config/policy.example.yaml` |
//! | `LISTEN_ADDR` | `0.0.0.0:8080` |
//! | `HEALTH_ADDR` | `0.0.0.0:8081` |
//! | `TLS_CERT_FILE`, `TLS_KEY_FILE`, `TLS_CA_FILE` | required |
//! | `SIGNING_KEY_FILE` | unset, ephemeral key |
//! | `SIGNING_KEY_ID` | `svid-exchange-<uuid>` |
//! | `SVID_EXCHANGE_LOG_LEVEL` | `info` |

use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;
use tracing::Level;

pub const DEFAULT_POLICY_FILE: &str = "config/policy.example.yaml";
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_HEALTH_ADDR: &str = "0.0.0.0:8081";
pub const LOG_LEVEL_VAR: &str = "SVID_EXCHANGE_LOG_LEVEL";

const TLS_VARS: [&str; 3] = ["TLS_CERT_FILE", "TLS_KEY_FILE", "TLS_CA_FILE"];

/// Configuration errors, all fatal at startup
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set, plaintext mode is not supported")]
    MissingTls(String),

    #[error("{var}={value} is not a valid listen address: {reason}")]
    InvalidAddr {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Certificate material for the mTLS listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFiles {
    /// Server certificate chain (PEM)
    pub cert_file: PathBuf,
    /// Server private key (PEM)
    pub key_file: PathBuf,
    /// CA bundle client certificates must chain to (PEM)
    pub ca_file: PathBuf,
}

/// Everything the server needs to start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub policy_file: PathBuf,
    pub listen_addr: SocketAddr,
    pub health_addr: SocketAddr,
    pub tls: TlsFiles,
    /// PKCS#8 PEM signing key; `None` generates an ephemeral key
    pub signing_key_file: Option<PathBuf>,
    pub signing_key_id: String,
}

impl ServerConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.is_empty());

        let [cert_file, key_file, ca_file] = TLS_VARS.map(get);
        let (Some(cert_file), Some(key_file), Some(ca_file)) = (cert_file, key_file, ca_file)
        else {
            let missing: Vec<&str> = TLS_VARS
                .into_iter()
                .filter(|var| get(*var).is_none())
                .collect();
            return Err(ConfigError::MissingTls(missing.join(", ")));
        };

        let listen_addr = parse_addr(
            "LISTEN_ADDR",
            get("LISTEN_ADDR").as_deref().unwrap_or(DEFAULT_LISTEN_ADDR),
        )?;
        let health_addr = parse_addr(
            "HEALTH_ADDR",
            get("HEALTH_ADDR").as_deref().unwrap_or(DEFAULT_HEALTH_ADDR),
        )?;

        Ok(Self {
            policy_file: get("POLICY_FILE")
                .unwrap_or_else(|| DEFAULT_POLICY_FILE.into())
                .into(),
            listen_addr,
            health_addr,
            tls: TlsFiles {
                cert_file: cert_file.into(),
                key_file: key_file.into(),
                ca_file: ca_file.into(),
            },
            signing_key_file: get("SIGNING_KEY_FILE").map(PathBuf::from),
            signing_key_id: get("SIGNING_KEY_ID")
                .unwrap_or_else(|| format!("svid-exchange-{}", uuid::Uuid::new_v4())),
        })
    }
}

/// Log level from `SVID_EXCHANGE_LOG_LEVEL`, `info` when unset or unparsable
pub fn log_level_from_env() -> Level {
    std::env::var(LOG_LEVEL_VAR)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(Level::INFO)
}

/// Parse `host:port`, accepting the bare `:port` shorthand for all interfaces
fn parse_addr(var: &'static str, value: &str) -> Result<SocketAddr, ConfigError> {
    let candidate = match value.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{}", port),
        None => value.to_string(),
    };
    candidate.parse().map_err(|e: std::net::AddrParseError| ConfigError::InvalidAddr {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}
