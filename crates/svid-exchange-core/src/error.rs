//! Error types for the exchange core

use thiserror::Error;

/// Result type alias using ExchangeError
pub type Result<T> = std::result::Result<T, ExchangeError>;

/// Errors that can occur in the exchange core
#[derive(Error, Debug)]
pub enum ExchangeError {
    /// Policy file could not be read
    #[error("Failed to read policy file {path}: {source}")]
    PolicyRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Policy document is not valid YAML or has the wrong shape
    #[error("Failed to parse policy: {0}")]
    PolicyParse(String),

    /// A rule failed structural validation at load time
    #[error("Invalid policy rule '{name}': {reason}")]
    InvalidRule { name: String, reason: String },

    /// A URI could not be interpreted as a SPIFFE ID
    #[error("Invalid SPIFFE ID '{uri}': {reason}")]
    InvalidSpiffeId { uri: String, reason: String },

    /// Signing key could not be generated, decoded or encoded
    #[error("Signing key error: {0}")]
    SigningKey(String),

    /// Token signing failed
    #[error("Failed to sign token: {0}")]
    Signing(String),
}

impl From<serde_yaml::Error> for ExchangeError {
    fn from(err: serde_yaml::Error) -> Self {
        ExchangeError::PolicyParse(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for ExchangeError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        ExchangeError::Signing(err.to_string())
    }
}
