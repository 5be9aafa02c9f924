//! Key Registry for the exchange server
//!
//! Owns the single signing key the server mints tokens with and publishes
//! its public half for downstream verification.

use std::path::Path;
use std::sync::Arc;
use tracing::info;

use svid_exchange_core::{ExchangeError, JwkSet, KeyPair, Minter, PublicKey};

/// Key Registry for the exchange server
///
/// Cloning is cheap; every clone shares the same minter.
#[derive(Debug, Clone)]
pub struct KeyRegistry {
    minter: Arc<Minter>,
}

impl KeyRegistry {
    /// Create a registry around an existing signing key
    pub fn new(key_pair: KeyPair) -> Self {
        info!(kid = %key_pair.kid(), "Key registry initialized with signing key");
        Self {
            minter: Arc::new(Minter::new(key_pair)),
        }
    }

    /// Generate a registry with a fresh ephemeral P-256 key
    ///
    /// Tokens signed with an ephemeral key stop verifying once the process
    /// restarts.
    pub fn generate(kid: impl Into<String>) -> Result<Self, ExchangeError> {
        Ok(Self::new(KeyPair::generate(kid)?))
    }

    /// Load the signing key from a PKCS#8 PEM file
    pub fn from_pem_file(kid: impl Into<String>, path: impl AsRef<Path>) -> Result<Self, ExchangeError> {
        let path = path.as_ref();
        let pem = std::fs::read_to_string(path).map_err(|e| {
            ExchangeError::SigningKey(format!("failed to read {}: {}", path.display(), e))
        })?;
        Ok(Self::new(KeyPair::from_pkcs8_pem(kid, &pem)?))
    }

    /// Key ID carried in every token header
    pub fn kid(&self) -> &str {
        self.minter.kid()
    }

    /// The minter signing with this registry's key
    pub fn minter(&self) -> Arc<Minter> {
        self.minter.clone()
    }

    /// Public verification key
    pub fn public_key(&self) -> PublicKey {
        self.minter.public_key()
    }

    /// Verification key as a JWK set
    pub fn jwks(&self) -> JwkSet {
        JwkSet::from(&self.public_key())
    }
}
