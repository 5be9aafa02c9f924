//! ES256 token minting for granted exchanges
//!
//! The minter is the last line of defense on lifetime: whatever TTL policy
//! granted, no token outlives [`MAX_TTL_CAP`].

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, Header};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::crypto::{KeyPair, PublicKey};
use crate::error::{ExchangeError, Result};

/// `iss` claim of every token minted by this service
pub const ISSUER: &str = "svid-exchange";

/// Hard ceiling on token lifetime in seconds, independent of policy
pub const MAX_TTL_CAP: i32 = 3600;

/// JWT claim set of an exchange token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    /// Caller identity
    pub sub: String,
    /// Single-element audience: the target service
    pub aud: Vec<String>,
    /// Space-separated granted scopes
    pub scope: String,
    pub iat: i64,
    pub exp: i64,
    /// Unique token identifier
    pub jti: String,
}

/// A freshly signed token and its metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintedCredential {
    /// Compact JWS
    pub token: String,
    pub token_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub granted_scopes: Vec<String>,
}

/// Produces signed credentials for granted exchanges
pub trait TokenMinter: Send + Sync {
    /// Sign a token for `subject` scoped to `target`
    ///
    /// Fails only when signing fails; that is always a server fault.
    fn mint(
        &self,
        subject: &str,
        target: &str,
        scopes: &[String],
        ttl_seconds: i32,
    ) -> Result<MintedCredential>;
}

/// Signs exchange tokens with a P-256 key
///
/// The key is read-only after construction, so a single minter can be
/// shared by reference across all request tasks.
#[derive(Debug, Clone)]
pub struct Minter {
    key: KeyPair,
}

impl Minter {
    /// Create a minter that signs with `key`
    pub fn new(key: KeyPair) -> Self {
        Self { key }
    }

    /// Create a minter with an ephemeral, randomly generated key
    pub fn generate(kid: impl Into<String>) -> Result<Self> {
        Ok(Self::new(KeyPair::generate(kid)?))
    }

    /// Key ID placed in every token header
    pub fn kid(&self) -> &str {
        self.key.kid()
    }

    /// Verification key for the tokens this minter issues
    pub fn public_key(&self) -> PublicKey {
        self.key.public_key()
    }
}

impl TokenMinter for Minter {
    fn mint(
        &self,
        subject: &str,
        target: &str,
        scopes: &[String],
        ttl_seconds: i32,
    ) -> Result<MintedCredential> {
        let ttl = cap_ttl(ttl_seconds);

        let jti = Uuid::new_v4().to_string();
        let iat = Utc::now().timestamp();
        let exp = iat + i64::from(ttl);

        let claims = Claims {
            iss: ISSUER.to_string(),
            sub: subject.to_string(),
            aud: vec![target.to_string()],
            scope: scopes.join(" "),
            iat,
            exp,
            jti: jti.clone(),
        };

        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.key.kid().to_string());

        let token = jsonwebtoken::encode(&header, &claims, self.key.encoding_key())?;

        let issued_at = timestamp(iat)?;
        let expires_at = timestamp(exp)?;

        debug!(jti = %jti, sub = %subject, aud = %target, ttl = ttl, "Minted token");

        Ok(MintedCredential {
            token,
            token_id: jti,
            issued_at,
            expires_at,
            granted_scopes: scopes.to_vec(),
        })
    }
}

/// Non-positive or over-cap TTLs become [`MAX_TTL_CAP`]
pub fn cap_ttl(ttl_seconds: i32) -> i32 {
    if ttl_seconds <= 0 || ttl_seconds > MAX_TTL_CAP {
        MAX_TTL_CAP
    } else {
        ttl_seconds
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| ExchangeError::Signing(format!("timestamp {} out of range", secs)))
}
