//! # SVID Exchange Core
//!
//! The decision half of the SVID exchange: given a verified caller identity
//! and a request, decide what the caller may have and sign a token for
//! exactly that.
//!
//! ## Components
//!
//! - **Policy Store / Evaluator** ([`policy`]): immutable rule list,
//!   first-match-wins exact lookup, scope intersection and TTL bounding
//! - **Minter** ([`token`]): ES256 JWTs with a process-wide TTL ceiling
//! - **Audit Sink** ([`audit`]): one JSON line per exchange attempt,
//!   never on the response's critical path
//!
//! ## Invariants
//!
//! 1. **Containment**: granted scopes are an order-preserving subsequence of
//!    the requested scopes, and each is allowed by the matched rule
//! 2. **Bounded lifetime**: `0 < granted_ttl ≤ rule.max_ttl`, and no token
//!    outlives [`token::MAX_TTL_CAP`]
//! 3. **Uniqueness**: every minted token carries a fresh random `jti`

pub mod audit;
pub mod crypto;
pub mod error;
pub mod policy;
pub mod token;
pub mod types;

pub use audit::{AuditOutcome, AuditSink, ExchangeAuditEvent, JsonAuditSink};
pub use crypto::{Jwk, JwkSet, KeyPair, PublicKey};
pub use error::{ExchangeError, Result};
pub use policy::{EvalDecision, PolicyEvaluator, PolicyRule, PolicyStore};
pub use token::{Claims, MintedCredential, Minter, TokenMinter, ISSUER, MAX_TTL_CAP};
pub use types::{SpiffeId, SPIFFE_SCHEME};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
