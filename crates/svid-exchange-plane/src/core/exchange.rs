//! Exchange Orchestrator
//!
//! Drives one exchange request through the pipeline:
//!
//! ```text
//! Start → IdentityExtracted → InputValidated → PolicyEvaluated
//!       → {Denied | Minted} → Audited → Responded
//! ```
//!
//! Identity is established before any request field is inspected, so an
//! unauthenticated caller learns nothing about input validation or policy.
//! Only decisions the policy made are audited: denials, and grants once a
//! credential exists.

use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use svid_exchange_core::token::cap_ttl;
use svid_exchange_core::{
    AuditSink, EvalDecision, ExchangeAuditEvent, MintedCredential, PolicyEvaluator, SpiffeId,
    TokenMinter,
};
use svid_exchange_identity::{IdentityError, IdentityExtractor, TransportSession};

/// Why an exchange did not produce a credential
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExchangeFailure {
    /// No verifiable caller identity
    #[error("extract SPIFFE ID: {0}")]
    Unauthenticated(IdentityError),

    /// The request body is incomplete
    #[error("{0}")]
    InvalidArgument(String),

    /// No rule authorizes the request
    #[error("no policy permits {subject} to access {target}")]
    PermissionDenied { subject: String, target: String },

    /// Signing failed
    #[error("mint token: {0}")]
    Internal(String),
}

/// The exchange pipeline with its four collaborators
///
/// All collaborators are read-only and shared, so one service instance
/// handles every request concurrently.
#[derive(Clone)]
pub struct ExchangeService {
    extractor: Arc<dyn IdentityExtractor>,
    policy: Arc<dyn PolicyEvaluator>,
    minter: Arc<dyn TokenMinter>,
    audit: Arc<dyn AuditSink>,
}

impl ExchangeService {
    /// Wire the pipeline together
    pub fn new(
        extractor: Arc<dyn IdentityExtractor>,
        policy: Arc<dyn PolicyEvaluator>,
        minter: Arc<dyn TokenMinter>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            extractor,
            policy,
            minter,
            audit,
        }
    }

    /// Establish the caller identity, or classify why it cannot be
    pub fn authenticate(
        &self,
        session: Option<&TransportSession>,
    ) -> Result<SpiffeId, ExchangeFailure> {
        self.extractor.extract(session).map_err(|e| {
            warn!(error = %e, "Rejected exchange without verifiable identity");
            ExchangeFailure::Unauthenticated(e)
        })
    }

    /// Exchange the caller's transport identity for a scoped credential
    ///
    /// # Arguments
    /// * `session` - Transport metadata of the connection carrying the request
    /// * `target` - Service the credential will be presented to
    /// * `scopes` - Requested scopes, in caller order
    /// * `ttl_seconds` - Requested lifetime, `<= 0` means "the maximum allowed"
    ///
    /// # Returns
    /// * `Ok(MintedCredential)` - Signed token carrying the granted scopes
    /// * `Err(ExchangeFailure)` - Classified failure, see [`ExchangeFailure`]
    pub fn exchange(
        &self,
        session: Option<&TransportSession>,
        target: &str,
        scopes: &[String],
        ttl_seconds: i32,
    ) -> Result<MintedCredential, ExchangeFailure> {
        // 1. Authenticate
        let subject = self.authenticate(session)?;
        let subject = subject.as_str();

        // 2. Validate input
        if target.is_empty() {
            return Err(ExchangeFailure::InvalidArgument(
                "target_service is required".into(),
            ));
        }
        if scopes.is_empty() {
            return Err(ExchangeFailure::InvalidArgument(
                "at least one scope is required".into(),
            ));
        }

        // 3. Evaluate policy
        let (granted_scopes, granted_ttl) =
            match self.policy.evaluate(subject, target, scopes, ttl_seconds) {
                EvalDecision::Allowed {
                    granted_scopes,
                    granted_ttl,
                } => (granted_scopes, granted_ttl),
                EvalDecision::Denied => {
                    warn!(subject = %subject, target = %target, scopes = ?scopes, "Exchange denied");
                    self.audit.record(ExchangeAuditEvent::denied(
                        subject,
                        target,
                        scopes.to_vec(),
                        format!("no policy permits {} → {}", subject, target),
                    ));
                    return Err(ExchangeFailure::PermissionDenied {
                        subject: subject.to_string(),
                        target: target.to_string(),
                    });
                }
            };

        // 4. Mint
        let minted = self
            .minter
            .mint(subject, target, &granted_scopes, granted_ttl)
            .map_err(|e| {
                error!(subject = %subject, target = %target, error = %e, "Failed to mint token");
                ExchangeFailure::Internal(e.to_string())
            })?;

        // 5. Audit
        self.audit.record(ExchangeAuditEvent::granted(
            subject,
            target,
            scopes.to_vec(),
            granted_scopes.clone(),
            cap_ttl(granted_ttl),
            minted.token_id.clone(),
        ));

        info!(
            subject = %subject,
            target = %target,
            token_id = %minted.token_id,
            scopes = ?granted_scopes,
            "Exchange granted"
        );

        Ok(minted)
    }
}
