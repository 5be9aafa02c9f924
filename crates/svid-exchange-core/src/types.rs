//! Common types used across the exchange

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ExchangeError, Result};

/// URI scheme carried by workload identities
pub const SPIFFE_SCHEME: &str = "spiffe";

/// A verified workload identity of the form `spiffe://<trust-domain>/<path>`
///
/// Only the identity extractor constructs these from an authenticated
/// peer certificate. Requests never supply a `SpiffeId` directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SpiffeId {
    uri: String,
    trust_domain: String,
}

impl SpiffeId {
    /// Parse and structurally validate a SPIFFE ID
    ///
    /// The scheme must be `spiffe` (ASCII case-insensitive), followed by a
    /// `//` authority whose host is non-empty and carries no userinfo. Signature and chain checks
    /// are the transport's job, not this function's.
    pub fn parse(uri: impl Into<String>) -> Result<Self> {
        let uri = uri.into();

        let rest = match split_scheme(&uri) {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case(SPIFFE_SCHEME) => rest,
            _ => {
                return Err(ExchangeError::InvalidSpiffeId {
                    uri,
                    reason: format!("scheme must be '{}'", SPIFFE_SCHEME),
                })
            }
        };

        let Some(hier) = rest.strip_prefix("//") else {
            return Err(ExchangeError::InvalidSpiffeId {
                uri,
                reason: "missing trust domain".into(),
            });
        };

        let authority_end = hier.find(['/', '?', '#']).unwrap_or(hier.len());
        let authority = &hier[..authority_end];
        let (userinfo, trust_domain) = match authority.rsplit_once('@') {
            Some((userinfo, host)) => (Some(userinfo), host),
            None => (None, authority),
        };
        if trust_domain.is_empty() {
            return Err(ExchangeError::InvalidSpiffeId {
                uri,
                reason: "missing trust domain".into(),
            });
        }
        if userinfo.is_some() {
            return Err(ExchangeError::InvalidSpiffeId {
                uri,
                reason: "userinfo is not permitted".into(),
            });
        }

        let trust_domain = trust_domain.to_string();
        Ok(Self { uri, trust_domain })
    }

    /// Check whether a URI uses the given scheme, without validating the rest
    pub fn has_scheme(uri: &str, scheme: &str) -> bool {
        split_scheme(uri).is_some_and(|(s, _)| s.eq_ignore_ascii_case(scheme))
    }

    /// The full identity URI
    pub fn as_str(&self) -> &str {
        &self.uri
    }

    /// The trust domain (authority component)
    pub fn trust_domain(&self) -> &str {
        &self.trust_domain
    }
}

/// Split `scheme:rest` at the first colon
///
/// The scheme must start with a letter and contain only letters, digits,
/// `+`, `-` or `.`; anything else is treated as having no scheme.
fn split_scheme(uri: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = uri.split_once(':')?;
    let mut chars = scheme.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some((scheme, rest))
}

impl fmt::Display for SpiffeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

impl AsRef<str> for SpiffeId {
    fn as_ref(&self) -> &str {
        &self.uri
    }
}

impl TryFrom<String> for SpiffeId {
    type Error = ExchangeError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<SpiffeId> for String {
    fn from(id: SpiffeId) -> Self {
        id.uri
    }
}

impl std::str::FromStr for SpiffeId {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
