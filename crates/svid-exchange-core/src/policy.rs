//! Exchange policy: which subject may obtain which scopes for which target
//!
//! A policy is an ordered list of [`PolicyRule`]s loaded once at startup
//! and never mutated afterwards. Evaluation is a pure function of the rule
//! list and the request, so a single [`PolicyStore`] can be shared across
//! any number of concurrent requests without locking.
//!
//! ## Matching contract
//!
//! Subjects and targets match by exact string equality. When more than one
//! rule names the same (subject, target) pair, the rule declared first wins
//! and the others are never consulted. The loader logs every shadowed rule
//! so the conflict is visible at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{ExchangeError, Result};

/// A static grant: `subject` may exchange for `target` with at most
/// `allowed_scopes` and a TTL of at most `max_ttl` seconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Human-readable rule name, used in logs
    pub name: String,

    /// Caller identity this rule applies to
    pub subject: String,

    /// Downstream target the issued token is scoped to
    pub target: String,

    /// Scopes that may be granted
    pub allowed_scopes: Vec<String>,

    /// Upper bound on the granted TTL, in seconds
    pub max_ttl: i32,
}

impl PolicyRule {
    fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| ExchangeError::InvalidRule {
            name: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name is required"));
        }
        if self.subject.is_empty() {
            return Err(invalid("subject is required"));
        }
        if self.target.is_empty() {
            return Err(invalid("target is required"));
        }
        if self.allowed_scopes.is_empty() {
            return Err(invalid("allowed_scopes must not be empty"));
        }
        if self.allowed_scopes.iter().any(|s| s.is_empty()) {
            return Err(invalid("allowed_scopes must not contain empty scopes"));
        }
        if self.max_ttl <= 0 {
            return Err(invalid("max_ttl must be positive"));
        }
        Ok(())
    }
}

/// Top-level layout of a policy YAML document
#[derive(Debug, Default, Deserialize)]
struct PolicyFile {
    #[serde(default)]
    policies: Vec<PolicyRule>,
}

/// Outcome of a policy evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalDecision {
    /// No rule authorizes the request
    Denied,

    /// A rule matched and at least one requested scope is allowed
    Allowed {
        /// Order-preserving subsequence of the requested scopes
        granted_scopes: Vec<String>,
        /// Seconds, always in `1..=rule.max_ttl`
        granted_ttl: i32,
    },
}

impl EvalDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, EvalDecision::Allowed { .. })
    }
}

/// Decides what a caller may obtain
///
/// Implementations must be pure: no I/O and no mutation, so the
/// orchestrator can call them from any number of tasks at once.
pub trait PolicyEvaluator: Send + Sync {
    fn evaluate(
        &self,
        subject: &str,
        target: &str,
        requested_scopes: &[String],
        requested_ttl: i32,
    ) -> EvalDecision;
}

/// Immutable, in-memory rule set
#[derive(Debug, Clone, Default)]
pub struct PolicyStore {
    rules: Vec<PolicyRule>,
}

impl PolicyStore {
    /// Build a store from already-parsed rules
    ///
    /// Every rule is validated; the first invalid rule aborts the load.
    pub fn new(rules: Vec<PolicyRule>) -> Result<Self> {
        for rule in &rules {
            rule.validate()?;
        }
        warn_shadowed(&rules);
        Ok(Self { rules })
    }

    /// Parse a policy YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: PolicyFile = serde_yaml::from_str(yaml)?;
        Self::new(file.policies)
    }

    /// Read and parse the policy YAML at `path`
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ExchangeError::PolicyRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    /// Rules in load order
    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First rule whose subject and target both match exactly
    pub fn find(&self, subject: &str, target: &str) -> Option<&PolicyRule> {
        self.rules
            .iter()
            .find(|rule| rule.subject == subject && rule.target == target)
    }
}

impl PolicyEvaluator for PolicyStore {
    fn evaluate(
        &self,
        subject: &str,
        target: &str,
        requested_scopes: &[String],
        requested_ttl: i32,
    ) -> EvalDecision {
        let Some(rule) = self.find(subject, target) else {
            debug!(subject = %subject, target = %target, "No policy rule matches");
            return EvalDecision::Denied;
        };

        let granted_scopes = intersect_scopes(requested_scopes, &rule.allowed_scopes);
        if granted_scopes.is_empty() {
            debug!(
                rule = %rule.name,
                requested = ?requested_scopes,
                "Rule matched but no requested scope is allowed"
            );
            return EvalDecision::Denied;
        }

        EvalDecision::Allowed {
            granted_scopes,
            granted_ttl: bound_ttl(requested_ttl, rule.max_ttl),
        }
    }
}

/// Requested scopes that also appear in `allowed`, in request order
pub fn intersect_scopes(requested: &[String], allowed: &[String]) -> Vec<String> {
    requested
        .iter()
        .filter(|scope| allowed.contains(*scope))
        .cloned()
        .collect()
}

/// Non-positive or over-limit requests get `max_ttl`
pub fn bound_ttl(requested: i32, max_ttl: i32) -> i32 {
    if requested <= 0 || requested > max_ttl {
        max_ttl
    } else {
        requested
    }
}

fn warn_shadowed(rules: &[PolicyRule]) {
    let mut first_by_pair: HashMap<(&str, &str), &str> = HashMap::new();
    for rule in rules {
        let pair = (rule.subject.as_str(), rule.target.as_str());
        if let Some(winner) = first_by_pair.get(&pair) {
            warn!(
                shadowed = %rule.name,
                winner = %winner,
                subject = %rule.subject,
                target = %rule.target,
                "Policy rule is shadowed by an earlier rule for the same subject and target"
            );
        } else {
            first_by_pair.insert(pair, rule.name.as_str());
        }
    }
}
