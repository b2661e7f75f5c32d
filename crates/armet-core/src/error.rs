//! Error types for the guardrail pipeline.
//!
//! Every fallible operation in this crate reports a [`GuardError`]. The
//! orchestrator maps attribution-time failures through the configured
//! failure policy; defense-time failures always degrade to the stripped
//! action and are never surfaced to the caller as the original action.

use thiserror::Error;

/// Errors produced by the guardrail pipeline.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GuardError {
    /// Transport or protocol error reaching or parsing a proxy scoring
    /// response.
    #[error("proxy scoring failed: {message}")]
    ProxyFailure {
        /// What went wrong.
        message: String,
        /// Underlying adapter error, when one exists.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The proxy returned inconsistent shapes across ablation variants.
    ///
    /// Token counts must be equal for every variant of the same action, and
    /// each response must carry one log-probability per action token.
    #[error("proxy inconsistency: {reason}")]
    ProxyInconsistency {
        /// Which contract was violated.
        reason: String,
    },

    /// The sanitizer capability failed for a flagged span.
    #[error("sanitization failed: {message}")]
    SanitizationFailure {
        /// What went wrong.
        message: String,
    },

    /// The action provider raised an error during regeneration.
    ///
    /// Distinct from "returned no tool call", which is handled by the
    /// stripped-action rule rather than an error.
    #[error("action regeneration failed: {message}")]
    RegenerationFailure {
        /// What went wrong.
        message: String,
    },

    /// Caller-supplied messages violate structural invariants.
    #[error("invalid input: {reason}")]
    InvalidInput {
        /// Which invariant was violated.
        reason: String,
    },

    /// Configuration failed validation or could not be loaded.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Which constraint was violated.
        reason: String,
    },
}

impl GuardError {
    /// Constructs a [`GuardError::ProxyFailure`] from a bare message.
    #[must_use]
    pub fn proxy_failure(message: impl Into<String>) -> Self {
        Self::ProxyFailure {
            message: message.into(),
            source: None,
        }
    }

    /// Returns a stable string identifier for the error kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ProxyFailure { .. } => "proxy_failure",
            Self::ProxyInconsistency { .. } => "proxy_inconsistency",
            Self::SanitizationFailure { .. } => "sanitization_failure",
            Self::RegenerationFailure { .. } => "regeneration_failure",
            Self::InvalidInput { .. } => "invalid_input",
            Self::InvalidConfig { .. } => "invalid_config",
        }
    }

    /// Returns `true` when the error occurred while scoring ablation
    /// variants, i.e. it is subject to the attribution failure policy.
    #[must_use]
    pub const fn is_attribution_failure(&self) -> bool {
        matches!(
            self,
            Self::ProxyFailure { .. } | Self::ProxyInconsistency { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_is_stable() {
        assert_eq!(GuardError::proxy_failure("boom").kind(), "proxy_failure");
        assert_eq!(
            GuardError::InvalidInput {
                reason: "x".to_string()
            }
            .kind(),
            "invalid_input"
        );
    }

    #[test]
    fn attribution_failures_are_classified() {
        assert!(GuardError::proxy_failure("boom").is_attribution_failure());
        assert!(GuardError::ProxyInconsistency {
            reason: "count".to_string()
        }
        .is_attribution_failure());
        assert!(!GuardError::RegenerationFailure {
            message: "x".to_string()
        }
        .is_attribution_failure());
    }
}
