//! Capability contracts for the three external model services.
//!
//! The pipeline never talks to a model endpoint directly; it consumes three
//! narrow capabilities. Any adapter that satisfies them plugs in: the
//! `armet-providers` crate ships HTTP-backed implementations, and the test
//! suites use scripted fakes.
//!
//! All three operations may suspend on outbound I/O; nothing else in the
//! core suspends. Implementations must be cancellation-safe: a dropped
//! future must abandon the underlying request.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GuardError;
use crate::message::{Message, ToolCall};

// =============================================================================
// ProxyScore
// =============================================================================

/// Per-token log-probabilities for a scored continuation.
///
/// # Invariants
///
/// - `logprobs[i]` corresponds to the `i`-th token of the continuation
///   only, never to a prompt token.
/// - `logprobs.len() == token_count`.
/// - Values are natural-log, sum-preserving probabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyScore {
    /// Ordered per-token log-probabilities of the continuation.
    pub logprobs: Vec<f64>,
    /// Number of tokens in the continuation.
    pub token_count: usize,
}

impl ProxyScore {
    /// Total log-probability of the continuation.
    #[must_use]
    pub fn total_logprob(&self) -> f64 {
        self.logprobs.iter().sum()
    }
}

// =============================================================================
// Capability traits
// =============================================================================

/// Scores log-probabilities of a fixed continuation under a context.
///
/// The proxy never generates; it only echoes the continuation and reports
/// how likely each of its tokens is given the prompt. Implementations
/// typically call an LLM serving endpoint in "echo + logprobs" mode and
/// slice at the prompt/continuation byte boundary.
#[async_trait]
pub trait ProxyProvider: Send + Sync {
    /// Computes per-token log-probabilities for `continuation` given
    /// `prompt`.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::ProxyFailure`] on any transport or protocol
    /// error.
    async fn score(&self, prompt: &str, continuation: &str) -> Result<ProxyScore, GuardError>;
}

/// Generates tool-call actions from a conversation context.
#[async_trait]
pub trait ActionProvider: Send + Sync {
    /// Proposes a tool call for the given context, or `None` when the
    /// model produced no tool call.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::RegenerationFailure`] when the provider
    /// itself fails (as opposed to declining to call a tool).
    async fn propose(&self, messages: &[Message]) -> Result<Option<ToolCall>, GuardError>;
}

/// Rewrites untrusted content to neutralize injected instructions.
#[async_trait]
pub trait SanitizerProvider: Send + Sync {
    /// Produces a cleaned rewrite of `span_content`.
    ///
    /// The contract: preserve factual data; remove any imperative or
    /// instruction-like content. Output length is not constrained.
    ///
    /// # Errors
    ///
    /// Returns an error when the rewrite could not be produced; the
    /// defense pipeline then falls back to the stripped action.
    async fn sanitize(&self, span_content: &str, span_tool_name: &str)
        -> Result<String, GuardError>;
}
