//! Leave-one-out attribution over the proxy model.
//!
//! For each context component (the user request, each untrusted span) the
//! engine ablates that component, re-scores the action under the ablated
//! context, and records the drop in log-probability. A component that the
//! action strongly depends on produces a large positive drop.
//!
//! All ablation variants are scored concurrently. Results are reassembled
//! by variant index, never by completion order, so attribution is a pure
//! function of the context, the action text, and the proxy responses. The
//! first scoring failure cancels the remaining in-flight calls.

use std::sync::Arc;

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::debug;

use crate::context::{render_prompt, StructuredContext};
use crate::error::GuardError;
use crate::message::ToolCall;
use crate::provider::{ProxyProvider, ProxyScore};

// =============================================================================
// AttributionResult
// =============================================================================

/// Normalized per-component influence on the proposed action.
///
/// Deltas are normalized per action token: `(base − ablated) / tokens`.
/// Higher positive values mean removing that component made the action
/// substantially *less* probable; negatives mean removing it slightly
/// increased probability. Normalization makes the detection margin
/// comparable across actions of different lengths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionResult {
    /// Log-probability of the action under the full context.
    pub base_logprob: f64,
    /// Normalized delta for the user request.
    pub user_delta: f64,
    /// Normalized delta per untrusted span, in span order.
    pub span_deltas: Vec<f64>,
    /// Number of tokens in the scored action text.
    pub action_token_count: usize,
}

// =============================================================================
// Engine
// =============================================================================

/// Scores all `2 + |S|` ablation variants and computes normalized deltas.
///
/// Variant order is fixed: base, user-ablated, then one variant per span
/// in span order. An optional bound caps how many scoring calls are in
/// flight at once; the bound primitive is created per call and discarded.
///
/// # Errors
///
/// - [`GuardError::ProxyFailure`] when any scoring call fails; remaining
///   in-flight calls are cancelled.
/// - [`GuardError::ProxyInconsistency`] when a response carries a
///   different number of log-probabilities than tokens, reports zero
///   tokens, or token counts differ across variants.
/// - [`GuardError::InvalidInput`] cannot occur for contexts built by this
///   crate; it is surfaced only for span indices that do not exist.
pub async fn compute_attribution(
    ctx: &StructuredContext,
    action: &ToolCall,
    proxy: &dyn ProxyProvider,
    max_loo_batch_size: Option<usize>,
) -> Result<AttributionResult, GuardError> {
    let span_count = ctx.untrusted_spans.len();
    let mut prompts = Vec::with_capacity(2 + span_count);
    prompts.push(render_prompt(&ctx.all_messages));
    prompts.push(render_prompt(&ctx.with_user_ablated()));
    for span_index in 0..span_count {
        prompts.push(render_prompt(&ctx.with_span_ablated(span_index)?));
    }

    let limiter = max_loo_batch_size.map(|bound| Arc::new(Semaphore::new(bound)));
    let scores = try_join_all(prompts.iter().map(|prompt| {
        let limiter = limiter.clone();
        async move {
            let _permit = match &limiter {
                Some(semaphore) => Some(semaphore.acquire().await.map_err(|_| {
                    GuardError::proxy_failure("scoring concurrency limiter closed")
                })?),
                None => None,
            };
            let score = proxy.score(prompt, &action.raw_text).await?;
            validate_score(&score)?;
            Ok::<ProxyScore, GuardError>(score)
        }
    }))
    .await?;

    let action_token_count = scores[0].token_count;
    for (variant, score) in scores.iter().enumerate() {
        if score.token_count != action_token_count {
            return Err(GuardError::ProxyInconsistency {
                reason: format!(
                    "variant {variant} reported {} action tokens, base reported \
                     {action_token_count}",
                    score.token_count
                ),
            });
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let tokens = action_token_count as f64;
    let base_logprob = scores[0].total_logprob();
    let user_delta = (base_logprob - scores[1].total_logprob()) / tokens;
    let span_deltas: Vec<f64> = scores[2..]
        .iter()
        .map(|score| (base_logprob - score.total_logprob()) / tokens)
        .collect();

    debug!(
        base_logprob,
        user_delta,
        ?span_deltas,
        action_token_count,
        "leave-one-out attribution complete"
    );

    Ok(AttributionResult {
        base_logprob,
        user_delta,
        span_deltas,
        action_token_count,
    })
}

/// Checks the per-response contract before any cross-variant comparison.
fn validate_score(score: &ProxyScore) -> Result<(), GuardError> {
    if score.token_count == 0 {
        return Err(GuardError::ProxyInconsistency {
            reason: "proxy reported zero action tokens".to_string(),
        });
    }
    if score.logprobs.len() != score.token_count {
        return Err(GuardError::ProxyInconsistency {
            reason: format!(
                "proxy returned {} log-probabilities for {} action tokens",
                score.logprobs.len(),
                score.token_count
            ),
        });
    }
    Ok(())
}
