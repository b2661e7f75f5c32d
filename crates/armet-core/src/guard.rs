//! Pipeline orchestrator.
//!
//! [`Guard::guard`] is the single entry point: it decomposes the
//! conversation, runs leave-one-out attribution, applies the
//! dominance-shift detector, and hands positive detections to the defense
//! pipeline. Short-circuits keep the expensive scoring path off actions
//! that have nothing to attribute: privileged tools, conversations with no
//! user request, and conversations with no untrusted spans.
//!
//! The orchestrator holds no mutable state; two invocations with identical
//! inputs and identical provider responses produce identical results.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::attribution::compute_attribution;
use crate::config::{AttributionFailurePolicy, GuardConfig};
use crate::context::StructuredContext;
use crate::defense::{defend, DefenseResult};
use crate::detection::detect;
use crate::error::GuardError;
use crate::message::{validate_messages, Message, ToolCall};
use crate::provider::{ActionProvider, ProxyProvider, SanitizerProvider};

/// The guardrail orchestrator.
///
/// Construction wires in the three capabilities and a validated
/// configuration; the value is cheap to clone and safe to share across
/// tasks.
#[derive(Clone)]
pub struct Guard {
    proxy: Arc<dyn ProxyProvider>,
    action_provider: Arc<dyn ActionProvider>,
    sanitizer: Arc<dyn SanitizerProvider>,
    config: GuardConfig,
}

impl Guard {
    /// Creates a guard over the given capabilities.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::InvalidConfig`] when the configuration fails
    /// validation.
    pub fn new(
        proxy: Arc<dyn ProxyProvider>,
        action_provider: Arc<dyn ActionProvider>,
        sanitizer: Arc<dyn SanitizerProvider>,
        config: GuardConfig,
    ) -> Result<Self, GuardError> {
        config.validate()?;
        Ok(Self {
            proxy,
            action_provider,
            sanitizer,
            config,
        })
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Decides whether `action` is driven by the user request or by an
    /// injected tool result, and defends when it is not.
    ///
    /// `untrusted_tool_names` declares which tools' results are treated as
    /// untrusted spans; privileged tools are excluded regardless.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::InvalidInput`] when the message list violates
    /// structural invariants; no model calls are made in that case. Proxy
    /// failures do not surface as errors: they are absorbed by the
    /// configured attribution failure policy.
    #[instrument(skip_all, fields(action = %action.name))]
    pub async fn guard(
        &self,
        messages: &[Message],
        action: &ToolCall,
        untrusted_tool_names: &BTreeSet<String>,
    ) -> Result<DefenseResult, GuardError> {
        validate_messages(messages)?;

        // Privileged actions bypass the pipeline entirely.
        if self.config.privileged_tools.contains(&action.name) {
            debug!("privileged action, bypassing pipeline");
            return Ok(DefenseResult::passthrough(action, None, None));
        }

        let ctx = StructuredContext::build(
            messages,
            untrusted_tool_names,
            &self.config.privileged_tools,
        );

        // Nothing to attribute to, or nothing untrusted to attribute.
        if ctx.user_request.is_none() || !ctx.has_untrusted_spans() {
            debug!(
                has_user = ctx.user_request.is_some(),
                spans = ctx.untrusted_spans.len(),
                "nothing to attribute, passing through"
            );
            return Ok(DefenseResult::passthrough(action, None, None));
        }

        // Score against the masked context so post-injection reasoning
        // cannot hide a span's influence.
        let scoring_ctx = if self.config.mask_cot_for_scoring {
            ctx.with_cot_masked_after_first_untrusted_span()
        } else {
            ctx.clone()
        };

        let attribution = match compute_attribution(
            &scoring_ctx,
            action,
            self.proxy.as_ref(),
            self.config.max_loo_batch_size,
        )
        .await
        {
            Ok(attribution) => attribution,
            Err(error) if error.is_attribution_failure() => {
                warn!(%error, policy = ?self.config.on_attribution_failure,
                    "attribution could not run");
                return Ok(match self.config.on_attribution_failure {
                    AttributionFailurePolicy::Passthrough => {
                        DefenseResult::passthrough(action, None, None)
                    }
                    AttributionFailurePolicy::Block => DefenseResult::blocked(action, None),
                });
            }
            Err(error) => return Err(error),
        };

        let detection = detect(&attribution, self.config.margin_tau);
        if !detection.detected {
            return Ok(DefenseResult::passthrough(
                action,
                Some(attribution),
                Some(detection),
            ));
        }

        Ok(defend(
            &ctx,
            action,
            detection,
            attribution,
            self.sanitizer.as_ref(),
            self.action_provider.as_ref(),
            &self.config,
        )
        .await)
    }
}

impl std::fmt::Debug for Guard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guard")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
