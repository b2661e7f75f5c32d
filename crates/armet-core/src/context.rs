//! Structured context decomposition.
//!
//! Decomposes a flat conversation into its causal components: the user
//! request, the trusted history, and the untrusted spans contributed by
//! tool results. The ablation and masking variants produced here are the
//! inputs to leave-one-out attribution and to the defense pipeline.
//!
//! # Multi-turn masking
//!
//! Assistant reasoning produced *after* an injected tool result may already
//! restate the injected instruction. If that reasoning stays in the scoring
//! context, ablating the tool result appears to have no effect and the
//! injection goes undetected. [`StructuredContext::with_cot_masked_after_first_untrusted_span`]
//! replaces post-injection assistant messages with a fixed low-information
//! placeholder so the span's true influence is measurable.

use serde::{Deserialize, Serialize};

use crate::error::GuardError;
use crate::message::{Message, Role};

/// Placeholder substituted for redacted assistant reasoning.
///
/// The exact string is fixed for reproducibility; the proxy only needs to
/// see *some* low-information replacement.
pub const COT_REDACTION_TEXT: &str = "[Reasoning redacted]";

// =============================================================================
// UntrustedSpan
// =============================================================================

/// A contiguous piece of content originating from an untrusted tool.
///
/// # Invariants
///
/// - `index` is a dense 0-based position in the ordered list of untrusted
///   spans extracted from the conversation.
/// - `message_index` references the originating tool message by position in
///   the input message list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UntrustedSpan {
    /// Dense 0-based position among the extracted spans.
    pub index: usize,
    /// Name of the tool that returned this content.
    pub tool_name: String,
    /// Raw untrusted text.
    pub content: String,
    /// Position of the originating message in the input list.
    pub message_index: usize,
}

// =============================================================================
// StructuredContext
// =============================================================================

/// A conversation decomposed into user request, history, and untrusted
/// spans.
///
/// Values are immutable; every transform returns a new context. Span
/// `message_index` values always refer to positions in `all_messages`,
/// which transforms preserve (masking and replacement never reorder or
/// remove messages; ablation variants are plain message lists, not
/// contexts).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredContext {
    /// The first user-role message, when one exists.
    pub user_request: Option<Message>,
    /// Every message that is neither the user request nor an untrusted
    /// span, in input order.
    pub history: Vec<Message>,
    /// Untrusted spans in the order their tool messages appear.
    pub untrusted_spans: Vec<UntrustedSpan>,
    /// The complete input message sequence.
    pub all_messages: Vec<Message>,
    /// Position of `user_request` in `all_messages`.
    user_index: Option<usize>,
}

impl StructuredContext {
    /// Builds a structured context from a flat message sequence.
    ///
    /// The user request is the *first* user-role message. Tool messages
    /// whose `tool_name` is in `untrusted_tool_names` become untrusted
    /// spans, unless the name is also in `privileged_tool_names`.
    #[must_use]
    pub fn build(
        messages: &[Message],
        untrusted_tool_names: &std::collections::BTreeSet<String>,
        privileged_tool_names: &std::collections::BTreeSet<String>,
    ) -> Self {
        let user_index = messages.iter().position(|m| m.role == Role::User);

        let mut untrusted_spans = Vec::new();
        for (message_index, message) in messages.iter().enumerate() {
            if message.role != Role::Tool {
                continue;
            }
            let Some(tool_name) = message.tool_name.as_deref() else {
                continue;
            };
            if !untrusted_tool_names.contains(tool_name)
                || privileged_tool_names.contains(tool_name)
            {
                continue;
            }
            untrusted_spans.push(UntrustedSpan {
                index: untrusted_spans.len(),
                tool_name: tool_name.to_string(),
                content: message.content.clone(),
                message_index,
            });
        }

        let span_indices: std::collections::BTreeSet<usize> =
            untrusted_spans.iter().map(|s| s.message_index).collect();
        let history = messages
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != user_index && !span_indices.contains(i))
            .map(|(_, m)| m.clone())
            .collect();

        Self {
            user_request: user_index.map(|i| messages[i].clone()),
            history,
            untrusted_spans,
            all_messages: messages.to_vec(),
            user_index,
        }
    }

    /// Returns `true` when at least one untrusted span exists.
    #[must_use]
    pub fn has_untrusted_spans(&self) -> bool {
        !self.untrusted_spans.is_empty()
    }

    /// Position in `all_messages` of the earliest untrusted span, if any.
    #[must_use]
    pub fn earliest_span_position(&self) -> Option<usize> {
        self.untrusted_spans.iter().map(|s| s.message_index).min()
    }

    // -------------------------------------------------------------------------
    // Ablation variants
    // -------------------------------------------------------------------------

    /// The message sequence with the first user message removed.
    #[must_use]
    pub fn with_user_ablated(&self) -> Vec<Message> {
        self.all_messages
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != self.user_index)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// The message sequence with the `span_index`-th untrusted span's tool
    /// message removed.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::InvalidInput`] for an out-of-range span index.
    pub fn with_span_ablated(&self, span_index: usize) -> Result<Vec<Message>, GuardError> {
        let span = self
            .untrusted_spans
            .get(span_index)
            .ok_or_else(|| GuardError::InvalidInput {
                reason: format!("unknown untrusted span index {span_index}"),
            })?;
        Ok(self
            .all_messages
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != span.message_index)
            .map(|(_, m)| m.clone())
            .collect())
    }

    // -------------------------------------------------------------------------
    // Masking and replacement
    // -------------------------------------------------------------------------

    /// Replaces every assistant message positioned strictly after
    /// `position` with [`COT_REDACTION_TEXT`], preserving positions and
    /// roles.
    #[must_use]
    pub fn with_cot_masked_after(&self, position: usize) -> Self {
        let messages: Vec<Message> = self
            .all_messages
            .iter()
            .enumerate()
            .map(|(i, m)| {
                if i > position && m.role == Role::Assistant {
                    Message {
                        role: Role::Assistant,
                        content: COT_REDACTION_TEXT.to_string(),
                        tool_name: m.tool_name.clone(),
                        tool_call_id: m.tool_call_id.clone(),
                    }
                } else {
                    m.clone()
                }
            })
            .collect();
        self.rebuilt_from(messages)
    }

    /// Masks assistant reasoning after the earliest untrusted span.
    ///
    /// Returns an unchanged clone when no untrusted spans exist.
    #[must_use]
    pub fn with_cot_masked_after_first_untrusted_span(&self) -> Self {
        match self.earliest_span_position() {
            Some(position) => self.with_cot_masked_after(position),
            None => self.clone(),
        }
    }

    /// Returns a new context with one span's content swapped for
    /// `new_content`. The replacement message keeps the original tool name,
    /// correlation id, and position.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::InvalidInput`] for an out-of-range span index.
    pub fn with_span_content_replaced(
        &self,
        span_index: usize,
        new_content: &str,
    ) -> Result<Self, GuardError> {
        let span = self
            .untrusted_spans
            .get(span_index)
            .ok_or_else(|| GuardError::InvalidInput {
                reason: format!("unknown untrusted span index {span_index}"),
            })?;
        let mut messages = self.all_messages.clone();
        messages[span.message_index].content = new_content.to_string();
        Ok(self.rebuilt_from(messages))
    }

    /// Removes the trailing run of assistant messages.
    ///
    /// Used before regeneration so the blocked proposal and its reasoning
    /// do not re-steer the action provider.
    #[must_use]
    pub fn with_trailing_assistant_dropped(&self) -> Self {
        let mut end = self.all_messages.len();
        while end > 0 && self.all_messages[end - 1].role == Role::Assistant {
            end -= 1;
        }
        // Span and user positions all precede the trailing assistant run,
        // so indices stay valid.
        self.rebuilt_from(self.all_messages[..end].to_vec())
    }

    /// Rebuilds derived views after a position-preserving transform.
    ///
    /// Span `message_index` values are kept; span contents are re-read from
    /// the new messages so replacement stays visible in `untrusted_spans`.
    fn rebuilt_from(&self, messages: Vec<Message>) -> Self {
        let untrusted_spans: Vec<UntrustedSpan> = self
            .untrusted_spans
            .iter()
            .map(|s| UntrustedSpan {
                index: s.index,
                tool_name: s.tool_name.clone(),
                content: messages[s.message_index].content.clone(),
                message_index: s.message_index,
            })
            .collect();
        let span_indices: std::collections::BTreeSet<usize> =
            untrusted_spans.iter().map(|s| s.message_index).collect();
        let history = messages
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != self.user_index && !span_indices.contains(i))
            .map(|(_, m)| m.clone())
            .collect();
        Self {
            user_request: self.user_index.map(|i| messages[i].clone()),
            history,
            untrusted_spans,
            all_messages: messages,
            user_index: self.user_index,
        }
    }
}

// =============================================================================
// Prompt rendering
// =============================================================================

/// Renders a message sequence to the single textual prompt the proxy
/// scores.
///
/// The format is fixed and stable: `"<ROLE>: <content>\n"` per message,
/// role label uppercased. The action's raw text is appended by the caller;
/// the proxy's per-token alignment depends on the byte length of this
/// rendered prompt.
#[must_use]
pub fn render_prompt(messages: &[Message]) -> String {
    let mut prompt = String::new();
    for message in messages {
        prompt.push_str(message.role.label());
        prompt.push_str(": ");
        prompt.push_str(&message.content);
        prompt.push('\n');
    }
    prompt
}
