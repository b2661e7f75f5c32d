//! Conversation message and tool-call value types.
//!
//! These are the immutable inputs to the pipeline: the conversation is an
//! ordered sequence of [`Message`] values, and the agent's proposed action
//! is a [`ToolCall`]. "Modification" anywhere in this crate means producing
//! a new value; nothing here is mutated in place.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::GuardError;

// =============================================================================
// Role
// =============================================================================

/// Who produced a message in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// System instructions.
    System,
    /// The end user.
    User,
    /// The agent model, including its intermediate reasoning.
    Assistant,
    /// A tool result.
    Tool,
}

impl Role {
    /// Uppercase label used when rendering a scoring prompt.
    ///
    /// The rendered form is part of the proxy contract: per-token alignment
    /// depends on byte offsets into the rendered prompt, so the label format
    /// must stay stable.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::System => "SYSTEM",
            Self::User => "USER",
            Self::Assistant => "ASSISTANT",
            Self::Tool => "TOOL",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        };
        write!(f, "{s}")
    }
}

// =============================================================================
// Message
// =============================================================================

/// A single message in the conversation.
///
/// # Invariants
///
/// - `tool_name` is present if and only if `role` is [`Role::Tool`].
/// - `content` is always present (possibly empty).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who produced this message.
    pub role: Role,
    /// Textual content.
    pub content: String,
    /// For tool-role messages, the name of the tool that produced the
    /// result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Provider-specific correlation id linking a tool result to its call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    /// Creates a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_name: None,
            tool_call_id: None,
        }
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_name: None,
            tool_call_id: None,
        }
    }

    /// Creates an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_name: None,
            tool_call_id: None,
        }
    }

    /// Creates a tool-result message.
    #[must_use]
    pub fn tool(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_name: Some(tool_name.into()),
            tool_call_id: None,
        }
    }

    /// Attaches a tool-call correlation id.
    #[must_use]
    pub fn with_tool_call_id(mut self, id: impl Into<String>) -> Self {
        self.tool_call_id = Some(id.into());
        self
    }
}

/// Validates the structural invariants of a caller-supplied message list.
///
/// # Errors
///
/// Returns [`GuardError::InvalidInput`] when a tool message lacks a
/// `tool_name` or a non-tool message carries one.
pub fn validate_messages(messages: &[Message]) -> Result<(), GuardError> {
    for (index, message) in messages.iter().enumerate() {
        match (message.role, message.tool_name.as_deref()) {
            (Role::Tool, None | Some("")) => {
                return Err(GuardError::InvalidInput {
                    reason: format!("tool message at index {index} has no tool_name"),
                });
            }
            (Role::Tool, Some(_)) => {}
            (role, Some(_)) => {
                return Err(GuardError::InvalidInput {
                    reason: format!("{role} message at index {index} carries a tool_name"),
                });
            }
            (_, None) => {}
        }
    }
    Ok(())
}

// =============================================================================
// ToolCall
// =============================================================================

/// A tool-use action proposed by the agent.
///
/// # Invariants
///
/// - `raw_text` is the verbatim textual form the agent emitted; it is what
///   the proxy scores. `arguments` is a parsed convenience only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the tool being invoked.
    pub name: String,
    /// Parsed arguments.
    pub arguments: serde_json::Map<String, serde_json::Value>,
    /// Verbatim text the agent produced for this call.
    pub raw_text: String,
}

impl ToolCall {
    /// Creates a tool call.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        arguments: serde_json::Map<String, serde_json::Value>,
        raw_text: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            arguments,
            raw_text: raw_text.into(),
        }
    }

    /// Creates a tool call with no arguments.
    #[must_use]
    pub fn bare(name: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self::new(name, serde_json::Map::new(), raw_text)
    }

    /// Returns the failure-safe substitute for this call: same name, empty
    /// arguments, `"<name>()"` as the textual form.
    ///
    /// Downstream consumers that parse `raw_text` strictly rely on this
    /// exact no-argument shape.
    #[must_use]
    pub fn stripped(&self) -> Self {
        Self {
            name: self.name.clone(),
            arguments: serde_json::Map::new(),
            raw_text: format!("{}()", self.name),
        }
    }
}
