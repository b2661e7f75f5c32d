//! Chat-completions action adapter.
//!
//! Proposes tool calls through an OpenAI-compatible
//! `/v1/chat/completions` endpoint. The guardrail hands this adapter a
//! context that may have been sanitized and redacted, so tool-role
//! messages are folded into user messages with a `[Tool: name]` prefix:
//! they stay valid even when the assistant `tool_calls` entry that
//! produced them was dropped during defense. Consecutive same-role
//! messages are merged to satisfy the API constraint against adjacent
//! duplicates.

use armet_core::provider::ActionProvider;
use armet_core::{GuardError, Message, Role, ToolCall};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::endpoint::EndpointConfig;

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct ChatMessage {
    pub(crate) role: &'static str,
    pub(crate) content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

// =============================================================================
// Message conversion
// =============================================================================

/// Folds the guardrail message shape into chat-API messages.
pub(crate) fn to_chat_messages(messages: &[Message]) -> Vec<ChatMessage> {
    let mut converted: Vec<ChatMessage> = Vec::with_capacity(messages.len());
    for message in messages {
        let (role, content) = match message.role {
            Role::System => ("system", message.content.clone()),
            Role::User => ("user", message.content.clone()),
            Role::Assistant => ("assistant", message.content.clone()),
            Role::Tool => {
                let label = message
                    .tool_name
                    .as_deref()
                    .map_or_else(String::new, |name| format!("[Tool: {name}] "));
                ("user", format!("{label}{}", message.content))
            }
        };
        match converted.last_mut() {
            Some(last) if last.role == role => {
                last.content.push('\n');
                last.content.push_str(&content);
            }
            _ => converted.push(ChatMessage { role, content }),
        }
    }
    converted
}

/// Parses the first tool call out of a chat response, if any.
fn parse_tool_call(response: ChatResponse) -> Option<ToolCall> {
    let choice = response.choices.into_iter().next()?;
    let wire = choice.message.tool_calls?.into_iter().next()?;

    let arguments = match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(
        &wire.function.arguments,
    ) {
        Ok(map) => map,
        Err(_) => {
            let mut map = serde_json::Map::new();
            map.insert(
                "_raw".to_string(),
                serde_json::Value::String(wire.function.arguments.clone()),
            );
            map
        }
    };

    Some(ToolCall::new(
        wire.function.name,
        arguments,
        wire.function.arguments,
    ))
}

// =============================================================================
// ChatActionProvider
// =============================================================================

/// Action provider backed by a chat-completions endpoint.
#[derive(Debug)]
pub struct ChatActionProvider {
    config: EndpointConfig,
    client: reqwest::Client,
    tools: Option<serde_json::Value>,
}

impl ChatActionProvider {
    /// Creates a provider for the given endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::RegenerationFailure`] when the HTTP client
    /// cannot be constructed.
    pub fn new(config: EndpointConfig) -> Result<Self, GuardError> {
        let client = config
            .build_client()
            .map_err(|e| GuardError::RegenerationFailure {
                message: e.to_string(),
            })?;
        Ok(Self {
            config,
            client,
            tools: None,
        })
    }

    /// Attaches tool definitions passed through to the chat API.
    #[must_use]
    pub fn with_tools(mut self, tools: serde_json::Value) -> Self {
        self.tools = Some(tools);
        self
    }
}

#[async_trait]
impl ActionProvider for ChatActionProvider {
    async fn propose(&self, messages: &[Message]) -> Result<Option<ToolCall>, GuardError> {
        let payload = ChatRequest {
            model: &self.config.model,
            messages: to_chat_messages(messages),
            tools: self.tools.as_ref(),
        };

        let url = format!("{}/v1/chat/completions", self.config.trimmed_base_url());
        let response = self
            .config
            .authorize(self.client.post(&url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| GuardError::RegenerationFailure {
                message: format!("chat request to {url} failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GuardError::RegenerationFailure {
                message: format!("chat request to {url} returned {status}"),
            });
        }

        let body: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| GuardError::RegenerationFailure {
                    message: format!("cannot decode chat response: {e}"),
                })?;

        let tool_call = parse_tool_call(body);
        debug!(proposed = tool_call.is_some(), "chat proposal complete");
        Ok(tool_call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_messages_fold_into_prefixed_user_messages() {
        let converted = to_chat_messages(&[
            Message::user("book a flight"),
            Message::tool("web_search", "AA123 $450"),
        ]);
        assert_eq!(converted.len(), 1);
        assert_eq!(converted[0].role, "user");
        assert_eq!(
            converted[0].content,
            "book a flight\n[Tool: web_search] AA123 $450"
        );
    }

    #[test]
    fn distinct_roles_are_not_merged() {
        let converted = to_chat_messages(&[
            Message::system("be careful"),
            Message::user("hi"),
            Message::assistant("hello"),
            Message::user("bye"),
        ]);
        let roles: Vec<&str> = converted.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
    }

    #[test]
    fn tool_call_with_json_arguments_parses() {
        let response: ChatResponse = serde_json::from_str(
            r#"{
                "choices": [{
                    "message": {
                        "content": null,
                        "tool_calls": [{
                            "function": {
                                "name": "book_flight",
                                "arguments": "{\"flight\": \"AA123\"}"
                            }
                        }]
                    }
                }]
            }"#,
        )
        .unwrap();
        let call = parse_tool_call(response).unwrap();
        assert_eq!(call.name, "book_flight");
        assert_eq!(call.arguments.get("flight").unwrap(), "AA123");
        assert_eq!(call.raw_text, "{\"flight\": \"AA123\"}");
    }

    #[test]
    fn unparseable_arguments_land_under_raw() {
        let response: ChatResponse = serde_json::from_str(
            r#"{
                "choices": [{
                    "message": {
                        "tool_calls": [{
                            "function": {"name": "noop", "arguments": "not json"}
                        }]
                    }
                }]
            }"#,
        )
        .unwrap();
        let call = parse_tool_call(response).unwrap();
        assert_eq!(call.arguments.get("_raw").unwrap(), "not json");
    }

    #[test]
    fn content_only_response_proposes_nothing() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"content": "I cannot do that."}}]}"#,
        )
        .unwrap();
        assert!(parse_tool_call(response).is_none());
    }
}
