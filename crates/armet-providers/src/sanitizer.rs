//! Chat-completions sanitizer adapter.
//!
//! Asks a chat model to rewrite a single untrusted span using the
//! templates in [`crate::prompts`]. The model receives only the span
//! content and its source tool name; the rewrite comes back as plain
//! message content.

use armet_core::provider::SanitizerProvider;
use armet_core::GuardError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::endpoint::EndpointConfig;
use crate::prompts::{sanitization_user_prompt, SANITIZATION_SYSTEM_PROMPT};

#[derive(Debug, Serialize)]
struct SanitizeRequest<'a> {
    model: &'a str,
    messages: [SanitizeMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct SanitizeMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct SanitizeResponse {
    choices: Vec<SanitizeChoice>,
}

#[derive(Debug, Deserialize)]
struct SanitizeChoice {
    message: SanitizeContent,
}

#[derive(Debug, Deserialize)]
struct SanitizeContent {
    #[serde(default)]
    content: Option<String>,
}

/// Sanitizer provider backed by a chat-completions endpoint.
#[derive(Debug)]
pub struct ChatSanitizerProvider {
    config: EndpointConfig,
    client: reqwest::Client,
}

impl ChatSanitizerProvider {
    /// Creates a provider for the given endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::SanitizationFailure`] when the HTTP client
    /// cannot be constructed.
    pub fn new(config: EndpointConfig) -> Result<Self, GuardError> {
        let client = config
            .build_client()
            .map_err(|e| GuardError::SanitizationFailure {
                message: e.to_string(),
            })?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl SanitizerProvider for ChatSanitizerProvider {
    async fn sanitize(
        &self,
        span_content: &str,
        span_tool_name: &str,
    ) -> Result<String, GuardError> {
        let user_prompt = sanitization_user_prompt(span_tool_name, span_content);
        let payload = SanitizeRequest {
            model: &self.config.model,
            messages: [
                SanitizeMessage {
                    role: "system",
                    content: SANITIZATION_SYSTEM_PROMPT,
                },
                SanitizeMessage {
                    role: "user",
                    content: &user_prompt,
                },
            ],
        };

        let url = format!("{}/v1/chat/completions", self.config.trimmed_base_url());
        let response = self
            .config
            .authorize(self.client.post(&url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| GuardError::SanitizationFailure {
                message: format!("sanitize request to {url} failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GuardError::SanitizationFailure {
                message: format!("sanitize request to {url} returned {status}"),
            });
        }

        let body: SanitizeResponse =
            response
                .json()
                .await
                .map_err(|e| GuardError::SanitizationFailure {
                    message: format!("cannot decode sanitize response: {e}"),
                })?;

        let rewrite = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GuardError::SanitizationFailure {
                message: "sanitize response carries no content".to_string(),
            })?;

        debug!(
            tool = span_tool_name,
            rewritten_len = rewrite.len(),
            "span sanitized"
        );
        Ok(rewrite.trim().to_string())
    }
}
