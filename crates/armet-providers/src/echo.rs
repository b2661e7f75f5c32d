//! Echo-mode proxy adapter.
//!
//! Scores a continuation by calling an OpenAI-compatible `/v1/completions`
//! endpoint (vLLM and most serving stacks) with `echo = true` and
//! `max_tokens = 0`: the server returns per-token log-probabilities for
//! the prompt it was given without generating anything. The adapter
//! appends the continuation to the prompt, then slices the returned token
//! stream at the prompt/continuation byte boundary using the server's
//! `text_offset` array, so the core only ever sees continuation tokens.

use armet_core::provider::{ProxyProvider, ProxyScore};
use armet_core::GuardError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::endpoint::EndpointConfig;

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: String,
    max_tokens: u32,
    echo: bool,
    logprobs: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    logprobs: Option<EchoLogprobs>,
}

/// The `logprobs` block of an echo-mode completion response.
///
/// `token_logprobs[0]` is `null` for the first token of the prompt (it has
/// no conditioning context); continuation tokens always follow at least
/// one prompt byte here, so a `null` inside the continuation region is
/// mapped to zero rather than rejected.
#[derive(Debug, Deserialize)]
struct EchoLogprobs {
    token_logprobs: Vec<Option<f64>>,
    text_offset: Vec<usize>,
}

// =============================================================================
// EchoProxyProvider
// =============================================================================

/// Proxy provider backed by an echo + logprobs completions endpoint.
#[derive(Debug)]
pub struct EchoProxyProvider {
    config: EndpointConfig,
    client: reqwest::Client,
}

impl EchoProxyProvider {
    /// Creates a provider for the given endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::ProxyFailure`] when the HTTP client cannot be
    /// constructed.
    pub fn new(config: EndpointConfig) -> Result<Self, GuardError> {
        let client = config.build_client()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl ProxyProvider for EchoProxyProvider {
    async fn score(&self, prompt: &str, continuation: &str) -> Result<ProxyScore, GuardError> {
        let payload = CompletionRequest {
            model: &self.config.model,
            prompt: format!("{prompt}{continuation}"),
            max_tokens: 0,
            echo: true,
            logprobs: 1,
        };

        let url = format!("{}/v1/completions", self.config.trimmed_base_url());
        let request = self.config.authorize(self.client.post(&url)).json(&payload);
        let response = request.send().await.map_err(|e| GuardError::ProxyFailure {
            message: format!("completions request to {url} failed"),
            source: Some(Box::new(e)),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GuardError::proxy_failure(format!(
                "completions request to {url} returned {status}"
            )));
        }

        let body: CompletionResponse =
            response.json().await.map_err(|e| GuardError::ProxyFailure {
                message: "cannot decode completions response".to_string(),
                source: Some(Box::new(e)),
            })?;

        let logprobs = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.logprobs)
            .ok_or_else(|| {
                GuardError::proxy_failure("completions response carries no logprobs block")
            })?;

        if logprobs.token_logprobs.len() != logprobs.text_offset.len() {
            return Err(GuardError::proxy_failure(format!(
                "echo response misaligned: {} logprobs vs {} offsets",
                logprobs.token_logprobs.len(),
                logprobs.text_offset.len()
            )));
        }

        Ok(slice_continuation(&logprobs, prompt.len()))
    }
}

/// Keeps only the tokens whose byte offset falls inside the continuation.
fn slice_continuation(logprobs: &EchoLogprobs, boundary: usize) -> ProxyScore {
    let continuation: Vec<f64> = logprobs
        .text_offset
        .iter()
        .zip(&logprobs.token_logprobs)
        .filter(|(offset, _)| **offset >= boundary)
        .map(|(_, lp)| lp.unwrap_or(0.0))
        .collect();
    let token_count = continuation.len();
    debug!(token_count, boundary, "sliced continuation tokens");
    ProxyScore {
        logprobs: continuation,
        token_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slicing_keeps_only_continuation_tokens() {
        // Prompt is 12 bytes; the last two tokens belong to the
        // continuation.
        let logprobs = EchoLogprobs {
            token_logprobs: vec![None, Some(-0.5), Some(-1.0), Some(-2.0), Some(-3.0)],
            text_offset: vec![0, 4, 8, 12, 16],
        };
        let score = slice_continuation(&logprobs, 12);
        assert_eq!(score.token_count, 2);
        assert_eq!(score.logprobs, vec![-2.0, -3.0]);
    }

    #[test]
    fn leading_null_inside_continuation_maps_to_zero() {
        let logprobs = EchoLogprobs {
            token_logprobs: vec![None, Some(-1.5)],
            text_offset: vec![0, 3],
        };
        let score = slice_continuation(&logprobs, 0);
        assert_eq!(score.token_count, 2);
        assert_eq!(score.logprobs, vec![0.0, -1.5]);
    }

    #[test]
    fn empty_continuation_yields_zero_tokens() {
        let logprobs = EchoLogprobs {
            token_logprobs: vec![Some(-1.0)],
            text_offset: vec![0],
        };
        let score = slice_continuation(&logprobs, 10);
        assert_eq!(score.token_count, 0);
        assert!(score.logprobs.is_empty());
    }

    #[test]
    fn response_body_parses() {
        let body: CompletionResponse = serde_json::from_str(
            r#"{
                "choices": [{
                    "logprobs": {
                        "token_logprobs": [null, -0.25, -1.75],
                        "text_offset": [0, 5, 9]
                    }
                }]
            }"#,
        )
        .unwrap();
        let logprobs = body.choices[0].logprobs.as_ref().unwrap();
        assert_eq!(logprobs.token_logprobs.len(), 3);
    }
}
