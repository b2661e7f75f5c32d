//! Shared endpoint configuration for the HTTP-backed adapters.

use std::time::Duration;

use armet_core::GuardError;
use serde::{Deserialize, Serialize};

/// Connection settings for an OpenAI-compatible serving endpoint.
///
/// # Invariants
///
/// - `timeout_ms` applies to the full request lifecycle; an expired
///   request surfaces as a provider failure, never a hang.
/// - `api_key`, when set, is sent as a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EndpointConfig {
    /// Server URL, e.g. `http://localhost:8000`.
    pub base_url: String,
    /// Model name as served by the endpoint.
    pub model: String,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Optional bearer token.
    pub api_key: Option<String>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            model: "google/gemma-3-12b-it".to_string(),
            timeout_ms: 30_000,
            api_key: None,
        }
    }
}

impl EndpointConfig {
    /// Creates a config for the given server and model.
    #[must_use]
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            ..Self::default()
        }
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Sets the bearer token.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// The base URL with any trailing slash removed.
    #[must_use]
    pub fn trimmed_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Builds the HTTP client for this endpoint.
    pub(crate) fn build_client(&self) -> Result<reqwest::Client, GuardError> {
        reqwest::Client::builder()
            .timeout(Duration::from_millis(self.timeout_ms))
            .build()
            .map_err(|e| GuardError::ProxyFailure {
                message: "cannot build HTTP client".to_string(),
                source: Some(Box::new(e)),
            })
    }

    /// Applies bearer auth when a key is configured.
    pub(crate) fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}
