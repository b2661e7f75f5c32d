//! Scripted provider fakes shared by the integration suites.
//!
//! Each fake is deterministic and counts its invocations so tests can
//! assert which capabilities ran. The proxy fake maps rendered prompts to
//! total log-probabilities via a scripted function, spreading the total
//! evenly over a fixed token count.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use armet_core::prelude::*;
use async_trait::async_trait;

// =============================================================================
// ScriptedProxy
// =============================================================================

type ScoreFn = Box<dyn Fn(&str) -> Result<f64, String> + Send + Sync>;

/// Proxy fake driven by a prompt -> total-logprob function.
pub struct ScriptedProxy {
    token_count: usize,
    score_fn: ScoreFn,
    calls: AtomicUsize,
    /// Every prompt the proxy was asked to score, in dispatch order.
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedProxy {
    /// Creates a proxy that spreads each scripted total over
    /// `token_count` tokens.
    pub fn new(
        token_count: usize,
        score_fn: impl Fn(&str) -> Result<f64, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            token_count,
            score_fn: Box::new(score_fn),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProxyProvider for ScriptedProxy {
    async fn score(&self, prompt: &str, _continuation: &str) -> Result<ProxyScore, GuardError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        let total = (self.score_fn)(prompt).map_err(GuardError::proxy_failure)?;
        #[allow(clippy::cast_precision_loss)]
        let per_token = total / self.token_count as f64;
        Ok(ProxyScore {
            logprobs: vec![per_token; self.token_count],
            token_count: self.token_count,
        })
    }
}

// =============================================================================
// ScriptedAction
// =============================================================================

/// Action provider fake returning a fixed proposal.
pub struct ScriptedAction {
    result: Result<Option<ToolCall>, String>,
    calls: AtomicUsize,
}

impl ScriptedAction {
    pub fn proposing(tool_call: ToolCall) -> Self {
        Self {
            result: Ok(Some(tool_call)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn declining() -> Self {
        Self {
            result: Ok(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActionProvider for ScriptedAction {
    async fn propose(&self, _messages: &[Message]) -> Result<Option<ToolCall>, GuardError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.result {
            Ok(result) => Ok(result.clone()),
            Err(message) => Err(GuardError::RegenerationFailure {
                message: message.clone(),
            }),
        }
    }
}

// =============================================================================
// ScriptedSanitizer
// =============================================================================

/// Sanitizer fake returning a fixed rewrite, or failing.
pub struct ScriptedSanitizer {
    result: Result<String, String>,
    calls: AtomicUsize,
}

impl ScriptedSanitizer {
    pub fn rewriting(text: &str) -> Self {
        Self {
            result: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SanitizerProvider for ScriptedSanitizer {
    async fn sanitize(
        &self,
        _span_content: &str,
        _span_tool_name: &str,
    ) -> Result<String, GuardError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.result {
            Ok(text) => Ok(text.clone()),
            Err(message) => Err(GuardError::SanitizationFailure {
                message: message.clone(),
            }),
        }
    }
}
