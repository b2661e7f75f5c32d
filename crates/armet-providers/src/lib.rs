//! # armet-providers
//!
//! HTTP-backed implementations of the three `armet-core` capabilities,
//! targeting OpenAI-compatible serving endpoints (vLLM and friends):
//!
//! - [`EchoProxyProvider`] — scores action log-probabilities through a
//!   completions endpoint in echo + logprobs mode.
//! - [`ChatActionProvider`] — proposes and regenerates tool calls through
//!   a chat-completions endpoint.
//! - [`ChatSanitizerProvider`] — rewrites untrusted spans with a
//!   security-focused sanitization prompt.
//!
//! All three share [`EndpointConfig`] for connection settings. Any other
//! transport works too: the core only needs the three traits.

pub mod chat;
pub mod echo;
pub mod endpoint;
pub mod prompts;
pub mod sanitizer;

pub use chat::ChatActionProvider;
pub use echo::EchoProxyProvider;
pub use endpoint::EndpointConfig;
pub use sanitizer::ChatSanitizerProvider;
