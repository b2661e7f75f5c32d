//! # armet-core
//!
//! Runtime guardrail that sits between a tool-using language-model agent
//! and tool execution. Before a proposed tool call is dispatched, the
//! guard decides whether the call is genuinely driven by the user's
//! request or has been hijacked by instructions smuggled into untrusted
//! tool outputs (an indirect prompt injection). Hijacked calls are
//! defended: flagged tool results are rewritten, polluted reasoning is
//! redacted, and the agent re-proposes an action. The original
//! attacker-controlled call is never executed.
//!
//! ## How it works
//!
//! - **Decomposition**: the conversation is split into the user request,
//!   the trusted history, and the untrusted spans contributed by tools the
//!   caller declares untrusted.
//! - **Attribution**: a separate proxy model scores the proposed action's
//!   log-probability under the full context and under leave-one-out
//!   ablations of each component, concurrently.
//! - **Detection**: a span whose normalized influence exceeds the user
//!   request's by more than a margin signals a dominance shift.
//! - **Defense**: flagged spans are sanitized, post-injection reasoning is
//!   masked, and the action is regenerated against the cleaned context.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::collections::BTreeSet;
//! use std::sync::Arc;
//!
//! use armet_core::{Guard, GuardConfig, Message, ToolCall};
//! # use armet_core::provider::{ActionProvider, ProxyProvider, SanitizerProvider};
//! # fn providers() -> (Arc<dyn ProxyProvider>, Arc<dyn ActionProvider>, Arc<dyn SanitizerProvider>) { unimplemented!() }
//!
//! # async fn demo() -> Result<(), armet_core::GuardError> {
//! let (proxy, agent, sanitizer) = providers();
//! let guard = Guard::new(proxy, agent, sanitizer, GuardConfig::default())?;
//!
//! let messages = vec![
//!     Message::user("Book a flight to Paris"),
//!     Message::tool("web_search", "AA123 $450"),
//! ];
//! let action = ToolCall::bare("book_flight", "book_flight(flight=AA123)");
//! let untrusted: BTreeSet<String> = ["web_search".to_string()].into();
//!
//! let outcome = guard.guard(&messages, &action, &untrusted).await?;
//! if outcome.was_defended {
//!     // Dispatch outcome.final_action instead of the original.
//! }
//! # Ok(())
//! # }
//! ```

pub mod attribution;
pub mod config;
pub mod context;
pub mod defense;
pub mod detection;
pub mod error;
pub mod guard;
pub mod message;
pub mod provider;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{AttributionFailurePolicy, GuardConfig};
    pub use crate::defense::DefenseResult;
    pub use crate::error::GuardError;
    pub use crate::guard::Guard;
    pub use crate::message::{Message, Role, ToolCall};
    pub use crate::provider::{ActionProvider, ProxyProvider, ProxyScore, SanitizerProvider};
}

pub use attribution::AttributionResult;
pub use config::{AttributionFailurePolicy, GuardConfig};
pub use context::{StructuredContext, UntrustedSpan, COT_REDACTION_TEXT};
pub use defense::DefenseResult;
pub use detection::DetectionResult;
pub use error::GuardError;
pub use guard::Guard;
pub use message::{Message, Role, ToolCall};
pub use provider::ProxyScore;
