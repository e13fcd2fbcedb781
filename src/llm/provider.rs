//! Pluggable LLM provider trait.
//!
//! Implementations translate provider-agnostic [`ChatRequest`] /
//! [`ChatResponse`] into provider-specific SDK calls. This keeps the
//! queue, router, and managers decoupled from any particular vendor.

use async_trait::async_trait;

use super::message::{ChatRequest, ChatResponse};
use crate::error::AgentError;

/// Trait for LLM provider backends.
///
/// Implementations handle the transport layer (HTTP, SDK calls, retries,
/// deadlines) for a specific provider while presenting a uniform
/// interface to the dispatch path. Calls carry their own deadline via the
/// client; the engine has no separate cancellation primitive.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g. `"openai"`, `"scripted"`).
    fn name(&self) -> &'static str;

    /// Executes a chat completion request.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] on API failures, timeouts, or parse errors.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError>;
}
