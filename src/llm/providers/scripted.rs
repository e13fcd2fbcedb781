//! Scripted provider for tests and dry runs.
//!
//! Returns pre-programmed responses in order, with optional per-response
//! latency so concurrency tests can shape completion order. Records every
//! request it receives for later inspection.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::AgentError;
use crate::llm::message::{ChatRequest, ChatResponse, TokenUsage};
use crate::llm::provider::LlmProvider;
use crate::llm::tool::ToolCall;

/// One scripted reply.
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    /// The response to return, or an error message to fail with.
    pub response: Result<ChatResponse, String>,
    /// Simulated provider latency before returning.
    pub latency: Duration,
}

/// Provider that replays scripted responses.
///
/// When the script runs out, every further call returns a plain `"OK"`
/// text response, which keeps fan-out tests from needing one entry per
/// incidental agent call.
#[derive(Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<ScriptedResponse>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    /// Creates an empty scripted provider (every call answers `"OK"`).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<ScriptedResponse>> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues a plain text response.
    pub fn push_text(&self, text: &str) {
        self.push_text_with_latency(text, Duration::ZERO);
    }

    /// Queues a plain text response returned after `latency`.
    pub fn push_text_with_latency(&self, text: &str, latency: Duration) {
        self.lock_script().push_back(ScriptedResponse {
            response: Ok(text_response(text)),
            latency,
        });
    }

    /// Queues a provider failure.
    pub fn push_error(&self, message: &str) {
        self.lock_script().push_back(ScriptedResponse {
            response: Err(message.to_string()),
            latency: Duration::ZERO,
        });
    }

    /// Queues a response carrying one tool call.
    pub fn push_tool_call(&self, name: &str, arguments: serde_json::Value) {
        self.push_tool_call_with_latency(name, arguments, Duration::ZERO);
    }

    /// Queues a tool-call response returned after `latency`.
    pub fn push_tool_call_with_latency(
        &self,
        name: &str,
        arguments: serde_json::Value,
        latency: Duration,
    ) {
        let calls = self.lock_script().len();
        self.lock_script().push_back(ScriptedResponse {
            response: Ok(ChatResponse {
                content: String::new(),
                usage: TokenUsage::default(),
                tool_calls: vec![ToolCall {
                    id: format!("call_{calls}"),
                    name: name.to_string(),
                    arguments: arguments.to_string(),
                }],
                finish_reason: Some("tool_calls".to_string()),
            }),
            latency,
        });
    }

    /// All requests received so far, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Builds a plain text [`ChatResponse`].
#[must_use]
pub fn text_response(text: &str) -> ChatResponse {
    ChatResponse {
        content: text.to_string(),
        usage: TokenUsage::default(),
        tool_calls: Vec::new(),
        finish_reason: Some("stop".to_string()),
    }
}

impl std::fmt::Debug for ScriptedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedProvider").finish_non_exhaustive()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let scripted = self.lock_script().pop_front();
        match scripted {
            Some(entry) => {
                if !entry.latency.is_zero() {
                    tokio::time::sleep(entry.latency).await;
                }
                entry.response.map_err(|message| AgentError::ApiRequest {
                    message,
                    status: None,
                })
            }
            None => Ok(text_response("OK")),
        }
    }
}
