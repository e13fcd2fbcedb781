//! LLM boundary: provider-agnostic message types, the provider trait,
//! and concrete provider implementations.
//!
//! Everything above this module (queue, router, managers, coordinator)
//! speaks [`ChatRequest`] / [`ChatResponse`] built from typed
//! [`PromptPart`]s; providers translate at this boundary.

pub mod message;
pub mod provider;
pub mod providers;
pub mod tool;

pub use message::{
    ChatMessage, ChatRequest, ChatResponse, PromptPart, Role, TokenUsage,
    assistant_tool_calls_message, system_message, tool_message, user_message, user_parts,
};
pub use provider::LlmProvider;
pub use providers::{OpenAiProvider, ScriptedProvider};
pub use tool::{ToolCall, ToolDefinition, ToolResult};
