//! Provider-agnostic message types for LLM communication.
//!
//! These types decouple the engine from any specific LLM SDK. Prompt
//! content is an ordered sequence of typed [`PromptPart`]s rather than a
//! plain string, because flush prompts interleave text markers, cloud
//! blob URIs, and inline images; providers translate the parts at the
//! boundary.

use serde::{Deserialize, Serialize};

use super::tool::{ToolCall, ToolDefinition};

/// Role of a chat message participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions.
    System,
    /// User input.
    User,
    /// Assistant response.
    Assistant,
    /// Tool result.
    Tool,
}

/// One typed piece of prompt content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PromptPart {
    /// Plain text.
    Text {
        /// The text content.
        text: String,
    },
    /// Reference to an uploaded cloud blob (screenshot, audio file).
    BlobUri {
        /// Provider-side blob URI.
        uri: String,
    },
    /// Image bytes carried inline, base64-encoded by the provider.
    InlineImage {
        /// Raw image bytes.
        data: Vec<u8>,
        /// MIME type, e.g. `"image/png"`.
        mime: String,
    },
}

impl PromptPart {
    /// Shorthand for a text part.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Shorthand for a blob URI part.
    #[must_use]
    pub fn blob_uri(uri: impl Into<String>) -> Self {
        Self::BlobUri { uri: uri.into() }
    }
}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender.
    pub role: Role,
    /// Ordered message content.
    pub parts: Vec<PromptPart>,
    /// Tool calls requested by the assistant (only for `Role::Assistant`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Tool call ID this message responds to (only for `Role::Tool`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    /// Concatenated text of all [`PromptPart::Text`] parts.
    #[must_use]
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for part in &self.parts {
            if let PromptPart::Text { text } = part {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(text);
            }
        }
        out
    }
}

/// A chat completion request (provider-agnostic).
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Model identifier.
    pub model: String,
    /// Ordered conversation messages.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// Tool definitions available to the model.
    pub tools: Vec<ToolDefinition>,
}

/// Token usage statistics from a completion.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt.
    pub prompt_tokens: u32,
    /// Tokens generated in the completion.
    pub completion_tokens: u32,
    /// Total tokens used.
    pub total_tokens: u32,
}

/// A chat completion response (provider-agnostic).
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Generated text content.
    pub content: String,
    /// Token usage statistics.
    pub usage: TokenUsage,
    /// Tool calls requested by the model.
    pub tool_calls: Vec<ToolCall>,
    /// Finish reason from the model (e.g. `"stop"`, `"tool_calls"`).
    pub finish_reason: Option<String>,
}

/// Creates a system message from plain text.
#[must_use]
pub fn system_message(content: &str) -> ChatMessage {
    ChatMessage {
        role: Role::System,
        parts: vec![PromptPart::text(content)],
        tool_calls: Vec::new(),
        tool_call_id: None,
    }
}

/// Creates a user message from plain text.
#[must_use]
pub fn user_message(content: &str) -> ChatMessage {
    user_parts(vec![PromptPart::text(content)])
}

/// Creates a user message from prompt parts.
#[must_use]
pub const fn user_parts(parts: Vec<PromptPart>) -> ChatMessage {
    ChatMessage {
        role: Role::User,
        parts,
        tool_calls: Vec::new(),
        tool_call_id: None,
    }
}

/// Creates an assistant message with tool calls (no text content).
#[must_use]
pub const fn assistant_tool_calls_message(tool_calls: Vec<ToolCall>) -> ChatMessage {
    ChatMessage {
        role: Role::Assistant,
        parts: Vec::new(),
        tool_calls,
        tool_call_id: None,
    }
}

/// Creates a tool result message.
#[must_use]
pub fn tool_message(tool_call_id: &str, content: &str) -> ChatMessage {
    ChatMessage {
        role: Role::Tool,
        parts: vec![PromptPart::text(content)],
        tool_calls: Vec::new(),
        tool_call_id: Some(tool_call_id.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_message() {
        let msg = system_message("You are helpful.");
        assert_eq!(msg.role, Role::System);
        assert_eq!(msg.text_content(), "You are helpful.");
        assert!(msg.tool_calls.is_empty());
    }

    #[test]
    fn test_text_content_skips_non_text_parts() {
        let msg = user_parts(vec![
            PromptPart::text("Timestamp: t0 Image Index 0:"),
            PromptPart::blob_uri("uri://files/abc"),
            PromptPart::text("trailing"),
        ]);
        assert_eq!(msg.text_content(), "Timestamp: t0 Image Index 0:\ntrailing");
    }

    #[test]
    fn test_tool_message_carries_call_id() {
        let msg = tool_message("call_123", "result data");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_123"));
    }

    #[test]
    fn test_prompt_part_serialization_is_tagged() {
        let json = serde_json::to_string(&PromptPart::blob_uri("uri://x"))
            .unwrap_or_else(|_| unreachable!());
        assert!(json.contains("\"type\":\"blob_uri\""));
        assert!(json.contains("uri://x"));
    }
}
