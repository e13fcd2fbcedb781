//! Wire types for LLM function-calling.
//!
//! Provider-agnostic definitions of tools, calls, and results. The
//! per-memory-type tool sets live in [`crate::agents::toolset`]; these
//! are the raw shapes providers serialize.

use serde::{Deserialize, Serialize};

/// A tool definition that can be sent to an LLM for function-calling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (must match the executor's dispatch table).
    pub name: String,
    /// Human-readable description of what the tool does.
    pub description: String,
    /// JSON Schema object describing the tool's parameters.
    pub parameters: serde_json::Value,
}

/// A tool call requested by the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this call (assigned by the provider).
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// JSON-encoded arguments for the tool.
    pub arguments: String,
}

/// The result of executing a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// ID of the tool call this result corresponds to.
    pub tool_call_id: String,
    /// Result content (JSON string on success, error message on failure).
    pub content: String,
    /// Whether this result represents an error.
    pub is_error: bool,
}

impl ToolResult {
    /// Successful result for a call.
    #[must_use]
    pub fn ok(call: &ToolCall, content: String) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            content,
            is_error: false,
        }
    }

    /// Failed result for a call.
    #[must_use]
    pub fn error(call: &ToolCall, message: String) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            content: message,
            is_error: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_call_serialization() {
        let call = ToolCall {
            id: "call_123".to_string(),
            name: "episodic_memory_insert".to_string(),
            arguments: r#"{"items":[]}"#.to_string(),
        };
        let json = serde_json::to_string(&call).unwrap_or_default();
        assert!(json.contains("call_123"));
        assert!(json.contains("episodic_memory_insert"));
    }

    #[test]
    fn test_tool_result_constructors() {
        let call = ToolCall {
            id: "call_9".to_string(),
            name: "search_in_memory".to_string(),
            arguments: "{}".to_string(),
        };
        let ok = ToolResult::ok(&call, "[]".to_string());
        assert!(!ok.is_error);
        assert_eq!(ok.tool_call_id, "call_9");

        let err = ToolResult::error(&call, "boom".to_string());
        assert!(err.is_error);
        assert_eq!(err.content, "boom");
    }
}
