//! Tool-calling loop shared by every agent dispatch.
//!
//! Drives the LLM ↔ tool execution round-trip: send the request, execute
//! any tool calls in the response, append results, repeat. Two exits:
//! the model answers without tool calls, or it calls the terminal tool
//! (the chat agent's `respond_to_user`), whose arguments the caller
//! parses instead of executing.

use tracing::debug;

use super::executor::ToolExecutor;
use crate::error::AgentError;
use crate::llm::message::{ChatRequest, ChatResponse, assistant_tool_calls_message, tool_message};
use crate::llm::provider::LlmProvider;

/// Runs the tool loop: model → tool calls → tool results → model → …
///
/// `terminal_tool` names a tool that ends the loop when called; the
/// response carrying that call is returned as-is so the caller can parse
/// its arguments (the chat agent's user-facing reply travels this way).
///
/// # Errors
///
/// Returns [`AgentError::ToolLoopExceeded`] if the model keeps
/// requesting tools beyond `max_iterations`. Propagates provider errors.
pub async fn run_tool_loop(
    provider: &dyn LlmProvider,
    request: &mut ChatRequest,
    executor: &ToolExecutor,
    terminal_tool: Option<&str>,
    max_iterations: usize,
) -> Result<ChatResponse, AgentError> {
    for iteration in 0..max_iterations {
        let response = provider.chat(request).await?;

        if response.tool_calls.is_empty() {
            debug!(iteration, "tool loop completed with final text response");
            return Ok(response);
        }

        if let Some(terminal) = terminal_tool
            && response.tool_calls.iter().any(|c| c.name == terminal)
        {
            debug!(iteration, terminal, "tool loop reached terminal tool");
            return Ok(response);
        }

        debug!(
            iteration,
            tool_count = response.tool_calls.len(),
            "executing tool calls"
        );

        request
            .messages
            .push(assistant_tool_calls_message(response.tool_calls.clone()));

        for tool_call in &response.tool_calls {
            let result = executor.execute(tool_call);
            debug!(
                tool = tool_call.name,
                call_id = tool_call.id,
                is_error = result.is_error,
                "tool execution complete"
            );
            request
                .messages
                .push(tool_message(&result.tool_call_id, &result.content));
        }
    }

    Err(AgentError::ToolLoopExceeded { max_iterations })
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::embedding::HashEmbedder;
    use crate::llm::message::{system_message, user_message};
    use crate::llm::providers::ScriptedProvider;
    use crate::memory::MemoryManagers;
    use crate::store::Store;

    fn executor() -> ToolExecutor {
        let store = Store::in_memory().unwrap_or_else(|e| panic!("store: {e}"));
        let embedder: Arc<dyn crate::embedding::Embedder> = Arc::new(HashEmbedder::default());
        ToolExecutor::new(MemoryManagers::new(&store, &embedder, "org-1"), "agent-chat")
    }

    fn request() -> ChatRequest {
        ChatRequest {
            model: "scripted".to_string(),
            messages: vec![system_message("test"), user_message("go")],
            temperature: Some(0.0),
            max_tokens: Some(1024),
            tools: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_loop_ends_on_text_response() {
        let provider = ScriptedProvider::new();
        provider.push_text("done");
        let mut request = request();
        let response = run_tool_loop(&provider, &mut request, &executor(), None, 5)
            .await
            .unwrap_or_else(|e| panic!("loop: {e}"));
        assert_eq!(response.content, "done");
        assert_eq!(request.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_loop_executes_tools_then_finishes() {
        let provider = ScriptedProvider::new();
        provider.push_tool_call(
            "episodic_memory_insert",
            serde_json::json!({
                "items": [{"event_type": "activity", "summary": "ran the tests"}]
            }),
        );
        provider.push_text("inserted");

        let mut request = request();
        let response = run_tool_loop(&provider, &mut request, &executor(), None, 5)
            .await
            .unwrap_or_else(|e| panic!("loop: {e}"));
        assert_eq!(response.content, "inserted");
        // system + user + assistant(tool_calls) + tool(result) = 4
        assert_eq!(request.messages.len(), 4);
    }

    #[tokio::test]
    async fn test_loop_stops_at_terminal_tool_without_executing() {
        let provider = ScriptedProvider::new();
        provider.push_tool_call("respond_to_user", serde_json::json!({"message": "hi"}));

        let mut request = request();
        let response = run_tool_loop(
            &provider,
            &mut request,
            &executor(),
            Some("respond_to_user"),
            5,
        )
        .await
        .unwrap_or_else(|e| panic!("loop: {e}"));
        assert_eq!(response.tool_calls[0].name, "respond_to_user");
        // Terminal call is returned, not executed: no messages appended.
        assert_eq!(request.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_loop_exceeds_budget() {
        let provider = ScriptedProvider::new();
        for _ in 0..10 {
            provider.push_tool_call("search_in_memory", serde_json::json!({
                "memory_type": "episodic",
                "query": ""
            }));
        }
        let mut request = request();
        let result = run_tool_loop(&provider, &mut request, &executor(), None, 2).await;
        assert!(matches!(
            result,
            Err(AgentError::ToolLoopExceeded { max_iterations: 2 })
        ));
    }
}
