//! Post-flush dispatch: routed through the meta-memory agent, or fanned
//! out directly to all six memory agents.
//!
//! Ordering: every dispatch goes through the [`MessageQueue`], so within
//! one memory type successive flushes run in submission order while
//! different types progress independently. Per-agent failures are logged
//! and reported; they never abort sibling dispatches.

use std::sync::Arc;

use futures_util::future::join_all;
use serde::Deserialize;
use tracing::{info, warn};

use crate::agents::toolset::{self, TRIGGER_TOOL};
use crate::agents::{AgentKind, ToolExecutor, run_tool_loop};
use crate::error::AgentError;
use crate::llm::message::{ChatRequest, ChatResponse, PromptPart, system_message, user_parts};
use crate::llm::provider::LlmProvider;
use crate::prompts;
use crate::queue::MessageQueue;

/// Which dispatch strategy the router uses after a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RouterMode {
    /// One request to the meta-memory agent, which picks the memory
    /// types via `trigger_memory_update`.
    #[default]
    Routed,
    /// The identical prompt goes to all six memory agents in parallel.
    Direct,
}

/// Result of one agent dispatch within a flush.
#[derive(Debug)]
pub struct DispatchOutcome {
    /// Which agent ran.
    pub kind: AgentKind,
    /// Whether its extraction completed.
    pub result: Result<(), AgentError>,
}

/// Dispatches batched prompts to the memory agents.
pub struct MetaRouter {
    queue: MessageQueue,
    executor: Arc<ToolExecutor>,
    mode: RouterMode,
    max_tool_iterations: usize,
}

#[derive(Deserialize)]
struct TriggerArgs {
    memory_types: Vec<String>,
    #[serde(default)]
    instructions: Vec<String>,
}

impl MetaRouter {
    /// Creates a router over the shared queue and tool executor.
    #[must_use]
    pub fn new(
        queue: MessageQueue,
        executor: Arc<ToolExecutor>,
        mode: RouterMode,
        max_tool_iterations: usize,
    ) -> Self {
        Self {
            queue,
            executor,
            mode,
            max_tool_iterations,
        }
    }

    /// The active dispatch mode.
    #[must_use]
    pub const fn mode(&self) -> RouterMode {
        self.mode
    }

    /// Dispatches a flush prompt to memory agents per the active mode.
    ///
    /// `existing_file_uris` is the set of blob URIs known to still exist;
    /// blob parts pointing elsewhere (deleted by the screenshot GC in the
    /// window between assembly and dispatch) are stripped so no agent
    /// receives a dead reference.
    pub async fn dispatch(
        &self,
        provider: &dyn LlmProvider,
        model: &str,
        parts: Vec<PromptPart>,
        existing_file_uris: &[String],
    ) -> Vec<DispatchOutcome> {
        let parts = strip_dead_uris(parts, existing_file_uris);
        match self.mode {
            RouterMode::Direct => self.dispatch_direct(provider, model, parts).await,
            RouterMode::Routed => self.dispatch_routed(provider, model, parts).await,
        }
    }

    /// Runs one memory agent over a prompt, honoring queue ordering.
    pub async fn dispatch_to_agent(
        &self,
        provider: &dyn LlmProvider,
        model: &str,
        kind: AgentKind,
        parts: Vec<PromptPart>,
    ) -> Result<ChatResponse, AgentError> {
        let mut request = ChatRequest {
            model: model.to_string(),
            messages: vec![
                system_message(prompts::system_prompt_for(kind)),
                user_parts(parts),
            ],
            temperature: Some(0.0),
            max_tokens: None,
            tools: toolset::tools_for(kind),
        };
        let executor = Arc::clone(&self.executor);
        let max_iterations = self.max_tool_iterations;
        self.queue
            .run(kind, async move {
                run_tool_loop(provider, &mut request, &executor, None, max_iterations).await
            })
            .await
    }

    async fn dispatch_direct(
        &self,
        provider: &dyn LlmProvider,
        model: &str,
        parts: Vec<PromptPart>,
    ) -> Vec<DispatchOutcome> {
        let dispatches = AgentKind::MEMORY_AGENTS.map(|kind| {
            let parts = parts.clone();
            async move {
                let result = self
                    .dispatch_to_agent(provider, model, kind, parts)
                    .await
                    .map(drop);
                DispatchOutcome { kind, result }
            }
        });

        let outcomes = join_all(dispatches).await;
        log_outcomes(&outcomes);
        outcomes
    }

    async fn dispatch_routed(
        &self,
        provider: &dyn LlmProvider,
        model: &str,
        parts: Vec<PromptPart>,
    ) -> Vec<DispatchOutcome> {
        // One queued request to the meta agent; its tool calls choose the
        // targets. The call is single-shot: the router interprets
        // trigger_memory_update itself instead of running a tool loop.
        let request = ChatRequest {
            model: model.to_string(),
            messages: vec![
                system_message(prompts::system_prompt_for(AgentKind::MetaMemory)),
                user_parts(parts.clone()),
            ],
            temperature: Some(0.0),
            max_tokens: None,
            tools: toolset::tools_for(AgentKind::MetaMemory),
        };

        let response = self
            .queue
            .run(AgentKind::MetaMemory, provider.chat(&request))
            .await;
        let response = match response {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "meta-memory dispatch failed");
                return vec![DispatchOutcome {
                    kind: AgentKind::MetaMemory,
                    result: Err(e),
                }];
            }
        };

        let mut targets: Vec<(AgentKind, Option<String>)> = Vec::new();
        for call in response
            .tool_calls
            .iter()
            .filter(|c| c.name == TRIGGER_TOOL)
        {
            match serde_json::from_str::<TriggerArgs>(&call.arguments) {
                Ok(args) => {
                    for (index, type_name) in args.memory_types.iter().enumerate() {
                        if let Some(kind) = AgentKind::from_memory_type(type_name) {
                            targets.push((kind, args.instructions.get(index).cloned()));
                        } else {
                            warn!(type_name, "meta agent named an unknown memory type");
                        }
                    }
                }
                Err(e) => warn!(error = %e, "malformed trigger_memory_update arguments"),
            }
        }

        if targets.is_empty() {
            info!("meta agent chose no memory types for this flush");
            return Vec::new();
        }

        let dispatches = targets.into_iter().map(|(kind, instruction)| {
            let mut parts = parts.clone();
            if let Some(instruction) = instruction {
                parts.push(PromptPart::text(format!(
                    "{}{instruction}",
                    prompts::META_INSTRUCTION_PREFIX
                )));
            }
            async move {
                let result = self
                    .dispatch_to_agent(provider, model, kind, parts)
                    .await
                    .map(drop);
                DispatchOutcome { kind, result }
            }
        });

        let outcomes = join_all(dispatches).await;
        log_outcomes(&outcomes);
        outcomes
    }
}

impl std::fmt::Debug for MetaRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaRouter")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

fn strip_dead_uris(parts: Vec<PromptPart>, existing: &[String]) -> Vec<PromptPart> {
    parts
        .into_iter()
        .filter(|part| match part {
            PromptPart::BlobUri { uri } => {
                let alive = existing.iter().any(|u| u == uri);
                if !alive {
                    warn!(uri, "stripping dead blob URI from flush prompt");
                }
                alive
            }
            _ => true,
        })
        .collect()
}

fn log_outcomes(outcomes: &[DispatchOutcome]) {
    for outcome in outcomes {
        match &outcome.result {
            Ok(()) => info!(agent = %outcome.kind, "memory dispatch complete"),
            Err(e) => warn!(agent = %outcome.kind, error = %e, "memory dispatch failed"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::llm::providers::ScriptedProvider;
    use crate::memory::MemoryManagers;
    use crate::store::Store;

    fn router(mode: RouterMode) -> (MetaRouter, Store) {
        let store = Store::in_memory().unwrap_or_else(|e| panic!("store: {e}"));
        let embedder: Arc<dyn crate::embedding::Embedder> = Arc::new(HashEmbedder::default());
        let managers = MemoryManagers::new(&store, &embedder, "org-1");
        let executor = Arc::new(ToolExecutor::new(managers, "agent-chat"));
        (
            MetaRouter::new(MessageQueue::new(), executor, mode, 10),
            store,
        )
    }

    fn parts() -> Vec<PromptPart> {
        vec![
            PromptPart::text("Timestamp: t0 Text:\nuser opened terminal"),
            PromptPart::text("[directive]"),
        ]
    }

    #[tokio::test]
    async fn test_direct_mode_reaches_all_six_agents() {
        let (router, _store) = router(RouterMode::Direct);
        let provider = ScriptedProvider::new();

        let outcomes = router.dispatch(&provider, "scripted", parts(), &[]).await;
        assert_eq!(outcomes.len(), 6);
        assert!(outcomes.iter().all(|o| o.result.is_ok()));
        assert_eq!(provider.requests().len(), 6);
    }

    #[tokio::test]
    async fn test_routed_mode_fans_out_to_named_types() {
        let (router, store) = router(RouterMode::Routed);
        let provider = ScriptedProvider::new();
        // Meta agent picks episodic + semantic.
        provider.push_tool_call(
            TRIGGER_TOOL,
            serde_json::json!({
                "memory_types": ["episodic", "semantic"],
                "instructions": ["save the terminal event", "record the concept"]
            }),
        );
        // Episodic agent inserts an event, then finishes.
        provider.push_tool_call(
            "episodic_memory_insert",
            serde_json::json!({
                "items": [{"event_type": "activity", "summary": "user opened terminal"}]
            }),
        );

        let outcomes = router.dispatch(&provider, "scripted", parts(), &[]).await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.result.is_ok()));

        // The instruction was appended to the episodic agent's prompt.
        let requests = provider.requests();
        let carried = requests.iter().any(|r| {
            r.messages
                .iter()
                .any(|m| m.text_content().contains("save the terminal event"))
        });
        assert!(carried);

        // The tool call actually mutated the store.
        let stats = store.stats().unwrap_or_else(|e| panic!("stats: {e}"));
        assert_eq!(stats.episodic, 1);
    }

    #[tokio::test]
    async fn test_routed_mode_with_no_tool_call_dispatches_nothing() {
        let (router, _store) = router(RouterMode::Routed);
        let provider = ScriptedProvider::new();
        provider.push_text("nothing worth remembering");

        let outcomes = router.dispatch(&provider, "scripted", parts(), &[]).await;
        assert!(outcomes.is_empty());
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_sibling_does_not_abort_others() {
        let (router, _store) = router(RouterMode::Direct);
        let provider = ScriptedProvider::new();
        // Exactly one agent draws a provider failure; the rest answer OK.
        provider.push_error("provider unavailable");

        let outcomes = router.dispatch(&provider, "scripted", parts(), &[]).await;
        assert_eq!(outcomes.len(), 6);
        let failures = outcomes.iter().filter(|o| o.result.is_err()).count();
        let successes = outcomes.iter().filter(|o| o.result.is_ok()).count();
        assert_eq!(failures, 1);
        assert_eq!(successes, 5);
    }

    #[test]
    fn test_strip_dead_uris() {
        let parts = vec![
            PromptPart::text("header"),
            PromptPart::blob_uri("blob://alive"),
            PromptPart::blob_uri("blob://dead"),
        ];
        let kept = strip_dead_uris(parts, &["blob://alive".to_string()]);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().any(|p| matches!(
            p,
            PromptPart::BlobUri { uri } if uri == "blob://alive"
        )));
    }
}
