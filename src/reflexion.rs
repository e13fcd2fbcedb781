//! Reflexion sweep: periodic self-maintenance across all six memory
//! stores.
//!
//! Three phases run in order. Redundancy asks each memory agent to merge
//! duplicates within its own store; conflict hands the reflexion agent
//! cross-manager tools to resolve contradictions; pattern asks the
//! reflexion, semantic, and meta agents to synthesize recurring themes
//! into new memories. Every dispatch goes through the message queue, so
//! per-agent ordering holds against concurrent flushes.

use futures_util::future::join_all;
use tracing::info;

use crate::agents::AgentKind;
use crate::error::AgentError;
use crate::llm::message::PromptPart;
use crate::llm::provider::LlmProvider;
use crate::prompts;
use crate::router::MetaRouter;

/// Outcome of one reflexion sweep.
#[derive(Debug)]
pub struct ReflexionReport {
    /// Per-agent results of the redundancy phase.
    pub redundancy: Vec<(AgentKind, Result<(), AgentError>)>,
    /// Result of the conflict phase.
    pub conflict: Result<(), AgentError>,
    /// Per-agent results of the pattern phase.
    pub pattern: Vec<(AgentKind, Result<(), AgentError>)>,
}

impl ReflexionReport {
    /// Returns `true` if every phase completed without errors.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.redundancy.iter().all(|(_, r)| r.is_ok())
            && self.conflict.is_ok()
            && self.pattern.iter().all(|(_, r)| r.is_ok())
    }
}

/// Runs the three reflexion phases in order.
///
/// Phase failures are collected, not propagated: a failing agent in one
/// phase never blocks the next phase or its siblings.
pub async fn reflexion_on_memory(
    router: &MetaRouter,
    provider: &dyn LlmProvider,
    model: &str,
) -> ReflexionReport {
    info!("starting reflexion sweep");

    // Phase 1: redundancy, each memory agent over its own store.
    let redundancy = join_all(AgentKind::MEMORY_AGENTS.map(|kind| async move {
        let parts = vec![PromptPart::text(prompts::redundancy_prompt(kind))];
        let result = router
            .dispatch_to_agent(provider, model, kind, parts)
            .await
            .map(drop);
        (kind, result)
    }))
    .await;

    // Phase 2: conflict resolution via the reflexion agent.
    let conflict = router
        .dispatch_to_agent(
            provider,
            model,
            AgentKind::Reflexion,
            vec![PromptPart::text(prompts::CONFLICT_PROMPT)],
        )
        .await
        .map(drop);

    // Phase 3: pattern synthesis.
    let pattern_agents = [
        AgentKind::Reflexion,
        AgentKind::SemanticMemory,
        AgentKind::MetaMemory,
    ];
    let pattern = join_all(pattern_agents.map(|kind| async move {
        let parts = vec![PromptPart::text(prompts::PATTERN_PROMPT)];
        let result = router
            .dispatch_to_agent(provider, model, kind, parts)
            .await
            .map(drop);
        (kind, result)
    }))
    .await;

    info!("reflexion sweep complete");
    ReflexionReport {
        redundancy,
        conflict,
        pattern,
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::agents::ToolExecutor;
    use crate::embedding::HashEmbedder;
    use crate::llm::providers::ScriptedProvider;
    use crate::memory::MemoryManagers;
    use crate::queue::MessageQueue;
    use crate::router::RouterMode;
    use crate::store::Store;

    fn router() -> MetaRouter {
        let store = Store::in_memory().unwrap_or_else(|e| panic!("store: {e}"));
        let embedder: Arc<dyn crate::embedding::Embedder> = Arc::new(HashEmbedder::default());
        let managers = MemoryManagers::new(&store, &embedder, "org-1");
        let executor = Arc::new(ToolExecutor::new(managers, "agent-chat"));
        MetaRouter::new(MessageQueue::new(), executor, RouterMode::Direct, 10)
    }

    #[tokio::test]
    async fn test_reflexion_runs_all_phases_in_order() {
        let router = router();
        let provider = ScriptedProvider::new();

        let report = reflexion_on_memory(&router, &provider, "scripted").await;
        assert!(report.is_clean());
        assert_eq!(report.redundancy.len(), 6);
        assert_eq!(report.pattern.len(), 3);

        let requests = provider.requests();
        assert_eq!(requests.len(), 10);

        let text_of = |r: &crate::llm::message::ChatRequest| {
            r.messages
                .iter()
                .map(crate::llm::message::ChatMessage::text_content)
                .collect::<Vec<_>>()
                .join("\n")
        };
        // First six are redundancy prompts, then conflict, then pattern.
        for request in &requests[..6] {
            assert!(text_of(request).contains("Review your"));
        }
        assert!(text_of(&requests[6]).contains("contradictions"));
        for request in &requests[7..] {
            assert!(text_of(request).contains("recurring themes"));
        }
    }

    #[tokio::test]
    async fn test_phase_failure_is_collected_not_fatal() {
        let router = router();
        let provider = ScriptedProvider::new();
        provider.push_error("redundancy agent down");

        let report = reflexion_on_memory(&router, &provider, "scripted").await;
        assert!(!report.is_clean());
        let failed = report
            .redundancy
            .iter()
            .filter(|(_, r)| r.is_err())
            .count();
        assert_eq!(failed, 1);
        // Later phases still ran.
        assert!(report.conflict.is_ok());
        assert_eq!(report.pattern.len(), 3);
    }
}
