//! Agent identities and the tool surface projected to them.
//!
//! The engine talks to nine logical agents: the chat agent, the
//! meta-memory router agent, one agent per memory type, and the
//! reflexion agent. Each is an LLM black box addressed by a stable id;
//! what distinguishes them is the system prompt and the tool set they
//! are given.

pub mod agentic_loop;
pub mod executor;
pub mod reply;
pub mod toolset;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ids;

pub use agentic_loop::run_tool_loop;
pub use executor::ToolExecutor;
pub use reply::extract_reply;
pub use toolset::tools_for;

/// The logical agents of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// User-facing chat agent.
    Chat,
    /// Meta-memory agent that routes extraction to memory types.
    MetaMemory,
    /// Episodic memory extraction agent.
    EpisodicMemory,
    /// Procedural memory extraction agent.
    ProceduralMemory,
    /// Knowledge-vault extraction agent.
    KnowledgeVault,
    /// Semantic memory extraction agent.
    SemanticMemory,
    /// Core memory extraction agent.
    CoreMemory,
    /// Resource memory extraction agent.
    ResourceMemory,
    /// Reflexion agent with cross-manager access.
    Reflexion,
}

impl AgentKind {
    /// The six memory extraction agents, in dispatch order.
    pub const MEMORY_AGENTS: [Self; 6] = [
        Self::EpisodicMemory,
        Self::ProceduralMemory,
        Self::KnowledgeVault,
        Self::SemanticMemory,
        Self::CoreMemory,
        Self::ResourceMemory,
    ];

    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::MetaMemory => "meta_memory",
            Self::EpisodicMemory => "episodic_memory",
            Self::ProceduralMemory => "procedural_memory",
            Self::KnowledgeVault => "knowledge_vault",
            Self::SemanticMemory => "semantic_memory",
            Self::CoreMemory => "core_memory",
            Self::ResourceMemory => "resource_memory",
            Self::Reflexion => "reflexion",
        }
    }

    /// Maps a `trigger_memory_update` memory-type name to its agent.
    ///
    /// Returns `None` for unknown names so the router can log and skip
    /// instead of failing the whole dispatch.
    #[must_use]
    pub fn from_memory_type(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "core" => Some(Self::CoreMemory),
            "episodic" => Some(Self::EpisodicMemory),
            "resource" => Some(Self::ResourceMemory),
            "procedural" => Some(Self::ProceduralMemory),
            "knowledge_vault" => Some(Self::KnowledgeVault),
            "semantic" => Some(Self::SemanticMemory),
            _ => None,
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable agent ids for one deployment.
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    ids: HashMap<AgentKind, String>,
}

impl AgentRegistry {
    /// Creates fresh ids for every agent kind.
    #[must_use]
    pub fn new() -> Self {
        let kinds = [
            AgentKind::Chat,
            AgentKind::MetaMemory,
            AgentKind::Reflexion,
        ];
        let mut ids_map = HashMap::new();
        for kind in kinds.into_iter().chain(AgentKind::MEMORY_AGENTS) {
            ids_map.insert(kind, ids::generate(ids::AGENT_PREFIX));
        }
        Self { ids: ids_map }
    }

    /// The id for one agent kind.
    #[must_use]
    pub fn id_of(&self, kind: AgentKind) -> &str {
        self.ids.get(&kind).map_or("", String::as_str)
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_type_mapping() {
        assert_eq!(
            AgentKind::from_memory_type("knowledge_vault"),
            Some(AgentKind::KnowledgeVault)
        );
        assert_eq!(AgentKind::from_memory_type("Episodic"), Some(AgentKind::EpisodicMemory));
        assert_eq!(AgentKind::from_memory_type("mystery"), None);
    }

    #[test]
    fn test_registry_assigns_distinct_ids() {
        let registry = AgentRegistry::new();
        let chat = registry.id_of(AgentKind::Chat);
        let meta = registry.id_of(AgentKind::MetaMemory);
        assert!(!chat.is_empty());
        assert_ne!(chat, meta);
        for kind in AgentKind::MEMORY_AGENTS {
            assert!(!registry.id_of(kind).is_empty());
        }
    }
}
