//! Tool executor that dispatches LLM tool calls to the memory managers.
//!
//! Maps tool names to direct Rust calls against the six managers. The
//! executor receives its managers at construction (a typed context, not
//! a process-wide singleton), so agents, tools, and the store stay
//! acyclic.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::toolset::RESPOND_TOOL;
use crate::error::AgentError;
use crate::llm::tool::{ToolCall, ToolResult};
use crate::memory::search::to_local_string;
use crate::memory::{
    EpisodicField, MemoryManagers, ProceduralField, ResourceField, SearchMethod, SemanticField,
    VaultField,
};
use crate::schema::{
    EpisodicEventDraft, KnowledgeVaultItemDraft, ProceduralItemDraft, ResourceItemDraft,
    SemanticItemDraft,
};

/// Maximum raw byte length of tool argument JSON from the LLM.
const MAX_TOOL_ARGS_LEN: usize = 200_000;
/// Maximum ids per batched call.
const MAX_IDS: usize = 100;
/// Maximum `limit` for `search_in_memory`.
const MAX_SEARCH_LIMIT: usize = 50;
/// Default `limit` for `search_in_memory`.
const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Executes tool calls against the memory managers.
pub struct ToolExecutor {
    managers: MemoryManagers,
    /// Agent whose core blocks the core tools mutate.
    core_agent_id: String,
    /// Caller timezone for rendering timestamps in results.
    timezone: std::sync::Mutex<Option<Tz>>,
}

impl ToolExecutor {
    /// Creates an executor over the given managers.
    ///
    /// `core_agent_id` names the agent whose core blocks `core_memory_*`
    /// tools operate on.
    #[must_use]
    pub fn new(managers: MemoryManagers, core_agent_id: &str) -> Self {
        Self {
            managers,
            core_agent_id: core_agent_id.to_string(),
            timezone: std::sync::Mutex::new(None),
        }
    }

    /// Renders result timestamps in the given timezone.
    #[must_use]
    pub fn with_timezone(self, timezone: Option<Tz>) -> Self {
        self.set_timezone(timezone);
        self
    }

    /// Updates the timezone used for rendering result timestamps.
    pub fn set_timezone(&self, timezone: Option<Tz>) {
        *self
            .timezone
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = timezone;
    }

    fn timezone(&self) -> Option<Tz> {
        *self
            .timezone
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Dispatches a tool call to the appropriate manager operation.
    ///
    /// Validates raw argument size before dispatch. Never panics; every
    /// failure becomes an error [`ToolResult`] the model can react to.
    #[must_use]
    pub fn execute(&self, call: &ToolCall) -> ToolResult {
        if call.arguments.len() > MAX_TOOL_ARGS_LEN {
            return ToolResult::error(
                call,
                format!(
                    "tool arguments too large ({} bytes, max {MAX_TOOL_ARGS_LEN})",
                    call.arguments.len()
                ),
            );
        }

        let result = match call.name.as_str() {
            "episodic_memory_insert" => self.tool_episodic_insert(&call.arguments),
            "episodic_memory_append" => self.tool_episodic_append(&call.arguments),
            "episodic_memory_replace" => self.tool_episodic_replace(&call.arguments),
            "check_episodic_memory" => self.tool_check_episodic(&call.arguments),
            "semantic_memory_insert" => self.tool_semantic_insert(&call.arguments),
            "semantic_memory_update" => self.tool_semantic_update(&call.arguments),
            "procedural_memory_insert" => self.tool_procedural_insert(&call.arguments),
            "procedural_memory_update" => self.tool_procedural_update(&call.arguments),
            "resource_memory_insert" => self.tool_resource_insert(&call.arguments),
            "resource_memory_update" => self.tool_resource_update(&call.arguments),
            "knowledge_vault_insert" => self.tool_vault_insert(&call.arguments),
            "knowledge_vault_update" => self.tool_vault_update(&call.arguments),
            "core_memory_append" => self.tool_core_append(&call.arguments),
            "core_memory_replace" => self.tool_core_replace(&call.arguments),
            "search_in_memory" => self.tool_search(&call.arguments),
            // The terminal chat tool carries the reply in its arguments;
            // nothing to execute.
            RESPOND_TOOL => Ok("null".to_string()),
            other => Err(AgentError::ToolExecution {
                name: other.to_string(),
                message: "unknown tool".to_string(),
            }),
        };

        match result {
            Ok(content) => ToolResult::ok(call, content),
            Err(e) => ToolResult::error(call, e.to_string()),
        }
    }

    fn parse_args<'a, T: Deserialize<'a>>(name: &str, args: &'a str) -> Result<T, AgentError> {
        serde_json::from_str(args).map_err(|e| AgentError::ToolExecution {
            name: name.to_string(),
            message: format!("invalid arguments: {e}"),
        })
    }

    fn manager_err(name: &str, e: crate::error::MemoryError) -> AgentError {
        AgentError::ToolExecution {
            name: name.to_string(),
            message: e.to_string(),
        }
    }

    fn check_id_count(name: &str, ids: &[String]) -> Result<(), AgentError> {
        if ids.len() > MAX_IDS {
            return Err(AgentError::ToolExecution {
                name: name.to_string(),
                message: format!("too many ids ({}, max {MAX_IDS})", ids.len()),
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Episodic tools
    // -----------------------------------------------------------------------

    fn tool_episodic_insert(&self, args: &str) -> Result<String, AgentError> {
        const NAME: &str = "episodic_memory_insert";
        #[derive(Deserialize)]
        struct Args {
            items: Vec<EpisodicEventDraft>,
        }
        let args: Args = Self::parse_args(NAME, args)?;
        let inserted = self
            .managers
            .episodic
            .insert_many(args.items)
            .map_err(|e| Self::manager_err(NAME, e))?;
        let ids: Vec<&str> = inserted.iter().map(|e| e.id.as_str()).collect();
        Ok(format!(
            "Inserted {} event(s): {ids:?}. Check whether any repeated events should now be \
             merged with episodic_memory_replace.",
            inserted.len()
        ))
    }

    fn tool_episodic_append(&self, args: &str) -> Result<String, AgentError> {
        const NAME: &str = "episodic_memory_append";
        #[derive(Deserialize)]
        struct Args {
            event_id: String,
            new_summary: Option<String>,
            new_details: Option<String>,
        }
        let args: Args = Self::parse_args(NAME, args)?;
        let event = self
            .managers
            .episodic
            .append(&args.event_id, args.new_summary, args.new_details)
            .map_err(|e| Self::manager_err(NAME, e))?;
        serde_json::to_string(&serde_json::json!({
            "event_id": event.id,
            "summary": event.summary,
            "details": event.details,
        }))
        .map_err(|e| AgentError::ToolExecution {
            name: NAME.to_string(),
            message: format!("serialization error: {e}"),
        })
    }

    fn tool_episodic_replace(&self, args: &str) -> Result<String, AgentError> {
        const NAME: &str = "episodic_memory_replace";
        #[derive(Deserialize)]
        struct Args {
            event_ids: Vec<String>,
            new_items: Vec<EpisodicEventDraft>,
        }
        let args: Args = Self::parse_args(NAME, args)?;
        Self::check_id_count(NAME, &args.event_ids)?;
        let inserted = self
            .managers
            .episodic
            .replace(&args.event_ids, args.new_items)
            .map_err(|e| Self::manager_err(NAME, e))?;
        Ok(format!(
            "Replaced {} event(s) with {} new event(s).",
            args.event_ids.len(),
            inserted.len()
        ))
    }

    fn tool_check_episodic(&self, args: &str) -> Result<String, AgentError> {
        const NAME: &str = "check_episodic_memory";
        #[derive(Deserialize)]
        struct Args {
            event_ids: Vec<String>,
        }
        let args: Args = Self::parse_args(NAME, args)?;
        Self::check_id_count(NAME, &args.event_ids)?;

        let mut views = Vec::with_capacity(args.event_ids.len());
        for id in &args.event_ids {
            let event = self
                .managers
                .episodic
                .get(id)
                .map_err(|e| Self::manager_err(NAME, e))?;
            views.push(EpisodicView::new(&event, self.timezone()));
        }
        to_json(NAME, &views)
    }

    // -----------------------------------------------------------------------
    // Replace-set tools
    // -----------------------------------------------------------------------

    fn tool_semantic_insert(&self, args: &str) -> Result<String, AgentError> {
        const NAME: &str = "semantic_memory_insert";
        #[derive(Deserialize)]
        struct Args {
            items: Vec<SemanticItemDraft>,
        }
        let args: Args = Self::parse_args(NAME, args)?;
        let inserted = self
            .managers
            .semantic
            .insert_many(args.items)
            .map_err(|e| Self::manager_err(NAME, e))?;
        Ok(format!("Inserted {} semantic item(s).", inserted.len()))
    }

    fn tool_semantic_update(&self, args: &str) -> Result<String, AgentError> {
        const NAME: &str = "semantic_memory_update";
        #[derive(Deserialize)]
        struct Args {
            old_ids: Vec<String>,
            new_items: Vec<SemanticItemDraft>,
        }
        let args: Args = Self::parse_args(NAME, args)?;
        Self::check_id_count(NAME, &args.old_ids)?;
        let inserted = self
            .managers
            .semantic
            .replace_set(&args.old_ids, args.new_items)
            .map_err(|e| Self::manager_err(NAME, e))?;
        Ok(format!(
            "Deleted {} item(s), inserted {}.",
            args.old_ids.len(),
            inserted.len()
        ))
    }

    fn tool_procedural_insert(&self, args: &str) -> Result<String, AgentError> {
        const NAME: &str = "procedural_memory_insert";
        #[derive(Deserialize)]
        struct Args {
            items: Vec<ProceduralItemDraft>,
        }
        let args: Args = Self::parse_args(NAME, args)?;
        let inserted = self
            .managers
            .procedural
            .insert_many(args.items)
            .map_err(|e| Self::manager_err(NAME, e))?;
        Ok(format!("Inserted {} procedure(s).", inserted.len()))
    }

    fn tool_procedural_update(&self, args: &str) -> Result<String, AgentError> {
        const NAME: &str = "procedural_memory_update";
        #[derive(Deserialize)]
        struct Args {
            old_ids: Vec<String>,
            new_items: Vec<ProceduralItemDraft>,
        }
        let args: Args = Self::parse_args(NAME, args)?;
        Self::check_id_count(NAME, &args.old_ids)?;
        let inserted = self
            .managers
            .procedural
            .replace_set(&args.old_ids, args.new_items)
            .map_err(|e| Self::manager_err(NAME, e))?;
        Ok(format!(
            "Deleted {} procedure(s), inserted {}.",
            args.old_ids.len(),
            inserted.len()
        ))
    }

    fn tool_resource_insert(&self, args: &str) -> Result<String, AgentError> {
        const NAME: &str = "resource_memory_insert";
        #[derive(Deserialize)]
        struct Args {
            items: Vec<ResourceItemDraft>,
        }
        let args: Args = Self::parse_args(NAME, args)?;
        let inserted = self
            .managers
            .resource
            .insert_many(args.items)
            .map_err(|e| Self::manager_err(NAME, e))?;
        Ok(format!("Inserted {} resource(s).", inserted.len()))
    }

    fn tool_resource_update(&self, args: &str) -> Result<String, AgentError> {
        const NAME: &str = "resource_memory_update";
        #[derive(Deserialize)]
        struct Args {
            old_ids: Vec<String>,
            new_items: Vec<ResourceItemDraft>,
        }
        let args: Args = Self::parse_args(NAME, args)?;
        Self::check_id_count(NAME, &args.old_ids)?;
        let inserted = self
            .managers
            .resource
            .replace_set(&args.old_ids, args.new_items)
            .map_err(|e| Self::manager_err(NAME, e))?;
        Ok(format!(
            "Deleted {} resource(s), inserted {}.",
            args.old_ids.len(),
            inserted.len()
        ))
    }

    fn tool_vault_insert(&self, args: &str) -> Result<String, AgentError> {
        const NAME: &str = "knowledge_vault_insert";
        #[derive(Deserialize)]
        struct Args {
            items: Vec<KnowledgeVaultItemDraft>,
        }
        let args: Args = Self::parse_args(NAME, args)?;
        let inserted = self
            .managers
            .vault
            .insert_many(args.items)
            .map_err(|e| Self::manager_err(NAME, e))?;
        Ok(format!("Inserted {} vault item(s).", inserted.len()))
    }

    fn tool_vault_update(&self, args: &str) -> Result<String, AgentError> {
        const NAME: &str = "knowledge_vault_update";
        #[derive(Deserialize)]
        struct Args {
            old_ids: Vec<String>,
            new_items: Vec<KnowledgeVaultItemDraft>,
        }
        let args: Args = Self::parse_args(NAME, args)?;
        Self::check_id_count(NAME, &args.old_ids)?;
        let inserted = self
            .managers
            .vault
            .replace_set(&args.old_ids, args.new_items)
            .map_err(|e| Self::manager_err(NAME, e))?;
        Ok(format!(
            "Deleted {} vault item(s), inserted {}.",
            args.old_ids.len(),
            inserted.len()
        ))
    }

    // -----------------------------------------------------------------------
    // Core tools
    // -----------------------------------------------------------------------

    fn tool_core_append(&self, args: &str) -> Result<String, AgentError> {
        const NAME: &str = "core_memory_append";
        #[derive(Deserialize)]
        struct Args {
            label: String,
            content: String,
        }
        let args: Args = Self::parse_args(NAME, args)?;
        let block = self
            .managers
            .core
            .append(&self.core_agent_id, &args.label, &args.content)
            .map_err(|e| Self::manager_err(NAME, e))?;
        Ok(format!("Appended to '{}' ({} chars).", args.label, block.value.len()))
    }

    fn tool_core_replace(&self, args: &str) -> Result<String, AgentError> {
        const NAME: &str = "core_memory_replace";
        #[derive(Deserialize)]
        struct Args {
            label: String,
            old_content: String,
            new_content: String,
        }
        let args: Args = Self::parse_args(NAME, args)?;
        let block = self
            .managers
            .core
            .replace(&self.core_agent_id, &args.label, &args.old_content, &args.new_content)
            .map_err(|e| Self::manager_err(NAME, e))?;
        Ok(format!("Replaced in '{}' ({} chars).", args.label, block.value.len()))
    }

    // -----------------------------------------------------------------------
    // Search
    // -----------------------------------------------------------------------

    fn tool_search(&self, args: &str) -> Result<String, AgentError> {
        const NAME: &str = "search_in_memory";
        #[derive(Deserialize)]
        struct Args {
            memory_type: String,
            query: String,
            #[serde(default)]
            field: Option<String>,
            #[serde(default)]
            method: Option<String>,
            #[serde(default)]
            limit: Option<usize>,
        }
        let args: Args = Self::parse_args(NAME, args)?;
        let method = args
            .method
            .as_deref()
            .map_or(SearchMethod::SemanticMatch, SearchMethod::parse);
        let limit = args
            .limit
            .unwrap_or(DEFAULT_SEARCH_LIMIT)
            .clamp(1, MAX_SEARCH_LIMIT);
        let field = args.field.as_deref().unwrap_or_default();
        let tz = self.timezone();

        match args.memory_type.to_lowercase().as_str() {
            "episodic" => {
                let hits = self
                    .managers
                    .episodic
                    .search(&args.query, EpisodicField::parse(field), method, limit)
                    .map_err(|e| Self::manager_err(NAME, e))?;
                let views: Vec<EpisodicView> =
                    hits.iter().map(|e| EpisodicView::new(e, tz)).collect();
                to_json(NAME, &views)
            }
            "semantic" => {
                let hits = self
                    .managers
                    .semantic
                    .search(&args.query, SemanticField::parse(field), method, limit)
                    .map_err(|e| Self::manager_err(NAME, e))?;
                let views: Vec<SemanticView> =
                    hits.iter().map(|i| SemanticView::new(i, tz)).collect();
                to_json(NAME, &views)
            }
            "procedural" => {
                let hits = self
                    .managers
                    .procedural
                    .search(&args.query, ProceduralField::parse(field), method, limit)
                    .map_err(|e| Self::manager_err(NAME, e))?;
                let views: Vec<ProceduralView> = hits.iter().map(ProceduralView::new).collect();
                to_json(NAME, &views)
            }
            "resource" => {
                let hits = self
                    .managers
                    .resource
                    .search(&args.query, ResourceField::parse(field), method, limit)
                    .map_err(|e| Self::manager_err(NAME, e))?;
                let views: Vec<ResourceView> = hits.iter().map(ResourceView::new).collect();
                to_json(NAME, &views)
            }
            "knowledge_vault" => {
                let hits = self
                    .managers
                    .vault
                    .search(&args.query, VaultField::parse(field), method, limit)
                    .map_err(|e| Self::manager_err(NAME, e))?;
                let views: Vec<VaultView> = hits.iter().map(VaultView::new).collect();
                to_json(NAME, &views)
            }
            "core" => {
                let blocks = self
                    .managers
                    .core
                    .list_blocks(&self.core_agent_id)
                    .map_err(|e| Self::manager_err(NAME, e))?;
                let views: Vec<CoreView> = blocks
                    .iter()
                    .map(|b| CoreView {
                        label: b.label.clone(),
                        value: b.value.clone(),
                    })
                    .collect();
                to_json(NAME, &views)
            }
            other => Err(AgentError::ToolExecution {
                name: NAME.to_string(),
                message: format!("unknown memory type '{other}'"),
            }),
        }
    }
}

fn to_json<T: Serialize>(name: &str, value: &T) -> Result<String, AgentError> {
    serde_json::to_string_pretty(value).map_err(|e| AgentError::ToolExecution {
        name: name.to_string(),
        message: format!("serialization error: {e}"),
    })
}

// ---------------------------------------------------------------------------
// View types for serialization (timestamps rendered in caller timezone)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct EpisodicView {
    event_id: String,
    occurred_at: String,
    event_type: String,
    actor: String,
    summary: String,
    details: String,
}

impl EpisodicView {
    fn new(event: &crate::schema::EpisodicEvent, tz: Option<Tz>) -> Self {
        Self {
            event_id: event.id.clone(),
            occurred_at: to_local_string(event.occurred_at, tz),
            event_type: event.event_type.clone(),
            actor: event.actor.as_str().to_string(),
            summary: event.summary.clone(),
            details: event.details.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SemanticView {
    item_id: String,
    concept: String,
    definition: String,
    details: String,
    source: String,
    created_at: String,
}

impl SemanticView {
    fn new(item: &crate::schema::SemanticItem, tz: Option<Tz>) -> Self {
        Self {
            item_id: item.id.clone(),
            concept: item.concept.clone(),
            definition: item.definition.clone(),
            details: item.details.clone(),
            source: item.source.clone(),
            created_at: to_local_string(item.created_at, tz),
        }
    }
}

#[derive(Debug, Serialize)]
struct ProceduralView {
    item_id: String,
    entry_type: String,
    description: String,
    steps: Vec<String>,
}

impl ProceduralView {
    fn new(item: &crate::schema::ProceduralItem) -> Self {
        Self {
            item_id: item.id.clone(),
            entry_type: item.entry_type.clone(),
            description: item.description.clone(),
            steps: item.steps.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ResourceView {
    item_id: String,
    title: String,
    summary: String,
    resource_type: String,
    content: String,
}

impl ResourceView {
    fn new(item: &crate::schema::ResourceItem) -> Self {
        Self {
            item_id: item.id.clone(),
            title: item.title.clone(),
            summary: item.summary.clone(),
            resource_type: item.resource_type.clone(),
            content: item.content.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct VaultView {
    item_id: String,
    entry_type: String,
    source: String,
    sensitivity: String,
    secret_value: String,
    description: String,
}

impl VaultView {
    fn new(item: &crate::schema::KnowledgeVaultItem) -> Self {
        Self {
            item_id: item.id.clone(),
            entry_type: item.entry_type.clone(),
            source: item.source.clone(),
            sensitivity: item.sensitivity.as_str().to_string(),
            secret_value: item.secret_value.clone(),
            description: item.description.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct CoreView {
    label: String,
    value: String,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::embedding::HashEmbedder;
    use crate::store::Store;

    fn executor() -> ToolExecutor {
        let store = Store::in_memory().unwrap_or_else(|e| panic!("store: {e}"));
        let embedder: Arc<dyn crate::embedding::Embedder> = Arc::new(HashEmbedder::default());
        let managers = MemoryManagers::new(&store, &embedder, "org-1");
        managers
            .core
            .ensure_block("agent-chat", "persona", "helpful assistant")
            .unwrap_or_else(|e| panic!("ensure: {e}"));
        ToolExecutor::new(managers, "agent-chat")
    }

    fn call(name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "call_1".to_string(),
            name: name.to_string(),
            arguments: args.to_string(),
        }
    }

    #[test]
    fn test_episodic_insert_then_search() {
        let executor = executor();
        let result = executor.execute(&call(
            "episodic_memory_insert",
            serde_json::json!({
                "items": [{"event_type": "activity", "summary": "user opened terminal"}]
            }),
        ));
        assert!(!result.is_error, "insert failed: {}", result.content);

        let result = executor.execute(&call(
            "search_in_memory",
            serde_json::json!({
                "memory_type": "episodic",
                "query": "terminal",
                "field": "summary",
                "method": "string_match"
            }),
        ));
        assert!(!result.is_error, "search failed: {}", result.content);
        assert!(result.content.contains("user opened terminal"));
    }

    #[test]
    fn test_core_replace_invariant_violation_reported() {
        let executor = executor();
        let result = executor.execute(&call(
            "core_memory_replace",
            serde_json::json!({
                "label": "persona",
                "old_content": "missing",
                "new_content": "x"
            }),
        ));
        assert!(result.is_error);
        assert!(result.content.contains("not found in core block"));
    }

    #[test]
    fn test_unknown_tool() {
        let executor = executor();
        let result = executor.execute(&call("nonexistent_tool", serde_json::json!({})));
        assert!(result.is_error);
        assert!(result.content.contains("unknown tool"));
    }

    #[test]
    fn test_invalid_arguments_reported() {
        let executor = executor();
        let result = executor.execute(&ToolCall {
            id: "call_1".to_string(),
            name: "episodic_memory_insert".to_string(),
            arguments: "not json".to_string(),
        });
        assert!(result.is_error);
        assert!(result.content.contains("invalid arguments"));
    }

    #[test]
    fn test_vault_update_empty_new_items_deletes() {
        let executor = executor();
        let result = executor.execute(&call(
            "knowledge_vault_insert",
            serde_json::json!({
                "items": [{
                    "entry_type": "credential",
                    "sensitivity": "high",
                    "secret_value": "s3cr3t",
                    "description": "test token"
                }]
            }),
        ));
        assert!(!result.is_error, "insert failed: {}", result.content);

        let search = executor.execute(&call(
            "search_in_memory",
            serde_json::json!({
                "memory_type": "knowledge_vault",
                "query": "token",
                "method": "string_match"
            }),
        ));
        let views: Vec<serde_json::Value> =
            serde_json::from_str(&search.content).unwrap_or_else(|e| panic!("parse: {e}"));
        let id = views[0]["item_id"].as_str().unwrap_or_default().to_string();

        let result = executor.execute(&call(
            "knowledge_vault_update",
            serde_json::json!({"old_ids": [id], "new_items": []}),
        ));
        assert!(!result.is_error, "update failed: {}", result.content);

        let search = executor.execute(&call(
            "search_in_memory",
            serde_json::json!({
                "memory_type": "knowledge_vault",
                "query": "token",
                "method": "string_match"
            }),
        ));
        assert_eq!(search.content.trim(), "[]");
    }

    #[test]
    fn test_search_core_lists_blocks() {
        let executor = executor();
        let result = executor.execute(&call(
            "search_in_memory",
            serde_json::json!({"memory_type": "core", "query": ""}),
        ));
        assert!(!result.is_error);
        assert!(result.content.contains("persona"));
        assert!(result.content.contains("helpful assistant"));
    }
}
