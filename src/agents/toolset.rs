//! Per-agent tool definitions.
//!
//! Projects each memory manager as callable tools for its LLM agent.
//! Names and argument shapes must match the dispatch table in
//! [`executor`](super::executor).

use serde_json::json;

use super::AgentKind;
use crate::llm::tool::ToolDefinition;

/// Name of the chat agent's terminal tool; the tool loop stops when the
/// model calls it and the reply parser extracts its `message` argument.
pub const RESPOND_TOOL: &str = "respond_to_user";

/// Name of the meta agent's routing tool.
pub const TRIGGER_TOOL: &str = "trigger_memory_update";

/// Tool definitions for one agent kind.
#[must_use]
pub fn tools_for(kind: AgentKind) -> Vec<ToolDefinition> {
    match kind {
        AgentKind::Chat => vec![def_respond_to_user(), def_search_in_memory()],
        AgentKind::MetaMemory => vec![def_trigger_memory_update()],
        AgentKind::EpisodicMemory => vec![
            def_episodic_insert(),
            def_episodic_append(),
            def_episodic_replace(),
            def_check_episodic(),
        ],
        AgentKind::SemanticMemory => vec![def_semantic_insert(), def_semantic_update()],
        AgentKind::ProceduralMemory => vec![def_procedural_insert(), def_procedural_update()],
        AgentKind::ResourceMemory => vec![def_resource_insert(), def_resource_update()],
        AgentKind::KnowledgeVault => vec![def_vault_insert(), def_vault_update()],
        AgentKind::CoreMemory => vec![def_core_append(), def_core_replace()],
        // The reflexion agent works across every memory type.
        AgentKind::Reflexion => {
            let mut tools = vec![def_search_in_memory()];
            tools.extend([
                def_episodic_insert(),
                def_episodic_append(),
                def_episodic_replace(),
                def_check_episodic(),
                def_semantic_insert(),
                def_semantic_update(),
                def_procedural_insert(),
                def_procedural_update(),
                def_resource_insert(),
                def_resource_update(),
                def_vault_insert(),
                def_vault_update(),
                def_core_append(),
                def_core_replace(),
            ]);
            tools
        }
    }
}

// ---------------------------------------------------------------------------
// Chat / meta tools
// ---------------------------------------------------------------------------

fn def_respond_to_user() -> ToolDefinition {
    ToolDefinition {
        name: RESPOND_TOOL.to_string(),
        description: "Send the final reply to the user. Always end the turn by calling this \
                      tool with the complete user-facing message."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "The user-facing reply text."
                }
            },
            "required": ["message"],
            "additionalProperties": false
        }),
    }
}

fn def_search_in_memory() -> ToolDefinition {
    ToolDefinition {
        name: "search_in_memory".to_string(),
        description: "Search one memory type. Returns matching items as JSON. An empty query \
                      returns the most recent items."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "memory_type": {
                    "type": "string",
                    "enum": ["episodic", "semantic", "procedural", "resource",
                             "knowledge_vault", "core"],
                    "description": "Which memory store to search."
                },
                "query": {
                    "type": "string",
                    "description": "Search query text. Empty returns recent items."
                },
                "field": {
                    "type": "string",
                    "description": "Field to match against (per-type default when omitted)."
                },
                "method": {
                    "type": "string",
                    "enum": ["string_match", "fuzzy_match", "semantic_match"],
                    "description": "Matching method. Defaults to semantic_match.",
                    "default": "semantic_match"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum items to return. Defaults to 10.",
                    "default": 10
                }
            },
            "required": ["memory_type", "query"],
            "additionalProperties": false
        }),
    }
}

fn def_trigger_memory_update() -> ToolDefinition {
    ToolDefinition {
        name: TRIGGER_TOOL.to_string(),
        description: "Choose which memory types to update. Each named type's agent receives \
                      the observed content together with the matching instruction."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "memory_types": {
                    "type": "array",
                    "items": {
                        "type": "string",
                        "enum": ["core", "episodic", "resource", "procedural",
                                 "knowledge_vault", "semantic"]
                    },
                    "minItems": 1,
                    "description": "Memory types that should absorb this content."
                },
                "instructions": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "One instruction per memory type, same order."
                }
            },
            "required": ["memory_types", "instructions"],
            "additionalProperties": false
        }),
    }
}

// ---------------------------------------------------------------------------
// Episodic tools
// ---------------------------------------------------------------------------

fn episodic_item_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "occurred_at": {
                "type": "string",
                "description": "When the event happened (RFC 3339). Defaults to now."
            },
            "actor": {
                "type": "string",
                "enum": ["user", "assistant", "system"],
                "description": "Who the event is attributed to."
            },
            "event_type": { "type": "string", "description": "Event category." },
            "summary": { "type": "string", "description": "One-line summary." },
            "details": { "type": "string", "description": "Longer narrative." }
        },
        "required": ["event_type", "summary"],
        "additionalProperties": false
    })
}

fn def_episodic_insert() -> ToolDefinition {
    ToolDefinition {
        name: "episodic_memory_insert".to_string(),
        description: "Insert new episodic events (things that happened to the user or the \
                      assistant)."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "items": {
                    "type": "array",
                    "items": episodic_item_schema(),
                    "minItems": 1,
                    "description": "Events to insert."
                }
            },
            "required": ["items"],
            "additionalProperties": false
        }),
    }
}

fn def_episodic_append() -> ToolDefinition {
    ToolDefinition {
        name: "episodic_memory_append".to_string(),
        description: "Merge new material into an existing event when the user keeps doing the \
                      same thing. A provided summary overwrites the old one (carry the old \
                      information forward); details are appended."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "event_id": { "type": "string", "description": "Event to merge into." },
                "new_summary": { "type": "string", "description": "Updated summary." },
                "new_details": { "type": "string", "description": "Details to append." }
            },
            "required": ["event_id"],
            "additionalProperties": false
        }),
    }
}

fn def_episodic_replace() -> ToolDefinition {
    ToolDefinition {
        name: "episodic_memory_replace".to_string(),
        description: "Collapse repeated events into fresh ones: deletes every listed event and \
                      inserts the new items."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "event_ids": {
                    "type": "array",
                    "items": { "type": "string" },
                    "minItems": 1,
                    "description": "Events to delete."
                },
                "new_items": {
                    "type": "array",
                    "items": episodic_item_schema(),
                    "description": "Replacement events, usually one."
                }
            },
            "required": ["event_ids", "new_items"],
            "additionalProperties": false
        }),
    }
}

fn def_check_episodic() -> ToolDefinition {
    ToolDefinition {
        name: "check_episodic_memory".to_string(),
        description: "Inspect episodic events by id. Returns each event's timestamp, type, \
                      actor, summary, and details."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "event_ids": {
                    "type": "array",
                    "items": { "type": "string" },
                    "minItems": 1,
                    "description": "Events to inspect."
                }
            },
            "required": ["event_ids"],
            "additionalProperties": false
        }),
    }
}

// ---------------------------------------------------------------------------
// Replace-set tools (semantic / procedural / resource / vault)
// ---------------------------------------------------------------------------

const UPDATE_DESCRIPTION: &str =
    "Update or delete items: every listed old id is deleted, then the new items are inserted. \
     The counts are independent (not a one-to-one mapping); an empty new_items deletes only.";

fn def_semantic_insert() -> ToolDefinition {
    ToolDefinition {
        name: "semantic_memory_insert".to_string(),
        description: "Insert new semantic items (concepts and their definitions).".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "items": {
                    "type": "array",
                    "minItems": 1,
                    "items": {
                        "type": "object",
                        "properties": {
                            "concept": { "type": "string" },
                            "definition": { "type": "string" },
                            "details": { "type": "string" },
                            "source": { "type": "string" }
                        },
                        "required": ["concept", "definition"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["items"],
            "additionalProperties": false
        }),
    }
}

fn def_semantic_update() -> ToolDefinition {
    ToolDefinition {
        name: "semantic_memory_update".to_string(),
        description: UPDATE_DESCRIPTION.to_string(),
        parameters: replace_set_schema(json!({
            "type": "object",
            "properties": {
                "concept": { "type": "string" },
                "definition": { "type": "string" },
                "details": { "type": "string" },
                "source": { "type": "string" }
            },
            "required": ["concept", "definition"],
            "additionalProperties": false
        })),
    }
}

fn def_procedural_insert() -> ToolDefinition {
    ToolDefinition {
        name: "procedural_memory_insert".to_string(),
        description: "Insert new procedures (ordered step sequences).".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "items": {
                    "type": "array",
                    "minItems": 1,
                    "items": procedural_item_schema()
                }
            },
            "required": ["items"],
            "additionalProperties": false
        }),
    }
}

fn def_procedural_update() -> ToolDefinition {
    ToolDefinition {
        name: "procedural_memory_update".to_string(),
        description: UPDATE_DESCRIPTION.to_string(),
        parameters: replace_set_schema(procedural_item_schema()),
    }
}

fn procedural_item_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "entry_type": { "type": "string", "description": "Kind of procedure." },
            "description": { "type": "string", "description": "What it accomplishes." },
            "steps": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Ordered steps."
            }
        },
        "required": ["entry_type", "description", "steps"],
        "additionalProperties": false
    })
}

fn def_resource_insert() -> ToolDefinition {
    ToolDefinition {
        name: "resource_memory_insert".to_string(),
        description: "Insert new resources (documents and artifacts in active use).".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "items": {
                    "type": "array",
                    "minItems": 1,
                    "items": resource_item_schema()
                }
            },
            "required": ["items"],
            "additionalProperties": false
        }),
    }
}

fn def_resource_update() -> ToolDefinition {
    ToolDefinition {
        name: "resource_memory_update".to_string(),
        description: UPDATE_DESCRIPTION.to_string(),
        parameters: replace_set_schema(resource_item_schema()),
    }
}

fn resource_item_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "title": { "type": "string" },
            "summary": { "type": "string" },
            "resource_type": { "type": "string" },
            "content": { "type": "string" }
        },
        "required": ["title"],
        "additionalProperties": false
    })
}

fn def_vault_insert() -> ToolDefinition {
    ToolDefinition {
        name: "knowledge_vault_insert".to_string(),
        description: "Insert new knowledge-vault entries (credential-like verbatim values). \
                      Every item must carry a sensitivity."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "items": {
                    "type": "array",
                    "minItems": 1,
                    "items": vault_item_schema()
                }
            },
            "required": ["items"],
            "additionalProperties": false
        }),
    }
}

fn def_vault_update() -> ToolDefinition {
    ToolDefinition {
        name: "knowledge_vault_update".to_string(),
        description: UPDATE_DESCRIPTION.to_string(),
        parameters: replace_set_schema(vault_item_schema()),
    }
}

fn vault_item_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "entry_type": { "type": "string" },
            "source": { "type": "string" },
            "sensitivity": {
                "type": "string",
                "enum": ["low", "medium", "high"]
            },
            "secret_value": { "type": "string" },
            "description": { "type": "string" }
        },
        "required": ["entry_type", "sensitivity", "secret_value"],
        "additionalProperties": false
    })
}

fn replace_set_schema(item_schema: serde_json::Value) -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "old_ids": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Ids of items to delete (or replace)."
            },
            "new_items": {
                "type": "array",
                "items": item_schema,
                "description": "Replacement items; empty means pure delete."
            }
        },
        "required": ["old_ids", "new_items"],
        "additionalProperties": false
    })
}

// ---------------------------------------------------------------------------
// Core tools
// ---------------------------------------------------------------------------

fn def_core_append() -> ToolDefinition {
    ToolDefinition {
        name: "core_memory_append".to_string(),
        description: "Append content to a core memory block (persona or human).".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "label": { "type": "string", "description": "Block to edit." },
                "content": { "type": "string", "description": "Content to append." }
            },
            "required": ["label", "content"],
            "additionalProperties": false
        }),
    }
}

fn def_core_replace() -> ToolDefinition {
    ToolDefinition {
        name: "core_memory_replace".to_string(),
        description: "Replace content in a core memory block. old_content must be an exact, \
                      non-empty substring of the current value; use an empty new_content to \
                      delete."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "label": { "type": "string", "description": "Block to edit." },
                "old_content": { "type": "string", "description": "Exact text to replace." },
                "new_content": { "type": "string", "description": "Replacement text." }
            },
            "required": ["label", "old_content", "new_content"],
            "additionalProperties": false
        }),
    }
}
