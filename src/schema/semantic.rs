//! Semantic memory: concepts and their definitions, independent of when
//! they were learned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids;

/// A concept stored in semantic memory.
///
/// `concept` and `definition` are non-empty (enforced at insert);
/// all three text fields are embedded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticItem {
    /// Prefixed id (`sem_item_…`).
    pub id: String,
    /// Owning organization.
    pub organization_id: String,
    /// The concept name. Embedded.
    pub concept: String,
    /// What the concept means. Embedded.
    pub definition: String,
    /// Supporting detail. Embedded.
    pub details: String,
    /// Where this knowledge came from.
    pub source: String,
    /// Free-form JSON metadata.
    pub metadata: serde_json::Value,
    /// Record creation time (UTC).
    pub created_at: DateTime<Utc>,
    /// Last update time, if ever updated.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Insert payload, as produced by an LLM tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticItemDraft {
    /// The concept name.
    pub concept: String,
    /// What the concept means.
    pub definition: String,
    /// Supporting detail.
    #[serde(default)]
    pub details: String,
    /// Where this knowledge came from.
    #[serde(default)]
    pub source: String,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct SemanticItemUpdate {
    /// Target item id.
    pub id: String,
    /// New concept (re-embedded).
    pub concept: Option<String>,
    /// New definition (re-embedded).
    pub definition: Option<String>,
    /// New details (re-embedded).
    pub details: Option<String>,
    /// New source.
    pub source: Option<String>,
}

impl SemanticItem {
    /// Builds a new item from a draft, stamping id and creation time.
    #[must_use]
    pub fn from_draft(draft: SemanticItemDraft, organization_id: &str) -> Self {
        Self {
            id: ids::generate(ids::SEMANTIC_PREFIX),
            organization_id: organization_id.to_string(),
            concept: draft.concept,
            definition: draft.definition,
            details: draft.details,
            source: draft.source,
            metadata: serde_json::Value::Object(serde_json::Map::new()),
            created_at: Utc::now(),
            updated_at: None,
        }
    }
}
