//! Resource memory: documents and artifacts the user has worked with.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids;

/// A resource stored in resource memory.
///
/// `title` is non-empty (enforced at insert); only `summary` is embedded,
/// since `content` may be arbitrarily large.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceItem {
    /// Prefixed id (`res_item_…`).
    pub id: String,
    /// Owning organization.
    pub organization_id: String,
    /// Resource title.
    pub title: String,
    /// Short description. Embedded.
    pub summary: String,
    /// Full content (may be large).
    pub content: String,
    /// Kind of resource (e.g. `"doc"`, `"code"`).
    pub resource_type: String,
    /// Free-form JSON metadata.
    pub metadata: serde_json::Value,
    /// Record creation time (UTC).
    pub created_at: DateTime<Utc>,
    /// Last update time, if ever updated.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Insert payload, as produced by an LLM tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceItemDraft {
    /// Resource title.
    pub title: String,
    /// Short description.
    #[serde(default)]
    pub summary: String,
    /// Full content.
    #[serde(default)]
    pub content: String,
    /// Kind of resource.
    #[serde(default)]
    pub resource_type: String,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ResourceItemUpdate {
    /// Target item id.
    pub id: String,
    /// New title.
    pub title: Option<String>,
    /// New summary (re-embedded).
    pub summary: Option<String>,
    /// New content.
    pub content: Option<String>,
    /// New kind.
    pub resource_type: Option<String>,
}

impl ResourceItem {
    /// Builds a new item from a draft, stamping id and creation time.
    #[must_use]
    pub fn from_draft(draft: ResourceItemDraft, organization_id: &str) -> Self {
        Self {
            id: ids::generate(ids::RESOURCE_PREFIX),
            organization_id: organization_id.to_string(),
            title: draft.title,
            summary: draft.summary,
            content: draft.content,
            resource_type: draft.resource_type,
            metadata: serde_json::Value::Object(serde_json::Map::new()),
            created_at: Utc::now(),
            updated_at: None,
        }
    }
}
