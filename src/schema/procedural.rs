//! Procedural memory: how-to knowledge as ordered step sequences.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids;

/// A procedure stored in procedural memory.
///
/// `steps` is an ordered textual sequence; it is serialized as a JSON
/// array in storage and embedded as one joined text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProceduralItem {
    /// Prefixed id (`proc_item_…`).
    pub id: String,
    /// Owning organization.
    pub organization_id: String,
    /// Kind of procedure (e.g. `"workflow"`, `"guide"`).
    pub entry_type: String,
    /// What the procedure accomplishes. Embedded.
    pub description: String,
    /// Ordered steps. Embedded as joined text.
    pub steps: Vec<String>,
    /// Free-form JSON metadata.
    pub metadata: serde_json::Value,
    /// Record creation time (UTC).
    pub created_at: DateTime<Utc>,
    /// Last update time, if ever updated.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Insert payload, as produced by an LLM tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProceduralItemDraft {
    /// Kind of procedure.
    pub entry_type: String,
    /// What the procedure accomplishes.
    pub description: String,
    /// Ordered steps.
    pub steps: Vec<String>,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ProceduralItemUpdate {
    /// Target item id.
    pub id: String,
    /// New kind.
    pub entry_type: Option<String>,
    /// New description (re-embedded).
    pub description: Option<String>,
    /// New steps (re-embedded).
    pub steps: Option<Vec<String>>,
}

impl ProceduralItem {
    /// Builds a new item from a draft, stamping id and creation time.
    #[must_use]
    pub fn from_draft(draft: ProceduralItemDraft, organization_id: &str) -> Self {
        Self {
            id: ids::generate(ids::PROCEDURAL_PREFIX),
            organization_id: organization_id.to_string(),
            entry_type: draft.entry_type,
            description: draft.description,
            steps: draft.steps,
            metadata: serde_json::Value::Object(serde_json::Map::new()),
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    /// Joins the steps into the single text that gets embedded.
    #[must_use]
    pub fn steps_text(&self) -> String {
        self.steps.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_text_preserves_order() {
        let draft = ProceduralItemDraft {
            entry_type: "workflow".to_string(),
            description: "release a build".to_string(),
            steps: vec!["tag".to_string(), "build".to_string(), "publish".to_string()],
        };
        let item = ProceduralItem::from_draft(draft, "org-1");
        assert_eq!(item.steps_text(), "tag\nbuild\npublish");
    }
}
