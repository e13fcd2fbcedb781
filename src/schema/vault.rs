//! Knowledge vault: credential-like values and other verbatim secrets.
//!
//! Values are stored verbatim; sensitivity is a label for downstream
//! handling, not an encryption scheme.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids;

/// Sensitivity classification of a vault entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    /// Freely usable in prompts.
    Low,
    /// Use with care.
    Medium,
    /// Never surface unprompted.
    High,
}

impl Sensitivity {
    /// Parses a sensitivity string (case-insensitive). Unknown values map
    /// to [`Sensitivity::High`], erring on the side of caution.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "low" => Self::Low,
            "medium" => Self::Medium,
            _ => Self::High,
        }
    }

    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An entry in the knowledge vault.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeVaultItem {
    /// Prefixed id (`kv_item_…`).
    pub id: String,
    /// Owning organization.
    pub organization_id: String,
    /// Kind of entry (e.g. `"credential"`, `"bookmark"`).
    pub entry_type: String,
    /// Where the value came from.
    pub source: String,
    /// Sensitivity classification.
    pub sensitivity: Sensitivity,
    /// The value itself, stored verbatim.
    pub secret_value: String,
    /// What the value is for. Embedded.
    pub description: String,
    /// Free-form JSON metadata.
    pub metadata: serde_json::Value,
    /// Record creation time (UTC).
    pub created_at: DateTime<Utc>,
    /// Last update time, if ever updated.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Insert payload, as produced by an LLM tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeVaultItemDraft {
    /// Kind of entry.
    pub entry_type: String,
    /// Where the value came from.
    #[serde(default)]
    pub source: String,
    /// Sensitivity classification. Required on every item.
    pub sensitivity: Sensitivity,
    /// The value itself.
    pub secret_value: String,
    /// What the value is for.
    #[serde(default)]
    pub description: String,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeVaultItemUpdate {
    /// Target item id.
    pub id: String,
    /// New kind.
    pub entry_type: Option<String>,
    /// New source.
    pub source: Option<String>,
    /// New sensitivity.
    pub sensitivity: Option<Sensitivity>,
    /// New value.
    pub secret_value: Option<String>,
    /// New description (re-embedded).
    pub description: Option<String>,
}

impl KnowledgeVaultItem {
    /// Builds a new item from a draft, stamping id and creation time.
    #[must_use]
    pub fn from_draft(draft: KnowledgeVaultItemDraft, organization_id: &str) -> Self {
        Self {
            id: ids::generate(ids::VAULT_PREFIX),
            organization_id: organization_id.to_string(),
            entry_type: draft.entry_type,
            source: draft.source,
            sensitivity: draft.sensitivity,
            secret_value: draft.secret_value,
            description: draft.description,
            metadata: serde_json::Value::Object(serde_json::Map::new()),
            created_at: Utc::now(),
            updated_at: None,
        }
    }
}
