//! Core memory blocks: small, always-in-context values mutated by
//! append/replace rather than insert/delete.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids;

/// A labelled core memory block. One block per label per agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreBlock {
    /// Prefixed id (`block_…`).
    pub id: String,
    /// Owning organization.
    pub organization_id: String,
    /// Owning agent.
    pub agent_id: String,
    /// Block label (`"persona"`, `"human"`, …).
    pub label: String,
    /// Free-text value.
    pub value: String,
    /// Record creation time (UTC).
    pub created_at: DateTime<Utc>,
    /// Last update time, if ever updated.
    pub updated_at: Option<DateTime<Utc>>,
}

impl CoreBlock {
    /// Creates a new block with the given label and initial value.
    #[must_use]
    pub fn new(agent_id: &str, organization_id: &str, label: &str, value: &str) -> Self {
        Self {
            id: ids::generate(ids::BLOCK_PREFIX),
            organization_id: organization_id.to_string(),
            agent_id: agent_id.to_string(),
            label: label.to_string(),
            value: value.to_string(),
            created_at: Utc::now(),
            updated_at: None,
        }
    }
}
