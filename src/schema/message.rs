//! Append-only message log, indexed by `(agent_id, created_at)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids;

/// One logged message from an agent exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Prefixed id (`msg_…`).
    pub id: String,
    /// Owning organization.
    pub organization_id: String,
    /// Agent this message belongs to.
    pub agent_id: String,
    /// Message role (`"user"`, `"assistant"`, `"tool"`, `"system"`).
    pub role: String,
    /// Text content, if any.
    pub text: Option<String>,
    /// Tool calls as raw JSON, if any.
    pub tool_calls: Option<serde_json::Value>,
    /// Step identifier within a multi-turn exchange.
    pub step_id: Option<String>,
    /// Record creation time (UTC).
    pub created_at: DateTime<Utc>,
}

impl MessageRecord {
    /// Creates a new log record for the given agent and role.
    #[must_use]
    pub fn new(agent_id: &str, organization_id: &str, role: &str, text: Option<String>) -> Self {
        Self {
            id: ids::generate(ids::MESSAGE_PREFIX),
            organization_id: organization_id.to_string(),
            agent_id: agent_id.to_string(),
            role: role.to_string(),
            text,
            tool_calls: None,
            step_id: None,
            created_at: Utc::now(),
        }
    }

    /// Attaches serialized tool calls to the record.
    #[must_use]
    pub fn with_tool_calls(mut self, tool_calls: serde_json::Value) -> Self {
        self.tool_calls = Some(tool_calls);
        self
    }
}
