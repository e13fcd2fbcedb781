//! Episodic memory: time-stamped events observed from the user, the
//! assistant, or the system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids;

/// Who an episodic event is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actor {
    /// The human user.
    User,
    /// The chat assistant.
    Assistant,
    /// The surrounding system (monitors, schedulers).
    System,
}

impl Actor {
    /// Parses an actor string (case-insensitive). Unknown values map to
    /// [`Actor::System`].
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "user" => Self::User,
            "assistant" => Self::Assistant,
            _ => Self::System,
        }
    }

    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single event in episodic memory.
///
/// `occurred_at` is timezone-aware and `summary` is non-empty; both are
/// enforced at insert time by the manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodicEvent {
    /// Prefixed id (`ep_mem_…`).
    pub id: String,
    /// Owning organization.
    pub organization_id: String,
    /// When the event happened (UTC; converted on read if the caller
    /// passed a timezone).
    pub occurred_at: DateTime<Utc>,
    /// Attribution.
    pub actor: Actor,
    /// Free-form event category (e.g. `"activity"`, `"conversation"`).
    pub event_type: String,
    /// One-line summary. Embedded.
    pub summary: String,
    /// Longer narrative. Embedded.
    pub details: String,
    /// Free-form JSON metadata.
    pub metadata: serde_json::Value,
    /// Record creation time (UTC).
    pub created_at: DateTime<Utc>,
    /// Last update time, if ever updated.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Insert payload, as produced by an LLM tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodicEventDraft {
    /// Event time; defaults to now when the model omits it.
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
    /// Attribution; defaults to the user.
    #[serde(default = "default_actor")]
    pub actor: Actor,
    /// Event category.
    pub event_type: String,
    /// One-line summary.
    pub summary: String,
    /// Longer narrative.
    #[serde(default)]
    pub details: String,
}

const fn default_actor() -> Actor {
    Actor::User
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct EpisodicEventUpdate {
    /// Target event id.
    pub id: String,
    /// New event time.
    pub occurred_at: Option<DateTime<Utc>>,
    /// New attribution.
    pub actor: Option<Actor>,
    /// New category.
    pub event_type: Option<String>,
    /// New summary (re-embedded).
    pub summary: Option<String>,
    /// New details (re-embedded).
    pub details: Option<String>,
}

impl EpisodicEvent {
    /// Builds a new event from a draft, stamping id and creation time.
    #[must_use]
    pub fn from_draft(draft: EpisodicEventDraft, organization_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: ids::generate(ids::EPISODIC_PREFIX),
            organization_id: organization_id.to_string(),
            occurred_at: draft.occurred_at.unwrap_or(now),
            actor: draft.actor,
            event_type: draft.event_type,
            summary: draft.summary,
            details: draft.details,
            metadata: serde_json::Value::Object(serde_json::Map::new()),
            created_at: now,
            updated_at: None,
        }
    }
}
