//! Manager for episodic memory.
//!
//! Owns insert/update/delete/search over [`EpisodicEvent`] rows plus the
//! merge operations the episodic agent uses for deduplication: `append`
//! folds new material into an existing event, `replace` collapses a set
//! of repeated events into fresh ones.

use std::sync::Arc;

use chrono::Utc;

use super::search::{self, SearchMethod};
use crate::embedding::{Embedder, pad_embedding};
use crate::error::MemoryError;
use crate::schema::{EpisodicEvent, EpisodicEventDraft, EpisodicEventUpdate};
use crate::store::{RowFilter, Store};

/// Searchable fields of an episodic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EpisodicField {
    /// The one-line summary (default).
    #[default]
    Summary,
    /// The narrative details.
    Details,
}

impl EpisodicField {
    /// Parses a field name; unknown values fall back to the summary.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("details") {
            Self::Details
        } else {
            Self::Summary
        }
    }

    const fn column(self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Details => "details",
        }
    }

    const fn embedding_column(self) -> &'static str {
        match self {
            Self::Summary => "summary_embedding",
            Self::Details => "details_embedding",
        }
    }

    fn text_of(self, event: &EpisodicEvent) -> &str {
        match self {
            Self::Summary => &event.summary,
            Self::Details => &event.details,
        }
    }
}

/// Manager for episodic events.
#[derive(Clone)]
pub struct EpisodicMemoryManager {
    store: Store,
    embedder: Arc<dyn Embedder>,
    organization_id: String,
}

impl EpisodicMemoryManager {
    /// Creates a manager over the shared store and embedder.
    #[must_use]
    pub fn new(store: Store, embedder: Arc<dyn Embedder>, organization_id: &str) -> Self {
        Self {
            store,
            embedder,
            organization_id: organization_id.to_string(),
        }
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        Ok(pad_embedding(self.embedder.embed(text)?))
    }

    /// Inserts one event, embedding summary and details.
    pub fn insert(&self, draft: EpisodicEventDraft) -> Result<EpisodicEvent, MemoryError> {
        if draft.summary.trim().is_empty() {
            return Err(MemoryError::Validation {
                message: "episodic event summary must be non-empty".to_string(),
            });
        }
        let event = EpisodicEvent::from_draft(draft, &self.organization_id);
        let summary_emb = self.embed(&event.summary)?;
        let details_emb = self.embed(&event.details)?;
        self.store.insert_episodic(&event, &summary_emb, &details_emb)?;
        Ok(event)
    }

    /// Inserts a batch of events in order.
    pub fn insert_many(
        &self,
        drafts: Vec<EpisodicEventDraft>,
    ) -> Result<Vec<EpisodicEvent>, MemoryError> {
        drafts.into_iter().map(|d| self.insert(d)).collect()
    }

    /// Fetches one event, raising `NotFound` when absent.
    pub fn get(&self, id: &str) -> Result<EpisodicEvent, MemoryError> {
        self.store
            .get_episodic(id)?
            .ok_or_else(|| MemoryError::NotFound {
                kind: "episodic event",
                id: id.to_string(),
            })
    }

    /// Applies a partial update, re-embedding changed fields.
    pub fn update(&self, patch: EpisodicEventUpdate) -> Result<EpisodicEvent, MemoryError> {
        let mut event = self.get(&patch.id)?;

        if let Some(occurred_at) = patch.occurred_at {
            event.occurred_at = occurred_at;
        }
        if let Some(actor) = patch.actor {
            event.actor = actor;
        }
        if let Some(event_type) = patch.event_type {
            event.event_type = event_type;
        }
        let summary_emb = if let Some(summary) = patch.summary {
            event.summary = summary;
            Some(self.embed(&event.summary)?)
        } else {
            None
        };
        let details_emb = if let Some(details) = patch.details {
            event.details = details;
            Some(self.embed(&event.details)?)
        } else {
            None
        };
        event.updated_at = Some(Utc::now());

        self.store
            .update_episodic(&event, summary_emb.as_deref(), details_emb.as_deref())?;
        Ok(event)
    }

    /// Merges new material into an existing event.
    ///
    /// A provided summary overwrites the old one; provided details are
    /// appended below the existing details. This is a free-text merge
    /// with no similarity check; callers decide what is mergeable.
    pub fn append(
        &self,
        event_id: &str,
        new_summary: Option<String>,
        new_details: Option<String>,
    ) -> Result<EpisodicEvent, MemoryError> {
        let current = self.get(event_id)?;
        let merged_details = new_details.map(|d| {
            if current.details.trim().is_empty() {
                d
            } else {
                format!("{}\n{d}", current.details)
            }
        });
        self.update(EpisodicEventUpdate {
            id: event_id.to_string(),
            summary: new_summary,
            details: merged_details,
            ..EpisodicEventUpdate::default()
        })
    }

    /// Replaces a set of events with freshly inserted ones.
    ///
    /// Used to dedupe repeated events: every listed id is verified first,
    /// then all are deleted and the new drafts inserted. Verification
    /// before deletion keeps the operation all-or-nothing on bad ids.
    pub fn replace(
        &self,
        event_ids: &[String],
        new_drafts: Vec<EpisodicEventDraft>,
    ) -> Result<Vec<EpisodicEvent>, MemoryError> {
        for id in event_ids {
            self.get(id)?;
        }
        for id in event_ids {
            self.store.delete_episodic(id)?;
        }
        self.insert_many(new_drafts)
    }

    /// Hard-deletes one event.
    pub fn delete_by_id(&self, id: &str) -> Result<(), MemoryError> {
        self.store.delete_episodic(id)
    }

    /// Searches episodic memory per the common retrieval contract.
    pub fn search(
        &self,
        query: &str,
        field: EpisodicField,
        method: SearchMethod,
        limit: usize,
    ) -> Result<Vec<EpisodicEvent>, MemoryError> {
        if query.is_empty() {
            return self.store.query_episodic(RowFilter::Recent, limit);
        }
        match method {
            SearchMethod::StringMatch => self.store.query_episodic(
                RowFilter::Contains {
                    column: field.column(),
                    needle: query,
                },
                limit,
            ),
            SearchMethod::SemanticMatch => {
                let vector = self.embed(query)?;
                self.store.query_episodic(
                    RowFilter::Nearest {
                        embedding_column: field.embedding_column(),
                        vector: &vector,
                    },
                    limit,
                )
            }
            SearchMethod::FuzzyMatch => {
                let all = self.store.query_episodic(RowFilter::All, 0)?;
                let scored = all
                    .into_iter()
                    .map(|event| {
                        let score = search::partial_ratio(query, field.text_of(&event));
                        (score, event.created_at, event)
                    })
                    .collect();
                Ok(search::rank_fuzzy(scored, limit))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::schema::Actor;

    fn manager() -> EpisodicMemoryManager {
        let store = Store::in_memory().unwrap_or_else(|e| panic!("store: {e}"));
        EpisodicMemoryManager::new(store, Arc::new(HashEmbedder::default()), "org-1")
    }

    fn draft(summary: &str) -> EpisodicEventDraft {
        EpisodicEventDraft {
            occurred_at: None,
            actor: Actor::User,
            event_type: "activity".to_string(),
            summary: summary.to_string(),
            details: String::new(),
        }
    }

    #[test]
    fn test_insert_rejects_empty_summary() {
        let mgr = manager();
        assert!(matches!(
            mgr.insert(draft("   ")),
            Err(MemoryError::Validation { .. })
        ));
    }

    #[test]
    fn test_string_match_finds_inserted_event() {
        let mgr = manager();
        let ev = mgr
            .insert(draft("user opened terminal"))
            .unwrap_or_else(|e| panic!("insert: {e}"));
        let hits = mgr
            .search("terminal", EpisodicField::Summary, SearchMethod::StringMatch, 10)
            .unwrap_or_else(|e| panic!("search: {e}"));
        assert!(hits.iter().any(|h| h.id == ev.id));
    }

    #[test]
    fn test_semantic_match_ranks_exact_text_first() {
        let mgr = manager();
        let target = mgr
            .insert(draft("user opened terminal"))
            .unwrap_or_else(|e| panic!("insert: {e}"));
        mgr.insert(draft("walked the dog around the block"))
            .unwrap_or_else(|e| panic!("insert: {e}"));

        let hits = mgr
            .search(
                "user opened terminal",
                EpisodicField::Summary,
                SearchMethod::SemanticMatch,
                1,
            )
            .unwrap_or_else(|e| panic!("search: {e}"));
        assert_eq!(hits.first().map(|h| h.id.as_str()), Some(target.id.as_str()));
    }

    #[test]
    fn test_delete_then_search_finds_nothing() {
        let mgr = manager();
        let ev = mgr
            .insert(draft("ephemeral event"))
            .unwrap_or_else(|e| panic!("insert: {e}"));
        mgr.delete_by_id(&ev.id).unwrap_or_else(|e| panic!("delete: {e}"));

        let hits = mgr
            .search("ephemeral", EpisodicField::Summary, SearchMethod::StringMatch, 10)
            .unwrap_or_else(|e| panic!("search: {e}"));
        assert!(hits.is_empty());
    }

    #[test]
    fn test_replace_dedupes_repeated_events() {
        let mgr = manager();
        let e1 = mgr
            .insert(draft("user opened terminal"))
            .unwrap_or_else(|e| panic!("insert: {e}"));
        let e2 = mgr
            .insert(draft("user opened terminal"))
            .unwrap_or_else(|e| panic!("insert: {e}"));

        mgr.replace(&[e1.id, e2.id], vec![draft("user opened terminal")])
            .unwrap_or_else(|e| panic!("replace: {e}"));

        let hits = mgr
            .search("terminal", EpisodicField::Summary, SearchMethod::StringMatch, 10)
            .unwrap_or_else(|e| panic!("search: {e}"));
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_replace_rejects_unknown_id_without_deleting() {
        let mgr = manager();
        let e1 = mgr
            .insert(draft("kept event"))
            .unwrap_or_else(|e| panic!("insert: {e}"));

        let result = mgr.replace(
            &[e1.id.clone(), "ep_mem_missing".to_string()],
            vec![draft("replacement")],
        );
        assert!(matches!(result, Err(MemoryError::NotFound { .. })));
        // The existing event must survive a failed replace.
        assert!(mgr.get(&e1.id).is_ok());
    }

    #[test]
    fn test_append_merges_details() {
        let mgr = manager();
        let ev = mgr
            .insert(EpisodicEventDraft {
                details: "first detail".to_string(),
                ..draft("editing code")
            })
            .unwrap_or_else(|e| panic!("insert: {e}"));

        let merged = mgr
            .append(&ev.id, None, Some("second detail".to_string()))
            .unwrap_or_else(|e| panic!("append: {e}"));
        assert_eq!(merged.details, "first detail\nsecond detail");
        assert_eq!(merged.summary, "editing code");
        assert!(merged.updated_at.is_some());
    }

    #[test]
    fn test_fuzzy_match_prefers_closer_summary() {
        let mgr = manager();
        mgr.insert(draft("user opened terminal"))
            .unwrap_or_else(|e| panic!("insert: {e}"));
        mgr.insert(draft("watched a movie"))
            .unwrap_or_else(|e| panic!("insert: {e}"));

        let hits = mgr
            .search("opened termnal", EpisodicField::Summary, SearchMethod::FuzzyMatch, 1)
            .unwrap_or_else(|e| panic!("search: {e}"));
        assert_eq!(
            hits.first().map(|h| h.summary.as_str()),
            Some("user opened terminal")
        );
    }
}
