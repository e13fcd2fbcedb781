//! Manager for procedural memory.

use std::sync::Arc;

use chrono::Utc;

use super::search::{self, SearchMethod};
use crate::embedding::{Embedder, pad_embedding};
use crate::error::MemoryError;
use crate::schema::{ProceduralItem, ProceduralItemDraft, ProceduralItemUpdate};
use crate::store::{RowFilter, Store};

/// Searchable fields of a procedural item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProceduralField {
    /// The description (default).
    #[default]
    Description,
    /// The joined step text.
    Steps,
}

impl ProceduralField {
    /// Parses a field name; unknown values fall back to the description.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("steps") {
            Self::Steps
        } else {
            Self::Description
        }
    }

    const fn column(self) -> &'static str {
        match self {
            Self::Description => "description",
            Self::Steps => "steps",
        }
    }

    const fn embedding_column(self) -> &'static str {
        match self {
            Self::Description => "description_embedding",
            Self::Steps => "steps_embedding",
        }
    }
}

/// Manager for procedural items.
#[derive(Clone)]
pub struct ProceduralMemoryManager {
    store: Store,
    embedder: Arc<dyn Embedder>,
    organization_id: String,
}

impl ProceduralMemoryManager {
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

    /// Inserts one procedure, embedding description and joined steps.
    pub fn insert(&self, draft: ProceduralItemDraft) -> Result<ProceduralItem, MemoryError> {
        if draft.description.trim().is_empty() {
            return Err(MemoryError::Validation {
                message: "procedural item description must be non-empty".to_string(),
            });
        }
        let item = ProceduralItem::from_draft(draft, &self.organization_id);
        let description_emb = self.embed(&item.description)?;
        let steps_emb = self.embed(&item.steps_text())?;
        self.store
            .insert_procedural(&item, &description_emb, &steps_emb)?;
        Ok(item)
    }

    /// Inserts a batch of procedures in order.
    pub fn insert_many(
        &self,
        drafts: Vec<ProceduralItemDraft>,
    ) -> Result<Vec<ProceduralItem>, MemoryError> {
        drafts.into_iter().map(|d| self.insert(d)).collect()
    }

    /// Fetches one procedure, raising `NotFound` when absent.
    pub fn get(&self, id: &str) -> Result<ProceduralItem, MemoryError> {
        self.store
            .get_procedural(id)?
            .ok_or_else(|| MemoryError::NotFound {
                kind: "procedural item",
                id: id.to_string(),
            })
    }

    /// Applies a partial update, re-embedding changed fields.
    pub fn update(&self, patch: ProceduralItemUpdate) -> Result<ProceduralItem, MemoryError> {
        let mut item = self.get(&patch.id)?;

        if let Some(entry_type) = patch.entry_type {
            item.entry_type = entry_type;
        }
        let description_emb = if let Some(description) = patch.description {
            item.description = description;
            Some(self.embed(&item.description)?)
        } else {
            None
        };
        let steps_emb = if let Some(steps) = patch.steps {
            item.steps = steps;
            Some(self.embed(&item.steps_text())?)
        } else {
            None
        };
        item.updated_at = Some(Utc::now());

        self.store
            .update_procedural(&item, description_emb.as_deref(), steps_emb.as_deref())?;
        Ok(item)
    }

    /// Replace-set update: deletes `old_ids`, inserts `new_drafts`.
    /// Empty `new_drafts` is a pure delete.
    pub fn replace_set(
        &self,
        old_ids: &[String],
        new_drafts: Vec<ProceduralItemDraft>,
    ) -> Result<Vec<ProceduralItem>, MemoryError> {
        for id in old_ids {
            self.store.delete_procedural(id)?;
        }
        self.insert_many(new_drafts)
    }

    /// Hard-deletes one procedure.
    pub fn delete_by_id(&self, id: &str) -> Result<(), MemoryError> {
        self.store.delete_procedural(id)
    }

    /// Searches procedural memory per the common retrieval contract.
    pub fn search(
        &self,
        query: &str,
        field: ProceduralField,
        method: SearchMethod,
        limit: usize,
    ) -> Result<Vec<ProceduralItem>, MemoryError> {
        if query.is_empty() {
            return self.store.query_procedural(RowFilter::Recent, limit);
        }
        match method {
            SearchMethod::StringMatch => self.store.query_procedural(
                RowFilter::Contains {
                    column: field.column(),
                    needle: query,
                },
                limit,
            ),
            SearchMethod::SemanticMatch => {
                let vector = self.embed(query)?;
                self.store.query_procedural(
                    RowFilter::Nearest {
                        embedding_column: field.embedding_column(),
                        vector: &vector,
                    },
                    limit,
                )
            }
            SearchMethod::FuzzyMatch => {
                let all = self.store.query_procedural(RowFilter::All, 0)?;
                let scored = all
                    .into_iter()
                    .map(|item| {
                        let text = match field {
                            ProceduralField::Description => item.description.clone(),
                            ProceduralField::Steps => item.steps_text(),
                        };
                        let score = search::partial_ratio(query, &text);
                        (score, item.created_at, item)
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

    fn manager() -> ProceduralMemoryManager {
        let store = Store::in_memory().unwrap_or_else(|e| panic!("store: {e}"));
        ProceduralMemoryManager::new(store, Arc::new(HashEmbedder::default()), "org-1")
    }

    #[test]
    fn test_insert_and_search_steps_field() {
        let mgr = manager();
        mgr.insert(ProceduralItemDraft {
            entry_type: "workflow".to_string(),
            description: "release a crate".to_string(),
            steps: vec!["bump version".to_string(), "cargo publish".to_string()],
        })
        .unwrap_or_else(|e| panic!("insert: {e}"));

        let hits = mgr
            .search("publish", ProceduralField::Steps, SearchMethod::StringMatch, 10)
            .unwrap_or_else(|e| panic!("search: {e}"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].steps.len(), 2);
    }

    #[test]
    fn test_update_preserves_step_order() {
        let mgr = manager();
        let item = mgr
            .insert(ProceduralItemDraft {
                entry_type: "guide".to_string(),
                description: "make tea".to_string(),
                steps: vec!["boil".to_string()],
            })
            .unwrap_or_else(|e| panic!("insert: {e}"));

        let updated = mgr
            .update(ProceduralItemUpdate {
                id: item.id,
                steps: Some(vec!["boil".to_string(), "steep".to_string(), "pour".to_string()]),
                ..ProceduralItemUpdate::default()
            })
            .unwrap_or_else(|e| panic!("update: {e}"));
        assert_eq!(updated.steps, vec!["boil", "steep", "pour"]);
    }
}
