//! Manager for semantic memory.

use std::sync::Arc;

use chrono::Utc;

use super::search::{self, SearchMethod};
use crate::embedding::{Embedder, pad_embedding};
use crate::error::MemoryError;
use crate::schema::{SemanticItem, SemanticItemDraft, SemanticItemUpdate};
use crate::store::{RowFilter, Store};

/// Searchable fields of a semantic item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SemanticField {
    /// The concept name (default).
    #[default]
    Concept,
    /// The definition text.
    Definition,
    /// The supporting details.
    Details,
}

impl SemanticField {
    /// Parses a field name; unknown values fall back to the concept.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "definition" => Self::Definition,
            "details" => Self::Details,
            _ => Self::Concept,
        }
    }

    const fn column(self) -> &'static str {
        match self {
            Self::Concept => "concept",
            Self::Definition => "definition",
            Self::Details => "details",
        }
    }

    const fn embedding_column(self) -> &'static str {
        match self {
            Self::Concept => "concept_embedding",
            Self::Definition => "definition_embedding",
            Self::Details => "details_embedding",
        }
    }

    fn text_of(self, item: &SemanticItem) -> &str {
        match self {
            Self::Concept => &item.concept,
            Self::Definition => &item.definition,
            Self::Details => &item.details,
        }
    }
}

/// Manager for semantic items.
#[derive(Clone)]
pub struct SemanticMemoryManager {
    store: Store,
    embedder: Arc<dyn Embedder>,
    organization_id: String,
}

impl SemanticMemoryManager {
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

    /// Inserts one item, embedding concept, definition, and details.
    pub fn insert(&self, draft: SemanticItemDraft) -> Result<SemanticItem, MemoryError> {
        if draft.concept.trim().is_empty() || draft.definition.trim().is_empty() {
            return Err(MemoryError::Validation {
                message: "semantic item requires non-empty concept and definition".to_string(),
            });
        }
        let item = SemanticItem::from_draft(draft, &self.organization_id);
        let concept_emb = self.embed(&item.concept)?;
        let definition_emb = self.embed(&item.definition)?;
        let details_emb = self.embed(&item.details)?;
        self.store
            .insert_semantic(&item, &concept_emb, &definition_emb, &details_emb)?;
        Ok(item)
    }

    /// Inserts a batch of items in order.
    pub fn insert_many(
        &self,
        drafts: Vec<SemanticItemDraft>,
    ) -> Result<Vec<SemanticItem>, MemoryError> {
        drafts.into_iter().map(|d| self.insert(d)).collect()
    }

    /// Fetches one item, raising `NotFound` when absent.
    pub fn get(&self, id: &str) -> Result<SemanticItem, MemoryError> {
        self.store
            .get_semantic(id)?
            .ok_or_else(|| MemoryError::NotFound {
                kind: "semantic item",
                id: id.to_string(),
            })
    }

    /// Applies a partial update, re-embedding changed fields.
    pub fn update(&self, patch: SemanticItemUpdate) -> Result<SemanticItem, MemoryError> {
        let mut item = self.get(&patch.id)?;

        let concept_emb = if let Some(concept) = patch.concept {
            item.concept = concept;
            Some(self.embed(&item.concept)?)
        } else {
            None
        };
        let definition_emb = if let Some(definition) = patch.definition {
            item.definition = definition;
            Some(self.embed(&item.definition)?)
        } else {
            None
        };
        let details_emb = if let Some(details) = patch.details {
            item.details = details;
            Some(self.embed(&item.details)?)
        } else {
            None
        };
        if let Some(source) = patch.source {
            item.source = source;
        }
        item.updated_at = Some(Utc::now());

        self.store.update_semantic(
            &item,
            concept_emb.as_deref(),
            definition_emb.as_deref(),
            details_emb.as_deref(),
        )?;
        Ok(item)
    }

    /// Replace-set update: deletes `old_ids`, inserts `new_drafts`.
    ///
    /// Empty `new_drafts` is a pure delete. The counts are independent;
    /// this is not a one-to-one mapping.
    pub fn replace_set(
        &self,
        old_ids: &[String],
        new_drafts: Vec<SemanticItemDraft>,
    ) -> Result<Vec<SemanticItem>, MemoryError> {
        for id in old_ids {
            self.store.delete_semantic(id)?;
        }
        self.insert_many(new_drafts)
    }

    /// Hard-deletes one item.
    pub fn delete_by_id(&self, id: &str) -> Result<(), MemoryError> {
        self.store.delete_semantic(id)
    }

    /// Searches semantic memory per the common retrieval contract.
    pub fn search(
        &self,
        query: &str,
        field: SemanticField,
        method: SearchMethod,
        limit: usize,
    ) -> Result<Vec<SemanticItem>, MemoryError> {
        if query.is_empty() {
            return self.store.query_semantic(RowFilter::Recent, limit);
        }
        match method {
            SearchMethod::StringMatch => self.store.query_semantic(
                RowFilter::Contains {
                    column: field.column(),
                    needle: query,
                },
                limit,
            ),
            SearchMethod::SemanticMatch => {
                let vector = self.embed(query)?;
                self.store.query_semantic(
                    RowFilter::Nearest {
                        embedding_column: field.embedding_column(),
                        vector: &vector,
                    },
                    limit,
                )
            }
            SearchMethod::FuzzyMatch => {
                let all = self.store.query_semantic(RowFilter::All, 0)?;
                let scored = all
                    .into_iter()
                    .map(|item| {
                        let score = search::partial_ratio(query, field.text_of(&item));
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

    fn manager() -> SemanticMemoryManager {
        let store = Store::in_memory().unwrap_or_else(|e| panic!("store: {e}"));
        SemanticMemoryManager::new(store, Arc::new(HashEmbedder::default()), "org-1")
    }

    fn draft(concept: &str, definition: &str) -> SemanticItemDraft {
        SemanticItemDraft {
            concept: concept.to_string(),
            definition: definition.to_string(),
            details: String::new(),
            source: String::new(),
        }
    }

    #[test]
    fn test_insert_validates_required_fields() {
        let mgr = manager();
        assert!(matches!(
            mgr.insert(draft("concept", " ")),
            Err(MemoryError::Validation { .. })
        ));
    }

    #[test]
    fn test_replace_set_with_empty_drafts_is_delete() {
        let mgr = manager();
        let item = mgr
            .insert(draft("cat", "a small domesticated felid"))
            .unwrap_or_else(|e| panic!("insert: {e}"));

        mgr.replace_set(&[item.id.clone()], Vec::new())
            .unwrap_or_else(|e| panic!("replace: {e}"));
        assert!(matches!(
            mgr.get(&item.id),
            Err(MemoryError::NotFound { .. })
        ));
    }

    #[test]
    fn test_update_bumps_updated_at() {
        let mgr = manager();
        let item = mgr
            .insert(draft("rust", "a systems language"))
            .unwrap_or_else(|e| panic!("insert: {e}"));
        let updated = mgr
            .update(SemanticItemUpdate {
                id: item.id,
                definition: Some("a systems programming language".to_string()),
                ..SemanticItemUpdate::default()
            })
            .unwrap_or_else(|e| panic!("update: {e}"));
        assert!(updated.updated_at.is_some());
        assert_eq!(updated.definition, "a systems programming language");
    }

    #[test]
    fn test_empty_query_returns_recent() {
        let mgr = manager();
        mgr.insert(draft("one", "first")).unwrap_or_else(|e| panic!("insert: {e}"));
        mgr.insert(draft("two", "second")).unwrap_or_else(|e| panic!("insert: {e}"));

        let hits = mgr
            .search("", SemanticField::Concept, SearchMethod::SemanticMatch, 1)
            .unwrap_or_else(|e| panic!("search: {e}"));
        assert_eq!(hits.len(), 1);
    }
}
