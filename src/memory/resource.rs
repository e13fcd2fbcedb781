//! Manager for resource memory.

use std::sync::Arc;

use chrono::Utc;

use super::search::{self, SearchMethod};
use crate::embedding::{Embedder, pad_embedding};
use crate::error::MemoryError;
use crate::schema::{ResourceItem, ResourceItemDraft, ResourceItemUpdate};
use crate::store::{RowFilter, Store};

/// Searchable fields of a resource item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResourceField {
    /// The summary (default; the only embedded field).
    #[default]
    Summary,
    /// The title.
    Title,
    /// The full content.
    Content,
}

impl ResourceField {
    /// Parses a field name; unknown values fall back to the summary.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "title" => Self::Title,
            "content" => Self::Content,
            _ => Self::Summary,
        }
    }

    const fn column(self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Title => "title",
            Self::Content => "content",
        }
    }

    fn text_of(self, item: &ResourceItem) -> &str {
        match self {
            Self::Summary => &item.summary,
            Self::Title => &item.title,
            Self::Content => &item.content,
        }
    }
}

/// Manager for resource items.
#[derive(Clone)]
pub struct ResourceMemoryManager {
    store: Store,
    embedder: Arc<dyn Embedder>,
    organization_id: String,
}

impl ResourceMemoryManager {
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

    /// Inserts one resource, embedding the summary.
    pub fn insert(&self, draft: ResourceItemDraft) -> Result<ResourceItem, MemoryError> {
        if draft.title.trim().is_empty() {
            return Err(MemoryError::Validation {
                message: "resource item title must be non-empty".to_string(),
            });
        }
        let item = ResourceItem::from_draft(draft, &self.organization_id);
        let summary_emb = self.embed(&item.summary)?;
        self.store.insert_resource(&item, &summary_emb)?;
        Ok(item)
    }

    /// Inserts a batch of resources in order.
    pub fn insert_many(
        &self,
        drafts: Vec<ResourceItemDraft>,
    ) -> Result<Vec<ResourceItem>, MemoryError> {
        drafts.into_iter().map(|d| self.insert(d)).collect()
    }

    /// Fetches one resource, raising `NotFound` when absent.
    pub fn get(&self, id: &str) -> Result<ResourceItem, MemoryError> {
        self.store
            .get_resource(id)?
            .ok_or_else(|| MemoryError::NotFound {
                kind: "resource item",
                id: id.to_string(),
            })
    }

    /// Applies a partial update, re-embedding the summary when changed.
    pub fn update(&self, patch: ResourceItemUpdate) -> Result<ResourceItem, MemoryError> {
        let mut item = self.get(&patch.id)?;

        if let Some(title) = patch.title {
            item.title = title;
        }
        if let Some(content) = patch.content {
            item.content = content;
        }
        if let Some(resource_type) = patch.resource_type {
            item.resource_type = resource_type;
        }
        let summary_emb = if let Some(summary) = patch.summary {
            item.summary = summary;
            Some(self.embed(&item.summary)?)
        } else {
            None
        };
        item.updated_at = Some(Utc::now());

        self.store.update_resource(&item, summary_emb.as_deref())?;
        Ok(item)
    }

    /// Replace-set update: deletes `old_ids`, inserts `new_drafts`.
    /// Empty `new_drafts` is a pure delete.
    pub fn replace_set(
        &self,
        old_ids: &[String],
        new_drafts: Vec<ResourceItemDraft>,
    ) -> Result<Vec<ResourceItem>, MemoryError> {
        for id in old_ids {
            self.store.delete_resource(id)?;
        }
        self.insert_many(new_drafts)
    }

    /// Hard-deletes one resource.
    pub fn delete_by_id(&self, id: &str) -> Result<(), MemoryError> {
        self.store.delete_resource(id)
    }

    /// Searches resource memory per the common retrieval contract.
    ///
    /// Semantic search always ranks against the summary embedding, the
    /// only embedded field; string and fuzzy search honor the requested
    /// field.
    pub fn search(
        &self,
        query: &str,
        field: ResourceField,
        method: SearchMethod,
        limit: usize,
    ) -> Result<Vec<ResourceItem>, MemoryError> {
        if query.is_empty() {
            return self.store.query_resource(RowFilter::Recent, limit);
        }
        match method {
            SearchMethod::StringMatch => self.store.query_resource(
                RowFilter::Contains {
                    column: field.column(),
                    needle: query,
                },
                limit,
            ),
            SearchMethod::SemanticMatch => {
                let vector = self.embed(query)?;
                self.store.query_resource(
                    RowFilter::Nearest {
                        embedding_column: "summary_embedding",
                        vector: &vector,
                    },
                    limit,
                )
            }
            SearchMethod::FuzzyMatch => {
                let all = self.store.query_resource(RowFilter::All, 0)?;
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

    fn manager() -> ResourceMemoryManager {
        let store = Store::in_memory().unwrap_or_else(|e| panic!("store: {e}"));
        ResourceMemoryManager::new(store, Arc::new(HashEmbedder::default()), "org-1")
    }

    #[test]
    fn test_insert_requires_title() {
        let mgr = manager();
        let result = mgr.insert(ResourceItemDraft {
            title: String::new(),
            summary: "s".to_string(),
            content: String::new(),
            resource_type: "doc".to_string(),
        });
        assert!(matches!(result, Err(MemoryError::Validation { .. })));
    }

    #[test]
    fn test_search_content_field() {
        let mgr = manager();
        mgr.insert(ResourceItemDraft {
            title: "llm.py".to_string(),
            summary: "client wrapper".to_string(),
            content: "def send_message(): pass".to_string(),
            resource_type: "code".to_string(),
        })
        .unwrap_or_else(|e| panic!("insert: {e}"));

        let hits = mgr
            .search("send_message", ResourceField::Content, SearchMethod::StringMatch, 5)
            .unwrap_or_else(|e| panic!("search: {e}"));
        assert_eq!(hits.len(), 1);
    }
}
