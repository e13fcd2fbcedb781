//! Manager for the knowledge vault.
//!
//! Vault values are stored verbatim; retrieval matches against the
//! description so that searches never need to touch secret values.

use std::sync::Arc;

use chrono::Utc;

use super::search::{self, SearchMethod};
use crate::embedding::{Embedder, pad_embedding};
use crate::error::MemoryError;
use crate::schema::{KnowledgeVaultItem, KnowledgeVaultItemDraft, KnowledgeVaultItemUpdate};
use crate::store::{RowFilter, Store};

/// Searchable fields of a vault item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VaultField {
    /// The description (default; the only embedded field).
    #[default]
    Description,
    /// The entry type.
    EntryType,
    /// The source.
    Source,
}

impl VaultField {
    /// Parses a field name; unknown values fall back to the description.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "entry_type" => Self::EntryType,
            "source" => Self::Source,
            _ => Self::Description,
        }
    }

    const fn column(self) -> &'static str {
        match self {
            Self::Description => "description",
            Self::EntryType => "entry_type",
            Self::Source => "source",
        }
    }

    fn text_of(self, item: &KnowledgeVaultItem) -> &str {
        match self {
            Self::Description => &item.description,
            Self::EntryType => &item.entry_type,
            Self::Source => &item.source,
        }
    }
}

/// Manager for knowledge-vault items.
#[derive(Clone)]
pub struct KnowledgeVaultManager {
    store: Store,
    embedder: Arc<dyn Embedder>,
    organization_id: String,
}

impl KnowledgeVaultManager {
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

    /// Inserts one vault item, embedding the description.
    pub fn insert(&self, draft: KnowledgeVaultItemDraft) -> Result<KnowledgeVaultItem, MemoryError> {
        let item = KnowledgeVaultItem::from_draft(draft, &self.organization_id);
        let description_emb = self.embed(&item.description)?;
        self.store.insert_vault(&item, &description_emb)?;
        Ok(item)
    }

    /// Inserts a batch of vault items in order.
    pub fn insert_many(
        &self,
        drafts: Vec<KnowledgeVaultItemDraft>,
    ) -> Result<Vec<KnowledgeVaultItem>, MemoryError> {
        drafts.into_iter().map(|d| self.insert(d)).collect()
    }

    /// Fetches one vault item, raising `NotFound` when absent.
    pub fn get(&self, id: &str) -> Result<KnowledgeVaultItem, MemoryError> {
        self.store
            .get_vault(id)?
            .ok_or_else(|| MemoryError::NotFound {
                kind: "knowledge vault item",
                id: id.to_string(),
            })
    }

    /// Applies a partial update, re-embedding the description if changed.
    pub fn update(&self, patch: KnowledgeVaultItemUpdate) -> Result<KnowledgeVaultItem, MemoryError> {
        let mut item = self.get(&patch.id)?;

        if let Some(entry_type) = patch.entry_type {
            item.entry_type = entry_type;
        }
        if let Some(source) = patch.source {
            item.source = source;
        }
        if let Some(sensitivity) = patch.sensitivity {
            item.sensitivity = sensitivity;
        }
        if let Some(secret_value) = patch.secret_value {
            item.secret_value = secret_value;
        }
        let description_emb = if let Some(description) = patch.description {
            item.description = description;
            Some(self.embed(&item.description)?)
        } else {
            None
        };
        item.updated_at = Some(Utc::now());

        self.store.update_vault(&item, description_emb.as_deref())?;
        Ok(item)
    }

    /// Replace-set update: deletes `old_ids`, inserts `new_drafts`.
    /// Empty `new_drafts` is a pure delete.
    pub fn replace_set(
        &self,
        old_ids: &[String],
        new_drafts: Vec<KnowledgeVaultItemDraft>,
    ) -> Result<Vec<KnowledgeVaultItem>, MemoryError> {
        for id in old_ids {
            self.store.delete_vault(id)?;
        }
        self.insert_many(new_drafts)
    }

    /// Hard-deletes one vault item.
    pub fn delete_by_id(&self, id: &str) -> Result<(), MemoryError> {
        self.store.delete_vault(id)
    }

    /// Searches the vault per the common retrieval contract.
    pub fn search(
        &self,
        query: &str,
        field: VaultField,
        method: SearchMethod,
        limit: usize,
    ) -> Result<Vec<KnowledgeVaultItem>, MemoryError> {
        if query.is_empty() {
            return self.store.query_vault(RowFilter::Recent, limit);
        }
        match method {
            SearchMethod::StringMatch => self.store.query_vault(
                RowFilter::Contains {
                    column: field.column(),
                    needle: query,
                },
                limit,
            ),
            SearchMethod::SemanticMatch => {
                let vector = self.embed(query)?;
                self.store.query_vault(
                    RowFilter::Nearest {
                        embedding_column: "description_embedding",
                        vector: &vector,
                    },
                    limit,
                )
            }
            SearchMethod::FuzzyMatch => {
                let all = self.store.query_vault(RowFilter::All, 0)?;
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
    use crate::schema::Sensitivity;

    fn manager() -> KnowledgeVaultManager {
        let store = Store::in_memory().unwrap_or_else(|e| panic!("store: {e}"));
        KnowledgeVaultManager::new(store, Arc::new(HashEmbedder::default()), "org-1")
    }

    #[test]
    fn test_secret_value_stored_verbatim() {
        let mgr = manager();
        let item = mgr
            .insert(KnowledgeVaultItemDraft {
                entry_type: "credential".to_string(),
                source: "github".to_string(),
                sensitivity: Sensitivity::High,
                secret_value: "  ghp_Token With Spaces  ".to_string(),
                description: "github personal access token".to_string(),
            })
            .unwrap_or_else(|e| panic!("insert: {e}"));

        let loaded = mgr.get(&item.id).unwrap_or_else(|e| panic!("get: {e}"));
        assert_eq!(loaded.secret_value, "  ghp_Token With Spaces  ");
        assert_eq!(loaded.sensitivity, Sensitivity::High);
    }

    #[test]
    fn test_search_matches_description_not_secret() {
        let mgr = manager();
        mgr.insert(KnowledgeVaultItemDraft {
            entry_type: "credential".to_string(),
            source: String::new(),
            sensitivity: Sensitivity::Medium,
            secret_value: "hunter2".to_string(),
            description: "forum password".to_string(),
        })
        .unwrap_or_else(|e| panic!("insert: {e}"));

        let by_description = mgr
            .search("password", VaultField::Description, SearchMethod::StringMatch, 5)
            .unwrap_or_else(|e| panic!("search: {e}"));
        assert_eq!(by_description.len(), 1);

        let by_secret = mgr
            .search("hunter2", VaultField::Description, SearchMethod::StringMatch, 5)
            .unwrap_or_else(|e| panic!("search: {e}"));
        assert!(by_secret.is_empty());
    }
}
