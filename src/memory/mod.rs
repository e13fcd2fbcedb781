//! The six memory managers and the shared retrieval contract.
//!
//! Each manager owns one entity type over the shared [`Store`] and the
//! shared [`Embedder`]: insert computes embeddings for the embedded
//! fields, update recomputes only what changed, delete is hard, and
//! search follows the common empty/string/fuzzy/semantic contract in
//! [`search`].
//!
//! [`Store`]: crate::store::Store
//! [`Embedder`]: crate::embedding::Embedder

pub mod core;
pub mod episodic;
pub mod procedural;
pub mod resource;
pub mod search;
pub mod semantic;
pub mod vault;

use std::sync::Arc;

pub use self::core::CoreMemoryManager;
pub use episodic::{EpisodicField, EpisodicMemoryManager};
pub use procedural::{ProceduralField, ProceduralMemoryManager};
pub use resource::{ResourceField, ResourceMemoryManager};
pub use search::SearchMethod;
pub use semantic::{SemanticField, SemanticMemoryManager};
pub use vault::{KnowledgeVaultManager, VaultField};

use crate::embedding::Embedder;
use crate::store::Store;

/// The six managers bundled behind one handle.
///
/// Cloning is cheap; all clones share the store and embedder.
#[derive(Clone)]
pub struct MemoryManagers {
    /// Episodic events.
    pub episodic: EpisodicMemoryManager,
    /// Semantic items.
    pub semantic: SemanticMemoryManager,
    /// Procedural items.
    pub procedural: ProceduralMemoryManager,
    /// Resource items.
    pub resource: ResourceMemoryManager,
    /// Knowledge-vault items.
    pub vault: KnowledgeVaultManager,
    /// Core memory blocks.
    pub core: CoreMemoryManager,
}

impl MemoryManagers {
    /// Builds all six managers over one store and embedder.
    #[must_use]
    pub fn new(store: &Store, embedder: &Arc<dyn Embedder>, organization_id: &str) -> Self {
        Self {
            episodic: EpisodicMemoryManager::new(store.clone(), Arc::clone(embedder), organization_id),
            semantic: SemanticMemoryManager::new(store.clone(), Arc::clone(embedder), organization_id),
            procedural: ProceduralMemoryManager::new(
                store.clone(),
                Arc::clone(embedder),
                organization_id,
            ),
            resource: ResourceMemoryManager::new(store.clone(), Arc::clone(embedder), organization_id),
            vault: KnowledgeVaultManager::new(store.clone(), Arc::clone(embedder), organization_id),
            core: CoreMemoryManager::new(store.clone(), organization_id),
        }
    }
}
