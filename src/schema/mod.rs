//! Entity types for the six memory stores and their bookkeeping tables.
//!
//! Every entity shares the same spine: a prefixed string id, an owning
//! organization, UTC timestamps, and a free-form JSON metadata bag.
//! Embedding vectors are a storage concern and live in the store layer,
//! not on these structs.

pub mod cloud_file;
pub mod core_block;
pub mod episodic;
pub mod message;
pub mod procedural;
pub mod resource;
pub mod semantic;
pub mod vault;

pub use cloud_file::{CloudFileMapping, CloudFileStatus};
pub use core_block::CoreBlock;
pub use episodic::{Actor, EpisodicEvent, EpisodicEventDraft, EpisodicEventUpdate};
pub use message::MessageRecord;
pub use procedural::{ProceduralItem, ProceduralItemDraft, ProceduralItemUpdate};
pub use resource::{ResourceItem, ResourceItemDraft, ResourceItemUpdate};
pub use semantic::{SemanticItem, SemanticItemDraft, SemanticItemUpdate};
pub use vault::{KnowledgeVaultItem, KnowledgeVaultItemDraft, KnowledgeVaultItemUpdate, Sensitivity};
