//! Manager for core memory blocks.
//!
//! Core memory is the small always-in-context state (persona, human
//! profile) mutated by append/replace rather than insert/delete. One
//! block exists per label per agent.

use crate::error::MemoryError;
use crate::schema::CoreBlock;
use crate::store::Store;

/// Manager for core memory blocks.
#[derive(Clone)]
pub struct CoreMemoryManager {
    store: Store,
    organization_id: String,
}

impl CoreMemoryManager {
    /// Creates a manager over the shared store.
    #[must_use]
    pub fn new(store: Store, organization_id: &str) -> Self {
        Self {
            store,
            organization_id: organization_id.to_string(),
        }
    }

    /// Creates the block for `(agent_id, label)` if it does not exist.
    pub fn ensure_block(
        &self,
        agent_id: &str,
        label: &str,
        initial_value: &str,
    ) -> Result<CoreBlock, MemoryError> {
        if let Some(existing) = self.store.get_block(agent_id, label)? {
            return Ok(existing);
        }
        let block = CoreBlock::new(agent_id, &self.organization_id, label, initial_value);
        self.store.upsert_block(&block)?;
        Ok(block)
    }

    /// Fetches the block for `(agent_id, label)`.
    pub fn get_block(&self, agent_id: &str, label: &str) -> Result<CoreBlock, MemoryError> {
        self.store
            .get_block(agent_id, label)?
            .ok_or_else(|| MemoryError::NotFound {
                kind: "core block",
                id: format!("{agent_id}/{label}"),
            })
    }

    /// Lists all blocks for one agent.
    pub fn list_blocks(&self, agent_id: &str) -> Result<Vec<CoreBlock>, MemoryError> {
        self.store.list_blocks(agent_id)
    }

    /// Overwrites a block's value entirely.
    pub fn set_value(&self, agent_id: &str, label: &str, value: &str) -> Result<(), MemoryError> {
        self.store.set_block_value(agent_id, label, value)
    }

    /// Appends content to a block: new value is
    /// `old + "\n" + content`, trimmed.
    pub fn append(
        &self,
        agent_id: &str,
        label: &str,
        content: &str,
    ) -> Result<CoreBlock, MemoryError> {
        let block = self.get_block(agent_id, label)?;
        let new_value = format!("{}\n{content}", block.value).trim().to_string();
        self.store.set_block_value(agent_id, label, &new_value)?;
        self.get_block(agent_id, label)
    }

    /// Replaces `old_content` with `new_content` inside a block.
    ///
    /// `old_content` must be non-empty and an exact substring of the
    /// current value; every occurrence is replaced. Violations raise
    /// [`MemoryError::InvariantViolation`] and leave the block untouched.
    pub fn replace(
        &self,
        agent_id: &str,
        label: &str,
        old_content: &str,
        new_content: &str,
    ) -> Result<CoreBlock, MemoryError> {
        if old_content.is_empty() {
            return Err(MemoryError::InvariantViolation {
                message: format!("core_memory_replace on '{label}' requires non-empty old content"),
            });
        }
        let block = self.get_block(agent_id, label)?;
        if !block.value.contains(old_content) {
            return Err(MemoryError::InvariantViolation {
                message: format!("old content '{old_content}' not found in core block '{label}'"),
            });
        }
        let new_value = block.value.replace(old_content, new_content);
        self.store.set_block_value(agent_id, label, &new_value)?;
        self.get_block(agent_id, label)
    }
}
