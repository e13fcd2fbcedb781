//! Prefixed entity identifiers.
//!
//! Every entity id is `{prefix}_{uuid}` with a per-type prefix. IDs are
//! opaque strings; the prefix exists only so humans and logs can tell
//! entity kinds apart at a glance.

use uuid::Uuid;

/// Id prefix for episodic events.
pub const EPISODIC_PREFIX: &str = "ep_mem";
/// Id prefix for semantic items.
pub const SEMANTIC_PREFIX: &str = "sem_item";
/// Id prefix for procedural items.
pub const PROCEDURAL_PREFIX: &str = "proc_item";
/// Id prefix for resource items.
pub const RESOURCE_PREFIX: &str = "res_item";
/// Id prefix for knowledge-vault items.
pub const VAULT_PREFIX: &str = "kv_item";
/// Id prefix for core memory blocks.
pub const BLOCK_PREFIX: &str = "block";
/// Id prefix for logged messages.
pub const MESSAGE_PREFIX: &str = "msg";
/// Id prefix for cloud file mappings.
pub const CLOUD_MAPPING_PREFIX: &str = "cloud_map";
/// Id prefix for agent records.
pub const AGENT_PREFIX: &str = "agent";

/// Generates a fresh id with the given prefix.
#[must_use]
pub fn generate(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4())
}

/// Returns `true` if `id` carries the given prefix.
#[must_use]
pub fn has_prefix(id: &str, prefix: &str) -> bool {
    id.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('_'))
        .is_some_and(|rest| !rest.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_carries_prefix() {
        let id = generate(EPISODIC_PREFIX);
        assert!(id.starts_with("ep_mem_"));
        assert!(has_prefix(&id, EPISODIC_PREFIX));
    }

    #[test]
    fn test_generate_is_unique() {
        assert_ne!(generate(SEMANTIC_PREFIX), generate(SEMANTIC_PREFIX));
    }

    #[test]
    fn test_has_prefix_rejects_wrong_kind() {
        let id = generate(RESOURCE_PREFIX);
        assert!(!has_prefix(&id, VAULT_PREFIX));
        assert!(!has_prefix("res_item_", RESOURCE_PREFIX));
    }
}
