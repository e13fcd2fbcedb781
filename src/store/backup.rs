//! Snapshot and restore of the store as a directory on disk.
//!
//! A snapshot is `sqlite.db` (written through the SQLite online backup
//! API, so a live connection can be copied consistently) plus
//! `agent_config.json` describing the coordinator state that is not in
//! the database.

use std::path::Path;
use std::sync::PoisonError;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use rusqlite::backup::Backup;
use serde::{Deserialize, Serialize};

use super::Store;
use crate::error::MemoryError;

/// Snapshot file name for the database.
pub const SNAPSHOT_DB_FILE: &str = "sqlite.db";
/// Snapshot file name for the coordinator state.
pub const SNAPSHOT_CONFIG_FILE: &str = "agent_config.json";

/// Coordinator state persisted beside the database snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfigSnapshot {
    /// Agent (deployment) name.
    pub agent_name: String,
    /// Chat model at snapshot time.
    pub model_name: String,
    /// Memory model at snapshot time.
    pub memory_model_name: String,
    /// Timezone string, e.g. `"America/Los_Angeles (UTC-8:00)"`.
    pub timezone_str: String,
    /// Active persona name.
    pub active_persona_name: String,
    /// Whether recent screenshots are included in chat prompts.
    pub include_recent_screenshots: bool,
    /// Whether the deployment runs as a screen monitor.
    pub is_screen_monitor: bool,
    /// Snapshot format marker (`"sqlite"`).
    pub backup_type: String,
    /// When the snapshot was taken.
    pub backup_timestamp: DateTime<Utc>,
}

impl Store {
    /// Writes a snapshot of the database into `dir/sqlite.db` and the
    /// coordinator state into `dir/agent_config.json`.
    pub fn save_to(&self, dir: &Path, config: &AgentConfigSnapshot) -> Result<(), MemoryError> {
        std::fs::create_dir_all(dir)?;

        let db_path = dir.join(SNAPSHOT_DB_FILE);
        {
            let guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
            let mut dst = Connection::open(&db_path)?;
            let backup = Backup::new(&guard, &mut dst)?;
            backup.run_to_completion(64, std::time::Duration::ZERO, None)?;
        }

        let json = serde_json::to_string_pretty(config)?;
        std::fs::write(dir.join(SNAPSHOT_CONFIG_FILE), json)?;
        Ok(())
    }

    /// Replaces the live database with the snapshot in `dir` and returns
    /// the coordinator state that was saved beside it.
    pub fn load_from(&self, dir: &Path) -> Result<AgentConfigSnapshot, MemoryError> {
        let db_path = dir.join(SNAPSHOT_DB_FILE);
        let src = Connection::open(&db_path)?;
        {
            let mut guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
            let backup = Backup::new(&src, &mut guard)?;
            backup.run_to_completion(64, std::time::Duration::ZERO, None)?;
        }

        let raw = std::fs::read_to_string(dir.join(SNAPSHOT_CONFIG_FILE))?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::schema::{EpisodicEvent, EpisodicEventDraft};

    fn snapshot_config() -> AgentConfigSnapshot {
        AgentConfigSnapshot {
            agent_name: "mirix".to_string(),
            model_name: "gpt-4o-mini".to_string(),
            memory_model_name: "gpt-4o-mini".to_string(),
            timezone_str: "UTC".to_string(),
            active_persona_name: "chill_buddy".to_string(),
            include_recent_screenshots: false,
            is_screen_monitor: false,
            backup_type: "sqlite".to_string(),
            backup_timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let source = Store::in_memory().unwrap_or_else(|e| panic!("open: {e}"));

        let ev = EpisodicEvent::from_draft(
            EpisodicEventDraft {
                occurred_at: None,
                actor: crate::schema::Actor::User,
                event_type: "activity".to_string(),
                summary: "wrote a snapshot test".to_string(),
                details: String::new(),
            },
            "org-1",
        );
        source
            .insert_episodic(&ev, &[1.0], &[])
            .unwrap_or_else(|e| panic!("insert: {e}"));
        source
            .save_to(dir.path(), &snapshot_config())
            .unwrap_or_else(|e| panic!("save: {e}"));

        let restored = Store::in_memory().unwrap_or_else(|e| panic!("open: {e}"));
        let config = restored
            .load_from(dir.path())
            .unwrap_or_else(|e| panic!("load: {e}"));
        assert_eq!(config.agent_name, "mirix");

        let loaded = restored
            .get_episodic(&ev.id)
            .unwrap_or_else(|e| panic!("get: {e}"));
        assert_eq!(loaded.map(|e| e.summary).as_deref(), Some("wrote a snapshot test"));
    }
}
