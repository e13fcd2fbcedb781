//! Cloud file mappings, the append-only message log, and provider keys.

use rusqlite::{Row, params};

use super::{Store, ts_from_sql, ts_to_sql};
use crate::error::MemoryError;
use crate::schema::{CloudFileMapping, CloudFileStatus, MessageRecord};

const MAPPING_COLS: &str =
    "id, organization_id, local_file_id, cloud_file_id, uri, timestamp, status, created_at";

fn map_mapping(row: &Row<'_>) -> rusqlite::Result<CloudFileMapping> {
    Ok(CloudFileMapping {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        local_file_id: row.get(2)?,
        cloud_file_id: row.get(3)?,
        uri: row.get(4)?,
        timestamp: row.get(5)?,
        status: CloudFileStatus::parse(&row.get::<_, String>(6)?),
        created_at: ts_from_sql(&row.get::<_, String>(7)?)?,
    })
}

impl Store {
    /// Persists a new cloud file mapping.
    pub fn insert_mapping(&self, mapping: &CloudFileMapping) -> Result<(), MemoryError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO cloud_file_mappings \
                 (id, organization_id, local_file_id, cloud_file_id, uri, timestamp, status, \
                  created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    mapping.id,
                    mapping.organization_id,
                    mapping.local_file_id,
                    mapping.cloud_file_id,
                    mapping.uri,
                    mapping.timestamp,
                    mapping.status.as_str(),
                    ts_to_sql(mapping.created_at),
                ],
            )?;
            Ok(())
        })
    }

    /// Most recent live mapping for a local file, if one exists.
    pub fn mapping_for_local(
        &self,
        local_file_id: &str,
    ) -> Result<Option<CloudFileMapping>, MemoryError> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MAPPING_COLS} FROM cloud_file_mappings \
                 WHERE local_file_id = ?1 AND status != 'deleted' \
                 ORDER BY created_at DESC LIMIT 1"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query_map([local_file_id], map_mapping)?;
            rows.next().transpose()
        })
    }

    /// Marks the mapping for a cloud file as `processed`.
    pub fn set_mapping_status(
        &self,
        cloud_file_id: &str,
        status: CloudFileStatus,
    ) -> Result<(), MemoryError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE cloud_file_mappings SET status = ?2 WHERE cloud_file_id = ?1",
                params![cloud_file_id, status.as_str()],
            )?;
            Ok(())
        })
    }

    /// Removes the mapping rows for a cloud file entirely.
    ///
    /// Used by startup reconciliation when the remote blob no longer
    /// exists; regular lifecycle transitions use
    /// [`Store::set_mapping_status`].
    pub fn delete_mapping(&self, cloud_file_id: &str) -> Result<(), MemoryError> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM cloud_file_mappings WHERE cloud_file_id = ?1",
                [cloud_file_id],
            )?;
            Ok(())
        })
    }

    /// Lists all mappings that have not been deleted.
    pub fn list_live_mappings(&self) -> Result<Vec<CloudFileMapping>, MemoryError> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MAPPING_COLS} FROM cloud_file_mappings \
                 WHERE status != 'deleted' ORDER BY created_at ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], map_mapping)?;
            rows.collect()
        })
    }

    /// Appends one message to the log.
    pub fn append_message(&self, record: &MessageRecord) -> Result<(), MemoryError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages \
                 (id, organization_id, agent_id, role, text, tool_calls, step_id, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.id,
                    record.organization_id,
                    record.agent_id,
                    record.role,
                    record.text,
                    record.tool_calls.as_ref().map(ToString::to_string),
                    record.step_id,
                    ts_to_sql(record.created_at),
                ],
            )?;
            Ok(())
        })
    }

    /// Most recent messages for one agent, newest last.
    pub fn messages_for_agent(
        &self,
        agent_id: &str,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, MemoryError> {
        #[allow(clippy::cast_possible_wrap)]
        let limit = limit as i64;
        let mut rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, organization_id, agent_id, role, text, tool_calls, step_id, \
                 created_at FROM messages WHERE agent_id = ?1 \
                 ORDER BY created_at DESC, id DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![agent_id, limit], |row| {
                let tool_calls: Option<String> = row.get(5)?;
                let tool_calls = tool_calls
                    .map(|raw| {
                        serde_json::from_str(&raw).map_err(|e| {
                            rusqlite::Error::FromSqlConversionFailure(
                                5,
                                rusqlite::types::Type::Text,
                                Box::new(e),
                            )
                        })
                    })
                    .transpose()?;
                Ok(MessageRecord {
                    id: row.get(0)?,
                    organization_id: row.get(1)?,
                    agent_id: row.get(2)?,
                    role: row.get(3)?,
                    text: row.get(4)?,
                    tool_calls,
                    step_id: row.get(6)?,
                    created_at: ts_from_sql(&row.get::<_, String>(7)?)?,
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })?;
        rows.reverse();
        Ok(rows)
    }

    /// Stores (or replaces) an API key for a provider.
    pub fn set_provider_key(&self, provider: &str, value: &str) -> Result<(), MemoryError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO provider_keys (provider, value) VALUES (?1, ?2) \
                 ON CONFLICT (provider) DO UPDATE SET value = ?2",
                params![provider, value],
            )?;
            Ok(())
        })
    }

    /// Fetches the stored API key for a provider, if any.
    pub fn get_provider_key(&self, provider: &str) -> Result<Option<String>, MemoryError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT value FROM provider_keys WHERE provider = ?1")?;
            let mut rows = stmt.query_map([provider], |row| row.get(0))?;
            rows.next().transpose()
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn store() -> Store {
        Store::in_memory().unwrap_or_else(|e| panic!("open failed: {e}"))
    }

    #[test]
    fn test_mapping_lifecycle() {
        let store = store();
        let m = CloudFileMapping::new("org-1", "/tmp/a.png", "files/abc", "uri://abc", "t0");
        store.insert_mapping(&m).unwrap_or_else(|e| panic!("insert: {e}"));

        let found = store
            .mapping_for_local("/tmp/a.png")
            .unwrap_or_else(|e| panic!("lookup: {e}"));
        assert_eq!(found.as_ref().map(|m| m.status), Some(CloudFileStatus::Uploaded));

        store
            .set_mapping_status("files/abc", CloudFileStatus::Processed)
            .unwrap_or_else(|e| panic!("status: {e}"));
        store
            .set_mapping_status("files/abc", CloudFileStatus::Deleted)
            .unwrap_or_else(|e| panic!("status: {e}"));
        assert!(
            store
                .mapping_for_local("/tmp/a.png")
                .unwrap_or_else(|e| panic!("lookup: {e}"))
                .is_none()
        );
    }

    #[test]
    fn test_message_log_order() {
        let store = store();
        for i in 0..3 {
            let rec = MessageRecord::new("agent-1", "org-1", "user", Some(format!("m{i}")));
            store.append_message(&rec).unwrap_or_else(|e| panic!("append: {e}"));
        }
        let msgs = store
            .messages_for_agent("agent-1", 2)
            .unwrap_or_else(|e| panic!("list: {e}"));
        assert_eq!(msgs.len(), 2);
        // Newest last, truncated from the front.
        assert_eq!(msgs[1].text.as_deref(), Some("m2"));
    }

    #[test]
    fn test_provider_key_upsert() {
        let store = store();
        store
            .set_provider_key("openai", "sk-one")
            .unwrap_or_else(|e| panic!("set: {e}"));
        store
            .set_provider_key("openai", "sk-two")
            .unwrap_or_else(|e| panic!("set: {e}"));
        let key = store
            .get_provider_key("openai")
            .unwrap_or_else(|e| panic!("get: {e}"));
        assert_eq!(key.as_deref(), Some("sk-two"));
        assert!(
            store
                .get_provider_key("gemini")
                .unwrap_or_else(|e| panic!("get: {e}"))
                .is_none()
        );
    }
}
