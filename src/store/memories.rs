//! Per-entity CRUD and row queries for the six memory stores.
//!
//! Insert and update take precomputed embeddings from the managers; the
//! store never talks to an embedding provider itself. Deletes are hard:
//! reflexion merges rather than soft-deletes, so there are no tombstones.

use rusqlite::{Connection, Row, params};

use super::{RowFilter, Store, opt_ts_from_sql, ts_from_sql, ts_to_sql, vector};
use crate::error::MemoryError;
use crate::schema::{
    Actor, CoreBlock, EpisodicEvent, KnowledgeVaultItem, ProceduralItem, ResourceItem,
    SemanticItem, Sensitivity,
};

/// Row counts across all persisted tables.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct StoreStats {
    /// Episodic events.
    pub episodic: usize,
    /// Semantic items.
    pub semantic: usize,
    /// Procedural items.
    pub procedural: usize,
    /// Resource items.
    pub resource: usize,
    /// Knowledge-vault items.
    pub vault: usize,
    /// Core memory blocks.
    pub core_blocks: usize,
    /// Logged messages.
    pub messages: usize,
    /// Cloud file mappings.
    pub cloud_mappings: usize,
}

fn json_to_sql(value: &serde_json::Value) -> String {
    value.to_string()
}

fn json_from_sql(raw: &str) -> rusqlite::Result<serde_json::Value> {
    serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Builds and runs one row query for `filter` against `table`.
fn run_query<T>(
    conn: &Connection,
    table: &str,
    columns: &str,
    filter: RowFilter<'_>,
    limit: usize,
    map: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
) -> rusqlite::Result<Vec<T>> {
    #[allow(clippy::cast_possible_wrap)]
    let limit = limit as i64;
    match filter {
        RowFilter::Recent => {
            let sql = format!(
                "SELECT {columns} FROM {table} ORDER BY created_at DESC, id DESC LIMIT ?1"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([limit], map)?;
            rows.collect()
        }
        RowFilter::Contains { column, needle } => {
            let sql = format!(
                "SELECT {columns} FROM {table} \
                 WHERE instr(lower({column}), lower(?1)) > 0 \
                 ORDER BY created_at DESC, id DESC LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![needle, limit], map)?;
            rows.collect()
        }
        RowFilter::Nearest {
            embedding_column,
            vector: query_vector,
        } => {
            let blob = vector::encode_vector(query_vector);
            let sql = format!(
                "SELECT {columns} FROM {table} \
                 ORDER BY cosine_distance({embedding_column}, ?1) ASC, \
                          created_at ASC, id ASC LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![blob, limit], map)?;
            rows.collect()
        }
        RowFilter::All => {
            let sql = format!("SELECT {columns} FROM {table} ORDER BY created_at ASC, id ASC");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], map)?;
            rows.collect()
        }
    }
}

// ---------------------------------------------------------------------------
// Episodic events
// ---------------------------------------------------------------------------

const EPISODIC_COLS: &str =
    "id, organization_id, occurred_at, actor, event_type, summary, details, metadata, \
     created_at, updated_at";

fn map_episodic(row: &Row<'_>) -> rusqlite::Result<EpisodicEvent> {
    Ok(EpisodicEvent {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        occurred_at: ts_from_sql(&row.get::<_, String>(2)?)?,
        actor: Actor::parse(&row.get::<_, String>(3)?),
        event_type: row.get(4)?,
        summary: row.get(5)?,
        details: row.get(6)?,
        metadata: json_from_sql(&row.get::<_, String>(7)?)?,
        created_at: ts_from_sql(&row.get::<_, String>(8)?)?,
        updated_at: opt_ts_from_sql(row.get(9)?)?,
    })
}

impl Store {
    /// Persists a new episodic event with its field embeddings.
    pub fn insert_episodic(
        &self,
        event: &EpisodicEvent,
        summary_embedding: &[f32],
        details_embedding: &[f32],
    ) -> Result<(), MemoryError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO episodic_events \
                 (id, organization_id, occurred_at, actor, event_type, summary, details, \
                  metadata, created_at, updated_at, summary_embedding, details_embedding) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    event.id,
                    event.organization_id,
                    ts_to_sql(event.occurred_at),
                    event.actor.as_str(),
                    event.event_type,
                    event.summary,
                    event.details,
                    json_to_sql(&event.metadata),
                    ts_to_sql(event.created_at),
                    event.updated_at.map(ts_to_sql),
                    vector::encode_vector(summary_embedding),
                    vector::encode_vector(details_embedding),
                ],
            )?;
            Ok(())
        })
    }

    /// Rewrites an episodic event; embeddings only for changed fields.
    pub fn update_episodic(
        &self,
        event: &EpisodicEvent,
        summary_embedding: Option<&[f32]>,
        details_embedding: Option<&[f32]>,
    ) -> Result<(), MemoryError> {
        let changed = self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE episodic_events SET occurred_at = ?2, actor = ?3, event_type = ?4, \
                 summary = ?5, details = ?6, metadata = ?7, updated_at = ?8 WHERE id = ?1",
                params![
                    event.id,
                    ts_to_sql(event.occurred_at),
                    event.actor.as_str(),
                    event.event_type,
                    event.summary,
                    event.details,
                    json_to_sql(&event.metadata),
                    event.updated_at.map(ts_to_sql),
                ],
            )?;
            if let Some(emb) = summary_embedding {
                conn.execute(
                    "UPDATE episodic_events SET summary_embedding = ?2 WHERE id = ?1",
                    params![event.id, vector::encode_vector(emb)],
                )?;
            }
            if let Some(emb) = details_embedding {
                conn.execute(
                    "UPDATE episodic_events SET details_embedding = ?2 WHERE id = ?1",
                    params![event.id, vector::encode_vector(emb)],
                )?;
            }
            Ok(changed)
        })?;
        if changed == 0 {
            return Err(MemoryError::NotFound {
                kind: "episodic event",
                id: event.id.clone(),
            });
        }
        Ok(())
    }

    /// Fetches one episodic event by id.
    pub fn get_episodic(&self, id: &str) -> Result<Option<EpisodicEvent>, MemoryError> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {EPISODIC_COLS} FROM episodic_events WHERE id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query_map([id], map_episodic)?;
            rows.next().transpose()
        })
    }

    /// Hard-deletes one episodic event.
    pub fn delete_episodic(&self, id: &str) -> Result<(), MemoryError> {
        let changed = self.with_conn(|conn| {
            conn.execute("DELETE FROM episodic_events WHERE id = ?1", [id])
        })?;
        if changed == 0 {
            return Err(MemoryError::NotFound {
                kind: "episodic event",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Runs a row query over episodic events.
    pub fn query_episodic(
        &self,
        filter: RowFilter<'_>,
        limit: usize,
    ) -> Result<Vec<EpisodicEvent>, MemoryError> {
        self.with_conn(|conn| {
            run_query(conn, "episodic_events", EPISODIC_COLS, filter, limit, map_episodic)
        })
    }
}

// ---------------------------------------------------------------------------
// Semantic items
// ---------------------------------------------------------------------------

const SEMANTIC_COLS: &str =
    "id, organization_id, concept, definition, details, source, metadata, created_at, updated_at";

fn map_semantic(row: &Row<'_>) -> rusqlite::Result<SemanticItem> {
    Ok(SemanticItem {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        concept: row.get(2)?,
        definition: row.get(3)?,
        details: row.get(4)?,
        source: row.get(5)?,
        metadata: json_from_sql(&row.get::<_, String>(6)?)?,
        created_at: ts_from_sql(&row.get::<_, String>(7)?)?,
        updated_at: opt_ts_from_sql(row.get(8)?)?,
    })
}

impl Store {
    /// Persists a new semantic item with its field embeddings.
    pub fn insert_semantic(
        &self,
        item: &SemanticItem,
        concept_embedding: &[f32],
        definition_embedding: &[f32],
        details_embedding: &[f32],
    ) -> Result<(), MemoryError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO semantic_items \
                 (id, organization_id, concept, definition, details, source, metadata, \
                  created_at, updated_at, concept_embedding, definition_embedding, \
                  details_embedding) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    item.id,
                    item.organization_id,
                    item.concept,
                    item.definition,
                    item.details,
                    item.source,
                    json_to_sql(&item.metadata),
                    ts_to_sql(item.created_at),
                    item.updated_at.map(ts_to_sql),
                    vector::encode_vector(concept_embedding),
                    vector::encode_vector(definition_embedding),
                    vector::encode_vector(details_embedding),
                ],
            )?;
            Ok(())
        })
    }

    /// Rewrites a semantic item; embeddings only for changed fields.
    pub fn update_semantic(
        &self,
        item: &SemanticItem,
        concept_embedding: Option<&[f32]>,
        definition_embedding: Option<&[f32]>,
        details_embedding: Option<&[f32]>,
    ) -> Result<(), MemoryError> {
        let changed = self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE semantic_items SET concept = ?2, definition = ?3, details = ?4, \
                 source = ?5, metadata = ?6, updated_at = ?7 WHERE id = ?1",
                params![
                    item.id,
                    item.concept,
                    item.definition,
                    item.details,
                    item.source,
                    json_to_sql(&item.metadata),
                    item.updated_at.map(ts_to_sql),
                ],
            )?;
            for (column, emb) in [
                ("concept_embedding", concept_embedding),
                ("definition_embedding", definition_embedding),
                ("details_embedding", details_embedding),
            ] {
                if let Some(emb) = emb {
                    let sql = format!("UPDATE semantic_items SET {column} = ?2 WHERE id = ?1");
                    conn.execute(&sql, params![item.id, vector::encode_vector(emb)])?;
                }
            }
            Ok(changed)
        })?;
        if changed == 0 {
            return Err(MemoryError::NotFound {
                kind: "semantic item",
                id: item.id.clone(),
            });
        }
        Ok(())
    }

    /// Fetches one semantic item by id.
    pub fn get_semantic(&self, id: &str) -> Result<Option<SemanticItem>, MemoryError> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {SEMANTIC_COLS} FROM semantic_items WHERE id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query_map([id], map_semantic)?;
            rows.next().transpose()
        })
    }

    /// Hard-deletes one semantic item.
    pub fn delete_semantic(&self, id: &str) -> Result<(), MemoryError> {
        let changed = self
            .with_conn(|conn| conn.execute("DELETE FROM semantic_items WHERE id = ?1", [id]))?;
        if changed == 0 {
            return Err(MemoryError::NotFound {
                kind: "semantic item",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Runs a row query over semantic items.
    pub fn query_semantic(
        &self,
        filter: RowFilter<'_>,
        limit: usize,
    ) -> Result<Vec<SemanticItem>, MemoryError> {
        self.with_conn(|conn| {
            run_query(conn, "semantic_items", SEMANTIC_COLS, filter, limit, map_semantic)
        })
    }
}

// ---------------------------------------------------------------------------
// Procedural items
// ---------------------------------------------------------------------------

const PROCEDURAL_COLS: &str =
    "id, organization_id, entry_type, description, steps, metadata, created_at, updated_at";

fn map_procedural(row: &Row<'_>) -> rusqlite::Result<ProceduralItem> {
    let steps_raw: String = row.get(4)?;
    let steps: Vec<String> = serde_json::from_str(&steps_raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(ProceduralItem {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        entry_type: row.get(2)?,
        description: row.get(3)?,
        steps,
        metadata: json_from_sql(&row.get::<_, String>(5)?)?,
        created_at: ts_from_sql(&row.get::<_, String>(6)?)?,
        updated_at: opt_ts_from_sql(row.get(7)?)?,
    })
}

impl Store {
    /// Persists a new procedural item with its field embeddings.
    pub fn insert_procedural(
        &self,
        item: &ProceduralItem,
        description_embedding: &[f32],
        steps_embedding: &[f32],
    ) -> Result<(), MemoryError> {
        let steps_json = serde_json::to_string(&item.steps)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO procedural_items \
                 (id, organization_id, entry_type, description, steps, metadata, created_at, \
                  updated_at, description_embedding, steps_embedding) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    item.id,
                    item.organization_id,
                    item.entry_type,
                    item.description,
                    steps_json,
                    json_to_sql(&item.metadata),
                    ts_to_sql(item.created_at),
                    item.updated_at.map(ts_to_sql),
                    vector::encode_vector(description_embedding),
                    vector::encode_vector(steps_embedding),
                ],
            )?;
            Ok(())
        })
    }

    /// Rewrites a procedural item; embeddings only for changed fields.
    pub fn update_procedural(
        &self,
        item: &ProceduralItem,
        description_embedding: Option<&[f32]>,
        steps_embedding: Option<&[f32]>,
    ) -> Result<(), MemoryError> {
        let steps_json = serde_json::to_string(&item.steps)?;
        let changed = self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE procedural_items SET entry_type = ?2, description = ?3, steps = ?4, \
                 metadata = ?5, updated_at = ?6 WHERE id = ?1",
                params![
                    item.id,
                    item.entry_type,
                    item.description,
                    steps_json,
                    json_to_sql(&item.metadata),
                    item.updated_at.map(ts_to_sql),
                ],
            )?;
            if let Some(emb) = description_embedding {
                conn.execute(
                    "UPDATE procedural_items SET description_embedding = ?2 WHERE id = ?1",
                    params![item.id, vector::encode_vector(emb)],
                )?;
            }
            if let Some(emb) = steps_embedding {
                conn.execute(
                    "UPDATE procedural_items SET steps_embedding = ?2 WHERE id = ?1",
                    params![item.id, vector::encode_vector(emb)],
                )?;
            }
            Ok(changed)
        })?;
        if changed == 0 {
            return Err(MemoryError::NotFound {
                kind: "procedural item",
                id: item.id.clone(),
            });
        }
        Ok(())
    }

    /// Fetches one procedural item by id.
    pub fn get_procedural(&self, id: &str) -> Result<Option<ProceduralItem>, MemoryError> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {PROCEDURAL_COLS} FROM procedural_items WHERE id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query_map([id], map_procedural)?;
            rows.next().transpose()
        })
    }

    /// Hard-deletes one procedural item.
    pub fn delete_procedural(&self, id: &str) -> Result<(), MemoryError> {
        let changed = self
            .with_conn(|conn| conn.execute("DELETE FROM procedural_items WHERE id = ?1", [id]))?;
        if changed == 0 {
            return Err(MemoryError::NotFound {
                kind: "procedural item",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Runs a row query over procedural items.
    pub fn query_procedural(
        &self,
        filter: RowFilter<'_>,
        limit: usize,
    ) -> Result<Vec<ProceduralItem>, MemoryError> {
        self.with_conn(|conn| {
            run_query(
                conn,
                "procedural_items",
                PROCEDURAL_COLS,
                filter,
                limit,
                map_procedural,
            )
        })
    }
}

// ---------------------------------------------------------------------------
// Resource items
// ---------------------------------------------------------------------------

const RESOURCE_COLS: &str =
    "id, organization_id, title, summary, content, resource_type, metadata, created_at, \
     updated_at";

fn map_resource(row: &Row<'_>) -> rusqlite::Result<ResourceItem> {
    Ok(ResourceItem {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        title: row.get(2)?,
        summary: row.get(3)?,
        content: row.get(4)?,
        resource_type: row.get(5)?,
        metadata: json_from_sql(&row.get::<_, String>(6)?)?,
        created_at: ts_from_sql(&row.get::<_, String>(7)?)?,
        updated_at: opt_ts_from_sql(row.get(8)?)?,
    })
}

impl Store {
    /// Persists a new resource item with its summary embedding.
    pub fn insert_resource(
        &self,
        item: &ResourceItem,
        summary_embedding: &[f32],
    ) -> Result<(), MemoryError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO resource_items \
                 (id, organization_id, title, summary, content, resource_type, metadata, \
                  created_at, updated_at, summary_embedding) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    item.id,
                    item.organization_id,
                    item.title,
                    item.summary,
                    item.content,
                    item.resource_type,
                    json_to_sql(&item.metadata),
                    ts_to_sql(item.created_at),
                    item.updated_at.map(ts_to_sql),
                    vector::encode_vector(summary_embedding),
                ],
            )?;
            Ok(())
        })
    }

    /// Rewrites a resource item; the embedding only when summary changed.
    pub fn update_resource(
        &self,
        item: &ResourceItem,
        summary_embedding: Option<&[f32]>,
    ) -> Result<(), MemoryError> {
        let changed = self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE resource_items SET title = ?2, summary = ?3, content = ?4, \
                 resource_type = ?5, metadata = ?6, updated_at = ?7 WHERE id = ?1",
                params![
                    item.id,
                    item.title,
                    item.summary,
                    item.content,
                    item.resource_type,
                    json_to_sql(&item.metadata),
                    item.updated_at.map(ts_to_sql),
                ],
            )?;
            if let Some(emb) = summary_embedding {
                conn.execute(
                    "UPDATE resource_items SET summary_embedding = ?2 WHERE id = ?1",
                    params![item.id, vector::encode_vector(emb)],
                )?;
            }
            Ok(changed)
        })?;
        if changed == 0 {
            return Err(MemoryError::NotFound {
                kind: "resource item",
                id: item.id.clone(),
            });
        }
        Ok(())
    }

    /// Fetches one resource item by id.
    pub fn get_resource(&self, id: &str) -> Result<Option<ResourceItem>, MemoryError> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {RESOURCE_COLS} FROM resource_items WHERE id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query_map([id], map_resource)?;
            rows.next().transpose()
        })
    }

    /// Hard-deletes one resource item.
    pub fn delete_resource(&self, id: &str) -> Result<(), MemoryError> {
        let changed = self
            .with_conn(|conn| conn.execute("DELETE FROM resource_items WHERE id = ?1", [id]))?;
        if changed == 0 {
            return Err(MemoryError::NotFound {
                kind: "resource item",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Runs a row query over resource items.
    pub fn query_resource(
        &self,
        filter: RowFilter<'_>,
        limit: usize,
    ) -> Result<Vec<ResourceItem>, MemoryError> {
        self.with_conn(|conn| {
            run_query(conn, "resource_items", RESOURCE_COLS, filter, limit, map_resource)
        })
    }
}

// ---------------------------------------------------------------------------
// Knowledge-vault items
// ---------------------------------------------------------------------------

const VAULT_COLS: &str =
    "id, organization_id, entry_type, source, sensitivity, secret_value, description, \
     metadata, created_at, updated_at";

fn map_vault(row: &Row<'_>) -> rusqlite::Result<KnowledgeVaultItem> {
    Ok(KnowledgeVaultItem {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        entry_type: row.get(2)?,
        source: row.get(3)?,
        sensitivity: Sensitivity::parse(&row.get::<_, String>(4)?),
        secret_value: row.get(5)?,
        description: row.get(6)?,
        metadata: json_from_sql(&row.get::<_, String>(7)?)?,
        created_at: ts_from_sql(&row.get::<_, String>(8)?)?,
        updated_at: opt_ts_from_sql(row.get(9)?)?,
    })
}

impl Store {
    /// Persists a new vault item with its description embedding.
    pub fn insert_vault(
        &self,
        item: &KnowledgeVaultItem,
        description_embedding: &[f32],
    ) -> Result<(), MemoryError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO vault_items \
                 (id, organization_id, entry_type, source, sensitivity, secret_value, \
                  description, metadata, created_at, updated_at, description_embedding) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    item.id,
                    item.organization_id,
                    item.entry_type,
                    item.source,
                    item.sensitivity.as_str(),
                    item.secret_value,
                    item.description,
                    json_to_sql(&item.metadata),
                    ts_to_sql(item.created_at),
                    item.updated_at.map(ts_to_sql),
                    vector::encode_vector(description_embedding),
                ],
            )?;
            Ok(())
        })
    }

    /// Rewrites a vault item; the embedding only when description changed.
    pub fn update_vault(
        &self,
        item: &KnowledgeVaultItem,
        description_embedding: Option<&[f32]>,
    ) -> Result<(), MemoryError> {
        let changed = self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE vault_items SET entry_type = ?2, source = ?3, sensitivity = ?4, \
                 secret_value = ?5, description = ?6, metadata = ?7, updated_at = ?8 \
                 WHERE id = ?1",
                params![
                    item.id,
                    item.entry_type,
                    item.source,
                    item.sensitivity.as_str(),
                    item.secret_value,
                    item.description,
                    json_to_sql(&item.metadata),
                    item.updated_at.map(ts_to_sql),
                ],
            )?;
            if let Some(emb) = description_embedding {
                conn.execute(
                    "UPDATE vault_items SET description_embedding = ?2 WHERE id = ?1",
                    params![item.id, vector::encode_vector(emb)],
                )?;
            }
            Ok(changed)
        })?;
        if changed == 0 {
            return Err(MemoryError::NotFound {
                kind: "knowledge vault item",
                id: item.id.clone(),
            });
        }
        Ok(())
    }

    /// Fetches one vault item by id.
    pub fn get_vault(&self, id: &str) -> Result<Option<KnowledgeVaultItem>, MemoryError> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {VAULT_COLS} FROM vault_items WHERE id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query_map([id], map_vault)?;
            rows.next().transpose()
        })
    }

    /// Hard-deletes one vault item.
    pub fn delete_vault(&self, id: &str) -> Result<(), MemoryError> {
        let changed =
            self.with_conn(|conn| conn.execute("DELETE FROM vault_items WHERE id = ?1", [id]))?;
        if changed == 0 {
            return Err(MemoryError::NotFound {
                kind: "knowledge vault item",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Runs a row query over vault items.
    pub fn query_vault(
        &self,
        filter: RowFilter<'_>,
        limit: usize,
    ) -> Result<Vec<KnowledgeVaultItem>, MemoryError> {
        self.with_conn(|conn| run_query(conn, "vault_items", VAULT_COLS, filter, limit, map_vault))
    }
}

// ---------------------------------------------------------------------------
// Core blocks
// ---------------------------------------------------------------------------

const BLOCK_COLS: &str = "id, organization_id, agent_id, label, value, created_at, updated_at";

fn map_block(row: &Row<'_>) -> rusqlite::Result<CoreBlock> {
    Ok(CoreBlock {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        agent_id: row.get(2)?,
        label: row.get(3)?,
        value: row.get(4)?,
        created_at: ts_from_sql(&row.get::<_, String>(5)?)?,
        updated_at: opt_ts_from_sql(row.get(6)?)?,
    })
}

impl Store {
    /// Creates or replaces the block for `(agent_id, label)`.
    pub fn upsert_block(&self, block: &CoreBlock) -> Result<(), MemoryError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO core_blocks \
                 (id, organization_id, agent_id, label, value, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
                 ON CONFLICT (agent_id, label) DO UPDATE SET value = ?5, updated_at = ?7",
                params![
                    block.id,
                    block.organization_id,
                    block.agent_id,
                    block.label,
                    block.value,
                    ts_to_sql(block.created_at),
                    block.updated_at.map(ts_to_sql),
                ],
            )?;
            Ok(())
        })
    }

    /// Fetches the block for `(agent_id, label)`.
    pub fn get_block(&self, agent_id: &str, label: &str) -> Result<Option<CoreBlock>, MemoryError> {
        self.with_conn(|conn| {
            let sql =
                format!("SELECT {BLOCK_COLS} FROM core_blocks WHERE agent_id = ?1 AND label = ?2");
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query_map([agent_id, label], map_block)?;
            rows.next().transpose()
        })
    }

    /// Overwrites a block's value and bumps its update time.
    pub fn set_block_value(&self, agent_id: &str, label: &str, value: &str) -> Result<(), MemoryError> {
        let changed = self.with_conn(|conn| {
            conn.execute(
                "UPDATE core_blocks SET value = ?3, updated_at = ?4 \
                 WHERE agent_id = ?1 AND label = ?2",
                params![agent_id, label, value, ts_to_sql(chrono::Utc::now())],
            )
        })?;
        if changed == 0 {
            return Err(MemoryError::NotFound {
                kind: "core block",
                id: format!("{agent_id}/{label}"),
            });
        }
        Ok(())
    }

    /// Lists all blocks for one agent, ordered by label.
    pub fn list_blocks(&self, agent_id: &str) -> Result<Vec<CoreBlock>, MemoryError> {
        self.with_conn(|conn| {
            let sql =
                format!("SELECT {BLOCK_COLS} FROM core_blocks WHERE agent_id = ?1 ORDER BY label");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([agent_id], map_block)?;
            rows.collect()
        })
    }

    /// Row counts across all tables.
    pub fn stats(&self) -> Result<StoreStats, MemoryError> {
        self.with_conn(|conn| {
            let count = |table: &str| -> rusqlite::Result<usize> {
                let sql = format!("SELECT COUNT(*) FROM {table}");
                let n: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
                #[allow(clippy::cast_sign_loss)]
                Ok(n as usize)
            };
            Ok(StoreStats {
                episodic: count("episodic_events")?,
                semantic: count("semantic_items")?,
                procedural: count("procedural_items")?,
                resource: count("resource_items")?,
                vault: count("vault_items")?,
                core_blocks: count("core_blocks")?,
                messages: count("messages")?,
                cloud_mappings: count("cloud_file_mappings")?,
            })
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::schema::{EpisodicEventDraft, SemanticItemDraft};

    fn store() -> Store {
        Store::in_memory().unwrap_or_else(|e| panic!("open failed: {e}"))
    }

    fn event(summary: &str) -> EpisodicEvent {
        EpisodicEvent::from_draft(
            EpisodicEventDraft {
                occurred_at: None,
                actor: Actor::User,
                event_type: "activity".to_string(),
                summary: summary.to_string(),
                details: String::new(),
            },
            "org-1",
        )
    }

    #[test]
    fn test_episodic_insert_get_delete() {
        let store = store();
        let ev = event("user opened terminal");
        store
            .insert_episodic(&ev, &[1.0, 0.0], &[0.0, 1.0])
            .unwrap_or_else(|e| panic!("insert failed: {e}"));

        let loaded = store
            .get_episodic(&ev.id)
            .unwrap_or_else(|e| panic!("get failed: {e}"));
        assert_eq!(loaded.map(|e| e.summary).as_deref(), Some("user opened terminal"));

        store
            .delete_episodic(&ev.id)
            .unwrap_or_else(|e| panic!("delete failed: {e}"));
        assert!(matches!(
            store.delete_episodic(&ev.id),
            Err(MemoryError::NotFound { .. })
        ));
    }

    #[test]
    fn test_contains_filter_is_case_insensitive() {
        let store = store();
        let ev = event("Opened the Terminal");
        store
            .insert_episodic(&ev, &[], &[])
            .unwrap_or_else(|e| panic!("insert failed: {e}"));

        let hits = store
            .query_episodic(
                RowFilter::Contains {
                    column: "summary",
                    needle: "terminal",
                },
                10,
            )
            .unwrap_or_else(|e| panic!("query failed: {e}"));
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_nearest_filter_orders_by_cosine() {
        let store = store();
        for (concept, vec) in [("cat", [1.0f32, 0.0]), ("galaxy", [0.0, 1.0])] {
            let item = SemanticItem::from_draft(
                SemanticItemDraft {
                    concept: concept.to_string(),
                    definition: "d".to_string(),
                    details: String::new(),
                    source: String::new(),
                },
                "org-1",
            );
            store
                .insert_semantic(&item, &vec, &[], &[])
                .unwrap_or_else(|e| panic!("insert failed: {e}"));
        }

        let hits = store
            .query_semantic(
                RowFilter::Nearest {
                    embedding_column: "concept_embedding",
                    vector: &[0.9, 0.1],
                },
                1,
            )
            .unwrap_or_else(|e| panic!("query failed: {e}"));
        assert_eq!(hits.first().map(|i| i.concept.as_str()), Some("cat"));
    }

    #[test]
    fn test_block_upsert_is_one_per_label() {
        let store = store();
        let a = CoreBlock::new("agent-1", "org-1", "persona", "helpful assistant");
        store.upsert_block(&a).unwrap_or_else(|e| panic!("upsert: {e}"));
        let b = CoreBlock::new("agent-1", "org-1", "persona", "terse assistant");
        store.upsert_block(&b).unwrap_or_else(|e| panic!("upsert: {e}"));

        let loaded = store
            .get_block("agent-1", "persona")
            .unwrap_or_else(|e| panic!("get: {e}"));
        assert_eq!(loaded.map(|b| b.value).as_deref(), Some("terse assistant"));
        let stats = store.stats().unwrap_or_else(|e| panic!("stats: {e}"));
        assert_eq!(stats.core_blocks, 1);
    }
}
