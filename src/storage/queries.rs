//! CRUD and lifecycle queries over the `memories` table and its
//! satellite tables (entities, relationships, memory_entities, memory_links,
//! embeddings).

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use sha2::{Digest, Sha256};

use crate::error::{MementoError, Result};
use crate::types::*;

/// Parse a `Memory` from a `memories` row.
pub fn memory_from_row(row: &Row) -> rusqlite::Result<Memory> {
    let tags_json: String = row.get("tags")?;
    let metadata_json: String = row.get("metadata")?;
    let keywords_json: String = row.get("keywords")?;
    let source_context_json: Option<String> = row.get("source_context")?;

    Ok(Memory {
        id: row.get("id")?,
        content: row.get("content")?,
        content_hash: row.get("content_hash")?,
        domain: row.get("domain")?,
        source: row.get("source")?,
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
        keywords: serde_json::from_str(&keywords_json).unwrap_or_default(),

        status: parse_status(row.get("status")?),
        entity_status: parse_status(row.get("entity_status")?),
        relationship_status: parse_status(row.get("relationship_status")?),
        embedding_status: parse_status(row.get("embedding_status")?),
        classification_status: parse_status(row.get("classification_status")?),
        summarization_status: parse_status(row.get("summarization_status")?),
        enrichment_attempts: row.get("enrichment_attempts")?,
        enrichment_error: row.get("enrichment_error")?,

        state: parse_state(row.get("state")?),
        state_updated_at: parse_ts_opt(row.get("state_updated_at")?),

        memory_type: row
            .get::<_, String>("memory_type")?
            .parse()
            .unwrap_or_default(),
        supersedes_id: row.get("supersedes_id")?,

        created_by: row.get("created_by")?,
        session_id: row.get("session_id")?,
        source_context: source_context_json.and_then(|s| serde_json::from_str(&s).ok()),

        access_count: row.get("access_count")?,
        last_accessed_at: parse_ts_opt(row.get("last_accessed_at")?),
        decay_score: row.get("decay_score")?,
        decay_updated_at: parse_ts_opt(row.get("decay_updated_at")?),

        created_at: parse_ts(row.get("created_at")?),
        updated_at: parse_ts(row.get("updated_at")?),
        timestamp: parse_ts(row.get("timestamp")?),
        enriched_at: parse_ts_opt(row.get("enriched_at")?),
        deleted_at: parse_ts_opt(row.get("deleted_at")?),
    })
}

fn parse_status(s: String) -> EnrichmentStatus {
    s.parse().unwrap_or_default()
}

fn parse_state(s: String) -> MemoryState {
    s.parse().unwrap_or_default()
}

fn parse_ts(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_ts_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}

/// `SHA-256(content)` as a lowercase hex string.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Derive the deterministic id `mem:<domain>:<16-hex>` from content.
pub fn derive_id(domain: &str, content: &str) -> String {
    let hash = content_hash(content);
    format!("mem:{}:{}", domain, &hash[..16])
}

pub(crate) const MEMORY_COLUMNS: &str = "id, content, content_hash, domain, source, tags, metadata, keywords, \
     status, entity_status, relationship_status, embedding_status, classification_status, summarization_status, \
     enrichment_attempts, enrichment_error, state, state_updated_at, memory_type, supersedes_id, \
     created_by, session_id, source_context, access_count, last_accessed_at, decay_score, decay_updated_at, \
     created_at, updated_at, timestamp, enriched_at, deleted_at";

/// Outcome of `store`: whether this call created a brand-new row or found
/// an existing one with the same id (dedupe happens at the application
/// layer — storage merely upserts).
#[derive(Debug)]
pub struct StoreOutcome {
    pub memory: Memory,
    pub duplicate: bool,
    pub existing_id: Option<String>,
}

/// `store` — upsert on `id`. Dedupe detection (not prevention) happens here:
/// if a row with this id already exists, it is reported as a duplicate but
/// still overwritten (content may legitimately change on re-upsert).
pub fn store_memory(conn: &Connection, input: &CreateMemoryInput) -> Result<StoreOutcome> {
    let domain = input
        .domain
        .clone()
        .unwrap_or_else(|| PRIMARY_CONNECTION.to_string());
    let id = derive_id(&domain, &input.content);
    let hash = content_hash(&input.content);

    if let Some(ctx) = &input.source_context {
        let size = serde_json::to_vec(ctx)?.len();
        if size > MAX_SOURCE_CONTEXT_BYTES {
            return Err(MementoError::InvalidInput(format!(
                "source_context serialized size {size} exceeds {MAX_SOURCE_CONTEXT_BYTES} bytes"
            )));
        }
    }

    let existing = get_memory_raw(conn, &id)?;
    let duplicate = existing.is_some();

    let mut tags = input.tags.clone();
    tags.sort();
    tags.dedup();

    let metadata_json = serde_json::to_string(&input.metadata)?;
    let tags_json = serde_json::to_string(&tags)?;
    let keywords_json = serde_json::to_string(&input.keywords)?;
    let source_context_json = input
        .source_context
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    let now = Utc::now().to_rfc3339();

    conn.execute(
        r#"
        INSERT INTO memories (
            id, content, content_hash, domain, source, tags, metadata, keywords,
            memory_type, created_by, session_id, source_context,
            created_at, updated_at, timestamp
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13, ?13)
        ON CONFLICT(id) DO UPDATE SET
            content = excluded.content,
            content_hash = excluded.content_hash,
            source = excluded.source,
            tags = excluded.tags,
            metadata = excluded.metadata,
            keywords = excluded.keywords,
            updated_at = excluded.updated_at
        "#,
        params![
            id,
            input.content,
            hash,
            domain,
            input.source,
            tags_json,
            metadata_json,
            keywords_json,
            input.memory_type.as_str(),
            input.created_by,
            input.session_id,
            source_context_json,
            now,
        ],
    )?;

    let memory = get_memory_raw(conn, &id)?.ok_or_else(|| {
        MementoError::Internal("memory vanished immediately after store".to_string())
    })?;

    Ok(StoreOutcome {
        memory,
        duplicate,
        existing_id: existing.map(|m| m.id),
    })
}

/// Fetch a row regardless of soft-delete state (internal helper; `get`
/// additionally excludes soft-deleted rows).
fn get_memory_raw(conn: &Connection, id: &str) -> Result<Option<Memory>> {
    let sql = format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1");
    conn.query_row(&sql, params![id], memory_from_row)
        .optional()
        .map_err(MementoError::from)
}

/// `get` — excludes soft-deleted rows (invariant 2).
pub fn get_memory(conn: &Connection, id: &str) -> Result<Option<Memory>> {
    let sql = format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1 AND deleted_at IS NULL");
    conn.query_row(&sql, params![id], memory_from_row)
        .optional()
        .map_err(MementoError::from)
}

/// `update` — `get` then `store` semantics: fails if the prior row is
/// missing; only the fields present in `input` are changed.
pub fn update_memory(conn: &Connection, id: &str, input: &UpdateMemoryInput) -> Result<Memory> {
    let existing = get_memory(conn, id)?.ok_or_else(|| MementoError::NotFound(id.to_string()))?;

    let content = input.content.clone().unwrap_or(existing.content);
    let mut tags = input.tags.clone().unwrap_or(existing.tags);
    tags.sort();
    tags.dedup();
    let metadata = input.metadata.clone().unwrap_or(existing.metadata);
    let keywords = input.keywords.clone().unwrap_or(existing.keywords);

    let hash = content_hash(&content);
    let tags_json = serde_json::to_string(&tags)?;
    let metadata_json = serde_json::to_string(&metadata)?;
    let keywords_json = serde_json::to_string(&keywords)?;
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "UPDATE memories SET content = ?1, content_hash = ?2, tags = ?3, metadata = ?4, \
         keywords = ?5, updated_at = ?6 WHERE id = ?7",
        params![
            content,
            hash,
            tags_json,
            metadata_json,
            keywords_json,
            now,
            id
        ],
    )?;

    get_memory(conn, id)?.ok_or_else(|| MementoError::NotFound(id.to_string()))
}

/// `delete` (soft) — conditional UPDATE setting `deleted_at`. A no-op on an
/// already-deleted or missing row returns `NotFound`.
pub fn delete_memory(conn: &Connection, id: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let rows = conn.execute(
        "UPDATE memories SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
        params![now, id],
    )?;
    if rows == 0 {
        return Err(MementoError::NotFound(id.to_string()));
    }
    Ok(())
}

/// `restore` — clears `deleted_at`. A no-op on a not-deleted or missing row
/// returns `NotFound`.
pub fn restore_memory(conn: &Connection, id: &str) -> Result<()> {
    let rows = conn.execute(
        "UPDATE memories SET deleted_at = NULL WHERE id = ?1 AND deleted_at IS NOT NULL",
        params![id],
    )?;
    if rows == 0 {
        return Err(MementoError::NotFound(id.to_string()));
    }
    Ok(())
}

/// `purge` (hard) — removes the row; junction rows (memory_entities,
/// memory_links, embeddings) cascade via foreign keys.
pub fn purge_memory(conn: &Connection, id: &str) -> Result<()> {
    let rows = conn.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
    if rows == 0 {
        return Err(MementoError::NotFound(id.to_string()));
    }
    Ok(())
}

/// `update_status` — set the overall enrichment `status`.
pub fn update_status(conn: &Connection, id: &str, status: EnrichmentStatus) -> Result<()> {
    let rows = conn.execute(
        "UPDATE memories SET status = ?1, updated_at = ?2 WHERE id = ?3 AND deleted_at IS NULL",
        params![status.as_str(), Utc::now().to_rfc3339(), id],
    )?;
    if rows == 0 {
        return Err(MementoError::NotFound(id.to_string()));
    }
    Ok(())
}

/// A single per-stage enrichment update. Unset fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentUpdate {
    pub entity_status: Option<EnrichmentStatus>,
    pub relationship_status: Option<EnrichmentStatus>,
    pub embedding_status: Option<EnrichmentStatus>,
    pub classification_status: Option<EnrichmentStatus>,
    pub summarization_status: Option<EnrichmentStatus>,
    pub enrichment_error: Option<String>,
    pub mark_enriched_now: bool,
    pub increment_attempts: bool,
}

/// `update_enrichment` — writes the per-stage progress columns in a single
/// statement; when every stage reaches a terminal status, bumps the overall
/// `status` accordingly.
pub fn update_enrichment(conn: &Connection, id: &str, update: &EnrichmentUpdate) -> Result<Memory> {
    let existing = get_memory(conn, id)?.ok_or_else(|| MementoError::NotFound(id.to_string()))?;

    let entity_status = update.entity_status.unwrap_or(existing.entity_status);
    let relationship_status = update
        .relationship_status
        .unwrap_or(existing.relationship_status);
    let embedding_status = update.embedding_status.unwrap_or(existing.embedding_status);
    let classification_status = update
        .classification_status
        .unwrap_or(existing.classification_status);
    let summarization_status = update
        .summarization_status
        .unwrap_or(existing.summarization_status);

    let attempts = if update.increment_attempts {
        existing.enrichment_attempts + 1
    } else {
        existing.enrichment_attempts
    };

    let all_enriched = [
        entity_status,
        relationship_status,
        embedding_status,
        classification_status,
        summarization_status,
    ]
    .iter()
    .all(|s| *s == EnrichmentStatus::Enriched);
    let any_failed = [
        entity_status,
        relationship_status,
        embedding_status,
        classification_status,
        summarization_status,
    ]
    .iter()
    .any(|s| *s == EnrichmentStatus::Failed);

    let overall_status = if all_enriched {
        EnrichmentStatus::Enriched
    } else if any_failed {
        EnrichmentStatus::Failed
    } else {
        existing.status
    };

    let now = Utc::now().to_rfc3339();
    let enriched_at = if update.mark_enriched_now {
        Some(now.clone())
    } else {
        existing.enriched_at.map(|dt| dt.to_rfc3339())
    };

    conn.execute(
        "UPDATE memories SET entity_status = ?1, relationship_status = ?2, embedding_status = ?3, \
         classification_status = ?4, summarization_status = ?5, status = ?6, enrichment_attempts = ?7, \
         enrichment_error = ?8, enriched_at = ?9, updated_at = ?10 WHERE id = ?11",
        params![
            entity_status.as_str(),
            relationship_status.as_str(),
            embedding_status.as_str(),
            classification_status.as_str(),
            summarization_status.as_str(),
            overall_status.as_str(),
            attempts,
            update.enrichment_error.clone().or(existing.enrichment_error),
            enriched_at,
            now,
            id,
        ],
    )?;

    get_memory(conn, id)?.ok_or_else(|| MementoError::NotFound(id.to_string()))
}

/// `update_state` — reads current state, validates the transition against
/// `crate::lifecycle::transition`, writes new state and `state_updated_at`
/// in a single transaction.
pub fn update_state(conn: &Connection, id: &str, new_state: MemoryState) -> Result<Memory> {
    let existing = get_memory(conn, id)?.ok_or_else(|| MementoError::NotFound(id.to_string()))?;
    crate::lifecycle::validate_transition(existing.state, new_state)?;

    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE memories SET state = ?1, state_updated_at = ?2, updated_at = ?2 WHERE id = ?3",
        params![new_state.as_str(), now, id],
    )?;

    get_memory(conn, id)?.ok_or_else(|| MementoError::NotFound(id.to_string()))
}

/// Set state unconditionally, bypassing the transition table. Used
/// internally by `evolve` to move the superseded predecessor, and by
/// `consolidate` for soft-delete bookkeeping; not part of the public
/// dispatcher surface.
pub(crate) fn force_state(conn: &Connection, id: &str, new_state: MemoryState) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let rows = conn.execute(
        "UPDATE memories SET state = ?1, state_updated_at = ?2, updated_at = ?2 WHERE id = ?3",
        params![new_state.as_str(), now, id],
    )?;
    if rows == 0 {
        return Err(MementoError::NotFound(id.to_string()));
    }
    Ok(())
}

/// `increment_access_count` — atomically bumps `access_count`, sets
/// `last_accessed_at`, and raises `decay_score` by 0.1 clamped to 1.0, in a
/// single statement.
pub fn increment_access_count(conn: &Connection, id: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let rows = conn.execute(
        "UPDATE memories SET access_count = access_count + 1, last_accessed_at = ?1, \
         decay_score = MIN(1.0, decay_score + 0.1) WHERE id = ?2 AND deleted_at IS NULL",
        params![now, id],
    )?;
    if rows == 0 {
        return Err(MementoError::NotFound(id.to_string()));
    }
    Ok(())
}

/// `update_decay_scores` — bulk decay pass over non-deleted rows whose
/// state is `""` or `active`. Returns the count of rows updated.
pub fn update_decay_scores(conn: &Connection) -> Result<u64> {
    let now = Utc::now().to_rfc3339();
    let rows = conn.execute(
        r#"
        UPDATE memories
        SET decay_score = MAX(0.0, decay_score / (1.0 + (julianday(?1) - julianday(COALESCE(last_accessed_at, created_at))) / 60.0)),
            decay_updated_at = ?1
        WHERE deleted_at IS NULL AND state IN ('', 'active')
        "#,
        params![now],
    )?;
    Ok(rows as u64)
}

/// `list` — filtered, paginated listing. Sort column is fixed to
/// `created_at DESC` (§4.1); the whitelist exists to keep the sort clause
/// free of client-controlled SQL.
pub fn list_memories(conn: &Connection, opts: &ListOptions) -> Result<Vec<Memory>> {
    let mut conditions: Vec<String> = Vec::new();
    let mut query_params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if opts.only_deleted {
        conditions.push("deleted_at IS NOT NULL".to_string());
    } else if !opts.include_deleted {
        conditions.push("deleted_at IS NULL".to_string());
    }

    if let Some(domain) = &opts.domain {
        conditions.push("domain = ?".to_string());
        query_params.push(Box::new(domain.clone()));
    }
    if let Some(state) = &opts.state {
        conditions.push("state = ?".to_string());
        query_params.push(Box::new(state.clone()));
    }
    if let Some(created_by) = &opts.created_by {
        conditions.push("created_by = ?".to_string());
        query_params.push(Box::new(created_by.clone()));
    }
    if let Some(after) = opts.created_after {
        conditions.push("created_at >= ?".to_string());
        query_params.push(Box::new(after.to_rfc3339()));
    }
    if let Some(before) = opts.created_before {
        conditions.push("created_at <= ?".to_string());
        query_params.push(Box::new(before.to_rfc3339()));
    }
    if let Some(min_decay) = opts.min_decay_score {
        conditions.push("decay_score >= ?".to_string());
        query_params.push(Box::new(min_decay));
    }
    if let Some(session_id) = &opts.session_id {
        conditions.push("session_id = ?".to_string());
        query_params.push(Box::new(session_id.clone()));
    }
    if let Some(memory_type) = &opts.memory_type {
        conditions.push("memory_type = ?".to_string());
        query_params.push(Box::new(memory_type.clone()));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let limit = opts.limit.max(1) as i64;
    let offset = ((opts.page.max(1) - 1) as i64) * limit;

    let sql = format!(
        "SELECT {MEMORY_COLUMNS} FROM memories {where_clause} ORDER BY created_at DESC LIMIT ? OFFSET ?"
    );
    query_params.push(Box::new(limit));
    query_params.push(Box::new(offset));

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = query_params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(param_refs.as_slice(), memory_from_row)?;

    let mut memories = Vec::new();
    for row in rows {
        memories.push(row?);
    }
    Ok(memories)
}

/// `get_evolution_chain` — walk `supersedes_id` backward then forward from
/// `id`, capped at `MAX_EVOLUTION_CHAIN_LEN`. Soft-deleted ancestors are not
/// filtered (history is preserved); a purged ancestor breaks the backward
/// walk cleanly.
pub fn get_evolution_chain(conn: &Connection, id: &str) -> Result<Vec<Memory>> {
    let start = get_memory_raw(conn, id)?.ok_or_else(|| MementoError::NotFound(id.to_string()))?;

    let mut chain: Vec<Memory> = vec![start.clone()];
    let mut visited: std::collections::HashSet<String> = std::collections::HashSet::new();
    visited.insert(start.id.clone());

    // Walk backward, prepending ancestors.
    let mut cursor = start.supersedes_id.clone();
    while let Some(ancestor_id) = cursor {
        if visited.contains(&ancestor_id) || chain.len() >= MAX_EVOLUTION_CHAIN_LEN {
            break;
        }
        match get_memory_raw(conn, &ancestor_id)? {
            Some(ancestor) => {
                cursor = ancestor.supersedes_id.clone();
                visited.insert(ancestor.id.clone());
                chain.insert(0, ancestor);
            }
            None => break, // purged ancestor: chain breaks cleanly
        }
    }

    // Walk forward: find rows whose supersedes_id equals the current tip.
    let mut tip = start.id.clone();
    while chain.len() < MAX_EVOLUTION_CHAIN_LEN {
        let next: Option<Memory> = conn
            .query_row(
                &format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE supersedes_id = ?1"),
                params![tip],
                memory_from_row,
            )
            .optional()?;
        match next {
            Some(m) if !visited.contains(&m.id) => {
                visited.insert(m.id.clone());
                tip = m.id.clone();
                chain.push(m);
            }
            _ => break,
        }
    }

    Ok(chain)
}

/// `get_related_memories` — memories linked via `memory_links` in either
/// direction.
pub fn get_related_memories(conn: &Connection, id: &str) -> Result<Vec<Memory>> {
    let sql = format!(
        "SELECT {cols} FROM memories m
         WHERE m.deleted_at IS NULL AND m.id IN (
            SELECT target_memory_id FROM memory_links WHERE source_memory_id = ?1
            UNION
            SELECT source_memory_id FROM memory_links WHERE target_memory_id = ?1
         )",
        cols = MEMORY_COLUMNS
            .split(", ")
            .map(|c| format!("m.{c}"))
            .collect::<Vec<_>>()
            .join(", ")
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![id], memory_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// `get_memory_entities` — entities a memory touches, via `memory_entities`.
pub fn get_memory_entities(conn: &Connection, memory_id: &str) -> Result<Vec<Entity>> {
    let mut stmt = conn.prepare(
        "SELECT e.id, e.name, e.entity_type, e.description, e.created_at, e.updated_at
         FROM entities e
         JOIN memory_entities me ON me.entity_id = e.id
         WHERE me.memory_id = ?1",
    )?;
    let rows = stmt.query_map(params![memory_id], entity_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn entity_from_row(row: &Row) -> rusqlite::Result<Entity> {
    Ok(Entity {
        id: row.get("id")?,
        name: row.get("name")?,
        entity_type: row.get("entity_type")?,
        description: row.get("description")?,
        created_at: parse_ts(row.get("created_at")?),
        updated_at: parse_ts(row.get("updated_at")?),
    })
}

/// `get_memories_by_relation_type` — memories that touch any entity that is
/// the source or target endpoint of a relationship of `relation_type`.
pub fn get_memories_by_relation_type(
    conn: &Connection,
    relation_type: &str,
) -> Result<Vec<Memory>> {
    let sql = format!(
        "SELECT DISTINCT {cols} FROM memories m
         JOIN memory_entities me ON me.memory_id = m.id
         WHERE m.deleted_at IS NULL AND me.entity_id IN (
            SELECT source_entity_id FROM relationships WHERE relation_type = ?1
            UNION
            SELECT target_entity_id FROM relationships WHERE relation_type = ?1
         )",
        cols = MEMORY_COLUMNS
            .split(", ")
            .map(|c| format!("m.{c}"))
            .collect::<Vec<_>>()
            .join(", ")
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![relation_type], memory_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// `create_memory_link` — typed memory-to-memory edge (only `CONTAINS` is
/// used by the core, for project hierarchy).
pub fn create_memory_link(
    conn: &Connection,
    source_memory_id: &str,
    target_memory_id: &str,
    link_type: &str,
) -> Result<MemoryLink> {
    let id = uuid::Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO memory_links (id, source_memory_id, target_memory_id, link_type) VALUES (?1, ?2, ?3, ?4)",
        params![id, source_memory_id, target_memory_id, link_type],
    )?;
    Ok(MemoryLink {
        id,
        source_memory_id: source_memory_id.to_string(),
        target_memory_id: target_memory_id.to_string(),
        link_type: link_type.to_string(),
    })
}

/// Fetch the memories linked as targets of `CONTAINS` edges from
/// `source_memory_id` (used by project-tree traversal).
pub fn get_contained_memories(conn: &Connection, source_memory_id: &str) -> Result<Vec<Memory>> {
    let sql = format!(
        "SELECT {cols} FROM memories m
         JOIN memory_links ml ON ml.target_memory_id = m.id
         WHERE ml.source_memory_id = ?1 AND ml.link_type = ?2 AND m.deleted_at IS NULL",
        cols = MEMORY_COLUMNS
            .split(", ")
            .map(|c| format!("m.{c}"))
            .collect::<Vec<_>>()
            .join(", ")
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![source_memory_id, LINK_TYPE_CONTAINS],
        memory_from_row,
    )?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Upsert an embedding for `memory_id`.
pub fn store_embedding(
    conn: &Connection,
    memory_id: &str,
    vector: &[f64],
    model: &str,
) -> Result<()> {
    let bytes = Embedding::serialize_vector(vector);
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO embeddings (memory_id, bytes, dimension, model, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)
         ON CONFLICT(memory_id) DO UPDATE SET bytes = excluded.bytes, dimension = excluded.dimension,
            model = excluded.model, updated_at = excluded.updated_at",
        params![memory_id, bytes, vector.len() as i32, model, now],
    )?;
    Ok(())
}

/// Load up to `limit` most-recent embeddings for non-deleted memories.
pub fn load_recent_embeddings(conn: &Connection, limit: u32) -> Result<Vec<(String, Vec<f64>)>> {
    let mut stmt = conn.prepare(
        "SELECT e.memory_id, e.bytes FROM embeddings e
         JOIN memories m ON m.id = e.memory_id
         WHERE m.deleted_at IS NULL
         ORDER BY e.created_at DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit], |row| {
        let memory_id: String = row.get(0)?;
        let bytes: Vec<u8> = row.get(1)?;
        Ok((memory_id, bytes))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (memory_id, bytes) = row?;
        let vector = Embedding::deserialize_vector(&bytes)?;
        out.push((memory_id, vector));
    }
    Ok(out)
}

/// Upsert an entity (used by tests and the enrichment-result writer path).
pub fn upsert_entity(conn: &Connection, id: &str, name: &str, entity_type: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO entities (id, name, entity_type, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name, entity_type = excluded.entity_type, updated_at = excluded.updated_at",
        params![id, name, entity_type, now],
    )?;
    Ok(())
}

/// Link a memory to an entity (many-to-many junction).
pub fn link_memory_entity(conn: &Connection, memory_id: &str, entity_id: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO memory_entities (memory_id, entity_id, frequency, confidence) VALUES (?1, ?2, 1, 1.0)
         ON CONFLICT(memory_id, entity_id) DO UPDATE SET frequency = frequency + 1",
        params![memory_id, entity_id],
    )?;
    Ok(())
}

/// Create a relationship between two entities.
pub fn create_relationship(
    conn: &Connection,
    source_entity_id: &str,
    target_entity_id: &str,
    relation_type: &str,
) -> Result<Relationship> {
    let id = uuid::Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO relationships (id, source_entity_id, target_entity_id, relation_type) VALUES (?1, ?2, ?3, ?4)",
        params![id, source_entity_id, target_entity_id, relation_type],
    )?;
    Ok(Relationship {
        id,
        source_entity_id: source_entity_id.to_string(),
        target_entity_id: target_entity_id.to_string(),
        relation_type: relation_type.to_string(),
        created_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    fn input(content: &str) -> CreateMemoryInput {
        CreateMemoryInput {
            content: content.to_string(),
            domain: Some("general".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn store_is_deterministic_and_detects_duplicate() {
        let storage = Storage::open_in_memory().unwrap();
        let (id1, dup1) = storage
            .with_connection(|conn| {
                let out = store_memory(conn, &input("hello world"))?;
                Ok((out.memory.id, out.duplicate))
            })
            .unwrap();
        assert!(!dup1);

        let (id2, dup2) = storage
            .with_connection(|conn| {
                let out = store_memory(conn, &input("hello world"))?;
                Ok((out.memory.id, out.duplicate))
            })
            .unwrap();
        assert_eq!(id1, id2);
        assert!(dup2);
    }

    #[test]
    fn soft_delete_then_restore_round_trips() {
        let storage = Storage::open_in_memory().unwrap();
        let id = storage
            .with_connection(|conn| Ok(store_memory(conn, &input("x"))?.memory.id))
            .unwrap();

        storage
            .with_connection(|conn| delete_memory(conn, &id))
            .unwrap();
        assert!(storage
            .with_connection(|conn| get_memory(conn, &id))
            .unwrap()
            .is_none());

        storage
            .with_connection(|conn| restore_memory(conn, &id))
            .unwrap();
        assert!(storage
            .with_connection(|conn| get_memory(conn, &id))
            .unwrap()
            .is_some());
    }

    #[test]
    fn source_context_over_cap_is_rejected() {
        let storage = Storage::open_in_memory().unwrap();
        let big = "x".repeat(MAX_SOURCE_CONTEXT_BYTES + 1);
        let mut create = input("y");
        create.source_context = Some(serde_json::Value::String(big));
        let result = storage.with_connection(|conn| store_memory(conn, &create));
        assert!(result.is_err());
    }

    #[test]
    fn increment_access_count_is_atomic_per_call() {
        let storage = Storage::open_in_memory().unwrap();
        let id = storage
            .with_connection(|conn| Ok(store_memory(conn, &input("z"))?.memory.id))
            .unwrap();
        for _ in 0..3 {
            storage
                .with_connection(|conn| increment_access_count(conn, &id))
                .unwrap();
        }
        let memory = storage
            .with_connection(|conn| get_memory(conn, &id))
            .unwrap()
            .unwrap();
        assert_eq!(memory.access_count, 3);
    }
}
