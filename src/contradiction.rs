//! Contradiction detection (§4.7): three heuristic scans over the entity and
//! memory-link graph, each yielding a `Contradiction` with a confidence score.

use rusqlite::{params, Connection};

use crate::error::Result;
use crate::types::{Contradiction, ContradictionKind, MemoryState};

/// Relation types declared single-valued: an entity may have at most one
/// target for these. Anything else is allowed to fan out.
const SINGLE_VALUED_RELATIONS: &[&str] = &["reports_to", "located_in", "owned_by", "status"];

/// `detect_contradictions` — run all three patterns, optionally restricted
/// to results touching `focus_memory_id`.
pub fn detect_contradictions(
    conn: &Connection,
    focus_memory_id: Option<&str>,
) -> Result<Vec<Contradiction>> {
    let mut out = Vec::new();
    out.extend(conflicting_relationships(conn)?);
    out.extend(superseded_active(conn)?);
    out.extend(temporal_impossibilities(conn)?);

    if let Some(focus) = focus_memory_id {
        out.retain(|c| c.memory_ids.iter().any(|id| id == focus));
    }
    Ok(out)
}

/// The same entity has more than one distinct target for a relation type
/// declared single-valued.
fn conflicting_relationships(conn: &Connection) -> Result<Vec<Contradiction>> {
    let mut out = Vec::new();
    let placeholders = SINGLE_VALUED_RELATIONS
        .iter()
        .map(|_| "?")
        .collect::<Vec<_>>()
        .join(",");
    let sql = format!(
        "SELECT source_entity_id, relation_type, COUNT(DISTINCT target_entity_id) AS n
         FROM relationships
         WHERE relation_type IN ({placeholders})
         GROUP BY source_entity_id, relation_type
         HAVING n > 1"
    );
    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn rusqlite::ToSql> = SINGLE_VALUED_RELATIONS
        .iter()
        .map(|s| s as &dyn rusqlite::ToSql)
        .collect();
    let rows = stmt.query_map(params.as_slice(), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    for row in rows {
        let (entity_id, relation_type) = row?;
        let memory_ids = memories_touching_entity(conn, &entity_id)?;
        out.push(Contradiction {
            kind: ContradictionKind::ConflictingRelationship,
            memory_ids,
            description: format!(
                "entity {entity_id} has multiple targets for single-valued relation '{relation_type}'"
            ),
            confidence: 0.8,
        });
    }
    Ok(out)
}

/// A `superseded` memory still has non-deleted, non-superseded memories
/// linking to it.
fn superseded_active(conn: &Connection) -> Result<Vec<Contradiction>> {
    let mut stmt = conn.prepare(
        "SELECT ml.source_memory_id, ml.target_memory_id
         FROM memory_links ml
         JOIN memories target ON target.id = ml.target_memory_id
         JOIN memories source ON source.id = ml.source_memory_id
         WHERE target.state = ?1
           AND target.deleted_at IS NULL
           AND source.deleted_at IS NULL
           AND source.state NOT IN (?1, ?2, ?3)",
    )?;
    let rows = stmt.query_map(
        params![
            MemoryState::Superseded.as_str(),
            MemoryState::Cancelled.as_str(),
            MemoryState::Archived.as_str(),
        ],
        |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
    )?;

    let mut out = Vec::new();
    for row in rows {
        let (source_id, target_id) = row?;
        out.push(Contradiction {
            kind: ContradictionKind::SupersededActive,
            memory_ids: vec![source_id.clone(), target_id.clone()],
            description: format!(
                "memory {target_id} is superseded but is still referenced by active memory {source_id}"
            ),
            confidence: 0.6,
        });
    }
    Ok(out)
}

/// A `began_before` relationship whose entities' creation timestamps run the
/// wrong way.
fn temporal_impossibilities(conn: &Connection) -> Result<Vec<Contradiction>> {
    let mut stmt = conn.prepare(
        "SELECT r.source_entity_id, r.target_entity_id, se.created_at, te.created_at
         FROM relationships r
         JOIN entities se ON se.id = r.source_entity_id
         JOIN entities te ON te.id = r.target_entity_id
         WHERE r.relation_type = 'began_before'",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (source_id, target_id, source_created, target_created) = row?;
        if source_created > target_created {
            let memory_ids = {
                let mut ids = memories_touching_entity(conn, &source_id)?;
                ids.extend(memories_touching_entity(conn, &target_id)?);
                ids.sort();
                ids.dedup();
                ids
            };
            out.push(Contradiction {
                kind: ContradictionKind::TemporalImpossibility,
                memory_ids,
                description: format!(
                    "entity {source_id} is declared to have begun before {target_id} but was created later"
                ),
                confidence: 0.7,
            });
        }
    }
    Ok(out)
}

fn memories_touching_entity(conn: &Connection, entity_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT memory_id FROM memory_entities WHERE entity_id = ?1")?;
    let rows = stmt.query_map(params![entity_id], |row| row.get::<_, String>(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
