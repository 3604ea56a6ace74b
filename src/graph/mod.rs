//! Graph traversal (§4.3): bounded BFS from a seed memory through the
//! shared-entity relationship graph.

use rusqlite::{params, Connection};
use std::collections::{HashMap, HashSet};

use crate::error::{MementoError, Result};
use crate::storage::queries::get_memory;
use crate::types::TraversalResult;

pub const MAX_HOPS: u32 = 4;
pub const DEFAULT_MAX_HOPS: u32 = 2;
pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 50;

struct Discovered {
    hop_distance: u32,
    shared_entities: Vec<String>,
}

/// `traverse_memory_graph(start_memory_id, max_hops, limit)` — §4.3.
///
/// 1. Seed frontier = entities linked to `start_memory_id`. Empty ⇒ empty result.
/// 2. `visited_entities` starts at the seed; `seen_memories = {start}`.
/// 3. For each hop: discover memories linked to the frontier's entities (first
///    discovery wins, no re-assignment), then expand the frontier via
///    relationships whose endpoints touch it.
/// 4. Hydrate, dedupe `shared_entities` preserving first-seen order, sort by
///    `(hop ASC, decay DESC)`, truncate to `limit`.
pub fn traverse_memory_graph(
    conn: &Connection,
    start_memory_id: &str,
    max_hops: u32,
    limit: u32,
) -> Result<Vec<TraversalResult>> {
    let max_hops = max_hops.clamp(1, MAX_HOPS);
    let limit = limit.clamp(1, MAX_LIMIT);

    if get_memory(conn, start_memory_id)?.is_none() {
        return Err(MementoError::NotFound(start_memory_id.to_string()));
    }

    let mut frontier = entities_for_memory(conn, start_memory_id)?;
    if frontier.is_empty() {
        return Ok(Vec::new());
    }

    let mut visited_entities: HashSet<String> = frontier.iter().map(|(id, _)| id.clone()).collect();
    let mut seen_memories: HashSet<String> = HashSet::from([start_memory_id.to_string()]);
    let mut discovered: HashMap<String, Discovered> = HashMap::new();

    for hop in 1..=max_hops {
        // Discover: memories linked to any entity in the frontier. First
        // entity to surface a given memory gets credit for its hop and its
        // name; later entities in the same hop don't re-claim it (it's
        // already in seen_memories).
        for (entity_id, entity_name) in &frontier {
            for memory_id in memories_for_entity(conn, entity_id)? {
                if seen_memories.contains(&memory_id) {
                    continue;
                }
                seen_memories.insert(memory_id.clone());
                discovered.insert(
                    memory_id,
                    Discovered {
                        hop_distance: hop,
                        shared_entities: vec![entity_name.clone()],
                    },
                );
            }
        }

        // Expand: relationships where either endpoint is in the frontier.
        let frontier_ids: Vec<String> = frontier.iter().map(|(id, _)| id.clone()).collect();
        let mut next_frontier: Vec<(String, String)> = Vec::new();
        for (source, target) in relationships_touching(conn, &frontier_ids)? {
            for candidate in [source, target] {
                if !visited_entities.contains(&candidate.0) {
                    visited_entities.insert(candidate.0.clone());
                    next_frontier.push(candidate);
                }
            }
        }

        frontier = dedup_entities(next_frontier);
        if frontier.is_empty() {
            break;
        }
    }

    let mut results = Vec::with_capacity(discovered.len());
    for (memory_id, entry) in discovered {
        if let Some(memory) = get_memory(conn, &memory_id)? {
            results.push(TraversalResult {
                memory,
                hop_distance: entry.hop_distance,
                shared_entities: entry.shared_entities,
            });
        }
    }

    results.sort_by(|a, b| {
        a.hop_distance.cmp(&b.hop_distance).then(
            b.memory
                .decay_score
                .partial_cmp(&a.memory.decay_score)
                .unwrap_or(std::cmp::Ordering::Equal),
        )
    });
    results.truncate(limit as usize);

    Ok(results)
}

fn dedup_entities(entities: Vec<(String, String)>) -> Vec<(String, String)> {
    let mut seen = HashSet::new();
    entities
        .into_iter()
        .filter(|(id, _)| seen.insert(id.clone()))
        .collect()
}

fn entities_for_memory(conn: &Connection, memory_id: &str) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT e.id, e.name FROM entities e
         JOIN memory_entities me ON me.entity_id = e.id
         WHERE me.memory_id = ?1",
    )?;
    let rows = stmt.query_map(params![memory_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn memories_for_entity(conn: &Connection, entity_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT me.memory_id FROM memory_entities me
         JOIN memories m ON m.id = me.memory_id
         WHERE me.entity_id = ?1 AND m.deleted_at IS NULL",
    )?;
    let rows = stmt.query_map(params![entity_id], |row| row.get::<_, String>(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Relationships touching any of `frontier_ids`, returned as
/// `(source_entity, target_entity)` pairs, each `(id, name)`.
fn relationships_touching(
    conn: &Connection,
    frontier_ids: &[String],
) -> Result<Vec<((String, String), (String, String))>> {
    if frontier_ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = frontier_ids
        .iter()
        .map(|_| "?")
        .collect::<Vec<_>>()
        .join(",");
    let sql = format!(
        "SELECT r.source_entity_id, se.name, r.target_entity_id, te.name
         FROM relationships r
         JOIN entities se ON se.id = r.source_entity_id
         JOIN entities te ON te.id = r.target_entity_id
         WHERE r.source_entity_id IN ({placeholders}) OR r.target_entity_id IN ({placeholders})"
    );
    let mut stmt = conn.prepare(&sql)?;
    let all_params: Vec<&dyn rusqlite::ToSql> = frontier_ids
        .iter()
        .chain(frontier_ids.iter())
        .map(|s| s as &dyn rusqlite::ToSql)
        .collect();
    let rows = stmt.query_map(all_params.as_slice(), |row| {
        Ok((
            (row.get::<_, String>(0)?, row.get::<_, String>(1)?),
            (row.get::<_, String>(2)?, row.get::<_, String>(3)?),
        ))
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::queries::{
        create_relationship, link_memory_entity, store_memory, upsert_entity,
    };
    use crate::storage::Storage;
    use crate::types::CreateMemoryInput;

    fn input(content: &str) -> CreateMemoryInput {
        CreateMemoryInput {
            content: content.to_string(),
            domain: Some("general".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn traversal_never_returns_start_and_respects_hop_bound() {
        // A, C memories; E1 linked to A, E2 linked to C; relationship E1<->E2.
        let storage = Storage::open_in_memory().unwrap();
        let (a_id, c_id) = storage
            .with_connection(|conn| {
                let a = store_memory(conn, &input("memory a"))?.memory.id;
                let c = store_memory(conn, &input("memory c"))?.memory.id;
                upsert_entity(conn, "e1", "E1", "concept")?;
                upsert_entity(conn, "e2", "E2", "concept")?;
                link_memory_entity(conn, &a, "e1")?;
                link_memory_entity(conn, &c, "e2")?;
                create_relationship(conn, "e1", "e2", "relates_to")?;
                Ok((a, c))
            })
            .unwrap();

        let hop1 = storage
            .with_connection(|conn| traverse_memory_graph(conn, &a_id, 1, 10))
            .unwrap();
        assert!(hop1.is_empty());

        let hop2 = storage
            .with_connection(|conn| traverse_memory_graph(conn, &a_id, 2, 10))
            .unwrap();
        assert_eq!(hop2.len(), 1);
        assert_eq!(hop2[0].memory.id, c_id);
        assert_eq!(hop2[0].hop_distance, 2);
    }

    #[test]
    fn empty_entity_frontier_yields_empty_result() {
        let storage = Storage::open_in_memory().unwrap();
        let id = storage
            .with_connection(|conn| Ok(store_memory(conn, &input("lonely"))?.memory.id))
            .unwrap();
        let results = storage
            .with_connection(|conn| traverse_memory_graph(conn, &id, 2, 10))
            .unwrap();
        assert!(results.is_empty());
    }
}
