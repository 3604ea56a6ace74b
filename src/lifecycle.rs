//! Lifecycle state machine (§4.4) and the evolve operation (§4.5).

use chrono::Utc;
use rusqlite::Connection;

use crate::error::{MementoError, Result};
use crate::storage::queries;
use crate::types::{Memory, MemoryState};

/// Validate a state transition against the table in §4.4. `Superseded` is
/// additionally allowed from any non-terminal state, not only `Active` —
/// see DESIGN.md's Open Question resolution for `evolve`.
pub fn validate_transition(from: MemoryState, to: MemoryState) -> Result<()> {
    if is_allowed(from, to) {
        return Ok(());
    }
    Err(MementoError::InvalidTransition {
        from: from.as_str().to_string(),
        to: to.as_str().to_string(),
    })
}

fn is_allowed(from: MemoryState, to: MemoryState) -> bool {
    use MemoryState::*;
    if to == Superseded && !from.is_terminal() {
        return true;
    }
    matches!(
        (from, to),
        (Initial, Planning)
            | (Initial, Active)
            | (Planning, Active)
            | (Planning, Cancelled)
            | (Active, Paused)
            | (Active, Blocked)
            | (Active, Completed)
            | (Active, Cancelled)
            | (Paused, Active)
            | (Paused, Cancelled)
            | (Blocked, Active)
            | (Blocked, Cancelled)
            | (Completed, Archived)
            | (Cancelled, Archived)
    )
}

/// `evolve(id, new_content)` — §4.5.
///
/// 1. Load existing memory; fail if missing.
/// 2. Allocate a new id (random, not content-hashed — the caller's intent
///    is an explicit version).
/// 3. Store new memory with `supersedes_id = old.id`, inheriting source,
///    domain, tags, metadata.
/// 4. Transition old memory's state to `superseded`.
/// 5. Offer new id+content to the enrichment queue (best-effort).
pub fn evolve(
    conn: &Connection,
    enrichment: &crate::enrichment::EnrichmentQueue,
    id: &str,
    new_content: &str,
) -> Result<Memory> {
    let old =
        queries::get_memory(conn, id)?.ok_or_else(|| MementoError::NotFound(id.to_string()))?;

    let new_id = format!("mem:{}:{}", old.domain, uuid::Uuid::new_v4().simple());
    let hash = queries::content_hash(new_content);

    let now = Utc::now().to_rfc3339();
    let tags_json = serde_json::to_string(&old.tags)?;
    let metadata_json = serde_json::to_string(&old.metadata)?;

    conn.execute(
        "INSERT INTO memories (
            id, content, content_hash, domain, source, tags, metadata, keywords,
            supersedes_id, created_at, updated_at, timestamp
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, '[]', ?8, ?9, ?9, ?9)",
        rusqlite::params![
            new_id,
            new_content,
            hash,
            old.domain,
            old.source,
            tags_json,
            metadata_json,
            old.id,
            now,
        ],
    )?;

    queries::force_state(conn, &old.id, MemoryState::Superseded)?;

    let new_memory = queries::get_memory(conn, &new_id)?.ok_or_else(|| {
        MementoError::Internal("evolved memory vanished after insert".to_string())
    })?;

    let _ = enrichment.offer(new_memory.id.clone(), new_memory.content.clone());

    Ok(new_memory)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_allows_planning_and_active() {
        assert!(validate_transition(MemoryState::Initial, MemoryState::Planning).is_ok());
        assert!(validate_transition(MemoryState::Initial, MemoryState::Active).is_ok());
        assert!(validate_transition(MemoryState::Initial, MemoryState::Completed).is_err());
    }

    #[test]
    fn archived_and_superseded_are_terminal_except_for_evolve() {
        assert!(validate_transition(MemoryState::Archived, MemoryState::Active).is_err());
        assert!(validate_transition(MemoryState::Superseded, MemoryState::Active).is_err());
    }

    #[test]
    fn superseded_reachable_from_any_non_terminal_state() {
        for from in [
            MemoryState::Initial,
            MemoryState::Planning,
            MemoryState::Active,
            MemoryState::Paused,
            MemoryState::Blocked,
            MemoryState::Completed,
            MemoryState::Cancelled,
        ] {
            assert!(validate_transition(from, MemoryState::Superseded).is_ok());
        }
    }

    #[test]
    fn evolve_sets_supersedes_and_marks_old_superseded() {
        let storage = crate::storage::Storage::open_in_memory().unwrap();
        let queue = crate::enrichment::EnrichmentQueue::new(8);
        let old_id = storage
            .with_connection(|conn| {
                Ok(queries::store_memory(
                    conn,
                    &crate::types::CreateMemoryInput {
                        content: "v1".to_string(),
                        domain: Some("general".to_string()),
                        ..Default::default()
                    },
                )?
                .memory
                .id)
            })
            .unwrap();

        let new_memory = storage
            .with_connection(|conn| evolve(conn, &queue, &old_id, "v2"))
            .unwrap();

        assert_ne!(new_memory.id, old_id);
        assert_eq!(new_memory.supersedes_id.as_deref(), Some(old_id.as_str()));

        let old = storage
            .with_connection(|conn| queries::get_memory(conn, &old_id))
            .unwrap()
            .unwrap();
        assert_eq!(old.state, MemoryState::Superseded);
    }
}
