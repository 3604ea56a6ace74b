//! Consolidation (§4.6): merge several related memories into one.

use rusqlite::Connection;

use crate::enrichment::EnrichmentQueue;
use crate::error::{MementoError, Result};
use crate::search::full_text_search;
use crate::storage::queries::{delete_memory, get_memory, store_memory};
use crate::types::{ConsolidationResult, CreateMemoryInput};

const CANDIDATE_POOL: u32 = 10;

/// `consolidate(ids | query, title?)`. Exactly one of `ids`/`query` should be
/// given; `ids` takes precedence if both are present. Requires ≥2 resolved
/// candidates and fails if any explicit id is missing.
pub fn consolidate(
    conn: &Connection,
    enrichment: &EnrichmentQueue,
    ids: Option<&[String]>,
    query: Option<&str>,
    title: Option<&str>,
) -> Result<ConsolidationResult> {
    let candidate_ids = resolve_candidates(conn, ids, query)?;
    if candidate_ids.len() < 2 {
        return Err(MementoError::InvalidInput(
            "consolidate requires at least two candidate memories".to_string(),
        ));
    }

    let mut sources = Vec::with_capacity(candidate_ids.len());
    for id in &candidate_ids {
        let memory = get_memory(conn, id)?.ok_or_else(|| MementoError::NotFound(id.clone()))?;
        sources.push(memory);
    }

    let content = build_consolidated_content(title, &sources);

    let mut tags: Vec<String> = sources.iter().flat_map(|m| m.tags.clone()).collect();
    tags.sort();
    tags.dedup();

    let domain = sources[0].domain.clone();

    let input = CreateMemoryInput {
        content,
        domain: Some(domain),
        source: Some("consolidation".to_string()),
        tags,
        ..Default::default()
    };
    let outcome = store_memory(conn, &input)?;
    let result_id = outcome.memory.id.clone();

    for source in &sources {
        if let Err(err) = delete_memory(conn, &source.id) {
            tracing::warn!(
                "failed to soft-delete consolidation source {}: {err}",
                source.id
            );
        }
    }

    enrichment.offer(result_id.clone(), outcome.memory.content.clone());

    Ok(ConsolidationResult {
        source_ids: candidate_ids,
        result_id,
        consolidated_at: outcome.memory.created_at,
    })
}

fn resolve_candidates(
    conn: &Connection,
    ids: Option<&[String]>,
    query: Option<&str>,
) -> Result<Vec<String>> {
    if let Some(ids) = ids {
        return Ok(ids.to_vec());
    }
    if let Some(query) = query {
        let matches = full_text_search(conn, query, CANDIDATE_POOL, 0, true)?;
        return Ok(matches.into_iter().map(|m| m.id).collect());
    }
    Err(MementoError::InvalidInput(
        "consolidate requires either ids or query".to_string(),
    ))
}

/// No summarization provider is wired in (§4.6 step 3's fallback path):
/// concatenate source excerpts under numbered headers.
fn build_consolidated_content(title: Option<&str>, sources: &[crate::types::Memory]) -> String {
    let mut out = String::new();
    if let Some(title) = title {
        out.push_str(title);
        out.push_str("\n\n");
    }
    for (i, memory) in sources.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, memory.content));
    }
    out
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
    fn consolidates_explicit_ids_and_soft_deletes_sources() {
        let storage = Storage::open_in_memory().unwrap();
        let queue = EnrichmentQueue::new(8);
        let (a_id, b_id) = storage
            .with_connection(|conn| {
                let a = store_memory(conn, &input("alpha detail"))?.memory.id;
                let b = store_memory(conn, &input("beta detail"))?.memory.id;
                Ok((a, b))
            })
            .unwrap();

        let result = storage
            .with_connection(|conn| {
                consolidate(
                    conn,
                    &queue,
                    Some(&[a_id.clone(), b_id.clone()]),
                    None,
                    None,
                )
            })
            .unwrap();

        assert_eq!(result.source_ids, vec![a_id.clone(), b_id.clone()]);

        storage
            .with_connection(|conn| {
                assert!(get_memory(conn, &a_id)?.is_none());
                assert!(get_memory(conn, &b_id)?.is_none());
                let merged = get_memory(conn, &result.result_id)?.unwrap();
                assert!(merged.content.contains("alpha detail"));
                assert!(merged.content.contains("beta detail"));
                assert_eq!(merged.source.as_deref(), Some("consolidation"));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn fewer_than_two_candidates_is_rejected() {
        let storage = Storage::open_in_memory().unwrap();
        let queue = EnrichmentQueue::new(8);
        let a_id = storage
            .with_connection(|conn| Ok(store_memory(conn, &input("alone"))?.memory.id))
            .unwrap();

        let err = storage
            .with_connection(|conn| consolidate(conn, &queue, Some(&[a_id]), None, None))
            .unwrap_err();
        assert!(matches!(err, MementoError::InvalidInput(_)));
    }
}
