//! Hybrid search (§4.2): Reciprocal Rank Fusion over full-text and vector
//! result lists.

use rusqlite::Connection;
use std::collections::HashMap;

use super::fulltext::full_text_search;
use super::vector::vector_search;
use crate::error::Result;
use crate::types::{Memory, SearchResult};

/// RRF constant: score of the rank-`r` item (1-indexed) is `1/(k + r)`.
const RRF_K: f64 = 60.0;

/// `hybrid_search` — if `query_vector` is empty, delegates to full-text.
/// Otherwise runs both searches with candidate pool `max(3*limit, 30)`,
/// fuses by RRF, sorts descending, paginates. Vector-search failure is
/// non-fatal: falls back to full-text-only (§7 `SearchEngineUnavailable`).
pub fn hybrid_search(
    conn: &Connection,
    query: &str,
    query_vector: &[f64],
    limit: u32,
    offset: u32,
) -> Result<Vec<SearchResult>> {
    if query_vector.is_empty() {
        let memories = full_text_search(conn, query, limit, offset, true)?;
        return Ok(memories
            .into_iter()
            .enumerate()
            .map(|(rank, memory)| SearchResult {
                memory,
                score: 1.0 / (RRF_K + (rank + 1) as f64),
            })
            .collect());
    }

    let pool = (3 * limit).max(30);

    let fts_results = full_text_search(conn, query, pool, 0, true)?;

    let vector_results = match vector_search(conn, query_vector, pool, 0) {
        Ok(results) => results,
        Err(err) => {
            tracing::warn!("vector search unavailable ({err}), falling back to full-text only");
            Vec::new()
        }
    };

    let mut scores: HashMap<String, f64> = HashMap::new();
    let mut memories: HashMap<String, Memory> = HashMap::new();

    for (rank, memory) in fts_results.into_iter().enumerate() {
        *scores.entry(memory.id.clone()).or_insert(0.0) += 1.0 / (RRF_K + (rank + 1) as f64);
        memories.insert(memory.id.clone(), memory);
    }

    for (rank, (memory, _)) in vector_results.into_iter().enumerate() {
        *scores.entry(memory.id.clone()).or_insert(0.0) += 1.0 / (RRF_K + (rank + 1) as f64);
        memories.entry(memory.id.clone()).or_insert(memory);
    }

    let mut fused: Vec<SearchResult> = scores
        .into_iter()
        .filter_map(|(id, score)| {
            memories
                .remove(&id)
                .map(|memory| SearchResult { memory, score })
        })
        .collect();

    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.memory.id.cmp(&b.memory.id))
    });

    Ok(fused
        .into_iter()
        .skip(offset as usize)
        .take(limit as usize)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::queries::{store_embedding, store_memory};
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
    fn rrf_top_result_matches_worked_example() {
        // FTS returns [A, B, C], vector returns [B, D, A] (§8 scenario 6):
        // B's fused score (1/61 + 1/62) beats A's (1/62 + 1/63), so the top
        // result must be B even though A is the exact FTS match.
        let storage = Storage::open_in_memory().unwrap();
        let b = storage
            .with_connection(|conn| {
                let a = store_memory(conn, &input("alpha beta gamma"))?.memory;
                let b = store_memory(conn, &input("alpha beta only"))?.memory;
                let _c = store_memory(conn, &input("alpha only here"))?.memory;
                let d = store_memory(conn, &input("unrelated entry"))?.memory;

                // Vector order [B, D, A]: cosine(query, x) decreases as the
                // second component moves away from the query's 0.
                store_embedding(conn, &b.id, &[1.0, 0.0], "test")?;
                store_embedding(conn, &d.id, &[1.0, 0.05], "test")?;
                store_embedding(conn, &a.id, &[1.0, 0.2], "test")?;
                Ok(b)
            })
            .unwrap();

        let results = storage
            .with_connection(|conn| hybrid_search(conn, "alpha beta gamma", &[1.0, 0.0], 10, 0))
            .unwrap();

        assert!(!results.is_empty());
        assert_eq!(
            results[0].memory.id, b.id,
            "B appears in both lists so its fused score must beat A's"
        );
    }

    #[test]
    fn empty_vector_delegates_to_full_text() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .with_connection(|conn| store_memory(conn, &input("hello world")).map(|_| ()))
            .unwrap();

        let results = storage
            .with_connection(|conn| hybrid_search(conn, "hello", &[], 10, 0))
            .unwrap();
        assert_eq!(results.len(), 1);
    }
}
