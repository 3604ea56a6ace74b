//! Vector search (§4.2): cosine similarity over a recency-capped pool of
//! embeddings.

use rusqlite::Connection;

use crate::error::Result;
use crate::storage::queries::{get_memory, load_recent_embeddings};
use crate::types::Memory;

/// Recency-ordered embedding pool cap: bounds memory even for large corpora
/// (no ANN index — see DESIGN.md's Open Question resolution).
pub const MAX_VECTOR_CANDIDATES: u32 = 10_000;

/// `(a·b)/(‖a‖‖b‖)`. Mismatched length or zero norm yields similarity 0.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// `vector_search` — load up to `MAX_VECTOR_CANDIDATES` most-recent
/// embeddings for non-deleted memories, score by cosine similarity against
/// `query_vector`, sort descending, paginate, hydrate memory rows.
pub fn vector_search(
    conn: &Connection,
    query_vector: &[f64],
    limit: u32,
    offset: u32,
) -> Result<Vec<(Memory, f64)>> {
    let candidates = load_recent_embeddings(conn, MAX_VECTOR_CANDIDATES)?;

    let mut scored: Vec<(String, f64)> = candidates
        .into_iter()
        .map(|(id, vector)| (id, cosine_similarity(query_vector, &vector)))
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let page: Vec<(String, f64)> = scored
        .into_iter()
        .skip(offset as usize)
        .take(limit as usize)
        .collect();

    let mut out = Vec::with_capacity(page.len());
    for (id, score) in page {
        if let Some(memory) = get_memory(conn, &id)? {
            out.push((memory, score));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-10);
    }

    #[test]
    fn cosine_similarity_mismatched_length_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn cosine_similarity_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
