//! Full-text search (§4.2): sanitizer pipeline + FTS5 MATCH, with a
//! fuzzy-fallback rerun on zero results.

use rusqlite::{params, Connection};

use crate::error::Result;
use crate::storage::queries::{list_memories, memory_from_row};
use crate::types::{ListOptions, Memory};

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "could", "should", "may", "might", "shall", "can", "to",
    "of", "in", "on", "at", "by", "for", "with", "from", "as", "about", "into", "through",
    "during", "before", "after", "above", "below", "between", "out", "off", "over", "under",
    "what", "how", "when", "where", "why", "who", "which", "this", "that", "these", "those", "i",
    "you", "he", "she", "it", "we", "they", "and", "or", "but", "if", "not", "s", "t",
];

/// The fixed sanitizer pipeline (§4.2, order matters):
/// 1. strip FTS-special punctuation,
/// 2. lowercase and split on whitespace,
/// 3. drop stop words,
/// 4. drop tokens shorter than 2 chars,
/// 5. append `*` to each token and join with ` OR `.
///
/// If every token was a stop word, falls back to the lowercased, cleaned
/// original text.
pub fn sanitize_query(query: &str) -> String {
    let stripped: String = query
        .chars()
        .map(|c| if "\"'()*-^?:".contains(c) { ' ' } else { c })
        .collect();

    let cleaned = stripped.to_lowercase();
    let tokens: Vec<&str> = cleaned.split_whitespace().collect();

    let filtered: Vec<&str> = tokens
        .iter()
        .copied()
        .filter(|t| !STOP_WORDS.contains(t))
        .filter(|t| t.len() >= 2)
        .collect();

    if filtered.is_empty() {
        return cleaned.trim().to_string();
    }

    filtered
        .iter()
        .map(|t| format!("{t}*"))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Same pipeline without the prefix wildcard, used for the fuzzy-fallback
/// rerun (no recursion: only called once, and never itself triggers another
/// fallback).
fn sanitize_query_no_prefix(query: &str) -> String {
    let stripped: String = query
        .chars()
        .map(|c| if "\"'()*-^?:".contains(c) { ' ' } else { c })
        .collect();
    let cleaned = stripped.to_lowercase();
    let tokens: Vec<&str> = cleaned
        .split_whitespace()
        .filter(|t| !STOP_WORDS.contains(t))
        .filter(|t| t.len() >= 2)
        .collect();
    tokens.join(" OR ")
}

fn token_count(query: &str) -> usize {
    query.split_whitespace().count()
}

/// `full_text_search` — empty query delegates to `list` ordered by
/// `created_at DESC`; otherwise runs the sanitized FTS5 `MATCH` query,
/// optionally rerunning once without prefix-expansion if `fuzzy_fallback`
/// is set and the first pass returned nothing.
pub fn full_text_search(
    conn: &Connection,
    query: &str,
    limit: u32,
    offset: u32,
    fuzzy_fallback: bool,
) -> Result<Vec<Memory>> {
    if query.trim().is_empty() {
        return list_memories(
            conn,
            &ListOptions {
                limit,
                page: offset / limit.max(1) + 1,
                ..Default::default()
            },
        );
    }

    let sanitized = sanitize_query(query);
    let results = run_match(conn, &sanitized, limit, offset)?;

    if results.is_empty() && fuzzy_fallback && token_count(query) >= 2 {
        let fallback = sanitize_query_no_prefix(query);
        if !fallback.is_empty() {
            return run_match(conn, &fallback, limit, offset);
        }
    }

    Ok(results)
}

fn run_match(conn: &Connection, match_expr: &str, limit: u32, offset: u32) -> Result<Vec<Memory>> {
    if match_expr.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT {cols} FROM memories_fts fts
         JOIN memories m ON fts.rowid = m.rowid
         WHERE memories_fts MATCH ?1 AND m.deleted_at IS NULL
         ORDER BY bm25(memories_fts) LIMIT ?2 OFFSET ?3",
        cols = super::memory_columns_prefixed("m")
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![match_expr, limit, offset], memory_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_special_punctuation_and_prefix_expands() {
        assert_eq!(sanitize_query("hello world"), "hello* OR world*");
    }

    #[test]
    fn sanitize_drops_stop_words_and_short_tokens() {
        assert_eq!(sanitize_query("the a of"), "the a of");
        assert_eq!(sanitize_query("the cat sat"), "cat* OR sat*");
    }

    #[test]
    fn sanitize_empty_query_has_no_fts_operators() {
        let s = sanitize_query("");
        assert!(!s.contains('*'));
        assert!(!s.contains("OR"));
    }

    #[test]
    fn sanitize_only_stop_words_falls_back_to_cleaned_text() {
        let s = sanitize_query("the is are");
        assert_eq!(s, "the is are");
    }
}
