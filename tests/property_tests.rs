//! Property-based tests for invariants that must hold for all inputs.
//!
//! Run with: cargo test --test property_tests

use memento::search::fulltext::sanitize_query;
use memento::search::vector::cosine_similarity;
use memento::storage::queries::{content_hash, derive_id};
use memento::types::Embedding;
use proptest::prelude::*;

proptest! {
    /// Invariant 1: id derivation never panics and is deterministic.
    #[test]
    fn derive_id_is_deterministic(domain in "[a-z]{1,12}", content in ".{0,200}") {
        let a = derive_id(&domain, &content);
        let b = derive_id(&domain, &content);
        prop_assert_eq!(a, b);
    }

    /// Invariant 1: id always takes the `mem:<domain>:<16-hex>` shape.
    #[test]
    fn derive_id_has_expected_shape(domain in "[a-z]{1,12}", content in ".{0,200}") {
        let id = derive_id(&domain, &content);
        let mut parts = id.splitn(3, ':');
        prop_assert_eq!(parts.next(), Some("mem"));
        prop_assert_eq!(parts.next(), Some(domain.as_str()));
        let hex = parts.next().unwrap();
        prop_assert_eq!(hex.len(), 16);
        prop_assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }

    /// content_hash is pure function of content; same input -> same hash.
    #[test]
    fn content_hash_is_deterministic(content in ".{0,200}") {
        prop_assert_eq!(content_hash(&content), content_hash(&content));
    }

    /// Invariant 8: embedding round-trip, within float tolerance.
    #[test]
    fn embedding_round_trips(values in prop::collection::vec(any::<f64>().prop_filter("finite", |v| v.is_finite()), 0..32)) {
        let bytes = Embedding::serialize_vector(&values);
        prop_assert_eq!(bytes.len(), values.len() * 8);
        let round_tripped = Embedding::deserialize_vector(&bytes).unwrap();
        prop_assert_eq!(round_tripped.len(), values.len());
        for (a, b) in values.iter().zip(round_tripped.iter()) {
            prop_assert!((a - b).abs() < 1e-10);
        }
    }

    /// Invariant 9: the sanitizer never panics on arbitrary input.
    #[test]
    fn sanitize_query_never_panics(query in ".{0,200}") {
        let _ = sanitize_query(&query);
    }

    #[test]
    fn sanitize_empty_query_has_no_fts_operators(query in "[ \t]{0,10}") {
        let sanitized = sanitize_query(&query);
        prop_assert!(!sanitized.contains('*'));
        prop_assert!(!sanitized.contains(" OR "));
    }

    /// Cosine similarity is always within [-1, 1] for finite, non-zero vectors.
    #[test]
    fn cosine_similarity_is_bounded(
        a in prop::collection::vec(-100.0f64..100.0, 1..16),
        b in prop::collection::vec(-100.0f64..100.0, 1..16),
    ) {
        let len = a.len().min(b.len());
        let a = &a[..len];
        let b = &b[..len];
        let sim = cosine_similarity(a, b);
        prop_assert!(sim >= -1.0001 && sim <= 1.0001);
    }
}

/// Invariant 10: RRF fusion score for a doubly-ranked id is the sum of its
/// per-list contributions.
#[test]
fn rrf_fused_score_matches_closed_form() {
    const RRF_K: f64 = 60.0;
    let rank_a = 1usize;
    let rank_b = 2usize;
    let fused = 1.0 / (RRF_K + rank_a as f64) + 1.0 / (RRF_K + rank_b as f64);
    let expected = 1.0 / 61.0 + 1.0 / 62.0;
    assert!((fused - expected).abs() < 1e-12);
}

/// Invariant 12: source_context over the 4096-byte cap is rejected.
#[test]
fn source_context_cap_is_enforced() {
    use memento::storage::Storage;
    use memento::types::CreateMemoryInput;

    let storage = Storage::open_in_memory().unwrap();
    let oversized = serde_json::json!({ "blob": "x".repeat(5000) });

    let err = storage
        .with_connection(|conn| {
            memento::storage::queries::store_memory(
                conn,
                &CreateMemoryInput {
                    content: "with oversized context".to_string(),
                    domain: Some("general".to_string()),
                    source_context: Some(oversized.clone()),
                    ..Default::default()
                },
            )
        })
        .unwrap_err();
    assert!(matches!(err, memento::error::MementoError::InvalidInput(_)));
}
