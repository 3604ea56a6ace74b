//! Golden tests - lock down the end-to-end scenarios that a correct
//! implementation must satisfy.
//!
//! Run with: cargo test --test golden_tests

use memento::enrichment::EnrichmentQueue;
use memento::error::MementoError;
use memento::graph::traverse_memory_graph;
use memento::lifecycle::evolve;
use memento::search::hybrid_search;
use memento::storage::queries::{
    create_relationship, delete_memory, get_evolution_chain, get_memory, link_memory_entity,
    list_memories, restore_memory, store_embedding, store_memory, update_state, upsert_entity,
};
use memento::storage::Storage;
use memento::types::{CreateMemoryInput, ListOptions, MemoryState};

fn input(content: &str) -> CreateMemoryInput {
    CreateMemoryInput {
        content: content.to_string(),
        domain: Some("general".to_string()),
        ..Default::default()
    }
}

#[test]
fn deterministic_dedupe() {
    let storage = Storage::open_in_memory().unwrap();
    storage
        .with_connection(|conn| {
            let first = store_memory(conn, &input("hello world"))?;
            assert!(!first.duplicate);
            assert!(first.existing_id.is_none());

            let second = store_memory(conn, &input("hello world"))?;
            assert!(second.duplicate);
            assert_eq!(
                second.existing_id.as_deref(),
                Some(first.memory.id.as_str())
            );
            assert_eq!(second.memory.id, first.memory.id);
            Ok(())
        })
        .unwrap();
}

#[test]
fn evolution_chain_orders_versions_and_supersedes_ancestors() {
    let storage = Storage::open_in_memory().unwrap();
    let queue = EnrichmentQueue::new(8);

    let id3 = storage
        .with_connection(|conn| {
            let v1 = store_memory(conn, &input("v1"))?.memory;
            let v2 = evolve(conn, &queue, &v1.id, "v2")?;
            let v3 = evolve(conn, &queue, &v2.id, "v3")?;
            Ok(v3.id)
        })
        .unwrap();

    storage
        .with_connection(|conn| {
            let chain = get_evolution_chain(conn, &id3)?;
            let contents: Vec<&str> = chain.iter().map(|m| m.content.as_str()).collect();
            assert_eq!(contents, vec!["v1", "v2", "v3"]);
            assert_eq!(chain[0].state, MemoryState::Superseded);
            assert_eq!(chain[1].state, MemoryState::Superseded);
            Ok(())
        })
        .unwrap();
}

#[test]
fn state_machine_rejects_invalid_transition_and_leaves_state_unchanged() {
    let storage = Storage::open_in_memory().unwrap();
    let id = storage
        .with_connection(|conn| Ok(store_memory(conn, &input("brand new"))?.memory.id))
        .unwrap();

    let err = storage
        .with_connection(|conn| update_state(conn, &id, MemoryState::Completed))
        .unwrap_err();
    assert!(matches!(err, MementoError::InvalidTransition { .. }));

    storage
        .with_connection(|conn| {
            let memory = get_memory(conn, &id)?.unwrap();
            assert_eq!(memory.state, MemoryState::Initial);
            Ok(())
        })
        .unwrap();
}

#[test]
fn traversal_hop_distance_matches_worked_example() {
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
fn soft_delete_then_restore_round_trips_visibility() {
    let storage = Storage::open_in_memory().unwrap();
    let id = storage
        .with_connection(|conn| Ok(store_memory(conn, &input("x"))?.memory.id))
        .unwrap();

    storage
        .with_connection(|conn| delete_memory(conn, &id))
        .unwrap();
    storage
        .with_connection(|conn| {
            assert!(get_memory(conn, &id)?.is_none());
            let deleted = list_memories(
                conn,
                &ListOptions {
                    only_deleted: true,
                    ..Default::default()
                },
            )?;
            assert!(deleted.iter().any(|m| m.id == id));
            Ok(())
        })
        .unwrap();

    storage
        .with_connection(|conn| restore_memory(conn, &id))
        .unwrap();
    storage
        .with_connection(|conn| {
            assert!(get_memory(conn, &id)?.is_some());
            Ok(())
        })
        .unwrap();
}

#[test]
fn hybrid_fusion_ranks_the_doubly_matched_memory_first() {
    // FTS returns [A, B, C], vector returns [B, D, A]: B's fused score
    // (1/61 + 1/62) beats A's (1/62 + 1/63), so B must rank first even
    // though A is the exact full-text match.
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
fn list_without_include_deleted_omits_soft_deleted_memories() {
    let storage = Storage::open_in_memory().unwrap();
    let id = storage
        .with_connection(|conn| Ok(store_memory(conn, &input("transient"))?.memory.id))
        .unwrap();

    storage
        .with_connection(|conn| delete_memory(conn, &id))
        .unwrap();

    let visible = storage
        .with_connection(|conn| list_memories(conn, &ListOptions::default()))
        .unwrap();
    assert!(visible.iter().all(|m| m.id != id));

    let deleted_only = storage
        .with_connection(|conn| {
            list_memories(
                conn,
                &ListOptions {
                    only_deleted: true,
                    ..Default::default()
                },
            )
        })
        .unwrap();
    assert!(deleted_only.iter().any(|m| m.id == id));
}
