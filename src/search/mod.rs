//! Search provider (§4.2): full-text (FTS5), vector (cosine), and RRF
//! hybrid fusion.

pub mod fulltext;
pub mod hybrid;
pub mod vector;

pub use fulltext::full_text_search;
pub use hybrid::hybrid_search;
pub use vector::vector_search;

/// `MEMORY_COLUMNS` from `storage::queries`, each qualified with `alias.`,
/// for use in joined queries (FTS table joins) where bare column names
/// would be ambiguous.
pub(crate) fn memory_columns_prefixed(alias: &str) -> String {
    crate::storage::queries::MEMORY_COLUMNS
        .split(", ")
        .map(|c| format!("{alias}.{c}"))
        .collect::<Vec<_>>()
        .join(", ")
}
