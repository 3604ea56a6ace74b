//! Higher-level operations built on top of storage and search: merging
//! related memories into a single consolidated record.

pub mod consolidation;

pub use consolidation::consolidate;
