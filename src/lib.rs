//! Memento - persistent, content-addressed memory for AI agents.
//!
//! Stores memories in SQLite with full-text and vector search, a lifecycle
//! state machine with evolution chains, entity-graph traversal, and
//! contradiction detection, exposed over a JSON-RPC-style command
//! dispatcher.

pub mod contradiction;
pub mod enrichment;
pub mod error;
pub mod graph;
pub mod intelligence;
pub mod lifecycle;
pub mod mcp;
pub mod project;
pub mod registry;
pub mod search;
pub mod storage;
pub mod types;

pub use error::{MementoError, Result};
pub use storage::Storage;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
