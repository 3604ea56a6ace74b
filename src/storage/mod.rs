//! Storage engine: SQLite-backed durable store for memories, entities,
//! relationships, and their junction tables.

mod connection;
mod migrations;
pub mod queries;

pub use connection::Storage;
pub use migrations::SCHEMA_VERSION;
