//! Connection registry (§4.8): named, isolated storage engines, with id
//! routing and connection-scope fallback.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{MementoError, Result};
use crate::storage::Storage;
use crate::types::PRIMARY_CONNECTION;

/// Map of connection name to its storage engine, plus the server's default
/// connection name (falls back to [`PRIMARY_CONNECTION`] if unset).
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, Storage>>,
    default_connection: String,
    base_dir: Option<std::path::PathBuf>,
}

impl ConnectionRegistry {
    /// `base_dir` is where on-disk connections are created (`<base_dir>/<name>.db`).
    /// `None` opens every connection in memory (used by tests).
    pub fn new(base_dir: Option<std::path::PathBuf>, default_connection: Option<String>) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            default_connection: default_connection
                .unwrap_or_else(|| PRIMARY_CONNECTION.to_string()),
            base_dir,
        }
    }

    pub fn default_connection_name(&self) -> &str {
        &self.default_connection
    }

    /// Get (opening lazily if needed) the storage engine for `name`.
    pub fn get_or_open(&self, name: &str) -> Result<Storage> {
        if let Some(storage) = self.connections.read().get(name) {
            return Ok(storage.clone());
        }
        let storage = self.open_connection(name)?;
        self.connections
            .write()
            .insert(name.to_string(), storage.clone());
        Ok(storage)
    }

    fn open_connection(&self, name: &str) -> Result<Storage> {
        match &self.base_dir {
            Some(dir) => Storage::open(&db_path(dir, name)),
            None => Storage::open_in_memory(),
        }
    }

    /// Resolve a connection name for a query/list-scoped operation: explicit
    /// `connection_id` argument, else the server default, else the primary.
    pub fn resolve_scope(&self, connection_id: Option<&str>) -> Result<Storage> {
        let name = connection_id.unwrap_or(&self.default_connection);
        self.get_or_open(name)
    }

    /// Route an id-bearing operation: parse the connection segment out of a
    /// `mem:<connection>:<hex>` id and open that store.
    pub fn resolve_for_id(&self, id: &str) -> Result<Storage> {
        let connection = connection_name_from_id(id)?;
        self.get_or_open(connection)
    }
}

fn db_path(base_dir: &Path, name: &str) -> String {
    base_dir
        .join(format!("{name}.db"))
        .to_string_lossy()
        .into_owned()
}

/// Parse the middle segment out of a memory id of the form `mem:<connection>:<hex>`.
pub fn connection_name_from_id(id: &str) -> Result<&str> {
    let mut parts = id.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("mem"), Some(connection), Some(_hex)) if !connection.is_empty() => Ok(connection),
        _ => Err(MementoError::InvalidInput(format!(
            "malformed memory id: {id}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_name_from_id_extracts_middle_segment() {
        assert_eq!(
            connection_name_from_id("mem:general:abc123").unwrap(),
            "general"
        );
        assert_eq!(
            connection_name_from_id("mem:work:deadbeef").unwrap(),
            "work"
        );
    }

    #[test]
    fn malformed_id_is_rejected() {
        assert!(connection_name_from_id("not-a-memory-id").is_err());
        assert!(connection_name_from_id("mem:general").is_err());
    }

    #[test]
    fn in_memory_registry_opens_distinct_named_connections() {
        let registry = ConnectionRegistry::new(None, None);
        let general = registry.get_or_open("general").unwrap();
        let work = registry.get_or_open("work").unwrap();
        assert_eq!(registry.default_connection_name(), "general");

        general
            .with_connection(|conn| {
                crate::storage::queries::store_memory(
                    conn,
                    &crate::types::CreateMemoryInput {
                        content: "in general".to_string(),
                        domain: Some("general".to_string()),
                        ..Default::default()
                    },
                )
                .map(|_| ())
            })
            .unwrap();

        let work_count = work
            .with_connection(|conn| {
                crate::storage::queries::list_memories(conn, &crate::types::ListOptions::default())
            })
            .unwrap();
        assert!(work_count.is_empty());
    }
}
