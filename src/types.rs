//! Core data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Reserved connection name for the primary store.
pub const PRIMARY_CONNECTION: &str = "general";

/// Maximum serialized size, in bytes, of `Memory::source_context`.
pub const MAX_SOURCE_CONTEXT_BYTES: usize = 4096;

/// Maximum length of a supersedes-chain walk before it is cut off.
pub const MAX_EVOLUTION_CHAIN_LEN: usize = 50;

/// Progress of an enrichment stage (or of the memory as a whole).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentStatus {
    #[default]
    Pending,
    Enriched,
    Failed,
}

impl EnrichmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichmentStatus::Pending => "pending",
            EnrichmentStatus::Enriched => "enriched",
            EnrichmentStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for EnrichmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EnrichmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(EnrichmentStatus::Pending),
            "enriched" => Ok(EnrichmentStatus::Enriched),
            "failed" => Ok(EnrichmentStatus::Failed),
            _ => Err(format!("unknown enrichment status: {s}")),
        }
    }
}

/// Lifecycle state machine states (§4.4). The empty string is the initial
/// state, distinct from any named state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryState {
    #[default]
    #[serde(rename = "")]
    Initial,
    Planning,
    Active,
    Paused,
    Blocked,
    Completed,
    Cancelled,
    Archived,
    Superseded,
}

impl MemoryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryState::Initial => "",
            MemoryState::Planning => "planning",
            MemoryState::Active => "active",
            MemoryState::Paused => "paused",
            MemoryState::Blocked => "blocked",
            MemoryState::Completed => "completed",
            MemoryState::Cancelled => "cancelled",
            MemoryState::Archived => "archived",
            MemoryState::Superseded => "superseded",
        }
    }

    /// Whether no further transitions are possible (ignoring the `evolve`
    /// escape hatch into `superseded`, handled separately by callers).
    pub fn is_terminal(&self) -> bool {
        matches!(self, MemoryState::Archived | MemoryState::Superseded)
    }
}

impl std::fmt::Display for MemoryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MemoryState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Ok(MemoryState::Initial),
            "planning" => Ok(MemoryState::Planning),
            "active" => Ok(MemoryState::Active),
            "paused" => Ok(MemoryState::Paused),
            "blocked" => Ok(MemoryState::Blocked),
            "completed" => Ok(MemoryState::Completed),
            "cancelled" => Ok(MemoryState::Cancelled),
            "archived" => Ok(MemoryState::Archived),
            "superseded" => Ok(MemoryState::Superseded),
            other => Err(format!("unknown lifecycle state: {other}")),
        }
    }
}

/// Project-hierarchy classification of a memory. Empty string means
/// "not a project-hierarchy node".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    #[default]
    #[serde(rename = "")]
    None,
    Project,
    Phase,
    Epic,
    Task,
    Step,
    Milestone,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::None => "",
            MemoryType::Project => "project",
            MemoryType::Phase => "phase",
            MemoryType::Epic => "epic",
            MemoryType::Task => "task",
            MemoryType::Step => "step",
            MemoryType::Milestone => "milestone",
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Ok(MemoryType::None),
            "project" => Ok(MemoryType::Project),
            "phase" => Ok(MemoryType::Phase),
            "epic" => Ok(MemoryType::Epic),
            "task" => Ok(MemoryType::Task),
            "step" => Ok(MemoryType::Step),
            "milestone" => Ok(MemoryType::Milestone),
            other => Err(format!("unknown memory type: {other}")),
        }
    }
}

/// The central entity: a unit of persisted text with provenance, lifecycle,
/// and optional enrichment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// `mem:<connection>:<16-hex>`; deterministic from (connection, content).
    pub id: String,
    pub content: String,
    /// Full SHA-256 hex digest of `content`.
    pub content_hash: String,
    /// Connection (tenant) name; equal to the middle segment of `id`.
    pub domain: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default)]
    pub status: EnrichmentStatus,
    #[serde(default)]
    pub entity_status: EnrichmentStatus,
    #[serde(default)]
    pub relationship_status: EnrichmentStatus,
    #[serde(default)]
    pub embedding_status: EnrichmentStatus,
    #[serde(default)]
    pub classification_status: EnrichmentStatus,
    #[serde(default)]
    pub summarization_status: EnrichmentStatus,
    #[serde(default)]
    pub enrichment_attempts: i32,
    pub enrichment_error: Option<String>,

    #[serde(default)]
    pub state: MemoryState,
    pub state_updated_at: Option<DateTime<Utc>>,

    #[serde(rename = "type", default)]
    pub memory_type: MemoryType,
    pub supersedes_id: Option<String>,

    pub created_by: Option<String>,
    pub session_id: Option<String>,
    pub source_context: Option<serde_json::Value>,

    #[serde(default)]
    pub access_count: i32,
    pub last_accessed_at: Option<DateTime<Utc>>,
    #[serde(default = "default_decay_score")]
    pub decay_score: f64,
    pub decay_updated_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
    pub enriched_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

fn default_decay_score() -> f64 {
    1.0
}

/// Produced by the external enrichment pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Directed edge between two entities, traversed bidirectionally by the
/// graph engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    pub source_entity_id: String,
    pub target_entity_id: String,
    #[serde(rename = "type")]
    pub relation_type: String,
    pub created_at: DateTime<Utc>,
}

/// Many-to-many junction: which entities a memory touches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntity {
    pub memory_id: String,
    pub entity_id: String,
    pub frequency: i32,
    pub confidence: f64,
}

/// Typed memory-to-memory edge. The only type used by the core is
/// `CONTAINS` (project hierarchy).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryLink {
    pub id: String,
    pub source_memory_id: String,
    pub target_memory_id: String,
    #[serde(rename = "type")]
    pub link_type: String,
}

pub const LINK_TYPE_CONTAINS: &str = "CONTAINS";

/// Opaque little-endian IEEE-754 double vector, keyed by memory id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub memory_id: String,
    pub bytes: Vec<u8>,
    pub dimension: i32,
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Embedding {
    /// Serialize a vector of doubles into the little-endian byte layout.
    pub fn serialize_vector(v: &[f64]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(v.len() * 8);
        for value in v {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    /// Deserialize the little-endian byte layout back into doubles.
    pub fn deserialize_vector(bytes: &[u8]) -> crate::error::Result<Vec<f64>> {
        if bytes.len() % 8 != 0 {
            return Err(crate::error::MementoError::InvalidInput(format!(
                "embedding byte length {} is not a multiple of 8",
                bytes.len()
            )));
        }
        Ok(bytes
            .chunks_exact(8)
            .map(|chunk| {
                let mut arr = [0u8; 8];
                arr.copy_from_slice(chunk);
                f64::from_le_bytes(arr)
            })
            .collect())
    }
}

/// Arguments to `store_memory` / `storage::store`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateMemoryInput {
    pub content: String,
    pub domain: Option<String>,
    pub source: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(rename = "type", default)]
    pub memory_type: MemoryType,
    pub created_by: Option<String>,
    pub session_id: Option<String>,
    pub source_context: Option<serde_json::Value>,
}

/// Arguments to `update_memory`. `None` fields leave the existing value
/// untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateMemoryInput {
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<HashMap<String, serde_json::Value>>,
    pub keywords: Option<Vec<String>>,
}

/// `list`/`list_deleted_memories` filter and pagination options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListOptions {
    pub domain: Option<String>,
    pub state: Option<String>,
    pub created_by: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub min_decay_score: Option<f64>,
    pub session_id: Option<String>,
    pub memory_type: Option<String>,
    #[serde(default)]
    pub include_deleted: bool,
    #[serde(default)]
    pub only_deleted: bool,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    20
}

/// A single hop result from `traverse_memory_graph`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraversalResult {
    pub memory: Memory,
    pub hop_distance: u32,
    pub shared_entities: Vec<String>,
}

/// One finding from `detect_contradictions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contradiction {
    pub kind: ContradictionKind,
    pub memory_ids: Vec<String>,
    pub description: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContradictionKind {
    ConflictingRelationship,
    SupersededActive,
    TemporalImpossibility,
}

/// Result of `consolidate_memories`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationResult {
    pub source_ids: Vec<String>,
    pub result_id: String,
    pub consolidated_at: DateTime<Utc>,
}

/// A search hit: a memory plus the retrieval metadata used to rank it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub memory: Memory,
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_round_trip() {
        let v = vec![1.0, -2.5, 0.0, 7.654321];
        let bytes = Embedding::serialize_vector(&v);
        assert_eq!(bytes.len(), v.len() * 8);
        let back = Embedding::deserialize_vector(&bytes).unwrap();
        for (a, b) in v.iter().zip(back.iter()) {
            assert!((a - b).abs() < 1e-10);
        }
    }

    #[test]
    fn deserialize_rejects_misaligned_bytes() {
        let bytes = vec![0u8; 7];
        assert!(Embedding::deserialize_vector(&bytes).is_err());
    }

    #[test]
    fn memory_state_roundtrips_through_str() {
        for s in [
            "",
            "planning",
            "active",
            "paused",
            "blocked",
            "completed",
            "cancelled",
            "archived",
            "superseded",
        ] {
            let parsed: MemoryState = s.parse().unwrap();
            assert_eq!(parsed.as_str(), s);
        }
    }
}
