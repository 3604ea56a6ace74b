//! Error types for the memory store

use thiserror::Error;

/// Result type alias for memory-store operations
pub type Result<T> = std::result::Result<T, MementoError>;

/// Main error type for the memory store
#[derive(Error, Debug)]
pub enum MementoError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage I/O error: {0}")]
    StorageIo(String),

    #[error("Memory not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidTransition { from: String, to: String },

    #[error("Search engine unavailable: {0}")]
    SearchEngineUnavailable(String),

    #[error("Enrichment queue is full")]
    EnrichmentQueueFull,

    #[error("Dependency failure: {0}")]
    DependencyFailure(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown connection: {0}")]
    UnknownConnection(String),

    #[error("Duplicate memory detected (existing_id={existing_id})")]
    Duplicate { existing_id: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MementoError {
    /// Whether retrying the same call without client intervention might
    /// succeed (used by callers deciding whether to log-and-continue).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MementoError::StorageIo(_)
                | MementoError::SearchEngineUnavailable(_)
                | MementoError::EnrichmentQueueFull
                | MementoError::DependencyFailure(_)
        )
    }

    /// Map to a JSON-RPC error code for the dispatcher's error reply.
    pub fn code(&self) -> i64 {
        match self {
            MementoError::InvalidInput(_) => -32602,
            MementoError::NotFound(_)
            | MementoError::InvalidTransition { .. }
            | MementoError::StorageIo(_)
            | MementoError::SearchEngineUnavailable(_)
            | MementoError::EnrichmentQueueFull
            | MementoError::DependencyFailure(_)
            | MementoError::Cancelled
            | MementoError::UnknownConnection(_)
            | MementoError::Duplicate { .. }
            | MementoError::Database(_)
            | MementoError::Serialization(_)
            | MementoError::Io(_)
            | MementoError::Internal(_) => -32000,
        }
    }

    /// Stable, never-leaks-internals message surfaced to clients.
    pub fn kind(&self) -> &'static str {
        match self {
            MementoError::NotFound(_) => "NotFound",
            MementoError::InvalidInput(_) => "InvalidInput",
            MementoError::InvalidTransition { .. } => "InvalidTransition",
            MementoError::StorageIo(_) | MementoError::Database(_) | MementoError::Io(_) => {
                "StorageIO"
            }
            MementoError::SearchEngineUnavailable(_) => "SearchEngineUnavailable",
            MementoError::EnrichmentQueueFull => "EnrichmentQueueFull",
            MementoError::DependencyFailure(_) => "DependencyFailure",
            MementoError::Cancelled => "Cancelled",
            MementoError::UnknownConnection(_) => "UnknownConnection",
            MementoError::Duplicate { .. } => "Duplicate",
            MementoError::Serialization(_) => "Serialization",
            MementoError::Internal(_) => "Internal",
        }
    }
}
