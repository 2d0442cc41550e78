//! Store-facing DTOs that don't belong on the storage-agnostic domain types.

use crate::domain::{ChunkType, Metadata};

/// Equality filters applied against a document or chunk's `metadata` JSON
/// column via `json_extract`, e.g. reprocessing looks documents up by
/// `{"source": "<path>"}`.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub metadata: Metadata,
}

impl SearchFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Optional narrowing applied to a chunk search, independent of query mode.
#[derive(Debug, Clone, Default)]
pub struct ChunkFilters {
    pub chunk_type: Option<ChunkType>,
    pub language: Option<String>,
}
