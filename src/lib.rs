//! An embedded, local-first semantic knowledge engine: Markdown/media
//! ingestion, smart chunking, hybrid vector+full-text retrieval, and a
//! persistent media-analysis pipeline, all backed by a single SQLite file.
//!
//! The public surface is [`engine::Engine`]; everything else is exposed for
//! callers who want to compose the pieces directly (custom pipeline steps,
//! alternate context strategies, direct store access).

pub mod cancellation;
pub mod chunking;
pub mod config;
pub mod context;
pub mod domain;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod ingestion;
pub mod logging;
pub mod markdown;
pub mod media;
pub mod media_service;
pub mod reprocess;
pub mod search;
pub mod store;

pub use config::EngineConfig;
pub use domain::{
    AnalysisResult, Chunk, ChunkMetadata, ChunkResult, ChunkType, ChunkWithEmbedding, Document, MatchType, MediaDetails, MediaTask, MediaType,
    Metadata, Role, SearchMode, SearchResult, TaskStatus, TimelineEntry,
};
pub use engine::Engine;
pub use error::EngineError;
pub use ingestion::IngestMode;
