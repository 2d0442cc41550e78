//! Core domain entities (C1): documents, chunks, media tasks, and the
//! transient DTOs search and media aggregation return.
//!
//! These are storage-agnostic: the store module maps them to rows, the
//! ingestion/search facades pass them around by value. Identifiers are
//! UUIDv4 strings, the same choice `wg_ragsmith::stores::ChunkRecord` makes
//! for chunk ids.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

/// Free-form metadata attached to a document or chunk. Backed by a JSON
/// object so the store can push it straight into a `metadata json` column
/// and query it with `json_extract`.
pub type Metadata = BTreeMap<String, Json>;

/// The reserved metadata key carrying a document's canonical original path.
/// Reprocessing treats this as the single source of truth.
pub const METADATA_SOURCE_KEY: &str = "source";

/// Coarse media classification of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Text,
    Markdown,
    Image,
    Audio,
    Video,
}

impl MediaType {
    pub fn is_media(self) -> bool {
        matches!(self, MediaType::Image | MediaType::Audio | MediaType::Video)
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MediaType::Text => "text",
            MediaType::Markdown => "markdown",
            MediaType::Image => "image",
            MediaType::Audio => "audio",
            MediaType::Video => "video",
        };
        f.write_str(s)
    }
}

/// Typed classification of a chunk's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Text,
    Code,
    Table,
    ImageRef,
    AudioRef,
    VideoRef,
}

impl ChunkType {
    pub fn is_media_ref(self) -> bool {
        matches!(self, ChunkType::ImageRef | ChunkType::AudioRef | ChunkType::VideoRef)
    }
}

impl std::fmt::Display for ChunkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChunkType::Text => "text",
            ChunkType::Code => "code",
            ChunkType::Table => "table",
            ChunkType::ImageRef => "image_ref",
            ChunkType::AudioRef => "audio_ref",
            ChunkType::VideoRef => "video_ref",
        };
        f.write_str(s)
    }
}

/// Role tag for media-derived chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Summary,
    Transcript,
    Ocr,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::Summary => "summary",
            Role::Transcript => "transcript",
            Role::Ocr => "ocr",
        };
        f.write_str(s)
    }
}

/// A document as stored by the engine. `content` holds source text for
/// text/markdown documents and a path reference for media documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    pub media_type: MediaType,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// Builds a document with a fresh id and `created_at = now`, the shape
    /// the ingestion core uses before the store assigns it durably.
    pub fn new(content: impl Into<String>, media_type: MediaType, metadata: Metadata) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            media_type,
            metadata,
            created_at: Utc::now(),
        }
    }

    /// The canonical original path, if set. See [`METADATA_SOURCE_KEY`].
    pub fn source_path(&self) -> Option<&str> {
        self.metadata.get(METADATA_SOURCE_KEY).and_then(Json::as_str)
    }
}

/// A chunk belonging to exactly one document.
///
/// `content` is the original textual fragment and is never rewritten by
/// context enrichment; the enriched prompt text is ephemeral (see
/// `crate::context`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: usize,
    pub content: String,
    pub chunk_type: ChunkType,
    pub language: Option<String>,
    pub metadata: ChunkMetadata,
    pub created_at: DateTime<Utc>,
}

/// Chunk-level metadata: an inherited copy of the document's metadata plus
/// fields the splitter and media pipeline populate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Ancestor heading breadcrumb, outermost first.
    #[serde(default)]
    pub headers: Vec<String>,
    /// Set for media-derived chunks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Seconds into the source media, for time-aligned transcript/ocr chunks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_seconds: Option<f64>,
    /// Canonical path of the media file this chunk was derived from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_media_path: Option<String>,
    /// Equal to the owning document's id; duplicated for query convenience.
    pub source_id: String,
    /// Inherited document metadata plus any chunk-local extras (e.g. the
    /// reserved `_vision_*`/`_audio_*`/`_video_*` keys the summary step
    /// writes). Flattened into the same JSON object on persistence.
    #[serde(flatten)]
    pub extra: Metadata,
}

impl ChunkMetadata {
    pub fn for_document(document: &Document) -> Self {
        Self {
            headers: Vec::new(),
            role: None,
            start_seconds: None,
            parent_media_path: None,
            source_id: document.id.clone(),
            extra: document.metadata.clone(),
        }
    }
}

impl Chunk {
    /// A chunk builder for use by the splitter/pipeline, which know the
    /// index and content up front but may not yet know a durable document
    /// id (filled in by the ingestion core before save).
    pub fn new(
        document_id: impl Into<String>,
        chunk_index: usize,
        content: impl Into<String>,
        chunk_type: ChunkType,
        metadata: ChunkMetadata,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.into(),
            chunk_index,
            content: content.into(),
            chunk_type,
            language: None,
            metadata,
            created_at: Utc::now(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// A chunk paired with the embedding vector the store should persist.
#[derive(Debug, Clone)]
pub struct ChunkWithEmbedding {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// Lifecycle state of a [`MediaTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A persistent media-analysis queue entry (C10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaTask {
    pub id: String,
    pub media_path: String,
    pub media_type: MediaType,
    pub mime_type: Option<String>,
    pub user_prompt: Option<String>,
    pub context_text: Option<String>,
    pub status: TaskStatus,
    pub error_message: Option<String>,
    pub result: Option<AnalysisResult>,
    pub result_document_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl MediaTask {
    pub fn new(media_path: impl Into<String>, media_type: MediaType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            media_path: media_path.into(),
            media_type,
            mime_type: None,
            user_prompt: None,
            context_text: None,
            status: TaskStatus::Pending,
            error_message: None,
            result: None,
            result_document_id: None,
            created_at: Utc::now(),
            processed_at: None,
        }
    }
}

/// Structured output of a media analyzer call (C9).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcription: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participants: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_items: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
}

/// How a [`ChunkResult`] was matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Vector,
    Fts,
    Hybrid,
}

/// Search mode requested by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Vector,
    Fts,
    Hybrid,
}

/// A single scored chunk match, the primary query surface (C13).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkResult {
    pub chunk: Chunk,
    pub score: f64,
    pub match_type: MatchType,
    pub document_id: String,
    pub document_title: Option<String>,
}

/// Document-shaped alternative query result, aggregating its best chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub document: Document,
    pub best_chunk: ChunkResult,
}

/// Aggregated view of a media document's derived chunks (C14).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaDetails {
    pub summary: Option<String>,
    pub transcript: Option<String>,
    pub ocr: Option<String>,
    pub timeline: Vec<TimelineEntry>,
    pub keywords: Vec<String>,
    pub duration: Option<f64>,
}

/// One time-anchored entry in a media document's timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub chunk_id: String,
    pub start_seconds: f64,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_source_path_reads_metadata_source_key() {
        let mut metadata = Metadata::new();
        metadata.insert(METADATA_SOURCE_KEY.to_string(), Json::String("/a/b.png".into()));
        let doc = Document::new("ignored", MediaType::Image, metadata);
        assert_eq!(doc.source_path(), Some("/a/b.png"));
    }

    #[test]
    fn chunk_metadata_inherits_document_metadata() {
        let mut metadata = Metadata::new();
        metadata.insert("project".to_string(), Json::String("demo".into()));
        let doc = Document::new("text", MediaType::Text, metadata);
        let cm = ChunkMetadata::for_document(&doc);
        assert_eq!(cm.source_id, doc.id);
        assert_eq!(cm.extra.get("project"), Some(&Json::String("demo".into())));
    }

    #[test]
    fn media_type_is_media_matches_spec_set() {
        assert!(MediaType::Image.is_media());
        assert!(MediaType::Audio.is_media());
        assert!(MediaType::Video.is_media());
        assert!(!MediaType::Text.is_media());
        assert!(!MediaType::Markdown.is_media());
    }
}
