//! Media service (C14): assembles a document's derived chunks back into a
//! human-shaped view — summary, transcript, OCR text, timeline, keywords.

use std::sync::Arc;

use crate::domain::{Chunk, MediaDetails, Role, TimelineEntry};
use crate::error::StoreError;
use crate::store::SqliteStore;

pub struct MediaService {
    store: Arc<SqliteStore>,
}

impl MediaService {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }

    pub async fn get_media_details(&self, document_id: &str) -> Result<MediaDetails, StoreError> {
        if self.store.get_document_by_id(document_id).await?.is_none() {
            return Err(StoreError::DocumentNotFound(document_id.to_string()));
        }

        let chunks = self.store.get_chunks_by_document_id(document_id, None).await?;

        let summary = chunks
            .iter()
            .find(|c| c.metadata.role == Some(Role::Summary))
            .map(|c| c.content.clone());

        let transcript_chunks: Vec<&Chunk> = chunks.iter().filter(|c| c.metadata.role == Some(Role::Transcript)).collect();
        let transcript = if transcript_chunks.is_empty() {
            None
        } else {
            Some(transcript_chunks.iter().map(|c| c.content.as_str()).collect::<Vec<_>>().join("\n\n"))
        };

        let ocr_chunks: Vec<&Chunk> = chunks.iter().filter(|c| c.metadata.role == Some(Role::Ocr)).collect();
        let ocr = if ocr_chunks.is_empty() {
            None
        } else {
            Some(ocr_chunks.iter().map(|c| c.content.as_str()).collect::<Vec<_>>().join("\n\n"))
        };

        let timeline: Vec<TimelineEntry> = transcript_chunks
            .iter()
            .filter_map(|c| {
                c.metadata.start_seconds.map(|start_seconds| TimelineEntry {
                    chunk_id: c.id.clone(),
                    start_seconds,
                    content: c.content.clone(),
                })
            })
            .collect();

        let keywords = chunks
            .iter()
            .find_map(|c| c.metadata.extra.get("_vision_keywords"))
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        let duration = chunks.iter().find_map(|c| c.metadata.extra.get("_video_duration_seconds")).and_then(|v| v.as_f64());

        Ok(MediaDetails { summary, transcript, ocr, timeline, keywords, duration })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::domain::{ChunkMetadata, ChunkType, ChunkWithEmbedding, Document, MediaType, Metadata};

    async fn store_with_media_document() -> (Arc<SqliteStore>, String) {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::new(dir.path().join("media_service.db")).with_embedding_dim(4);
        std::mem::forget(dir);
        let store = Arc::new(SqliteStore::open(&config).await.unwrap());

        let doc = Document::new("/a.mp4", MediaType::Video, Metadata::new());

        let mut summary_meta = ChunkMetadata::default();
        summary_meta.role = Some(Role::Summary);
        let mut summary_extra = serde_json::Map::new();
        summary_extra.insert("_video_duration_seconds".to_string(), serde_json::json!(90.0));
        summary_meta.extra = summary_extra.into_iter().collect();
        let summary = Chunk::new(doc.id.clone(), 0, "a person explains rust ownership", ChunkType::VideoRef, summary_meta);

        let mut transcript_meta = ChunkMetadata::default();
        transcript_meta.role = Some(Role::Transcript);
        transcript_meta.start_seconds = Some(5.0);
        let transcript = Chunk::new(doc.id.clone(), 1, "hello and welcome", ChunkType::Text, transcript_meta);

        let with_embeddings = vec![
            ChunkWithEmbedding { chunk: summary, embedding: vec![0.1, 0.2, 0.3, 0.4] },
            ChunkWithEmbedding { chunk: transcript, embedding: vec![0.2, 0.2, 0.2, 0.2] },
        ];
        store.save(&doc, &with_embeddings).await.unwrap();
        (store, doc.id)
    }

    #[tokio::test]
    async fn assembles_summary_transcript_and_timeline() {
        let (store, doc_id) = store_with_media_document().await;
        let service = MediaService::new(store);
        let details = service.get_media_details(&doc_id).await.unwrap();
        assert_eq!(details.summary.as_deref(), Some("a person explains rust ownership"));
        assert_eq!(details.transcript.as_deref(), Some("hello and welcome"));
        assert!(details.ocr.is_none());
        assert_eq!(details.timeline.len(), 1);
        assert_eq!(details.timeline[0].start_seconds, 5.0);
        assert_eq!(details.duration, Some(90.0));
    }

    #[tokio::test]
    async fn missing_document_returns_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::new(dir.path().join("media_service_missing.db")).with_embedding_dim(4);
        std::mem::forget(dir);
        let store = Arc::new(SqliteStore::open(&config).await.unwrap());
        let service = MediaService::new(store);
        let result = service.get_media_details("nonexistent").await;
        assert!(matches!(result, Err(StoreError::DocumentNotFound(_))));
    }
}
