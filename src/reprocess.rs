//! Reprocess service (C15): re-run the media pipeline (and optionally the
//! analyzer) for an existing document, replacing its chunks atomically.

use std::sync::Arc;

use crate::domain::{AnalysisResult, ChunkWithEmbedding, Document, MediaType};
use crate::embedding::EmbedderClient;
use crate::error::EngineError;
use crate::logging::{keys, Logger};
use crate::media::{MediaAnalyzer, MediaContext, MediaPipeline, PipelineServices};
use crate::store::SqliteStore;

pub struct ReprocessService {
    store: Arc<SqliteStore>,
    embedder: Arc<dyn EmbedderClient>,
    analyzer: Arc<dyn MediaAnalyzer>,
    pipeline: Arc<tokio::sync::RwLock<MediaPipeline>>,
    context_strategy: Arc<dyn crate::context::ContextStrategy>,
    services: PipelineServices,
    logger: Logger,
}

impl ReprocessService {
    pub fn new(
        store: Arc<SqliteStore>,
        embedder: Arc<dyn EmbedderClient>,
        analyzer: Arc<dyn MediaAnalyzer>,
        pipeline: Arc<tokio::sync::RwLock<MediaPipeline>>,
        context_strategy: Arc<dyn crate::context::ContextStrategy>,
        services: PipelineServices,
    ) -> Self {
        Self { store, embedder, analyzer, pipeline, context_strategy, services, logger: Logger::root() }
    }

    /// Loads the document, extracts its media path from `metadata.source`
    /// (never from the task queue), optionally clears old chunks, re-runs
    /// the pipeline against `new_analysis`, then embeds and saves.
    pub async fn reprocess_document(&self, document_id: &str, new_analysis: AnalysisResult, delete_old_chunks: bool) -> Result<String, EngineError> {
        let document = self
            .store
            .get_document_by_id(document_id)
            .await?
            .ok_or_else(|| crate::error::StoreError::DocumentNotFound(document_id.to_string()))?;

        if !matches!(document.media_type, MediaType::Image | MediaType::Audio | MediaType::Video) {
            return Err(EngineError::Config(format!("document {document_id} is not a media document")));
        }

        let media_path = document
            .source_path()
            .ok_or_else(|| EngineError::Config("media document is missing metadata.source".to_string()))?
            .to_string();

        if delete_old_chunks {
            self.store.delete_chunks_by_document_id(document_id).await?;
        }

        let logger = self.logger.bind(keys::DOC_ID, document_id);
        logger.info("reprocessing media document");

        let context = MediaContext::new(media_path, document.clone(), new_analysis, self.services.clone());
        let chunks = self.pipeline.read().await.run(context).await?;

        if chunks.is_empty() {
            self.store.save(&document, &[]).await?;
            return Ok(document.id);
        }

        let texts: Vec<String> = chunks.iter().map(|c| self.context_strategy.enrich(&document, c)).collect();
        let embeddings = self.embedder.embed_documents(&texts).await?;
        let chunks_with_embeddings: Vec<ChunkWithEmbedding> =
            chunks.into_iter().zip(embeddings).map(|(chunk, embedding)| ChunkWithEmbedding { chunk, embedding }).collect();

        self.store.save(&document, &chunks_with_embeddings).await?;
        Ok(document.id)
    }

    /// Calls the analyzer anew, then delegates to `reprocess_document`.
    pub async fn reanalyze(&self, document_id: &str, custom_instructions: Option<&str>) -> Result<String, EngineError> {
        let document = self
            .store
            .get_document_by_id(document_id)
            .await?
            .ok_or_else(|| crate::error::StoreError::DocumentNotFound(document_id.to_string()))?;

        let media_path = document
            .source_path()
            .ok_or_else(|| EngineError::Config("media document is missing metadata.source".to_string()))?
            .to_string();

        let analysis = self.analyzer.analyze(&media_path, document.media_type, None, custom_instructions).await?;
        self.reprocess_document(document_id, analysis, true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::{SmartSplitter, SplitterConfig};
    use crate::config::EngineConfig;
    use crate::context::HierarchicalContext;
    use crate::domain::{ChunkWithEmbedding as CWE, Metadata};
    use crate::embedding::MockEmbedder;
    use crate::media::{MockAnalyzer, OcrStep, SummaryStep, TranscriptionStep};

    async fn test_service() -> (ReprocessService, Arc<SqliteStore>, String) {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::new(dir.path().join("reprocess.db")).with_embedding_dim(8);
        std::mem::forget(dir);
        let store = Arc::new(SqliteStore::open(&config).await.unwrap());
        let embedder = Arc::new(MockEmbedder::new(8));
        let analyzer = Arc::new(MockAnalyzer::new(AnalysisResult { description: "original".into(), ..Default::default() }));
        let pipeline = Arc::new(tokio::sync::RwLock::new(MediaPipeline::new(vec![Arc::new(SummaryStep), Arc::new(TranscriptionStep), Arc::new(OcrStep)])));
        let splitter = Arc::new(SmartSplitter::new(SplitterConfig::new(config.chunk_size, config.min_chunk_size, config.code_chunk_size).unwrap()));
        let services = PipelineServices {
            splitter,
            transcript_chunk_size: config.transcript_chunk_size,
            ocr_chunk_size: config.ocr_chunk_size,
            ocr_code_ratio_warn_threshold: config.ocr_code_ratio_warn_threshold,
            language: config.output_language.clone(),
            ocr_mode: config.ocr_mode,
            media_enable_timecodes: config.media_enable_timecodes,
            media_strict_timecode_ordering: config.media_strict_timecode_ordering,
        };

        let mut metadata = Metadata::new();
        metadata.insert("source".to_string(), serde_json::Value::String("/a/b.png".into()));
        let document = Document::new("/a/b.png", MediaType::Image, metadata);

        let original_analysis = AnalysisResult { description: "original summary".into(), ..Default::default() };
        let services_clone = services.clone();
        let context = MediaContext::new("/a/b.png", document.clone(), original_analysis, services_clone);
        let chunks = pipeline.read().await.run(context).await.unwrap();
        let embeddings = embedder.embed_documents(&chunks.iter().map(|c| c.content.clone()).collect::<Vec<_>>()).await.unwrap();
        let with_embeddings: Vec<CWE> = chunks.into_iter().zip(embeddings).map(|(chunk, embedding)| CWE { chunk, embedding }).collect();
        store.save(&document, &with_embeddings).await.unwrap();

        let service = ReprocessService::new(store.clone(), embedder, analyzer, pipeline, Arc::new(HierarchicalContext), services);
        (service, store, document.id)
    }

    #[tokio::test]
    async fn reprocess_rebuilds_chunks_from_metadata_source() {
        let (service, store, doc_id) = test_service().await;
        let new_analysis = AnalysisResult { description: "updated summary".into(), ..Default::default() };
        service.reprocess_document(&doc_id, new_analysis, true).await.unwrap();
        let chunks = store.get_chunks_by_document_id(&doc_id, None).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "updated summary");
    }

    #[tokio::test]
    async fn reprocess_fails_for_non_media_document() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::new(dir.path().join("reprocess_text.db")).with_embedding_dim(8);
        std::mem::forget(dir);
        let store = Arc::new(SqliteStore::open(&config).await.unwrap());
        let embedder = Arc::new(MockEmbedder::new(8));
        let analyzer = Arc::new(MockAnalyzer::new(AnalysisResult::default()));
        let pipeline = Arc::new(tokio::sync::RwLock::new(MediaPipeline::new(vec![])));
        let splitter = Arc::new(SmartSplitter::new(SplitterConfig::new(config.chunk_size, config.min_chunk_size, config.code_chunk_size).unwrap()));
        let services = PipelineServices {
            splitter,
            transcript_chunk_size: None,
            ocr_chunk_size: None,
            ocr_code_ratio_warn_threshold: 0.5,
            language: "en".to_string(),
            ocr_mode: crate::config::OcrMode::Markdown,
            media_enable_timecodes: true,
            media_strict_timecode_ordering: false,
        };
        let document = Document::new("plain text", MediaType::Text, Metadata::new());
        store.save(&document, &[]).await.unwrap();
        let service = ReprocessService::new(store, embedder, analyzer, pipeline, Arc::new(HierarchicalContext), services);
        let result = service.reprocess_document(&document.id, AnalysisResult::default(), true).await;
        assert!(result.is_err());
    }
}
