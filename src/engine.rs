//! Public facade: wires ingestion, search, media service and reprocess
//! behind the single surface external callers (CLI, web layer) are meant
//! to use.

use std::sync::Arc;

use crate::cancellation::CancellationToken;
use crate::chunking::{SmartSplitter, SplitterConfig};
use crate::config::{ContextMode, EngineConfig};
use crate::context::{ContextStrategy, HierarchicalContext, NoContext};
use crate::domain::{AnalysisResult, ChunkResult, ChunkType, Document, MediaDetails, SearchMode};
use crate::embedding::EmbedderClient;
use crate::error::EngineError;
use crate::ingestion::{IngestMode, IngestionCore};
use crate::media::{MediaAnalyzer, MediaPipeline, MediaTaskQueue, OcrStep, PipelineServices, ProcessingStep, SummaryStep, TranscriptionStep};
use tokio::sync::RwLock;
use crate::media_service::MediaService;
use crate::reprocess::ReprocessService;
use crate::search::SearchFacade;
use crate::store::SqliteStore;

/// Top-level entry point. Construct once per process with `Engine::new`,
/// then share it (it is `Send + Sync`, cheap to clone via `Arc` if needed
/// by callers) across ingestion/search call sites.
pub struct Engine {
    store: Arc<SqliteStore>,
    ingestion: IngestionCore,
    search: SearchFacade,
    media_service: MediaService,
    reprocess: ReprocessService,
    queue: Arc<MediaTaskQueue>,
    pipeline: Arc<RwLock<MediaPipeline>>,
    splitter: Arc<SmartSplitter>,
    context_strategy: Arc<dyn ContextStrategy>,
    embedder: Arc<dyn EmbedderClient>,
    config: EngineConfig,
}

impl Engine {
    pub async fn new(config: EngineConfig, embedder: Arc<dyn EmbedderClient>, analyzer: Arc<dyn MediaAnalyzer>) -> Result<Self, EngineError> {
        config.validate()?;

        let store = Arc::new(SqliteStore::open(&config).await?);
        let splitter = Arc::new(SmartSplitter::new(SplitterConfig::new(config.chunk_size, config.min_chunk_size, config.code_chunk_size)?));
        let context_strategy: Arc<dyn ContextStrategy> = match config.context_mode {
            ContextMode::Hierarchical => Arc::new(HierarchicalContext),
            ContextMode::None => Arc::new(NoContext),
        };

        let steps: Vec<Arc<dyn ProcessingStep>> = vec![Arc::new(SummaryStep), Arc::new(TranscriptionStep), Arc::new(OcrStep)];
        let pipeline = Arc::new(RwLock::new(MediaPipeline::new(steps)));
        let queue = Arc::new(MediaTaskQueue::new(store.clone(), analyzer.clone()));

        let services = PipelineServices {
            splitter: splitter.clone(),
            transcript_chunk_size: config.transcript_chunk_size,
            ocr_chunk_size: config.ocr_chunk_size,
            ocr_code_ratio_warn_threshold: config.ocr_code_ratio_warn_threshold,
            language: config.output_language.clone(),
            ocr_mode: config.ocr_mode,
            media_enable_timecodes: config.media_enable_timecodes,
            media_strict_timecode_ordering: config.media_strict_timecode_ordering,
        };

        let ingestion = IngestionCore::new(
            store.clone(),
            splitter.clone(),
            context_strategy.clone(),
            embedder.clone(),
            analyzer.clone(),
            pipeline.clone(),
            queue.clone(),
            config.clone(),
        );
        let search = SearchFacade::new(store.clone(), embedder.clone(), &config);
        let media_service = MediaService::new(store.clone());
        let reprocess = ReprocessService::new(store.clone(), embedder.clone(), analyzer, pipeline.clone(), context_strategy.clone(), services);

        Ok(Self {
            store,
            ingestion,
            search,
            media_service,
            reprocess,
            queue,
            pipeline,
            splitter,
            context_strategy,
            embedder,
            config,
        })
    }

    pub async fn ingest(&self, document: Document, mode: IngestMode) -> Result<Document, EngineError> {
        self.ingest_with_cancellation(document, mode, &CancellationToken::none()).await
    }

    pub async fn ingest_with_cancellation(&self, document: Document, mode: IngestMode, cancellation: &CancellationToken) -> Result<Document, EngineError> {
        self.ingestion.ingest(document, mode, cancellation).await
    }

    pub async fn search_chunks(
        &self,
        query: &str,
        mode: SearchMode,
        limit: Option<usize>,
        chunk_type_filter: Option<ChunkType>,
        language_filter: Option<String>,
    ) -> Result<Vec<ChunkResult>, EngineError> {
        self.search.search(query, mode, limit, chunk_type_filter, language_filter).await
    }

    pub async fn get_media_details(&self, document_id: &str) -> Result<MediaDetails, EngineError> {
        Ok(self.media_service.get_media_details(document_id).await?)
    }

    pub async fn process_media_queue(&self, max: usize) -> Result<usize, EngineError> {
        Ok(self.queue.process_batch(max).await?)
    }

    pub async fn reprocess_document(&self, document_id: &str, new_analysis: AnalysisResult) -> Result<String, EngineError> {
        self.reprocess.reprocess_document(document_id, new_analysis, true).await
    }

    pub async fn reanalyze(&self, document_id: &str, custom_instructions: Option<&str>) -> Result<String, EngineError> {
        self.reprocess.reanalyze(document_id, custom_instructions).await
    }

    /// Re-runs exactly one pipeline step against the document's last
    /// completed analysis, replacing that step's chunks. Custom steps
    /// registered on a caller-built `MediaPipeline` are not visible here;
    /// use the lower-level components directly for that.
    pub async fn rerun_step(&self, step_name: &str, document_id: &str) -> Result<usize, EngineError> {
        let document = self
            .store
            .get_document_by_id(document_id)
            .await?
            .ok_or_else(|| crate::error::StoreError::DocumentNotFound(document_id.to_string()))?;
        let media_path = document
            .source_path()
            .ok_or_else(|| EngineError::Config("document is missing metadata.source".to_string()))?
            .to_string();

        let task = self
            .store
            .get_latest_completed_media_task_for_document(document_id)
            .await?
            .ok_or_else(|| EngineError::Config(format!("no completed analysis found for document {document_id}")))?;
        let analysis = task
            .result
            .ok_or_else(|| EngineError::Config(format!("completed media task for document {document_id} carries no result")))?;

        let role = self.role_for_step(step_name);
        let role_chunks = self.store.get_chunks_by_document_id(document_id, role).await?;
        let role_chunk_ids: Vec<String> = role_chunks.iter().map(|c| c.id.clone()).collect();
        let remaining_chunks: Vec<_> = self.store.get_chunks_by_document_id(document_id, None).await?.into_iter().filter(|c| role != c.metadata.role).collect();

        self.store.delete_chunks_by_ids(&role_chunk_ids).await?;

        let services = PipelineServices {
            splitter: self.splitter.clone(),
            transcript_chunk_size: self.config.transcript_chunk_size,
            ocr_chunk_size: self.config.ocr_chunk_size,
            ocr_code_ratio_warn_threshold: self.config.ocr_code_ratio_warn_threshold,
            language: self.config.output_language.clone(),
            ocr_mode: self.config.ocr_mode,
            media_enable_timecodes: self.config.media_enable_timecodes,
            media_strict_timecode_ordering: self.config.media_strict_timecode_ordering,
        };
        let context = crate::media::MediaContext::new(media_path, document.clone(), analysis, services);
        let new_chunks = self.pipeline.read().await.rerun_step(step_name, context, remaining_chunks.clone()).await?;
        let new_count = new_chunks.len();

        // The re-run step's chunks may land anywhere in the document's
        // chunk order (transcript/ocr keep their slot, summary must be
        // first), so the whole set is reindexed densely rather than just
        // appending the new chunks after the untouched ones.
        let mut all_chunks: Vec<_> = remaining_chunks.into_iter().chain(new_chunks.iter().cloned()).collect();
        all_chunks.sort_by_key(|c| (c.metadata.role != Some(crate::domain::Role::Summary), c.chunk_index));
        let mut reindexed_ids = Vec::with_capacity(all_chunks.len());
        for (i, chunk) in all_chunks.iter_mut().enumerate() {
            reindexed_ids.push((chunk.id.clone(), i));
            chunk.chunk_index = i;
        }
        let new_ids: std::collections::HashSet<&str> = new_chunks.iter().map(|c| c.id.as_str()).collect();
        let existing_updates: Vec<(String, usize)> = reindexed_ids.into_iter().filter(|(id, _)| !new_ids.contains(id.as_str())).collect();
        self.store.reindex_chunks(&existing_updates).await?;

        if new_chunks.is_empty() {
            return Ok(0);
        }
        let final_new_chunks: Vec<_> = all_chunks.into_iter().filter(|c| new_ids.contains(c.id.as_str())).collect();
        let texts: Vec<String> = final_new_chunks.iter().map(|c| self.context_strategy.enrich(&document, c)).collect();
        let embeddings = self.embedder.embed_documents(&texts).await?;
        let chunks_with_embeddings: Vec<crate::domain::ChunkWithEmbedding> =
            final_new_chunks.into_iter().zip(embeddings).map(|(chunk, embedding)| crate::domain::ChunkWithEmbedding { chunk, embedding }).collect();
        self.store.save(&document, &chunks_with_embeddings).await?;
        Ok(new_count)
    }

    /// Inserts a custom step into the engine's media pipeline, visible to
    /// every subsequent `ingest`/`reprocess_document`/`rerun_step` call.
    pub async fn register_step(&self, step: Arc<dyn ProcessingStep>, position: Option<usize>) {
        self.pipeline.write().await.register_step(step, position);
    }

    fn role_for_step(&self, step_name: &str) -> Option<crate::domain::Role> {
        match step_name {
            "summary" => Some(crate::domain::Role::Summary),
            "transcription" => Some(crate::domain::Role::Transcript),
            "ocr" => Some(crate::domain::Role::Ocr),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Metadata, MediaType};
    use crate::embedding::MockEmbedder;
    use crate::media::MockAnalyzer;

    async fn test_engine() -> Engine {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::new(dir.path().join("engine.db")).with_embedding_dim(8);
        std::mem::forget(dir);
        let embedder = Arc::new(MockEmbedder::new(8));
        let analyzer = Arc::new(MockAnalyzer::new(AnalysisResult { description: "a mountain at sunset".into(), ..Default::default() }));
        Engine::new(config, embedder, analyzer).await.unwrap()
    }

    #[tokio::test]
    async fn ingests_and_finds_a_text_document_via_hybrid_search() {
        let engine = test_engine().await;
        let doc = Document::new("Reciprocal Rank Fusion explained in detail.", MediaType::Text, Metadata::new());
        engine.ingest(doc, IngestMode::Sync).await.unwrap();

        let results = engine.search_chunks("Reciprocal Rank Fusion", SearchMode::Hybrid, None, None, None).await.unwrap();
        assert!(!results.is_empty());
    }

    #[tokio::test]
    async fn ingests_image_and_reads_back_media_details() {
        let engine = test_engine().await;
        let mut metadata = Metadata::new();
        metadata.insert("source".to_string(), serde_json::Value::String("/sunset.png".into()));
        let doc = Document::new("/sunset.png", MediaType::Image, metadata);
        engine.ingest(doc.clone(), IngestMode::Sync).await.unwrap();

        let details = engine.get_media_details(&doc.id).await.unwrap();
        assert_eq!(details.summary.as_deref(), Some("a mountain at sunset"));
    }

    #[tokio::test]
    async fn process_media_queue_drains_queued_tasks() {
        let engine = test_engine().await;
        let mut metadata = Metadata::new();
        metadata.insert("source".to_string(), serde_json::Value::String("/sunset.png".into()));
        let doc = Document::new("/sunset.png", MediaType::Image, metadata);
        engine.ingest(doc, IngestMode::Queued).await.unwrap();

        let processed = engine.process_media_queue(10).await.unwrap();
        assert_eq!(processed, 1);
    }
}
