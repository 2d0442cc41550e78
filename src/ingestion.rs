//! Ingestion core (C12): orchestrates parser → splitter → context → embedder
//! → store for text documents, and analyzer → queue/pipeline → embedder →
//! store for media documents.

use std::sync::Arc;

use crate::cancellation::CancellationToken;
use crate::chunking::SmartSplitter;
use crate::config::EngineConfig;
use crate::context::ContextStrategy;
use crate::domain::{Chunk, ChunkWithEmbedding, Document, MediaType};
use crate::embedding::EmbedderClient;
use crate::error::EngineError;
use crate::logging::{keys, Logger};
use crate::markdown::{MarkdownParser, Segment, SegmentMetadata, SegmentType};
use crate::media::{MediaAnalyzer, MediaContext, MediaPipeline, MediaTask, MediaTaskQueue};
use crate::store::SqliteStore;

/// Whether a media document is analyzed immediately (`Sync`) or handed to
/// the persistent queue for later processing (`Queued`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestMode {
    Sync,
    Queued,
}

pub struct IngestionCore {
    store: Arc<SqliteStore>,
    parser: MarkdownParser,
    splitter: Arc<SmartSplitter>,
    context_strategy: Arc<dyn ContextStrategy>,
    embedder: Arc<dyn EmbedderClient>,
    analyzer: Arc<dyn MediaAnalyzer>,
    pipeline: Arc<tokio::sync::RwLock<MediaPipeline>>,
    queue: Arc<MediaTaskQueue>,
    config: EngineConfig,
    logger: Logger,
}

impl IngestionCore {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<SqliteStore>,
        splitter: Arc<SmartSplitter>,
        context_strategy: Arc<dyn ContextStrategy>,
        embedder: Arc<dyn EmbedderClient>,
        analyzer: Arc<dyn MediaAnalyzer>,
        pipeline: Arc<tokio::sync::RwLock<MediaPipeline>>,
        queue: Arc<MediaTaskQueue>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            parser: MarkdownParser::new(),
            splitter,
            context_strategy,
            embedder,
            analyzer,
            pipeline,
            queue,
            config,
            logger: Logger::root(),
        }
    }

    pub async fn ingest(&self, document: Document, mode: IngestMode, cancellation: &CancellationToken) -> Result<Document, EngineError> {
        if cancellation.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let logger = self.logger.bind(keys::DOC_ID, &document.id);
        logger.info("ingesting document");

        match document.media_type {
            MediaType::Text | MediaType::Markdown => {
                let segments = self.segments_for_text_document(&document);
                let chunks = self.splitter.split(&document.id, &segments);
                self.embed_and_save(&document, chunks, cancellation).await?;
            }
            MediaType::Image | MediaType::Audio | MediaType::Video => {
                self.ingest_media(&document, mode, cancellation).await?;
            }
        }

        Ok(document)
    }

    fn segments_for_text_document(&self, document: &Document) -> Vec<Segment> {
        match document.media_type {
            MediaType::Markdown => self.parser.parse(&document.content),
            _ => vec![Segment::new(document.content.clone(), SegmentType::Text, SegmentMetadata::default())],
        }
    }

    async fn ingest_media(&self, document: &Document, mode: IngestMode, cancellation: &CancellationToken) -> Result<(), EngineError> {
        let media_path = document
            .source_path()
            .ok_or_else(|| EngineError::Config("media document is missing metadata.source".to_string()))?
            .to_string();

        match mode {
            IngestMode::Sync => {
                let analysis = self.analyzer.analyze(&media_path, document.media_type, None, None).await?;
                let chunks = self.run_pipeline(document, &media_path, analysis).await?;
                self.embed_and_save(document, chunks, cancellation).await?;
            }
            IngestMode::Queued => {
                self.store.save(document, &[]).await?;
                let mut task = MediaTask::new(media_path, document.media_type);
                task.result_document_id = Some(document.id.clone());
                self.queue.enqueue(task).await?;
            }
        }
        Ok(())
    }

    async fn run_pipeline(&self, document: &Document, media_path: &str, analysis: crate::domain::AnalysisResult) -> Result<Vec<Chunk>, EngineError> {
        let services = crate::media::PipelineServices {
            splitter: self.splitter.clone(),
            transcript_chunk_size: self.config.transcript_chunk_size,
            ocr_chunk_size: self.config.ocr_chunk_size,
            ocr_code_ratio_warn_threshold: self.config.ocr_code_ratio_warn_threshold,
            language: self.config.output_language.clone(),
            ocr_mode: self.config.ocr_mode,
            media_enable_timecodes: self.config.media_enable_timecodes,
            media_strict_timecode_ordering: self.config.media_strict_timecode_ordering,
        };
        let context = MediaContext::new(media_path, document.clone(), analysis, services);
        Ok(self.pipeline.read().await.run(context).await?)
    }

    async fn embed_and_save(&self, document: &Document, chunks: Vec<Chunk>, cancellation: &CancellationToken) -> Result<(), EngineError> {
        if chunks.is_empty() {
            self.store.save(document, &[]).await?;
            return Ok(());
        }
        if cancellation.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let texts: Vec<String> = chunks.iter().map(|c| self.context_strategy.enrich(document, c)).collect();
        let embeddings = self.embedder.embed_documents(&texts).await?;

        if embeddings.len() != chunks.len() {
            return Err(EngineError::Config(format!(
                "embedder returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let chunks_with_embeddings: Vec<ChunkWithEmbedding> =
            chunks.into_iter().zip(embeddings).map(|(chunk, embedding)| ChunkWithEmbedding { chunk, embedding }).collect();

        self.store.save(document, &chunks_with_embeddings).await?;
        Ok(())
    }
}
