//! Engine-wide configuration.
//!
//! A single `EngineConfig` is threaded through ingestion, chunking, embedding
//! and search. There is no config-file loader: callers build one in code and
//! pass it to [`crate::engine::Engine::new`], the same plain-struct-plus-
//! builder shape `ChunkingConfig` uses in the transcript chunker.

use std::time::Duration;

/// Context-enrichment strategy applied to a chunk's text before embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextMode {
    /// Embed the chunk text as-is.
    None,
    /// Prepend a breadcrumb of ancestor headings and document title.
    Hierarchical,
}

/// How OCR output should be interpreted when deciding if a page is
/// image-dominant (spec Open Question: default parser mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrMode {
    /// Treat OCR output as Markdown (default).
    Markdown,
    /// Treat OCR output as plain text.
    PlainText,
}

/// Top-level engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path to the SQLite database file.
    pub db_path: std::path::PathBuf,

    /// Maximum characters per text chunk before splitting.
    pub chunk_size: usize,
    /// Minimum characters per text chunk before merging into a neighbor.
    pub min_chunk_size: usize,
    /// Maximum characters per code chunk before line-boundary splitting.
    pub code_chunk_size: usize,

    /// Embedding vector dimensionality the store enforces.
    pub embedding_dim: usize,
    /// Context enrichment applied before embedding.
    pub context_mode: ContextMode,

    /// Maximum embedding requests per `rate_limit_window`.
    pub rate_limit_requests: u32,
    /// Window over which `rate_limit_requests` is replenished.
    pub rate_limit_window: Duration,

    /// Maximum retry attempts for a transient embedder/analyzer failure.
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries.
    pub retry_base_delay: Duration,

    /// RRF constant `k` used when fusing vector and full-text rankings.
    pub rrf_k: f64,
    /// Default number of results returned by a search when unspecified.
    pub default_search_limit: usize,

    /// How OCR output from the media analyzer should be interpreted.
    pub ocr_mode: OcrMode,
    /// Warn (rather than fail) when a page's code-character ratio exceeds
    /// this threshold under `OcrMode::Markdown`.
    pub ocr_code_ratio_warn_threshold: f64,

    /// Overrides `chunk_size` for transcript chunks specifically; `None`
    /// keeps the plain-text default.
    pub transcript_chunk_size: Option<usize>,
    /// Overrides `chunk_size` for OCR chunks specifically; `None` keeps the
    /// plain-text default.
    pub ocr_chunk_size: Option<usize>,
    /// Language tag passed to the media analyzer's prompt template and
    /// recorded on produced chunks.
    pub output_language: String,
    /// Whether the transcription step looks for `[MM:SS]`/`[HH:MM:SS]`
    /// timecodes at all; disabling falls back to pure proportional-delta
    /// spacing for every chunk.
    pub media_enable_timecodes: bool,
    /// Whether an out-of-order parsed timecode (earlier than the previous
    /// chunk's) is rejected (and inherited instead) rather than accepted.
    pub media_strict_timecode_ordering: bool,

    /// Whether the embedder's batch path is used for ingestion instead of
    /// the synchronous bulk endpoint.
    pub batch_enabled: bool,
    /// Minimum number of pending chunks before a batch is submitted.
    pub batch_min_queue_size: usize,
    /// Interval between `check_status` polls of a submitted batch.
    pub batch_poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: std::path::PathBuf::from("semindex.db"),
            chunk_size: 1800,
            min_chunk_size: 200,
            code_chunk_size: 2000,
            embedding_dim: 768,
            context_mode: ContextMode::Hierarchical,
            rate_limit_requests: 60,
            rate_limit_window: Duration::from_secs(60),
            max_retries: 5,
            retry_base_delay: Duration::from_millis(250),
            rrf_k: 60.0,
            default_search_limit: 10,
            ocr_mode: OcrMode::Markdown,
            ocr_code_ratio_warn_threshold: 0.5,
            transcript_chunk_size: None,
            ocr_chunk_size: None,
            output_language: "en".to_string(),
            media_enable_timecodes: true,
            media_strict_timecode_ordering: false,
            batch_enabled: false,
            batch_min_queue_size: 50,
            batch_poll_interval: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    pub fn new(db_path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Default::default()
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_min_chunk_size(mut self, min_chunk_size: usize) -> Self {
        self.min_chunk_size = min_chunk_size;
        self
    }

    pub fn with_code_chunk_size(mut self, code_chunk_size: usize) -> Self {
        self.code_chunk_size = code_chunk_size;
        self
    }

    pub fn with_embedding_dim(mut self, dim: usize) -> Self {
        self.embedding_dim = dim;
        self
    }

    pub fn with_context_mode(mut self, mode: ContextMode) -> Self {
        self.context_mode = mode;
        self
    }

    pub fn with_rate_limit(mut self, requests: u32, window: Duration) -> Self {
        self.rate_limit_requests = requests;
        self.rate_limit_window = window;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_rrf_k(mut self, rrf_k: f64) -> Self {
        self.rrf_k = rrf_k;
        self
    }

    pub fn with_ocr_mode(mut self, mode: OcrMode) -> Self {
        self.ocr_mode = mode;
        self
    }

    pub fn with_transcript_chunk_size(mut self, size: usize) -> Self {
        self.transcript_chunk_size = Some(size);
        self
    }

    pub fn with_ocr_chunk_size(mut self, size: usize) -> Self {
        self.ocr_chunk_size = Some(size);
        self
    }

    pub fn with_output_language(mut self, language: impl Into<String>) -> Self {
        self.output_language = language.into();
        self
    }

    pub fn with_media_timecodes(mut self, enabled: bool, strict_ordering: bool) -> Self {
        self.media_enable_timecodes = enabled;
        self.media_strict_timecode_ordering = strict_ordering;
        self
    }

    pub fn with_batch(mut self, enabled: bool, min_queue_size: usize, poll_interval: Duration) -> Self {
        self.batch_enabled = enabled;
        self.batch_min_queue_size = min_queue_size;
        self.batch_poll_interval = poll_interval;
        self
    }

    /// Validates bounds that would otherwise surface as confusing runtime
    /// errors deep inside the splitter or store.
    pub fn validate(&self) -> Result<(), crate::error::EngineError> {
        if self.chunk_size == 0 {
            return Err(crate::error::EngineError::Config(
                "chunk_size must be greater than zero".into(),
            ));
        }
        if self.min_chunk_size >= self.chunk_size {
            return Err(crate::error::EngineError::Config(
                "min_chunk_size must be smaller than chunk_size".into(),
            ));
        }
        if self.code_chunk_size == 0 {
            return Err(crate::error::EngineError::Config(
                "code_chunk_size must be greater than zero".into(),
            ));
        }
        if self.embedding_dim == 0 {
            return Err(crate::error::EngineError::Config(
                "embedding_dim must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        let cfg = EngineConfig::default();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_min_chunk_size_not_smaller_than_chunk_size() {
        let cfg = EngineConfig::default().with_chunk_size(100).with_min_chunk_size(100);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn builder_overrides_take_effect() {
        let cfg = EngineConfig::new("x.db")
            .with_chunk_size(500)
            .with_rrf_k(10.0);
        assert_eq!(cfg.chunk_size, 500);
        assert_eq!(cfg.rrf_k, 10.0);
    }

    #[test]
    fn media_option_overrides_take_effect() {
        let cfg = EngineConfig::new("x.db")
            .with_transcript_chunk_size(400)
            .with_ocr_chunk_size(600)
            .with_output_language("fr")
            .with_ocr_mode(OcrMode::PlainText)
            .with_media_timecodes(false, true)
            .with_batch(true, 10, Duration::from_secs(5));
        assert_eq!(cfg.transcript_chunk_size, Some(400));
        assert_eq!(cfg.ocr_chunk_size, Some(600));
        assert_eq!(cfg.output_language, "fr");
        assert_eq!(cfg.ocr_mode, OcrMode::PlainText);
        assert!(!cfg.media_enable_timecodes);
        assert!(cfg.media_strict_timecode_ordering);
        assert!(cfg.batch_enabled);
        assert_eq!(cfg.batch_min_queue_size, 10);
        assert_eq!(cfg.batch_poll_interval, Duration::from_secs(5));
    }
}
