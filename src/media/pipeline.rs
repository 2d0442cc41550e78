//! Media pipeline (C11): turns an `AnalysisResult` into chunks via an
//! ordered sequence of immutable processing steps.

use std::sync::Arc;

use async_trait::async_trait;

use crate::chunking::SmartSplitter;
use crate::config::OcrMode;
use crate::domain::{AnalysisResult, Chunk, Document};
use crate::error::PipelineError;
use crate::logging::Logger;

/// Services steps need but that don't belong on `MediaContext` itself —
/// the Rust-idiomatic realization of the spec's abstract "services: map":
/// a typed struct instead of a stringly-keyed registry, since every step
/// needs the same fixed set of collaborators.
#[derive(Clone)]
pub struct PipelineServices {
    pub splitter: Arc<SmartSplitter>,
    pub transcript_chunk_size: Option<usize>,
    pub ocr_chunk_size: Option<usize>,
    pub ocr_code_ratio_warn_threshold: f64,
    pub language: String,
    pub ocr_mode: OcrMode,
    pub media_enable_timecodes: bool,
    pub media_strict_timecode_ordering: bool,
}

/// Immutable context threaded through the pipeline. `with_chunks` is the
/// only way to add chunks; it returns a new context rather than mutating.
#[derive(Clone)]
pub struct MediaContext {
    pub media_path: String,
    pub document: Document,
    pub analysis: AnalysisResult,
    pub chunks: Vec<Chunk>,
    pub base_index: usize,
    pub services: PipelineServices,
    pub user_instructions: Option<String>,
}

impl MediaContext {
    pub fn new(media_path: impl Into<String>, document: Document, analysis: AnalysisResult, services: PipelineServices) -> Self {
        Self {
            media_path: media_path.into(),
            document,
            analysis,
            chunks: Vec::new(),
            base_index: 0,
            services,
            user_instructions: None,
        }
    }

    pub fn with_user_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.user_instructions = Some(instructions.into());
        self
    }

    /// Appends `new_chunks`, advancing `base_index` by their count. Returns
    /// a new context; `self` is left untouched.
    pub fn with_chunks(&self, new_chunks: Vec<Chunk>) -> Self {
        let mut chunks = self.chunks.clone();
        let added = new_chunks.len();
        chunks.extend(new_chunks);
        Self { chunks, base_index: self.base_index + added, ..self.clone() }
    }
}

/// A single pipeline stage. Steps never mutate the context they receive;
/// `process` returns a new one (typically via `context.with_chunks(..)`).
#[async_trait]
pub trait ProcessingStep: Send + Sync {
    fn step_name(&self) -> &'static str;
    fn should_run(&self, context: &MediaContext) -> bool;
    fn is_optional(&self) -> bool;
    async fn process(&self, context: &MediaContext) -> Result<MediaContext, PipelineError>;
}

/// Runs an ordered list of steps over a context, skipping steps whose
/// `should_run` returns false, continuing past optional-step failures and
/// propagating critical-step failures.
pub struct MediaPipeline {
    steps: Vec<Arc<dyn ProcessingStep>>,
    logger: Logger,
}

impl MediaPipeline {
    pub fn new(steps: Vec<Arc<dyn ProcessingStep>>) -> Self {
        Self { steps, logger: Logger::root() }
    }

    /// Inserts a custom step at `position` (end of pipeline if `None`).
    pub fn register_step(&mut self, step: Arc<dyn ProcessingStep>, position: Option<usize>) {
        match position {
            Some(pos) if pos <= self.steps.len() => self.steps.insert(pos, step),
            _ => self.steps.push(step),
        }
    }

    pub async fn run(&self, mut context: MediaContext) -> Result<Vec<Chunk>, PipelineError> {
        for step in &self.steps {
            if !step.should_run(&context) {
                continue;
            }
            let logger = self.logger.bind("step", step.step_name());
            match step.process(&context).await {
                Ok(next) => {
                    context = next;
                }
                Err(err) if step.is_optional() => {
                    logger.warn(&format!("optional step failed, continuing: {err}"));
                }
                Err(err) => {
                    logger.error(&format!("critical step failed: {err}"));
                    return Err(err);
                }
            }
        }
        Ok(context.chunks)
    }

    /// Re-runs exactly one named step's worth of work by rebuilding a fresh
    /// context with `base_index` resuming after `existing_chunks` and
    /// running only the matching step. Returns only the chunks the step
    /// itself produced, not `existing_chunks` echoed back — callers own
    /// reindexing the full chunk set and deleting the role's old chunks.
    pub async fn rerun_step(&self, step_name: &str, context: MediaContext, existing_chunks: Vec<Chunk>) -> Result<Vec<Chunk>, PipelineError> {
        let existing_len = existing_chunks.len();
        let base = MediaContext { base_index: existing_len, chunks: existing_chunks, ..context };
        let step = self
            .steps
            .iter()
            .find(|s| s.step_name() == step_name)
            .ok_or_else(|| PipelineError { step_name: step_name.to_string(), cause: "no such step registered".to_string() })?;
        let mut result = step.process(&base).await?;
        Ok(result.chunks.split_off(existing_len))
    }
}
