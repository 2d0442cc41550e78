//! Default media pipeline steps (C11): `summary`, `transcription`, `ocr`.

use async_trait::async_trait;
use serde_json::Value as Json;

use crate::chunking::SmartSplitter;
use crate::config::OcrMode;
use crate::domain::{Chunk, ChunkMetadata, ChunkType, MediaType, Role};
use crate::error::PipelineError;
use crate::logging::Logger;
use crate::markdown::{MarkdownParser, Segment, SegmentMetadata, SegmentType};

use super::pipeline::{MediaContext, ProcessingStep};
use super::timecode::assign_start_seconds;

fn summary_chunk_type(media_type: MediaType) -> ChunkType {
    match media_type {
        MediaType::Audio => ChunkType::AudioRef,
        MediaType::Video => ChunkType::VideoRef,
        _ => ChunkType::ImageRef,
    }
}

/// Always emits exactly one summary chunk carrying the analyzer's
/// description plus reserved `_vision_*`/`_audio_*`/`_video_*` metadata
/// the context strategy knows how to render.
pub struct SummaryStep;

#[async_trait]
impl ProcessingStep for SummaryStep {
    fn step_name(&self) -> &'static str {
        "summary"
    }

    fn should_run(&self, _context: &MediaContext) -> bool {
        true
    }

    fn is_optional(&self) -> bool {
        false
    }

    async fn process(&self, context: &MediaContext) -> Result<MediaContext, PipelineError> {
        let mut metadata = ChunkMetadata::for_document(&context.document);
        metadata.role = Some(Role::Summary);
        metadata.parent_media_path = Some(context.media_path.clone());

        if !context.analysis.keywords.is_empty() {
            metadata.extra.insert(
                "_vision_keywords".to_string(),
                Json::Array(context.analysis.keywords.iter().cloned().map(Json::String).collect()),
            );
        }
        if let Some(participants) = &context.analysis.participants {
            metadata.extra.insert(
                "_audio_participants".to_string(),
                Json::Array(participants.iter().cloned().map(Json::String).collect()),
            );
        }
        if let Some(duration) = context.analysis.duration_seconds {
            metadata.extra.insert(
                "_video_duration_seconds".to_string(),
                serde_json::json!(duration),
            );
        }
        if let Some(transcription) = &context.analysis.transcription {
            metadata.extra.insert("_audio_transcription".to_string(), Json::String(transcription.clone()));
        }

        let chunk = Chunk::new(
            context.document.id.clone(),
            context.base_index,
            context.analysis.description.clone(),
            summary_chunk_type(context.document.media_type),
            metadata,
        );

        Ok(context.with_chunks(vec![chunk]))
    }
}

fn renumber(chunks: &mut [Chunk], base_index: usize) {
    for (offset, chunk) in chunks.iter_mut().enumerate() {
        chunk.chunk_index = base_index + offset;
    }
}

/// Runs when `analysis.transcription` is non-empty. Splits the transcript
/// as plain text and assigns `start_seconds` via timecode parsing with
/// proportional-delta inheritance.
pub struct TranscriptionStep;

#[async_trait]
impl ProcessingStep for TranscriptionStep {
    fn step_name(&self) -> &'static str {
        "transcription"
    }

    fn should_run(&self, context: &MediaContext) -> bool {
        context.analysis.transcription.as_deref().is_some_and(|t| !t.trim().is_empty())
    }

    fn is_optional(&self) -> bool {
        true
    }

    async fn process(&self, context: &MediaContext) -> Result<MediaContext, PipelineError> {
        let text = context
            .analysis
            .transcription
            .clone()
            .ok_or_else(|| PipelineError { step_name: self.step_name().to_string(), cause: "no transcription present".to_string() })?;

        let splitter = effective_splitter(&context.services.splitter, context.services.transcript_chunk_size);
        let segment = Segment::new(text, SegmentType::Text, SegmentMetadata::default());
        let mut chunks = splitter.split(&context.document.id, std::slice::from_ref(&segment));
        renumber(&mut chunks, context.base_index);

        let contents: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let starts = assign_start_seconds(
            &contents,
            context.analysis.duration_seconds,
            context.services.media_enable_timecodes,
            context.services.media_strict_timecode_ordering,
        );

        for (chunk, start) in chunks.iter_mut().zip(starts) {
            chunk.metadata.role = Some(Role::Transcript);
            chunk.metadata.parent_media_path = Some(context.media_path.clone());
            chunk.metadata.start_seconds = Some(start);
        }

        Ok(context.with_chunks(chunks))
    }
}

/// Runs when `analysis.ocr_text` is non-empty. Under `OcrMode::Markdown`
/// (the default) parses the OCR text as Markdown so fenced code isolates
/// into `code` chunks, then warns if the resulting code-chunk fraction
/// suggests UI text was misdetected as code. Under `OcrMode::PlainText`
/// the text is kept as a single untyped segment instead.
pub struct OcrStep;

#[async_trait]
impl ProcessingStep for OcrStep {
    fn step_name(&self) -> &'static str {
        "ocr"
    }

    fn should_run(&self, context: &MediaContext) -> bool {
        context.analysis.ocr_text.as_deref().is_some_and(|t| !t.trim().is_empty())
    }

    fn is_optional(&self) -> bool {
        true
    }

    async fn process(&self, context: &MediaContext) -> Result<MediaContext, PipelineError> {
        let text = context
            .analysis
            .ocr_text
            .clone()
            .ok_or_else(|| PipelineError { step_name: self.step_name().to_string(), cause: "no ocr text present".to_string() })?;

        let segments = match context.services.ocr_mode {
            OcrMode::Markdown => MarkdownParser::new().parse(&text),
            OcrMode::PlainText => vec![Segment::new(text, SegmentType::Text, SegmentMetadata::default())],
        };
        let splitter = effective_splitter(&context.services.splitter, context.services.ocr_chunk_size);
        let mut chunks = splitter.split(&context.document.id, &segments);
        renumber(&mut chunks, context.base_index);

        for chunk in &mut chunks {
            chunk.metadata.role = Some(Role::Ocr);
            chunk.metadata.parent_media_path = Some(context.media_path.clone());
        }

        if context.services.ocr_mode == OcrMode::Markdown && !chunks.is_empty() {
            let code_ratio = chunks.iter().filter(|c| c.chunk_type == ChunkType::Code).count() as f64 / chunks.len() as f64;
            if code_ratio > context.services.ocr_code_ratio_warn_threshold {
                Logger::root().warn(&format!(
                    "ocr output for {} is {:.0}% code chunks; UI text may be misdetected as code",
                    context.media_path,
                    code_ratio * 100.0
                ));
            }
        }

        Ok(context.with_chunks(chunks))
    }
}

fn effective_splitter(base: &SmartSplitter, override_chunk_size: Option<usize>) -> SmartSplitter {
    match override_chunk_size {
        Some(size) => SmartSplitter::new(base.config().with_chunk_size(size)),
        None => base.clone(),
    }
}
