//! Smart splitter (C3): segment stream → size-bounded, type-homogeneous
//! chunks.
//!
//! Mirrors `indexing::chunking`'s section-then-paragraph-then-strict
//! splitting cascade and its bidirectional `enforce_min_chunk_tokens`
//! merge pass, but operates on already-typed [`Segment`]s instead of raw
//! Markdown text, and bounds chunks by character count rather than token
//! count (no tokenizer dependency needed once the parser has already done
//! structural segmentation).

use serde_json::Value as Json;

use crate::domain::{Chunk, ChunkMetadata, ChunkType};
use crate::error::SplitError;
use crate::markdown::{Segment, SegmentType};

/// Size bounds the splitter enforces. `transcript_chunk_size`/
/// `ocr_chunk_size` let the media pipeline request a different bound than
/// the plain-text default without constructing a second splitter type.
#[derive(Debug, Clone, Copy)]
pub struct SplitterConfig {
    pub chunk_size: usize,
    pub min_chunk_size: usize,
    pub code_chunk_size: usize,
}

impl SplitterConfig {
    pub fn new(chunk_size: usize, min_chunk_size: usize, code_chunk_size: usize) -> Result<Self, SplitError> {
        if chunk_size == 0 {
            return Err(SplitError::InvalidChunkSize);
        }
        if code_chunk_size == 0 {
            return Err(SplitError::InvalidCodeChunkSize);
        }
        Ok(Self { chunk_size, min_chunk_size, code_chunk_size })
    }

    /// Returns a copy with `chunk_size` overridden, keeping the other
    /// bounds — used by the media pipeline's transcript/OCR steps.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Converts a document's segment stream into dense, size-bounded chunks.
#[derive(Debug, Clone)]
pub struct SmartSplitter {
    config: SplitterConfig,
}

impl SmartSplitter {
    pub fn new(config: SplitterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    /// Splits `segments` into chunks owned by `document_id`. `chunk_index`
    /// is dense and 0-based across the returned vector.
    pub fn split(&self, document_id: &str, segments: &[Segment]) -> Vec<Chunk> {
        let mut state = SplitState::new(document_id, &self.config);
        for segment in segments {
            match segment.segment_type {
                SegmentType::Text | SegmentType::Table => state.append_text(segment),
                SegmentType::Code => state.push_code(segment),
                SegmentType::ImageRef => state.push_media(segment, ChunkType::ImageRef),
                SegmentType::AudioRef => state.push_media(segment, ChunkType::AudioRef),
                SegmentType::VideoRef => state.push_media(segment, ChunkType::VideoRef),
            }
        }
        state.flush_buffer();
        enforce_min_chunk_size(state.chunks, self.config.min_chunk_size, self.config.chunk_size)
    }
}

struct SplitState<'a> {
    document_id: &'a str,
    config: &'a SplitterConfig,
    chunks: Vec<Chunk>,
    buffer: String,
    buffer_headers: Vec<String>,
    buffer_quote: bool,
    index: usize,
}

impl<'a> SplitState<'a> {
    fn new(document_id: &'a str, config: &'a SplitterConfig) -> Self {
        Self {
            document_id,
            config,
            chunks: Vec::new(),
            buffer: String::new(),
            buffer_headers: Vec::new(),
            buffer_quote: false,
            index: 0,
        }
    }

    fn flush_buffer(&mut self) {
        let trimmed = self.buffer.trim();
        if !trimmed.is_empty() {
            let mut metadata = ChunkMetadata {
                headers: std::mem::take(&mut self.buffer_headers),
                source_id: self.document_id.to_string(),
                ..Default::default()
            };
            if self.buffer_quote {
                metadata.extra.insert("quote".to_string(), Json::Bool(true));
            }
            self.chunks.push(Chunk::new(
                self.document_id,
                self.index,
                trimmed.to_string(),
                ChunkType::Text,
                metadata,
            ));
            self.index += 1;
        }
        self.buffer.clear();
        self.buffer_headers.clear();
        self.buffer_quote = false;
    }

    fn append_text(&mut self, segment: &Segment) {
        if !self.buffer.is_empty() {
            self.buffer.push_str("\n\n");
        }
        self.buffer.push_str(&segment.content);
        self.buffer_headers = segment.metadata.headers.clone();
        self.buffer_quote = segment.metadata.quote;
        if char_len(&self.buffer) >= self.config.chunk_size {
            self.flush_buffer();
        }
    }

    fn push_code(&mut self, segment: &Segment) {
        self.flush_buffer();
        for piece in split_code_by_lines(&segment.content, self.config.code_chunk_size) {
            let metadata = ChunkMetadata {
                headers: segment.metadata.headers.clone(),
                source_id: self.document_id.to_string(),
                ..Default::default()
            };
            let mut chunk = Chunk::new(self.document_id, self.index, piece, ChunkType::Code, metadata);
            if let Some(lang) = &segment.metadata.language {
                chunk = chunk.with_language(lang.clone());
            }
            self.chunks.push(chunk);
            self.index += 1;
        }
    }

    fn push_media(&mut self, segment: &Segment, chunk_type: ChunkType) {
        self.flush_buffer();
        let mut metadata = ChunkMetadata {
            headers: segment.metadata.headers.clone(),
            source_id: self.document_id.to_string(),
            ..Default::default()
        };
        if let Some(alt) = &segment.metadata.alt {
            metadata.extra.insert("alt".to_string(), Json::String(alt.clone()));
        }
        if let Some(title) = &segment.metadata.title {
            metadata.extra.insert("title".to_string(), Json::String(title.clone()));
        }
        self.chunks.push(Chunk::new(
            self.document_id,
            self.index,
            segment.content.clone(),
            chunk_type,
            metadata,
        ));
        self.index += 1;
    }
}

/// Splits an oversized code segment on line boundaries so no piece exceeds
/// `max_chars`, never breaking a line in the middle.
fn split_code_by_lines(content: &str, max_chars: usize) -> Vec<String> {
    if char_len(content) <= max_chars {
        return vec![content.to_string()];
    }

    let mut pieces = Vec::new();
    let mut current = String::new();

    for line in content.lines() {
        let candidate_len = char_len(&current) + char_len(line) + 1;
        if !current.is_empty() && candidate_len > max_chars {
            pieces.push(current.clone());
            current.clear();
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    if pieces.is_empty() {
        pieces.push(content.to_string());
    }
    pieces
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum MergeDirection {
    Previous,
    Next,
}

fn merge_chunk_pair(a: &Chunk, b: &Chunk) -> Chunk {
    let content = format!("{}\n\n{}", a.content, b.content);
    Chunk::new(a.document_id.clone(), a.chunk_index, content, ChunkType::Text, a.metadata.clone())
}

/// Bidirectional neighbor-merge pass: any `Text` chunk below
/// `min_chunk_size` characters is merged into whichever neighbor keeps the
/// combined size under `max_chars`, preferring the larger legal merge, the
/// same tie-break `enforce_min_chunk_tokens` uses. Code and media chunks
/// are never touched, preserving type homogeneity.
fn enforce_min_chunk_size(mut chunks: Vec<Chunk>, min_chars: usize, max_chars: usize) -> Vec<Chunk> {
    if chunks.len() < 2 || min_chars == 0 {
        return reindex(chunks);
    }

    let mut index = 0;
    while index < chunks.len() {
        if chunks[index].chunk_type != ChunkType::Text || char_len(&chunks[index].content) >= min_chars {
            index += 1;
            continue;
        }

        let mut merged_any = false;
        while chunks[index].chunk_type == ChunkType::Text
            && char_len(&chunks[index].content) < min_chars
            && chunks.len() > 1
        {
            let previous_candidate = if index > 0 && chunks[index - 1].chunk_type == ChunkType::Text {
                let merged = merge_chunk_pair(&chunks[index - 1], &chunks[index]);
                let len = char_len(&merged.content);
                (len <= max_chars).then_some((MergeDirection::Previous, len, merged))
            } else {
                None
            };

            let next_candidate = if index + 1 < chunks.len() && chunks[index + 1].chunk_type == ChunkType::Text {
                let merged = merge_chunk_pair(&chunks[index], &chunks[index + 1]);
                let len = char_len(&merged.content);
                (len <= max_chars).then_some((MergeDirection::Next, len, merged))
            } else {
                None
            };

            let selected = match (previous_candidate, next_candidate) {
                (Some(prev), Some(next)) => Some(if prev.1 >= next.1 { prev } else { next }),
                (Some(prev), None) => Some(prev),
                (None, Some(next)) => Some(next),
                (None, None) => None,
            };

            let Some((direction, _len, merged)) = selected else {
                break;
            };

            match direction {
                MergeDirection::Previous => {
                    let previous_index = index - 1;
                    chunks[previous_index] = merged;
                    chunks.remove(index);
                    index = previous_index;
                }
                MergeDirection::Next => {
                    let next_index = index + 1;
                    chunks[index] = merged;
                    chunks.remove(next_index);
                }
            }
            merged_any = true;
        }

        if !merged_any {
            index += 1;
        } else {
            index += 1;
        }
    }

    reindex(chunks)
}

fn reindex(mut chunks: Vec<Chunk>) -> Vec<Chunk> {
    for (i, chunk) in chunks.iter_mut().enumerate() {
        chunk.chunk_index = i;
    }
    chunks
}
