//! Context-enrichment strategy (C4): chunk → enriched prompt text sent to
//! the embedder. The chunk's stored `content` is never rewritten.

use crate::domain::{Chunk, ChunkType, Document};

/// Produces the text actually sent to the embedder for a chunk.
pub trait ContextStrategy: Send + Sync {
    fn enrich(&self, document: &Document, chunk: &Chunk) -> String;
}

fn document_title(document: &Document) -> Option<String> {
    document
        .metadata
        .get("title")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn type_label(chunk: &Chunk) -> Option<String> {
    match chunk.chunk_type {
        ChunkType::Code => Some(format!("{} Code", chunk.language.as_deref().unwrap_or("Unknown"))),
        ChunkType::ImageRef => Some("Image Reference".to_string()),
        ChunkType::AudioRef => Some("Audio".to_string()),
        ChunkType::VideoRef => Some("Video".to_string()),
        ChunkType::Text if chunk.metadata.extra.get("quote").is_some() => Some("Quote".to_string()),
        ChunkType::Text | ChunkType::Table => None,
    }
}

/// Default strategy: wraps the chunk in a `Document/Section/Type/Content`
/// template built from its heading breadcrumb and type.
#[derive(Debug, Default, Clone, Copy)]
pub struct HierarchicalContext;

impl ContextStrategy for HierarchicalContext {
    fn enrich(&self, document: &Document, chunk: &Chunk) -> String {
        let mut lines = Vec::new();

        if let Some(title) = document_title(document) {
            lines.push(format!("Document: {title}"));
        }
        if !chunk.metadata.headers.is_empty() {
            lines.push(format!("Section: {}", chunk.metadata.headers.join(" > ")));
        }
        if let Some(label) = type_label(chunk) {
            lines.push(format!("Type: {label}"));
        }

        match chunk.chunk_type {
            ChunkType::ImageRef => {
                if let Some(alt) = chunk.metadata.extra.get("alt").and_then(|v| v.as_str()) {
                    lines.push(format!("Description: {alt}"));
                }
                if let Some(title) = chunk.metadata.extra.get("title").and_then(|v| v.as_str()) {
                    lines.push(format!("Title: {title}"));
                }
                lines.push(format!("Source: {}", chunk.content));
            }
            ChunkType::AudioRef | ChunkType::VideoRef => {
                if let Some(transcription) = chunk.metadata.extra.get("_audio_transcription").and_then(|v| v.as_str())
                {
                    lines.push(format!("Transcription: {transcription}"));
                }
                if let Some(keywords) = chunk.metadata.extra.get("_vision_keywords").and_then(|v| v.as_array()) {
                    let rendered: Vec<&str> = keywords.iter().filter_map(|v| v.as_str()).collect();
                    if !rendered.is_empty() {
                        lines.push(format!("Keywords: {}", rendered.join(", ")));
                    }
                }
                if let Some(duration) = chunk.metadata.extra.get("_video_duration_seconds").and_then(|v| v.as_f64()) {
                    lines.push(format!("Duration: {duration}s"));
                }
                lines.push(format!("Source: {}", chunk.content));
            }
            ChunkType::Code => {
                lines.push(format!("Code:\n{}", chunk.content));
            }
            ChunkType::Text | ChunkType::Table => {
                lines.push(format!("Content: {}", chunk.content));
            }
        }

        lines.join("\n")
    }
}

/// Pluggable alternate: returns the chunk's stored content unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoContext;

impl ContextStrategy for NoContext {
    fn enrich(&self, _document: &Document, chunk: &Chunk) -> String {
        chunk.content.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChunkMetadata, MediaType, Metadata};

    fn doc_with_title(title: &str) -> Document {
        let mut metadata = Metadata::new();
        metadata.insert("title".to_string(), serde_json::Value::String(title.to_string()));
        Document::new("body", MediaType::Markdown, metadata)
    }

    #[test]
    fn hierarchical_context_includes_section_breadcrumb() {
        let document = doc_with_title("Guide");
        let metadata = ChunkMetadata {
            headers: vec!["A".into(), "B".into()],
            source_id: document.id.clone(),
            ..Default::default()
        };
        let chunk = Chunk::new(&document.id, 0, "para 1", ChunkType::Text, metadata);
        let enriched = HierarchicalContext.enrich(&document, &chunk);
        assert!(enriched.contains("Document: Guide"));
        assert!(enriched.contains("Section: A > B"));
        assert!(enriched.contains("Content: para 1"));
    }

    #[test]
    fn no_context_returns_content_verbatim() {
        let document = doc_with_title("Guide");
        let metadata = ChunkMetadata { source_id: document.id.clone(), ..Default::default() };
        let chunk = Chunk::new(&document.id, 0, "para 1", ChunkType::Text, metadata);
        assert_eq!(NoContext.enrich(&document, &chunk), "para 1");
    }

    #[test]
    fn image_ref_context_uses_alt_title_and_source() {
        let document = doc_with_title("Guide");
        let mut metadata = ChunkMetadata { source_id: document.id.clone(), ..Default::default() };
        metadata.extra.insert("alt".into(), serde_json::Value::String("a cat".into()));
        metadata.extra.insert("title".into(), serde_json::Value::String("Cat photo".into()));
        let chunk = Chunk::new(&document.id, 0, "cat.png", ChunkType::ImageRef, metadata);
        let enriched = HierarchicalContext.enrich(&document, &chunk);
        assert!(enriched.contains("Description: a cat"));
        assert!(enriched.contains("Title: Cat photo"));
        assert!(enriched.contains("Source: cat.png"));
    }

    #[test]
    fn chunk_content_is_never_mutated_by_enrichment() {
        let document = doc_with_title("Guide");
        let metadata = ChunkMetadata { source_id: document.id.clone(), ..Default::default() };
        let chunk = Chunk::new(&document.id, 0, "para 1", ChunkType::Text, metadata);
        let original = chunk.content.clone();
        let _ = HierarchicalContext.enrich(&document, &chunk);
        assert_eq!(chunk.content, original);
    }
}
