//! The typed segment stream produced by [`super::parser::MarkdownParser`].

use serde::{Deserialize, Serialize};

/// The kind of content a [`Segment`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentType {
    Text,
    Code,
    Table,
    ImageRef,
    AudioRef,
    VideoRef,
}

/// Per-segment metadata: heading breadcrumbs plus type-specific extras.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentMetadata {
    /// Ancestor heading titles, outermost first. Empty headings are kept
    /// for stack bookkeeping but never appear here.
    pub headers: Vec<String>,
    /// Fence info-string's first word, for code segments.
    pub language: Option<String>,
    /// Alt text, for image/audio/video reference segments.
    pub alt: Option<String>,
    /// Title attribute, for image/audio/video reference segments.
    pub title: Option<String>,
    /// Set when the text segment originated inside a blockquote.
    pub quote: bool,
}

/// One unit of the parser's output stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub content: String,
    pub segment_type: SegmentType,
    pub metadata: SegmentMetadata,
}

impl Segment {
    pub fn new(content: impl Into<String>, segment_type: SegmentType, metadata: SegmentMetadata) -> Self {
        Self {
            content: content.into(),
            segment_type,
            metadata,
        }
    }
}
