//! Structural Markdown parser (C2): token stream → typed segment stream
//! with a live heading breadcrumb stack.
//!
//! Walks a `pulldown_cmark` event stream the same way
//! `indexing::chunking::split_major_sections` walks one to find section
//! boundaries, but instead of slicing raw text this builds typed
//! [`Segment`]s directly from events, classifying image/link targets into
//! audio/video references by file extension.

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};

use crate::error::ParseError;

use super::segment::{Segment, SegmentMetadata, SegmentType};

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "flac", "aac", "aiff"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm"];

fn classify_media_extension(url: &str) -> Option<SegmentType> {
    let ext = url.rsplit('.').next()?.to_ascii_lowercase();
    if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
        Some(SegmentType::AudioRef)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(SegmentType::VideoRef)
    } else {
        None
    }
}

fn parser_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options
}

/// Heading stack used to compute breadcrumbs as the event stream is walked.
#[derive(Default)]
struct HeadingStack {
    entries: Vec<(HeadingLevel, Option<String>)>,
}

impl HeadingStack {
    fn push(&mut self, level: HeadingLevel, title: String) {
        while let Some((top_level, _)) = self.entries.last() {
            if *top_level >= level {
                self.entries.pop();
            } else {
                break;
            }
        }
        let title = if title.trim().is_empty() { None } else { Some(title) };
        self.entries.push((level, title));
    }

    fn breadcrumbs(&self) -> Vec<String> {
        self.entries.iter().filter_map(|(_, t)| t.clone()).collect()
    }
}

/// Turns Markdown source into a typed [`Segment`] stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkdownParser;

impl MarkdownParser {
    pub fn new() -> Self {
        Self
    }

    /// Validates UTF-8 then parses. The only way this contract can fail.
    pub fn parse_bytes(&self, input: &[u8]) -> Result<Vec<Segment>, ParseError> {
        let text = std::str::from_utf8(input)?;
        Ok(self.parse(text))
    }

    /// Parses already-validated UTF-8 Markdown text. Malformed Markdown
    /// syntax is tolerated and folded into plain text segments.
    pub fn parse(&self, input: &str) -> Vec<Segment> {
        let mut walker = Walker::new(input);
        for (event, range) in Parser::new_ext(input, parser_options()).into_offset_iter() {
            walker.handle(event, range);
        }
        walker.finish()
    }
}

struct Walker<'a> {
    source: &'a str,
    headers: HeadingStack,
    segments: Vec<Segment>,

    text_buf: String,
    blockquote_depth: usize,
    list_depth: usize,

    pending_heading_level: Option<HeadingLevel>,
    pending_heading_title: String,

    in_code_block: bool,
    code_buf: String,
    code_lang: Option<String>,

    in_image: bool,
    image_dest: String,
    image_title: Option<String>,
    image_alt: String,

    media_link_type: Option<SegmentType>,
    link_dest: String,
    link_title: Option<String>,
    link_text: String,

    table_start: usize,
}

impl<'a> Walker<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            headers: HeadingStack::default(),
            segments: Vec::new(),
            text_buf: String::new(),
            blockquote_depth: 0,
            list_depth: 0,
            pending_heading_level: None,
            pending_heading_title: String::new(),
            in_code_block: false,
            code_buf: String::new(),
            code_lang: None,
            in_image: false,
            image_dest: String::new(),
            image_title: None,
            image_alt: String::new(),
            media_link_type: None,
            link_dest: String::new(),
            link_title: None,
            link_text: String::new(),
            table_start: 0,
        }
    }

    fn flush_text(&mut self, quote: bool) {
        let content = self.text_buf.trim();
        if !content.is_empty() {
            self.segments.push(Segment::new(
                content.to_string(),
                SegmentType::Text,
                SegmentMetadata {
                    headers: self.headers.breadcrumbs(),
                    quote,
                    ..Default::default()
                },
            ));
        }
        self.text_buf.clear();
    }

    fn handle(&mut self, event: Event<'_>, range: std::ops::Range<usize>) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                self.flush_text(self.blockquote_depth > 0);
                self.pending_heading_level = Some(level);
                self.pending_heading_title.clear();
            }
            Event::End(TagEnd::Heading(level)) => {
                self.headers.push(level, self.pending_heading_title.clone());
                self.pending_heading_level = None;
                self.pending_heading_title.clear();
            }
            Event::Start(Tag::CodeBlock(kind)) => {
                self.flush_text(self.blockquote_depth > 0);
                self.in_code_block = true;
                self.code_lang = match kind {
                    CodeBlockKind::Fenced(info) => {
                        info.split_whitespace().next().map(|s| s.to_string())
                    }
                    CodeBlockKind::Indented => None,
                };
                self.code_buf.clear();
            }
            Event::End(TagEnd::CodeBlock) => {
                self.in_code_block = false;
                self.segments.push(Segment::new(
                    self.code_buf.clone(),
                    SegmentType::Code,
                    SegmentMetadata {
                        headers: self.headers.breadcrumbs(),
                        language: self.code_lang.take(),
                        ..Default::default()
                    },
                ));
                self.code_buf.clear();
            }
            Event::Start(Tag::Image { dest_url, title, .. }) => {
                self.flush_text(self.blockquote_depth > 0);
                self.in_image = true;
                self.image_dest = dest_url.to_string();
                self.image_title = if title.is_empty() { None } else { Some(title.to_string()) };
                self.image_alt.clear();
            }
            Event::End(TagEnd::Image) => {
                self.in_image = false;
                let segment_type =
                    classify_media_extension(&self.image_dest).unwrap_or(SegmentType::ImageRef);
                self.segments.push(Segment::new(
                    self.image_dest.clone(),
                    segment_type,
                    SegmentMetadata {
                        headers: self.headers.breadcrumbs(),
                        alt: (!self.image_alt.is_empty()).then(|| self.image_alt.clone()),
                        title: self.image_title.clone(),
                        ..Default::default()
                    },
                ));
            }
            Event::Start(Tag::Link { dest_url, title, .. }) => {
                if let Some(segment_type) = classify_media_extension(&dest_url) {
                    self.flush_text(self.blockquote_depth > 0);
                    self.media_link_type = Some(segment_type);
                    self.link_dest = dest_url.to_string();
                    self.link_title = if title.is_empty() { None } else { Some(title.to_string()) };
                    self.link_text.clear();
                }
            }
            Event::End(TagEnd::Link) => {
                if let Some(segment_type) = self.media_link_type.take() {
                    self.segments.push(Segment::new(
                        self.link_dest.clone(),
                        segment_type,
                        SegmentMetadata {
                            headers: self.headers.breadcrumbs(),
                            alt: (!self.link_text.is_empty()).then(|| self.link_text.clone()),
                            title: self.link_title.clone(),
                            ..Default::default()
                        },
                    ));
                }
            }
            Event::Start(Tag::BlockQuote(_)) => {
                self.flush_text(false);
                self.blockquote_depth += 1;
            }
            Event::End(TagEnd::BlockQuote(_)) => {
                self.flush_text(true);
                self.blockquote_depth = self.blockquote_depth.saturating_sub(1);
            }
            Event::Start(Tag::Table(_)) => {
                self.flush_text(self.blockquote_depth > 0);
                self.table_start = range.start;
            }
            Event::End(TagEnd::Table) => {
                let slice = self.source.get(self.table_start..range.end).unwrap_or("").trim();
                if !slice.is_empty() {
                    self.segments.push(Segment::new(
                        slice.to_string(),
                        SegmentType::Table,
                        SegmentMetadata {
                            headers: self.headers.breadcrumbs(),
                            ..Default::default()
                        },
                    ));
                }
            }
            Event::Start(Tag::List(_)) => {
                self.list_depth += 1;
            }
            Event::End(TagEnd::List(_)) => {
                self.list_depth = self.list_depth.saturating_sub(1);
            }
            Event::Start(Tag::Item) => {
                if !self.text_buf.is_empty() && !self.text_buf.ends_with('\n') {
                    self.text_buf.push('\n');
                }
                self.text_buf.push_str(&"  ".repeat(self.list_depth.saturating_sub(1)));
                self.text_buf.push_str("- ");
            }
            Event::End(TagEnd::Paragraph) => {
                if !self.text_buf.is_empty() {
                    self.text_buf.push_str("\n\n");
                }
            }
            Event::Rule => {
                self.flush_text(self.blockquote_depth > 0);
            }
            Event::SoftBreak => self.push_inline_text(" "),
            Event::HardBreak => self.push_inline_text("\n"),
            Event::Text(text) => self.push_inline_text(&text),
            Event::Code(code) => {
                let formatted = format!("`{code}`");
                self.push_inline_text(&formatted);
            }
            _ => {}
        }
    }

    fn push_inline_text(&mut self, text: &str) {
        if self.pending_heading_level.is_some() {
            self.pending_heading_title.push_str(text);
        } else if self.in_code_block {
            self.code_buf.push_str(text);
        } else if self.in_image {
            self.image_alt.push_str(text);
        } else if self.media_link_type.is_some() {
            self.link_text.push_str(text);
        } else {
            self.text_buf.push_str(text);
        }
    }

    fn finish(mut self) -> Vec<Segment> {
        self.flush_text(self.blockquote_depth > 0);
        self.segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_hierarchy_matches_seed_scenario() {
        let input = "# A\n## B\npara 1\n## C\n```python\nx=1\n```\n";
        let segments = MarkdownParser::new().parse(input);

        let text = segments
            .iter()
            .find(|s| s.segment_type == SegmentType::Text)
            .expect("expected a text segment");
        assert_eq!(text.content, "para 1");
        assert_eq!(text.metadata.headers, vec!["A", "B"]);

        let code = segments
            .iter()
            .find(|s| s.segment_type == SegmentType::Code)
            .expect("expected a code segment");
        assert_eq!(code.content.trim(), "x=1");
        assert_eq!(code.metadata.language.as_deref(), Some("python"));
        assert_eq!(code.metadata.headers, vec!["A", "C"]);
    }

    #[test]
    fn empty_document_yields_empty_stream() {
        assert!(MarkdownParser::new().parse("").is_empty());
    }

    #[test]
    fn empty_heading_title_is_kept_for_bookkeeping_not_breadcrumbs() {
        let input = "# \n## B\npara\n";
        let segments = MarkdownParser::new().parse(input);
        let text = segments.iter().find(|s| s.segment_type == SegmentType::Text).unwrap();
        assert_eq!(text.metadata.headers, vec!["B"]);
    }

    #[test]
    fn image_with_audio_extension_becomes_audio_ref() {
        let input = "![narration](clip.mp3 \"Intro\")";
        let segments = MarkdownParser::new().parse(input);
        let seg = &segments[0];
        assert_eq!(seg.segment_type, SegmentType::AudioRef);
        assert_eq!(seg.content, "clip.mp3");
        assert_eq!(seg.metadata.alt.as_deref(), Some("narration"));
        assert_eq!(seg.metadata.title.as_deref(), Some("Intro"));
    }

    #[test]
    fn plain_image_stays_image_ref() {
        let input = "![a diagram](diagram.png)";
        let segments = MarkdownParser::new().parse(input);
        assert_eq!(segments[0].segment_type, SegmentType::ImageRef);
    }

    #[test]
    fn link_to_video_extension_emits_video_ref() {
        let input = "See [the recording](talk.mp4) for details.";
        let segments = MarkdownParser::new().parse(input);
        assert!(segments.iter().any(|s| s.segment_type == SegmentType::VideoRef && s.content == "talk.mp4"));
    }

    #[test]
    fn blockquote_text_is_flagged_quote() {
        let input = "> quoted line\n";
        let segments = MarkdownParser::new().parse(input);
        assert!(segments[0].metadata.quote);
    }

    #[test]
    fn table_segment_preserves_pipe_syntax() {
        let input = "| a | b |\n|---|---|\n| 1 | 2 |\n";
        let segments = MarkdownParser::new().parse(input);
        let table = segments.iter().find(|s| s.segment_type == SegmentType::Table).unwrap();
        assert!(table.content.contains('|'));
    }

    #[test]
    fn nested_list_collapses_into_one_text_segment() {
        let input = "- top\n  - nested\n  - nested2\n- top2\n";
        let segments = MarkdownParser::new().parse(input);
        let text_segments: Vec<_> = segments.iter().filter(|s| s.segment_type == SegmentType::Text).collect();
        assert_eq!(text_segments.len(), 1);
        assert!(text_segments[0].content.contains("top"));
        assert!(text_segments[0].content.contains("nested"));
    }
}
