//! Media analysis: analyzer (C9), task queue (C10), and pipeline (C11).

pub mod analyzer;
pub mod pipeline;
pub mod queue;
pub mod steps;
pub mod timecode;

pub use analyzer::{recover_analysis_result, HttpMediaAnalyzer, MediaAnalyzer, MockAnalyzer};
pub use pipeline::{MediaContext, MediaPipeline, PipelineServices, ProcessingStep};
pub use queue::MediaTaskQueue;
pub use steps::{OcrStep, SummaryStep, TranscriptionStep};
pub use timecode::{assign_start_seconds, find_timecode_seconds};
