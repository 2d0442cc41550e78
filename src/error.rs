//! Error kinds for every subsystem, composed into a single facade error.
//!
//! Each subsystem owns its own `thiserror` enum so callers that only touch
//! one subsystem (e.g. a standalone splitter) get a narrow error type. The
//! facade (`Engine`, in `engine.rs`) converts everything into [`EngineError`]
//! via `#[from]`, the same shape `weavegraph::node::NodeError` uses to wrap
//! lower-level errors.

use thiserror::Error;

/// Markdown parsing failures. Malformed Markdown is tolerated as plain text;
/// this only fires on genuine encoding problems.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("input is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

/// Splitter failures. The splitter is pure and total over well-formed
/// segment streams, so this is rarely constructed outside of misuse.
#[derive(Debug, Error)]
pub enum SplitError {
    #[error("chunk_size must be greater than zero")]
    InvalidChunkSize,
    #[error("code_chunk_size must be greater than zero")]
    InvalidCodeChunkSize,
}

/// Classification of an embedder/analyzer failure, used by the retry layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transient: worth retrying with backoff.
    Transient,
    /// Permanent: retrying will not help.
    Permanent,
}

/// Errors from the embedding client (C5/C6/C7).
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding request failed: {cause}")]
    Transient { cause: String },

    #[error("embedding request rejected: {cause}")]
    Permanent { cause: String },

    #[error("embedding request failed after exhausting retries: {last_cause}")]
    RetriesExhausted { last_cause: String },

    #[error("embedder returned {actual}-dimensional vector, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("batch embedding is not supported by the configured model")]
    BatchUnsupported,

    #[error(transparent)]
    RateLimit(#[from] RateLimitError),
}

/// Rate limiter failures. In practice `acquire` blocks rather than failing;
/// this variant exists for bounded-wait callers.
#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("rate limiter wait exceeded {waited_ms}ms budget")]
    WaitExceeded { waited_ms: u64 },
}

/// Vector/document store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("vector has {actual} dimensions, store expects {expected}")]
    VectorDimMismatch { expected: usize, actual: usize },

    #[error("schema migration failed: {0}")]
    MigrationFailed(String),

    #[error("document {0} not found")]
    DocumentNotFound(String),
}

impl From<tokio_rusqlite::Error> for StoreError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

/// Media analyzer failures.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("analyzer output did not match the expected schema: {0}")]
    Schema(String),

    #[error("analyzer upstream call failed: {0}")]
    Upstream(String),

    #[error("analyzer call timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Media task queue failures.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("task {0} not found")]
    NotFound(String),

    #[error("task {task_id} is in state {state} and cannot transition that way")]
    InvalidState { task_id: String, state: String },
}

/// Media pipeline failures (a critical step failed).
#[derive(Debug, Error)]
#[error("pipeline step '{step_name}' failed: {cause}")]
pub struct PipelineError {
    pub step_name: String,
    pub cause: String,
}

/// Facade-level error returned by [`crate::engine::Engine`] methods.
///
/// Carries a stable `kind()` and a safe display message: no API keys, no raw
/// document content beyond lengths/hashes, per `spec.md` §7.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Split(#[from] SplitError),

    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error(transparent)]
    RateLimit(#[from] RateLimitError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Analyze(#[from] AnalyzeError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("operation was cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Stable, machine-matchable kind name (no Rust type names leaked).
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Parse(_) => "parse_error",
            EngineError::Split(_) => "split_error",
            EngineError::Embed(EmbedError::Transient { .. }) => "embed_transient",
            EngineError::Embed(EmbedError::Permanent { .. }) => "embed_permanent",
            EngineError::Embed(EmbedError::RetriesExhausted { .. }) => "embed_retries_exhausted",
            EngineError::Embed(EmbedError::DimensionMismatch { .. }) => "embed_dimension_mismatch",
            EngineError::Embed(EmbedError::BatchUnsupported) => "embed_batch_unsupported",
            EngineError::Embed(EmbedError::RateLimit(_)) => "rate_limit",
            EngineError::RateLimit(_) => "rate_limit",
            EngineError::Store(StoreError::VectorDimMismatch { .. }) => "store_vector_dim_mismatch",
            EngineError::Store(StoreError::Constraint(_)) => "store_constraint",
            EngineError::Store(StoreError::MigrationFailed(_)) => "store_migration_failed",
            EngineError::Store(StoreError::DocumentNotFound(_)) => "store_document_not_found",
            EngineError::Store(StoreError::Io(_)) => "store_io",
            EngineError::Analyze(AnalyzeError::Schema(_)) => "analyze_schema",
            EngineError::Analyze(AnalyzeError::Upstream(_)) => "analyze_upstream",
            EngineError::Analyze(AnalyzeError::Timeout(_)) => "analyze_timeout",
            EngineError::Queue(QueueError::NotFound(_)) => "queue_not_found",
            EngineError::Queue(QueueError::InvalidState { task_id: _, state: _ }) => "queue_invalid_state",
            EngineError::Pipeline(_) => "pipeline_error",
            EngineError::Cancelled => "cancelled",
            EngineError::Config(_) => "config_error",
        }
    }
}
