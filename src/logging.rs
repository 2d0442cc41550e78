//! Structured logging contract (C16).
//!
//! `Logger` wraps a `tracing::Span` and exposes an immutable `bind` that
//! returns a *new* child logger rather than mutating `self`, so callers can
//! fan a root logger out into per-document / per-chunk / per-task loggers
//! without aliasing concerns. Installing a global subscriber is opt-in via
//! [`init`], following the `tracing_subscriber::registry().with(...).init()`
//! idiom used by the CLI binaries in this corpus.

use tracing::Span;

/// Reserved field keys callers are expected to bind for correlation.
pub mod keys {
    pub const BATCH_ID: &str = "batch_id";
    pub const DOC_ID: &str = "doc_id";
    pub const CHUNK_ID: &str = "chunk_id";
    pub const TASK_ID: &str = "task_id";
    pub const REQUEST_ID: &str = "request_id";
}

/// A structured logger bound to a `tracing::Span`, with a chain of
/// caller-supplied correlation fields it emits alongside every message.
///
/// Cloning is cheap (`Span` is internally reference-counted, the field
/// chain is a small `Vec`). `bind` never mutates the receiver: it returns
/// a new logger carrying the parent's fields plus the new one, opened as a
/// child span so downstream `tracing` subscribers still see the nesting.
#[derive(Debug, Clone)]
pub struct Logger {
    span: Span,
    fields: Vec<(&'static str, String)>,
}

impl Logger {
    /// The engine-wide root logger. Call once per `Engine` instance.
    pub fn root() -> Self {
        Self {
            span: tracing::info_span!("semindex"),
            fields: Vec::new(),
        }
    }

    /// Returns a new logger with `key = value` added to its field chain.
    /// Does not affect `self`.
    pub fn bind(&self, key: &'static str, value: impl std::fmt::Display) -> Self {
        let child = tracing::info_span!(parent: &self.span, "bound", key = key);
        let mut fields = self.fields.clone();
        fields.push((key, value.to_string()));
        Self { span: child, fields }
    }

    pub fn info(&self, message: &str) {
        let _enter = self.span.enter();
        tracing::info!(fields = %self.render_fields(), "{message}");
    }

    pub fn warn(&self, message: &str) {
        let _enter = self.span.enter();
        tracing::warn!(fields = %self.render_fields(), "{message}");
    }

    pub fn error(&self, message: &str) {
        let _enter = self.span.enter();
        tracing::error!(fields = %self.render_fields(), "{message}");
    }

    pub fn debug(&self, message: &str) {
        let _enter = self.span.enter();
        tracing::debug!(fields = %self.render_fields(), "{message}");
    }

    /// Access the underlying span, e.g. to `.enter()` it around an
    /// `#[instrument]`-free async block.
    pub fn span(&self) -> &Span {
        &self.span
    }

    fn render_fields(&self) -> String {
        self.fields
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::root()
    }
}

/// Installs a global `tracing_subscriber` with an `EnvFilter` defaulting to
/// `level` when `RUST_LOG` is unset. Idempotent: a second call is a no-op if
/// a subscriber is already installed.
pub fn init(level: &str) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("semindex={level}")));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_does_not_mutate_parent() {
        let root = Logger::root();
        let child = root.bind(keys::DOC_ID, "doc-1");
        // Both loggers remain independently usable; this mainly checks
        // the call doesn't panic and produces a distinct span.
        root.info("root message");
        child.info("child message");
    }
}
