//! Embedder client (C5): maps text to fixed-dimension float32 vectors,
//! with synchronous and deferred (batch) request modes.
//!
//! HTTP plumbing follows the "generic JSON client, sort results back into
//! input order" idiom `Smebbs-lytt::embedding::openai::OpenAIEmbedder`
//! uses, generalized away from any single vendor's SDK: we speak
//! vendor-agnostic JSON over `reqwest` instead of depending on
//! `async_openai`, since the spec's embedder contract (index vs. query
//! task, batch submit/poll/retrieve) is not OpenAI-specific.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::EmbedError;

use super::rate_limiter::RateLimiter;
use super::retry::{classify_status, retry_with_backoff, Classification, RetryPolicy};

/// Distinguishes the two request shapes the embedder contract supports;
/// some providers use a different model/task parameter for each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskVariant {
    Index,
    Query,
}

/// Status of a submitted batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Opaque handle to a submitted batch job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchHandle {
    pub batch_id: String,
}

/// One request within a batch, correlated back to its caller-chosen id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub custom_id: String,
    pub text: String,
}

/// One result within a retrieved batch, correlated by `custom_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub custom_id: String,
    pub embedding: Option<Vec<f32>>,
    pub error: Option<String>,
}

/// Capability flag: not every configured model supports the batch path
/// (spec Open Question — batch is feature-flagged per model).
pub trait EmbedderCapabilities {
    fn supports_batch(&self) -> bool;
}

/// The embedder contract the ingestion core and search facade depend on.
#[async_trait]
pub trait EmbedderClient: Send + Sync {
    /// Bulk, index-task embedding. Results are returned in input order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Single, query-task embedding.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    fn dimensions(&self) -> usize;

    async fn submit_batch(&self, requests: Vec<BatchRequest>) -> Result<BatchHandle, EmbedError> {
        let _ = requests;
        Err(EmbedError::BatchUnsupported)
    }

    async fn check_status(&self, handle: &BatchHandle) -> Result<BatchStatus, EmbedError> {
        let _ = handle;
        Err(EmbedError::BatchUnsupported)
    }

    async fn retrieve_results(&self, handle: &BatchHandle) -> Result<Vec<BatchResult>, EmbedError> {
        let _ = handle;
        Err(EmbedError::BatchUnsupported)
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequestBody<'a> {
    model: &'a str,
    task: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponseItem {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponseBody {
    data: Vec<EmbedResponseItem>,
}

/// A vendor-agnostic HTTP embedder: POSTs `{model, task, input}` to a
/// configured endpoint and expects `{data: [{index, embedding}, ...]}`
/// back, sorting by `index` to guarantee input order regardless of what
/// order the upstream returns them in.
pub struct HttpEmbedder {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    dimensions: usize,
    rate_limiter: RateLimiter,
    retry_policy: RetryPolicy,
    timeout: Duration,
    /// Base URL for the batch submit/status/results endpoints. `None` means
    /// this deployment has no batch endpoint, so `supports_batch()` is
    /// `false` and the default `BatchUnsupported` trait methods apply.
    batch_endpoint: Option<String>,
}

impl HttpEmbedder {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, dimensions: usize, rate_limiter: RateLimiter) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            dimensions,
            rate_limiter,
            retry_policy: RetryPolicy::default(),
            timeout: Duration::from_secs(30),
            batch_endpoint: None,
        }
    }

    /// Enables the batch path against `{batch_endpoint}/batches(/...)`.
    pub fn with_batch_endpoint(mut self, batch_endpoint: impl Into<String>) -> Self {
        self.batch_endpoint = Some(batch_endpoint.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[instrument(skip(self, texts), fields(count = texts.len()))]
    async fn embed(&self, texts: &[String], task: TaskVariant) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        self.rate_limiter.acquire(texts.len() as f64).await;

        let task_label = match task {
            TaskVariant::Index => "index",
            TaskVariant::Query => "query",
        };

        let body = retry_with_backoff(&self.retry_policy, |_attempt| {
            let request = EmbedRequestBody { model: &self.model, task: task_label, input: texts };
            async move {
                let response = self
                    .http
                    .post(&self.endpoint)
                    .timeout(self.timeout)
                    .json(&request)
                    .send()
                    .await;

                match response {
                    Ok(resp) => {
                        let status = resp.status();
                        if status.is_success() {
                            resp.json::<EmbedResponseBody>()
                                .await
                                .map_err(|e| (Classification { kind: crate::error::ErrorKind::Permanent }, EmbedError::Permanent { cause: e.to_string() }))
                        } else {
                            let classification = classify_status(Some(status.as_u16()), false, false);
                            let cause = format!("upstream returned HTTP {status}");
                            let err = match classification.kind {
                                crate::error::ErrorKind::Transient => EmbedError::Transient { cause },
                                crate::error::ErrorKind::Permanent => EmbedError::Permanent { cause },
                            };
                            Err((classification, err))
                        }
                    }
                    Err(e) => {
                        let classification = classify_status(None, e.is_timeout(), true);
                        Err((classification, EmbedError::Transient { cause: e.to_string() }))
                    }
                }
            }
        })
        .await
        .map_err(|last| match last {
            EmbedError::Transient { cause } => EmbedError::RetriesExhausted { last_cause: cause },
            other => other,
        })?;

        let mut items = body.data;
        items.sort_by_key(|item| item.index);

        for item in &items {
            if item.embedding.len() != self.dimensions {
                return Err(EmbedError::DimensionMismatch { expected: self.dimensions, actual: item.embedding.len() });
            }
        }

        debug!(returned = items.len(), "embedding batch complete");
        Ok(items.into_iter().map(|i| i.embedding).collect())
    }
}

#[derive(Debug, Serialize)]
struct BatchRequestLine<'a> {
    custom_id: &'a str,
    body: BatchRequestBody<'a>,
}

#[derive(Debug, Serialize)]
struct BatchRequestBody<'a> {
    model: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct BatchSubmitResponse {
    batch_id: String,
}

#[derive(Debug, Deserialize)]
struct BatchStatusResponse {
    status: BatchStatus,
}

#[derive(Debug, Deserialize)]
struct BatchResultLine {
    custom_id: String,
    embedding: Option<Vec<f32>>,
    error: Option<String>,
}

#[async_trait]
impl EmbedderClient for HttpEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.embed(texts, TaskVariant::Index).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let results = self.embed(std::slice::from_ref(&text.to_string()), TaskVariant::Query).await?;
        results.into_iter().next().ok_or_else(|| EmbedError::Permanent { cause: "empty embedding response".into() })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn submit_batch(&self, requests: Vec<BatchRequest>) -> Result<BatchHandle, EmbedError> {
        let batch_endpoint = self.batch_endpoint.as_ref().ok_or(EmbedError::BatchUnsupported)?;

        let mut body = String::new();
        for request in &requests {
            let line = BatchRequestLine { custom_id: &request.custom_id, body: BatchRequestBody { model: &self.model, content: &request.text } };
            body.push_str(&serde_json::to_string(&line).map_err(|e| EmbedError::Permanent { cause: e.to_string() })?);
            body.push('\n');
        }

        let response = self
            .http
            .post(format!("{batch_endpoint}/batches"))
            .timeout(self.timeout)
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(|e| EmbedError::Transient { cause: e.to_string() })?;
        if !response.status().is_success() {
            return Err(EmbedError::Permanent { cause: format!("batch submit returned HTTP {}", response.status()) });
        }
        let parsed: BatchSubmitResponse = response.json().await.map_err(|e| EmbedError::Permanent { cause: e.to_string() })?;
        Ok(BatchHandle { batch_id: parsed.batch_id })
    }

    async fn check_status(&self, handle: &BatchHandle) -> Result<BatchStatus, EmbedError> {
        let batch_endpoint = self.batch_endpoint.as_ref().ok_or(EmbedError::BatchUnsupported)?;

        let response = self
            .http
            .get(format!("{batch_endpoint}/batches/{}", handle.batch_id))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| EmbedError::Transient { cause: e.to_string() })?;
        if !response.status().is_success() {
            return Err(EmbedError::Permanent { cause: format!("batch status check returned HTTP {}", response.status()) });
        }
        let parsed: BatchStatusResponse = response.json().await.map_err(|e| EmbedError::Permanent { cause: e.to_string() })?;
        Ok(parsed.status)
    }

    async fn retrieve_results(&self, handle: &BatchHandle) -> Result<Vec<BatchResult>, EmbedError> {
        let batch_endpoint = self.batch_endpoint.as_ref().ok_or(EmbedError::BatchUnsupported)?;

        let response = self
            .http
            .get(format!("{batch_endpoint}/batches/{}/results", handle.batch_id))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| EmbedError::Transient { cause: e.to_string() })?;
        if !response.status().is_success() {
            return Err(EmbedError::Permanent { cause: format!("batch results fetch returned HTTP {}", response.status()) });
        }
        let text = response.text().await.map_err(|e| EmbedError::Permanent { cause: e.to_string() })?;

        let mut results = Vec::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let parsed: BatchResultLine = serde_json::from_str(line).map_err(|e| EmbedError::Permanent { cause: e.to_string() })?;
            results.push(BatchResult { custom_id: parsed.custom_id, embedding: parsed.embedding, error: parsed.error });
        }
        Ok(results)
    }
}

impl EmbedderCapabilities for HttpEmbedder {
    fn supports_batch(&self) -> bool {
        self.batch_endpoint.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_status_round_trips_through_serde() {
        let s = serde_json::to_string(&BatchStatus::Processing).unwrap();
        assert_eq!(s, "\"processing\"");
    }

    #[test]
    fn supports_batch_reflects_whether_a_batch_endpoint_was_configured() {
        let without = HttpEmbedder::new("https://e.test/embed", "m", 4, RateLimiter::new(600, 600));
        assert!(!without.supports_batch());

        let with = HttpEmbedder::new("https://e.test/embed", "m", 4, RateLimiter::new(600, 600)).with_batch_endpoint("https://e.test");
        assert!(with.supports_batch());
    }

    #[test]
    fn batch_request_line_serializes_to_the_documented_jsonl_shape() {
        let line = BatchRequestLine { custom_id: "chunk-1", body: BatchRequestBody { model: "m", content: "hello" } };
        let json: serde_json::Value = serde_json::from_str(&serde_json::to_string(&line).unwrap()).unwrap();
        assert_eq!(json["custom_id"], "chunk-1");
        assert_eq!(json["body"]["model"], "m");
        assert_eq!(json["body"]["content"], "hello");
    }

    #[test]
    fn batch_result_line_parses_a_failed_entry_without_an_embedding() {
        let raw = r#"{"custom_id": "chunk-2", "embedding": null, "error": "rejected"}"#;
        let parsed: BatchResultLine = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.custom_id, "chunk-2");
        assert!(parsed.embedding.is_none());
        assert_eq!(parsed.error.as_deref(), Some("rejected"));
    }
}
