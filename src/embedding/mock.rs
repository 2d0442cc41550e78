//! Deterministic in-memory embedder used by tests, grounded on the
//! `MockEmbeddingProvider` used across `wg-ragsmith`'s integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::EmbedError;

use super::client::{BatchHandle, BatchRequest, BatchResult, BatchStatus, EmbedderClient};

/// Produces a deterministic, content-derived vector so equality/ordering
/// assertions in tests don't depend on network calls.
fn hash_embed(text: &str, dimensions: usize) -> Vec<f32> {
    let mut seed: u64 = 1469598103934665603; // FNV offset basis
    for byte in text.bytes() {
        seed ^= byte as u64;
        seed = seed.wrapping_mul(1099511628211);
    }
    (0..dimensions)
        .map(|i| {
            let mixed = seed.wrapping_add(i as u64).wrapping_mul(2654435761);
            ((mixed % 2000) as f32 / 1000.0) - 1.0
        })
        .collect()
}

pub struct MockEmbedder {
    dimensions: usize,
    call_count: AtomicUsize,
    batches: Mutex<std::collections::HashMap<String, Vec<BatchResult>>>,
    batch_capable: bool,
}

impl MockEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            call_count: AtomicUsize::new(0),
            batches: Mutex::new(std::collections::HashMap::new()),
            batch_capable: true,
        }
    }

    pub fn with_batch_capable(mut self, capable: bool) -> Self {
        self.batch_capable = capable;
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbedderClient for MockEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| hash_embed(t, self.dimensions)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        Ok(hash_embed(text, self.dimensions))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn submit_batch(&self, requests: Vec<BatchRequest>) -> Result<BatchHandle, EmbedError> {
        if !self.batch_capable {
            return Err(EmbedError::BatchUnsupported);
        }
        let batch_id = uuid::Uuid::new_v4().to_string();
        let results: Vec<BatchResult> = requests
            .into_iter()
            .map(|r| BatchResult { custom_id: r.custom_id, embedding: Some(hash_embed(&r.text, self.dimensions)), error: None })
            .collect();
        self.batches.lock().unwrap().insert(batch_id.clone(), results);
        Ok(BatchHandle { batch_id })
    }

    async fn check_status(&self, handle: &BatchHandle) -> Result<BatchStatus, EmbedError> {
        if self.batches.lock().unwrap().contains_key(&handle.batch_id) {
            Ok(BatchStatus::Completed)
        } else {
            Err(EmbedError::Permanent { cause: "unknown batch handle".into() })
        }
    }

    async fn retrieve_results(&self, handle: &BatchHandle) -> Result<Vec<BatchResult>, EmbedError> {
        self.batches
            .lock()
            .unwrap()
            .get(&handle.batch_id)
            .cloned()
            .ok_or_else(|| EmbedError::Permanent { cause: "unknown batch handle".into() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embed_documents_is_deterministic_and_order_preserving() {
        let embedder = MockEmbedder::new(8);
        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let a = embedder.embed_documents(&texts).await.unwrap();
        let b = embedder.embed_documents(&texts).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].len(), 8);
    }

    #[tokio::test]
    async fn batch_round_trip_correlates_by_custom_id() {
        let embedder = MockEmbedder::new(4);
        let handle = embedder
            .submit_batch(vec![
                BatchRequest { custom_id: "c1".into(), text: "one".into() },
                BatchRequest { custom_id: "c2".into(), text: "two".into() },
            ])
            .await
            .unwrap();
        assert_eq!(embedder.check_status(&handle).await.unwrap(), BatchStatus::Completed);
        let results = embedder.retrieve_results(&handle).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().any(|r| r.custom_id == "c1"));
    }
}
