//! Integration tests for the public `Engine` surface with mock embedder
//! and analyzer backends, suitable for CI and deterministic testing.

use std::sync::Arc;

use semindex::domain::{AnalysisResult, ChunkType, Document, MediaType, Metadata, SearchMode};
use semindex::embedding::MockEmbedder;
use semindex::media::MockAnalyzer;
use semindex::{Engine, EngineConfig, IngestMode};

fn test_config() -> EngineConfig {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::new(dir.path().join("integration.db")).with_embedding_dim(8);
    std::mem::forget(dir);
    config
}

async fn build_engine(description: &str) -> Engine {
    let embedder = Arc::new(MockEmbedder::new(8));
    let analyzer = Arc::new(MockAnalyzer::new(AnalysisResult { description: description.to_string(), ..Default::default() }));
    Engine::new(test_config(), embedder, analyzer).await.unwrap()
}

#[tokio::test]
async fn markdown_document_round_trips_through_hybrid_search() {
    let engine = build_engine("unused").await;
    let doc = Document::new(
        "# Title\n\n## Background\n\nReciprocal Rank Fusion explained for hybrid retrieval.\n\n## Other\n\nunrelated text about gardening\n",
        MediaType::Markdown,
        Metadata::new(),
    );
    engine.ingest(doc, IngestMode::Sync).await.unwrap();

    let results = engine.search_chunks("Reciprocal Rank Fusion", SearchMode::Hybrid, Some(5), None, None).await.unwrap();
    assert!(!results.is_empty());
    assert!(results[0].chunk.content.contains("Reciprocal Rank Fusion"));
}

#[tokio::test]
async fn code_fence_becomes_its_own_typed_chunk() {
    let engine = build_engine("unused").await;
    let doc = Document::new("# A\n## B\npara 1\n## C\n```python\nx=1\n```\n", MediaType::Markdown, Metadata::new());
    engine.ingest(doc, IngestMode::Sync).await.unwrap();

    let results = engine.search_chunks("x=1", SearchMode::Fts, None, Some(ChunkType::Code), None).await.unwrap();
    assert!(results.iter().any(|r| r.chunk.chunk_type == ChunkType::Code));
}

#[tokio::test]
async fn media_document_flows_through_pipeline_into_media_details() {
    let engine = build_engine("a lighthouse on a cliff").await;
    let mut metadata = Metadata::new();
    metadata.insert("source".to_string(), serde_json::Value::String("/lighthouse.png".into()));
    let doc = Document::new("/lighthouse.png", MediaType::Image, metadata);
    engine.ingest(doc.clone(), IngestMode::Sync).await.unwrap();

    let details = engine.get_media_details(&doc.id).await.unwrap();
    assert_eq!(details.summary.as_deref(), Some("a lighthouse on a cliff"));
}

#[tokio::test]
async fn queued_media_document_is_processed_by_the_queue() {
    let engine = build_engine("a dog in a park").await;
    let mut metadata = Metadata::new();
    metadata.insert("source".to_string(), serde_json::Value::String("/dog.png".into()));
    let doc = Document::new("/dog.png", MediaType::Image, metadata);
    engine.ingest(doc.clone(), IngestMode::Queued).await.unwrap();

    let processed = engine.process_media_queue(5).await.unwrap();
    assert_eq!(processed, 1);

    let details = engine.get_media_details(&doc.id).await.unwrap();
    assert_eq!(details.summary.as_deref(), Some("a dog in a park"));
}

#[tokio::test]
async fn reprocess_rebuilds_media_chunks_with_new_analysis() {
    let engine = build_engine("first draft summary").await;
    let mut metadata = Metadata::new();
    metadata.insert("source".to_string(), serde_json::Value::String("/a.png".into()));
    let doc = Document::new("/a.png", MediaType::Image, metadata);
    engine.ingest(doc.clone(), IngestMode::Sync).await.unwrap();

    let new_analysis = AnalysisResult { description: "revised summary".into(), ..Default::default() };
    engine.reprocess_document(&doc.id, new_analysis).await.unwrap();

    let details = engine.get_media_details(&doc.id).await.unwrap();
    assert_eq!(details.summary.as_deref(), Some("revised summary"));
}
