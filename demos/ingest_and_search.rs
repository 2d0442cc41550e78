//! Demonstrates ingesting a Markdown document and a mock image document,
//! then running hybrid search and reading back media details.
//!
//! ```bash
//! cargo run --example ingest_and_search
//! ```

use std::sync::Arc;

use semindex::domain::{AnalysisResult, Document, MediaType, Metadata, SearchMode};
use semindex::embedding::MockEmbedder;
use semindex::media::MockAnalyzer;
use semindex::{Engine, EngineConfig, IngestMode};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::new("demo.db").with_embedding_dim(8);
    let embedder = Arc::new(MockEmbedder::new(8));
    let analyzer = Arc::new(MockAnalyzer::new(AnalysisResult {
        description: "a red bicycle leaning against a brick wall".to_string(),
        keywords: vec!["bicycle".to_string(), "brick wall".to_string()],
        ..Default::default()
    }));
    let engine = Engine::new(config, embedder, analyzer).await?;

    let doc = Document::new(
        "# Notes\n\n## Retrieval\n\nHybrid search combines vector similarity with full-text ranking.\n",
        MediaType::Markdown,
        Metadata::new(),
    );
    engine.ingest(doc, IngestMode::Sync).await?;

    let mut metadata = Metadata::new();
    metadata.insert("source".to_string(), serde_json::Value::String("/bicycle.jpg".to_string()));
    let image_doc = Document::new("/bicycle.jpg", MediaType::Image, metadata);
    engine.ingest(image_doc.clone(), IngestMode::Sync).await?;

    let results = engine.search_chunks("hybrid search ranking", SearchMode::Hybrid, Some(5), None, None).await?;
    println!("hybrid search results:");
    for r in &results {
        println!("  [{:.4}] {:?}: {}", r.score, r.match_type, r.chunk.content);
    }

    let details = engine.get_media_details(&image_doc.id).await?;
    println!("\nmedia details for {}:", image_doc.id);
    println!("  summary: {:?}", details.summary);
    println!("  keywords: {:?}", details.keywords);

    Ok(())
}
