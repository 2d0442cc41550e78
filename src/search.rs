//! Search facade (C13): embeds a query and delegates to the store's
//! vector/FTS/hybrid search, applying optional chunk-type and language
//! filters.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::domain::{ChunkResult, ChunkType, SearchMode};
use crate::embedding::EmbedderClient;
use crate::error::EngineError;
use crate::store::{ChunkFilters, SqliteStore};

pub struct SearchFacade {
    store: Arc<SqliteStore>,
    embedder: Arc<dyn EmbedderClient>,
    rrf_k: f64,
    default_limit: usize,
}

impl SearchFacade {
    pub fn new(store: Arc<SqliteStore>, embedder: Arc<dyn EmbedderClient>, config: &EngineConfig) -> Self {
        Self { store, embedder, rrf_k: config.rrf_k, default_limit: config.default_search_limit }
    }

    pub async fn search(
        &self,
        query: &str,
        mode: SearchMode,
        limit: Option<usize>,
        chunk_type: Option<ChunkType>,
        language: Option<String>,
    ) -> Result<Vec<ChunkResult>, EngineError> {
        let limit = limit.unwrap_or(self.default_limit);
        let filters = ChunkFilters { chunk_type, language };

        let query_vector = match mode {
            SearchMode::Fts => None,
            SearchMode::Vector | SearchMode::Hybrid => Some(self.embedder.embed_query(query).await?),
        };
        let query_text = match mode {
            SearchMode::Vector => None,
            SearchMode::Fts | SearchMode::Hybrid => Some(query),
        };

        let results = self.store.search_chunks(query_vector, query_text, mode, limit, self.rrf_k, &filters).await?;
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChunkWithEmbedding, Document, Metadata};
    use crate::embedding::MockEmbedder;

    async fn seeded_store() -> (Arc<SqliteStore>, Arc<MockEmbedder>) {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::new(dir.path().join("search.db")).with_embedding_dim(8);
        std::mem::forget(dir);
        let store = Arc::new(SqliteStore::open(&config).await.unwrap());
        let embedder = Arc::new(MockEmbedder::new(8));

        let doc = Document::new("the quick brown fox", crate::domain::MediaType::Text, Metadata::new());
        let chunk = crate::domain::Chunk::new(doc.id.clone(), 0, "the quick brown fox", crate::domain::ChunkType::Text, Default::default());
        let embedding = embedder.embed_query("the quick brown fox").await.unwrap();
        store.save(&doc, &[ChunkWithEmbedding { chunk, embedding }]).await.unwrap();
        (store, embedder)
    }

    #[tokio::test]
    async fn fts_search_finds_seeded_chunk() {
        let (store, embedder) = seeded_store().await;
        let facade = SearchFacade::new(store, embedder, &EngineConfig::new("unused.db"));
        let results = facade.search("fox", SearchMode::Fts, None, None, None).await.unwrap();
        assert!(!results.is_empty());
    }

    #[tokio::test]
    async fn vector_search_returns_seeded_chunk() {
        let (store, embedder) = seeded_store().await;
        let facade = SearchFacade::new(store, embedder, &EngineConfig::new("unused.db"));
        let results = facade.search("the quick brown fox", SearchMode::Vector, Some(5), None, None).await.unwrap();
        assert!(!results.is_empty());
    }
}
