//! Builds evaluator collaborators from strategy configurations.

use crate::chunking::{Chunker, build_chunker};
use crate::config::{EmbeddingApiConfig, LlmConfig};
use crate::embedding::{Embedder, EmbedderRegistry};
use crate::error::Result;
use crate::judge::{LlmJudge, RagJudge};
use crate::store::{InMemoryVectorStore, VectorStore};
use crate::strategy::{ChunkerConfig, EmbedderConfig};
use async_trait::async_trait;
use std::sync::Arc;

/// Source of the chunker, embedder, store and judge for one evaluation.
///
/// Parallel workers call this after decoding their strategy descriptor, so
/// implementations must be shareable across tasks.
#[async_trait]
pub trait CollaboratorFactory: Send + Sync {
    async fn chunker(&self, config: &ChunkerConfig) -> Result<Arc<dyn Chunker>>;

    async fn embedder(&self, config: &EmbedderConfig) -> Result<Arc<dyn Embedder>>;

    async fn vector_store(&self) -> Result<Arc<dyn VectorStore>>;

    /// The RAG judge, if one is configured.
    async fn judge(&self) -> Result<Option<Arc<dyn RagJudge>>>;
}

/// Default factory: built-in chunkers, cached embedders, one shared
/// in-memory store, and an LLM judge when an endpoint is configured.
pub struct StandardFactory {
    embedding_api: EmbeddingApiConfig,
    registry: EmbedderRegistry,
    store: Arc<dyn VectorStore>,
    judge: Option<Arc<dyn RagJudge>>,
}

impl StandardFactory {
    pub fn new(embedding_api: EmbeddingApiConfig) -> Self {
        Self {
            embedding_api,
            registry: EmbedderRegistry::new(),
            store: Arc::new(InMemoryVectorStore::new()),
            judge: None,
        }
    }

    /// Enable RAG judging through the given LLM endpoint.
    pub fn with_llm(mut self, llm: LlmConfig) -> Self {
        self.judge = Some(Arc::new(LlmJudge::from_config(llm)));
        self
    }

    /// Use a specific vector store instead of the in-memory default.
    pub fn with_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.store = store;
        self
    }

    pub fn registry(&self) -> &EmbedderRegistry {
        &self.registry
    }
}

#[async_trait]
impl CollaboratorFactory for StandardFactory {
    async fn chunker(&self, config: &ChunkerConfig) -> Result<Arc<dyn Chunker>> {
        build_chunker(config)
    }

    async fn embedder(&self, config: &EmbedderConfig) -> Result<Arc<dyn Embedder>> {
        self.registry.get_or_build(config, &self.embedding_api).await
    }

    async fn vector_store(&self) -> Result<Arc<dyn VectorStore>> {
        Ok(Arc::clone(&self.store))
    }

    async fn judge(&self) -> Result<Option<Arc<dyn RagJudge>>> {
        Ok(self.judge.clone())
    }
}
