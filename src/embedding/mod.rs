//! Embedding backends.
//!
//! - `hashing`: deterministic feature hashing, no model or network
//! - `openai`: OpenAI-compatible HTTP endpoint
//! - `local`: sentence-transformers via candle (feature `local-embeddings`)

mod hashing;
#[cfg(feature = "local-embeddings")]
mod local;
mod openai;

pub use hashing::HashingEmbedder;
#[cfg(feature = "local-embeddings")]
pub use local::SentenceTransformerEmbedder;
pub use openai::OpenAiEmbedder;

use crate::config::EmbeddingApiConfig;
use crate::error::{BenchError, Result};
use crate::strategy::EmbedderConfig;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

/// A dense embedding vector.
pub type Embedding = Vec<f32>;

/// Produces dense vectors of a fixed, declared dimension.
///
/// Implementations must be idempotent: the same input always yields the
/// same output.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, one vector per input in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    /// Embed a single query.
    async fn embed_query(&self, text: &str) -> Result<Embedding> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| BenchError::Collaborator("embedder returned no vector".to_string()))
    }

    /// Declared vector dimension.
    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// Build an embedder from its configuration. Model loading runs on the
/// blocking pool.
pub async fn build_embedder(
    config: &EmbedderConfig,
    api: &EmbeddingApiConfig,
) -> Result<Arc<dyn Embedder>> {
    match config {
        EmbedderConfig::Hashing {
            dimension,
            normalize,
        } => Ok(Arc::new(HashingEmbedder::new(*dimension, *normalize)?)),
        EmbedderConfig::OpenAi {
            model,
            dimension,
            batch_size,
        } => Ok(Arc::new(OpenAiEmbedder::new(
            api.clone(),
            model.clone(),
            *dimension,
            *batch_size,
        )?)),
        #[cfg(feature = "local-embeddings")]
        EmbedderConfig::SentenceTransformer { model_id } => {
            let model_id = model_id.clone();
            let embedder =
                tokio::task::spawn_blocking(move || SentenceTransformerEmbedder::load(&model_id))
                    .await
                    .map_err(|e| {
                        BenchError::Collaborator(format!("Model loading task failed: {}", e))
                    })??;
            Ok(Arc::new(embedder))
        }
        #[cfg(not(feature = "local-embeddings"))]
        EmbedderConfig::SentenceTransformer { model_id } => Err(BenchError::Unsupported(format!(
            "embedder '{}' needs the `local-embeddings` feature",
            model_id
        ))),
    }
}

type Slot = Arc<OnceCell<Arc<dyn Embedder>>>;

/// Caches built embedders by their descriptor signature so strategies that
/// share an embedder configuration share one instance (and one loaded model).
///
/// Each signature gets its own slot. A slow build only holds up callers
/// waiting for the same signature. Failed builds leave the slot empty so the
/// next caller retries. Owned by the caller; nothing here is process-global.
#[derive(Default)]
pub struct EmbedderRegistry {
    slots: Mutex<HashMap<String, Slot>>,
}

impl EmbedderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached embedder for `config`, building it on first use.
    pub async fn get_or_build(
        &self,
        config: &EmbedderConfig,
        api: &EmbeddingApiConfig,
    ) -> Result<Arc<dyn Embedder>> {
        let key = config.to_descriptor().signature();
        self.get_or_insert_with(key, || build_embedder(config, api))
            .await
    }

    pub(crate) async fn get_or_insert_with<F, Fut>(
        &self,
        key: String,
        build: F,
    ) -> Result<Arc<dyn Embedder>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Arc<dyn Embedder>>>,
    {
        let slot = {
            let mut slots = self.slots.lock().await;
            Arc::clone(slots.entry(key).or_default())
        };
        slot.get_or_try_init(build).await.map(Arc::clone)
    }

    /// Number of built embedders.
    pub async fn len(&self) -> usize {
        self.slots
            .lock()
            .await
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    pub async fn clear(&self) {
        self.slots.lock().await.clear();
    }
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
