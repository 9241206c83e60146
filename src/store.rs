//! Vector store abstraction and an in-process implementation.

use crate::embedding::{Embedding, cosine_similarity};
use crate::error::{BenchError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// What is stored alongside each vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub chunk_id: String,
    pub document_id: String,
    pub content: String,
}

/// A single similarity search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk_id: String,
    pub document_id: String,
    pub score: f32,
    pub content: String,
}

/// Named collections of fixed-dimension vectors.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create a collection. Fails if it already exists.
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()>;

    async fn collection_exists(&self, name: &str) -> Result<bool>;

    /// Delete a collection. Deleting a missing collection is not an error.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Insert or replace vectors keyed by `payload.chunk_id`.
    async fn upsert(
        &self,
        collection: &str,
        vectors: Vec<Embedding>,
        payloads: Vec<ChunkPayload>,
    ) -> Result<()>;

    /// Top `limit` hits by descending similarity.
    async fn search(&self, collection: &str, query: &[f32], limit: usize) -> Result<Vec<SearchHit>>;
}

#[derive(Debug)]
struct Collection {
    dimension: usize,
    points: Vec<(Embedding, ChunkPayload)>,
    by_id: HashMap<String, usize>,
}

/// Brute-force cosine search over in-memory collections.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live collections.
    pub async fn collection_count(&self) -> usize {
        self.collections.read().await.len()
    }

    pub async fn point_count(&self, name: &str) -> Option<usize> {
        self.collections.read().await.get(name).map(|c| c.points.len())
    }
}

fn missing(name: &str) -> BenchError {
    BenchError::Collaborator(format!("collection '{}' does not exist", name))
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()> {
        if dimension == 0 {
            return Err(BenchError::InvalidConfig(
                "collection dimension must be greater than 0".to_string(),
            ));
        }
        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            return Err(BenchError::Collaborator(format!(
                "collection '{}' already exists",
                name
            )));
        }
        collections.insert(
            name.to_string(),
            Collection {
                dimension,
                points: Vec::new(),
                by_id: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.collections.write().await.remove(name);
        Ok(())
    }

    async fn upsert(
        &self,
        collection: &str,
        vectors: Vec<Embedding>,
        payloads: Vec<ChunkPayload>,
    ) -> Result<()> {
        if vectors.len() != payloads.len() {
            return Err(BenchError::Collaborator(format!(
                "upsert got {} vectors but {} payloads",
                vectors.len(),
                payloads.len()
            )));
        }

        let mut collections = self.collections.write().await;
        let target = collections.get_mut(collection).ok_or_else(|| missing(collection))?;

        if let Some(bad) = vectors.iter().find(|v| v.len() != target.dimension) {
            return Err(BenchError::Collaborator(format!(
                "vector dimension {} does not match collection dimension {}",
                bad.len(),
                target.dimension
            )));
        }

        for (vector, payload) in vectors.into_iter().zip(payloads) {
            match target.by_id.get(&payload.chunk_id) {
                Some(&i) => target.points[i] = (vector, payload),
                None => {
                    target.by_id.insert(payload.chunk_id.clone(), target.points.len());
                    target.points.push((vector, payload));
                }
            }
        }
        Ok(())
    }

    async fn search(&self, collection: &str, query: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        let collections = self.collections.read().await;
        let target = collections.get(collection).ok_or_else(|| missing(collection))?;

        if query.len() != target.dimension {
            return Err(BenchError::Collaborator(format!(
                "query dimension {} does not match collection dimension {}",
                query.len(),
                target.dimension
            )));
        }

        let mut scored: Vec<(f32, &ChunkPayload)> = target
            .points
            .iter()
            .map(|(vector, payload)| (cosine_similarity(query, vector), payload))
            .collect();

        // Stable: equal scores keep insertion order.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(score, payload)| SearchHit {
                chunk_id: payload.chunk_id.clone(),
                document_id: payload.document_id.clone(),
                score,
                content: payload.content.clone(),
            })
            .collect())
    }
}
