//! Collaborator doubles for evaluator and comparator tests.

use crate::chunking::{Chunker, RecursiveChunker, build_chunker};
use crate::embedding::{Embedder, Embedding, HashingEmbedder};
use crate::error::{BenchError, Result};
use crate::evaluator::{
    EfficiencyMetrics, EvaluationMetadata, EvaluationResult, RetrievalMetrics, StrategyMetrics,
    collection_name,
};
use crate::factory::CollaboratorFactory;
use crate::judge::{RagAssessment, RagJudge, RagSample};
use crate::store::{ChunkPayload, InMemoryVectorStore, SearchHit, VectorStore};
use crate::strategy::{ChunkerConfig, EmbedderConfig, StrategyConfig};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn hashing_strategy(name: &str, dimension: usize) -> StrategyConfig {
    StrategyConfig::new(
        name,
        ChunkerConfig::Recursive {
            chunk_size: 1000,
            chunk_overlap: 0,
        },
        EmbedderConfig::Hashing {
            dimension,
            normalize: true,
        },
    )
}

pub fn recursive(chunk_size: usize) -> Arc<dyn Chunker> {
    Arc::new(RecursiveChunker::new(chunk_size, 0).unwrap())
}

/// Misbehavior injected into [`FaultyEmbedder`].
#[derive(Debug, Clone)]
pub enum Fault {
    None,
    /// Error on any batch containing the substring.
    FailContaining(String),
    /// Error on queries containing the substring; documents embed normally.
    FailQueryContaining(String),
    /// Panic on any batch containing the substring.
    PanicContaining(String),
    /// Sleep before every batch.
    Delay(Duration),
    /// Return vectors one element longer than declared.
    WrongDimension,
}

pub struct FaultyEmbedder {
    inner: HashingEmbedder,
    fault: Fault,
}

impl FaultyEmbedder {
    pub fn new(dimension: usize, fault: Fault) -> Self {
        Self {
            inner: HashingEmbedder::new(dimension, true).unwrap(),
            fault,
        }
    }
}

#[async_trait]
impl Embedder for FaultyEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        match &self.fault {
            Fault::None | Fault::FailQueryContaining(_) => {}
            Fault::FailContaining(needle) => {
                if texts.iter().any(|t| t.contains(needle.as_str())) {
                    return Err(BenchError::Collaborator(format!(
                        "injected failure on '{}'",
                        needle
                    )));
                }
            }
            Fault::PanicContaining(needle) => {
                if texts.iter().any(|t| t.contains(needle.as_str())) {
                    panic!("injected panic on '{}'", needle);
                }
            }
            Fault::Delay(delay) => tokio::time::sleep(*delay).await,
            Fault::WrongDimension => {
                let mut vectors = self.inner.embed_batch(texts).await?;
                vectors.iter_mut().for_each(|v| v.push(0.0));
                return Ok(vectors);
            }
        }
        self.inner.embed_batch(texts).await
    }

    async fn embed_query(&self, text: &str) -> Result<Embedding> {
        if let Fault::FailQueryContaining(needle) = &self.fault {
            if text.contains(needle.as_str()) {
                return Err(BenchError::Collaborator(format!(
                    "injected query failure on '{}'",
                    needle
                )));
            }
        }
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        Ok(vectors.remove(0))
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_name(&self) -> &str {
        "faulty"
    }
}

/// In-memory store that records lifecycle calls.
#[derive(Default)]
pub struct RecordingStore {
    inner: InMemoryVectorStore,
    created: AtomicUsize,
    deleted: Mutex<Vec<String>>,
    fail_deletes: bool,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_deletes(mut self) -> Self {
        self.fail_deletes = true;
        self
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub async fn live_collections(&self) -> usize {
        self.inner.collection_count().await
    }
}

#[async_trait]
impl VectorStore for RecordingStore {
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()> {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.inner.create_collection(name, dimension).await
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        self.inner.collection_exists(name).await
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.deleted.lock().unwrap().push(name.to_string());
        if self.fail_deletes {
            return Err(BenchError::Collaborator("injected delete failure".to_string()));
        }
        self.inner.delete_collection(name).await
    }

    async fn upsert(
        &self,
        collection: &str,
        vectors: Vec<Embedding>,
        payloads: Vec<ChunkPayload>,
    ) -> Result<()> {
        self.inner.upsert(collection, vectors, payloads).await
    }

    async fn search(&self, collection: &str, query: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        self.inner.search(collection, query, limit).await
    }
}

/// Judge returning a fixed assessment, optionally failing its first calls.
pub struct ScriptedJudge {
    assessment: RagAssessment,
    fail_first: usize,
    calls: AtomicUsize,
}

impl ScriptedJudge {
    pub fn new(assessment: RagAssessment) -> Self {
        Self {
            assessment,
            fail_first: 0,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }
}

#[async_trait]
impl RagJudge for ScriptedJudge {
    async fn assess(&self, _sample: &RagSample) -> Result<RagAssessment> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(BenchError::LlmParse("scripted failure".to_string()));
        }
        Ok(self.assessment)
    }
}

/// Factory handing out [`FaultyEmbedder`]s keyed by hashing dimension and
/// one shared [`RecordingStore`].
pub struct TestFactory {
    pub store: Arc<RecordingStore>,
    faults: Vec<(usize, Fault)>,
    build_delays: Vec<(usize, Duration)>,
}

impl TestFactory {
    pub fn new() -> Self {
        Self {
            store: Arc::new(RecordingStore::new()),
            faults: Vec::new(),
            build_delays: Vec::new(),
        }
    }

    /// Building a hashing embedder of `dimension` takes `delay`.
    pub fn with_build_delay(mut self, dimension: usize, delay: Duration) -> Self {
        self.build_delays.push((dimension, delay));
        self
    }

    /// Hashing embedders of `dimension` get `fault`.
    pub fn with_fault(mut self, dimension: usize, fault: Fault) -> Self {
        self.faults.push((dimension, fault));
        self
    }
}

#[async_trait]
impl CollaboratorFactory for TestFactory {
    async fn chunker(&self, config: &ChunkerConfig) -> Result<Arc<dyn Chunker>> {
        build_chunker(config)
    }

    async fn embedder(&self, config: &EmbedderConfig) -> Result<Arc<dyn Embedder>> {
        match config {
            EmbedderConfig::Hashing { dimension, .. } => {
                if let Some((_, delay)) = self.build_delays.iter().find(|(d, _)| d == dimension) {
                    tokio::time::sleep(*delay).await;
                }
                let fault = self
                    .faults
                    .iter()
                    .find(|(d, _)| d == dimension)
                    .map(|(_, f)| f.clone())
                    .unwrap_or(Fault::None);
                Ok(Arc::new(FaultyEmbedder::new(*dimension, fault)))
            }
            other => Err(BenchError::Unsupported(format!(
                "test factory has no {} embedder",
                other.kind().as_str()
            ))),
        }
    }

    async fn vector_store(&self) -> Result<Arc<dyn VectorStore>> {
        Ok(self.store.clone())
    }

    async fn judge(&self) -> Result<Option<Arc<dyn RagJudge>>> {
        Ok(None)
    }
}

/// A finished result with the given NDCG and otherwise fixed metrics.
pub fn sample_result(name: &str, ndcg: f64) -> EvaluationResult {
    let strategy = hashing_strategy(name, 16);
    EvaluationResult {
        strategy_name: name.to_string(),
        dataset_name: "ds".to_string(),
        metrics: StrategyMetrics {
            retrieval: RetrievalMetrics {
                k: 5,
                ndcg_at_k: ndcg,
                mrr: ndcg,
                precision_at_k: 0.2,
                recall_at_k: 1.0,
                hit_rate: 1.0,
                map: ndcg,
                num_queries: 1,
            },
            efficiency: EfficiencyMetrics {
                indexing_time_secs: 0.1,
                query_latency_ms: 1.0,
                total_chunks: 1,
                avg_chunk_size: 10.0,
                memory_usage_bytes: 64,
                memory_usage_mb: 64.0 / (1024.0 * 1024.0),
            },
            rag: None,
        },
        query_results: Vec::new(),
        metadata: EvaluationMetadata {
            collection_name: collection_name(&strategy),
            vector_dimension: 16,
            documents_indexed: 1,
            documents_skipped: 0,
            queries_evaluated: 1,
            queries_failed: 0,
            started_at: chrono::Utc::now(),
            total_time_secs: 0.1,
            warnings: Vec::new(),
        },
        config: strategy,
    }
}
