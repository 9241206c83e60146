//! Single-strategy evaluation: index, query, score, aggregate, clean up.

use crate::cancel::CancellationToken;
use crate::chunking::Chunker;
use crate::dataset::{EvaluationDataset, EvaluationDocument, EvaluationQuery, dedup_ordered, estimate_tokens};
use crate::embedding::Embedder;
use crate::error::{BenchError, Result};
use crate::judge::{RagJudge, RagSample};
use crate::metrics;
use crate::store::{ChunkPayload, VectorStore};
use crate::strategy::StrategyConfig;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Evaluation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Number of hits retrieved per query, and the K in every @K metric.
    pub top_k: usize,
    /// Relevance at or above this counts as a hit.
    pub relevance_threshold: f64,
    pub use_rag_metrics: bool,
    /// Delete the collection when the evaluation ends, whatever the outcome.
    pub cleanup_after: bool,
    /// Fewer successful judge samples than this yields no RAG metrics.
    pub rag_min_samples: usize,
    pub rag_max_samples: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            relevance_threshold: 0.5,
            use_rag_metrics: false,
            cleanup_after: true,
            rag_min_samples: 3,
            rag_max_samples: 20,
        }
    }
}

/// Outcome of one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub query_text: String,
    pub retrieved_chunk_ids: Vec<String>,
    /// Documents in rank order, each listed once.
    pub retrieved_doc_ids: Vec<String>,
    /// Binary relevance, parallel to `retrieved_doc_ids`.
    pub relevance_scores: Vec<f64>,
    pub retrieval_time_ms: f64,
    pub ground_truth_doc_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalMetrics {
    pub k: usize,
    pub ndcg_at_k: f64,
    pub mrr: f64,
    pub precision_at_k: f64,
    pub recall_at_k: f64,
    pub hit_rate: f64,
    pub map: f64,
    pub num_queries: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyMetrics {
    pub indexing_time_secs: f64,
    /// Mean per-query retrieval latency.
    pub query_latency_ms: f64,
    pub total_chunks: usize,
    /// Mean chunk size as a token estimate.
    pub avg_chunk_size: f64,
    /// Approximate vector storage: chunks × dimension × 4 bytes.
    pub memory_usage_bytes: u64,
    pub memory_usage_mb: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagMetrics {
    pub faithfulness: f64,
    pub answer_relevance: f64,
    pub context_relevance: f64,
    pub samples_evaluated: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyMetrics {
    pub retrieval: RetrievalMetrics,
    pub efficiency: EfficiencyMetrics,
    pub rag: Option<RagMetrics>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    DocumentSkipped,
    QueryFailed,
    RagSkipped,
    RagSampleFailed,
    CleanupFailed,
}

/// A recoverable problem recorded on the result instead of failing the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationWarning {
    pub kind: WarningKind,
    /// Document id, query text or collection name the warning is about.
    pub subject: String,
    pub message: String,
}

impl EvaluationWarning {
    fn new(kind: WarningKind, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetadata {
    pub collection_name: String,
    pub vector_dimension: usize,
    pub documents_indexed: usize,
    pub documents_skipped: usize,
    pub queries_evaluated: usize,
    pub queries_failed: usize,
    pub started_at: DateTime<Utc>,
    pub total_time_secs: f64,
    pub warnings: Vec<EvaluationWarning>,
}

/// Everything measured for one strategy on one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub strategy_name: String,
    pub dataset_name: String,
    pub metrics: StrategyMetrics,
    pub query_results: Vec<QueryResult>,
    pub config: StrategyConfig,
    pub metadata: EvaluationMetadata,
}

/// Deterministic collection name for a strategy: `eval_` plus the first
/// 8 hex chars of SHA-256 over the name, or over the embedder signature when
/// the name is blank.
pub fn collection_name(strategy: &StrategyConfig) -> String {
    let input = if strategy.name.trim().is_empty() {
        strategy.embedder.to_descriptor().signature()
    } else {
        strategy.name.clone()
    };
    let digest = Sha256::digest(input.as_bytes());
    let hex: String = digest.iter().take(4).map(|b| format!("{:02x}", b)).collect();
    format!("eval_{}", hex)
}

#[derive(Debug, Default)]
struct IndexingStats {
    documents_indexed: usize,
    documents_skipped: usize,
    total_chunks: usize,
    token_sum: usize,
    elapsed: Duration,
}

struct QueryPhase {
    results: Vec<QueryResult>,
    contexts: Vec<Vec<String>>,
    expected_answers: Vec<Option<String>>,
    failed: usize,
}

/// Runs one strategy against a dataset.
pub struct Evaluator {
    strategy: StrategyConfig,
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    judge: Option<Arc<dyn RagJudge>>,
    config: EvaluationConfig,
}

impl Evaluator {
    pub fn new(
        strategy: StrategyConfig,
        chunker: Arc<dyn Chunker>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        config: EvaluationConfig,
    ) -> Self {
        Self {
            strategy,
            chunker,
            embedder,
            store,
            judge: None,
            config,
        }
    }

    /// Attach a judge for RAG metrics. Only used when `use_rag_metrics` is set.
    pub fn with_judge(mut self, judge: Arc<dyn RagJudge>) -> Self {
        self.judge = Some(judge);
        self
    }

    pub fn strategy(&self) -> &StrategyConfig {
        &self.strategy
    }

    /// Evaluate without a deadline or external cancellation.
    pub async fn evaluate(&self, dataset: &EvaluationDataset) -> Result<EvaluationResult> {
        self.evaluate_until(dataset, &CancellationToken::new(), None)
            .await
    }

    /// Evaluate until done, cancelled, or `deadline` elapses.
    ///
    /// When `cleanup_after` is set the collection is deleted on every exit
    /// path, including a panic in a collaborator, which is re-raised after
    /// cleanup. Cleanup failures are recorded as warnings and never replace
    /// the outcome.
    pub async fn evaluate_until(
        &self,
        dataset: &EvaluationDataset,
        cancel: &CancellationToken,
        deadline: Option<Duration>,
    ) -> Result<EvaluationResult> {
        let violations = dataset.validate();
        if !violations.is_empty() {
            return Err(BenchError::Validation { violations });
        }

        let started = Instant::now();
        let started_at = Utc::now();
        let collection = collection_name(&self.strategy);
        let name = self.strategy.name.clone();

        info!(
            strategy = %name,
            dataset = %dataset.name,
            collection = %collection,
            "Starting evaluation"
        );

        let work = AssertUnwindSafe(self.run(dataset, &collection, started_at)).catch_unwind();
        let expired = async {
            match deadline {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(Err(BenchError::Cancelled(name.clone()))),
            _ = expired => Ok(Err(BenchError::Timeout {
                strategy: name.clone(),
                after: deadline.unwrap_or_default(),
            })),
            outcome = work => outcome,
        };

        let cleanup_warning = if self.config.cleanup_after {
            self.cleanup(&collection).await
        } else {
            None
        };

        match outcome {
            Err(panic) => std::panic::resume_unwind(panic),
            Ok(Ok(mut result)) => {
                result.metadata.warnings.extend(cleanup_warning);
                result.metadata.total_time_secs = started.elapsed().as_secs_f64();
                info!(
                    strategy = %name,
                    ndcg = result.metrics.retrieval.ndcg_at_k,
                    mrr = result.metrics.retrieval.mrr,
                    warnings = result.metadata.warnings.len(),
                    "Evaluation finished"
                );
                Ok(result)
            }
            Ok(Err(e)) => {
                warn!(strategy = %name, kind = e.kind(), error = %e, "Evaluation failed");
                Err(e)
            }
        }
    }

    async fn cleanup(&self, collection: &str) -> Option<EvaluationWarning> {
        match self.store.delete_collection(collection).await {
            Ok(()) => {
                debug!(collection, "Deleted collection");
                None
            }
            Err(e) => {
                warn!(collection, error = %e, "Failed to delete collection");
                Some(EvaluationWarning::new(
                    WarningKind::CleanupFailed,
                    collection,
                    e.to_string(),
                ))
            }
        }
    }

    async fn run(
        &self,
        dataset: &EvaluationDataset,
        collection: &str,
        started_at: DateTime<Utc>,
    ) -> Result<EvaluationResult> {
        let mut warnings = Vec::new();
        let dimension = self.embedder.dimension();

        if self.store.collection_exists(collection).await? {
            self.store.delete_collection(collection).await?;
        }
        self.store.create_collection(collection, dimension).await?;

        let indexing = self
            .index_documents(dataset, collection, dimension, &mut warnings)
            .await?;
        let queries = self.run_queries(dataset, collection, &mut warnings).await?;

        let retrieval = self.retrieval_metrics(&queries.results);
        let efficiency = Self::efficiency_metrics(&indexing, &queries.results, dimension);
        let rag = if self.config.use_rag_metrics {
            self.rag_metrics(&queries, &mut warnings).await
        } else {
            None
        };

        Ok(EvaluationResult {
            strategy_name: self.strategy.name.clone(),
            dataset_name: dataset.name.clone(),
            metrics: StrategyMetrics {
                retrieval,
                efficiency,
                rag,
            },
            metadata: EvaluationMetadata {
                collection_name: collection.to_string(),
                vector_dimension: dimension,
                documents_indexed: indexing.documents_indexed,
                documents_skipped: indexing.documents_skipped,
                queries_evaluated: queries.results.len(),
                queries_failed: queries.failed,
                started_at,
                total_time_secs: 0.0,
                warnings,
            },
            query_results: queries.results,
            config: self.strategy.clone(),
        })
    }

    fn no_usable_data(&self, phase: &str) -> BenchError {
        BenchError::NoUsableData {
            strategy: self.strategy.name.clone(),
            phase: phase.to_string(),
        }
    }

    async fn index_documents(
        &self,
        dataset: &EvaluationDataset,
        collection: &str,
        dimension: usize,
        warnings: &mut Vec<EvaluationWarning>,
    ) -> Result<IndexingStats> {
        let start = Instant::now();
        let mut stats = IndexingStats::default();

        for document in &dataset.documents {
            match self.index_document(document, collection, dimension).await {
                Ok((chunks, tokens)) => {
                    debug!(doc_id = %document.doc_id, chunks, "Indexed document");
                    stats.documents_indexed += 1;
                    stats.total_chunks += chunks;
                    stats.token_sum += tokens;
                }
                Err(e) => {
                    warn!(doc_id = %document.doc_id, error = %e, "Skipping document");
                    stats.documents_skipped += 1;
                    warnings.push(EvaluationWarning::new(
                        WarningKind::DocumentSkipped,
                        &document.doc_id,
                        e.to_string(),
                    ));
                }
            }
        }
        stats.elapsed = start.elapsed();

        if stats.documents_indexed == 0 || stats.total_chunks == 0 {
            return Err(self.no_usable_data("indexing"));
        }

        info!(
            documents = stats.documents_indexed,
            skipped = stats.documents_skipped,
            chunks = stats.total_chunks,
            secs = stats.elapsed.as_secs_f64(),
            "Indexing complete"
        );
        Ok(stats)
    }

    /// Returns (chunk count, token estimate sum).
    async fn index_document(
        &self,
        document: &EvaluationDocument,
        collection: &str,
        dimension: usize,
    ) -> Result<(usize, usize)> {
        let fail = |reason: String| BenchError::DocumentIndexing {
            doc_id: document.doc_id.clone(),
            reason,
        };

        let chunks = self.chunker.chunk(document).map_err(|e| fail(e.to_string()))?;
        if chunks.is_empty() {
            return Ok((0, 0));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| fail(e.to_string()))?;

        if vectors.len() != chunks.len() {
            return Err(fail(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(fail(format!(
                "embedder returned a {}-dimensional vector, expected {}",
                bad.len(),
                dimension
            )));
        }

        let tokens = chunks.iter().map(|c| estimate_tokens(&c.content)).sum();
        let payloads = chunks
            .into_iter()
            .map(|c| ChunkPayload {
                chunk_id: format!("{}#{}", document.doc_id, c.chunk_index),
                document_id: document.doc_id.clone(),
                content: c.content,
            })
            .collect::<Vec<_>>();
        let count = payloads.len();

        self.store
            .upsert(collection, vectors, payloads)
            .await
            .map_err(|e| fail(e.to_string()))?;

        Ok((count, tokens))
    }

    async fn run_queries(
        &self,
        dataset: &EvaluationDataset,
        collection: &str,
        warnings: &mut Vec<EvaluationWarning>,
    ) -> Result<QueryPhase> {
        let mut phase = QueryPhase {
            results: Vec::with_capacity(dataset.queries.len()),
            contexts: Vec::with_capacity(dataset.queries.len()),
            expected_answers: Vec::with_capacity(dataset.queries.len()),
            failed: 0,
        };

        for query in &dataset.queries {
            match self.run_query(query, collection).await {
                Ok((result, contexts)) => {
                    phase.results.push(result);
                    phase.contexts.push(contexts);
                    phase.expected_answers.push(query.expected_answer.clone());
                }
                Err(e) => {
                    warn!(query = %query.text, error = %e, "Query failed");
                    phase.failed += 1;
                    warnings.push(EvaluationWarning::new(
                        WarningKind::QueryFailed,
                        &query.text,
                        e.to_string(),
                    ));
                }
            }
        }

        if phase.results.is_empty() {
            return Err(self.no_usable_data("querying"));
        }
        Ok(phase)
    }

    async fn run_query(
        &self,
        query: &EvaluationQuery,
        collection: &str,
    ) -> Result<(QueryResult, Vec<String>)> {
        let fail = |reason: String| BenchError::QueryEvaluation {
            query: query.text.clone(),
            reason,
        };

        let start = Instant::now();
        let vector = self
            .embedder
            .embed_query(&query.text)
            .await
            .map_err(|e| fail(e.to_string()))?;
        let hits = self
            .store
            .search(collection, &vector, self.config.top_k)
            .await
            .map_err(|e| fail(e.to_string()))?;
        let elapsed = start.elapsed();

        let retrieved_chunk_ids = hits.iter().map(|h| h.chunk_id.clone()).collect();
        let retrieved_doc_ids = dedup_ordered(hits.iter().map(|h| h.document_id.clone()));
        let relevance_scores = metrics::binary_relevance(&retrieved_doc_ids, &query.relevant_doc_ids);
        let contexts = hits.into_iter().map(|h| h.content).collect();

        Ok((
            QueryResult {
                query_text: query.text.clone(),
                retrieved_chunk_ids,
                retrieved_doc_ids,
                relevance_scores,
                retrieval_time_ms: elapsed.as_secs_f64() * 1000.0,
                ground_truth_doc_ids: query.relevant_doc_ids.clone(),
            },
            contexts,
        ))
    }

    fn retrieval_metrics(&self, results: &[QueryResult]) -> RetrievalMetrics {
        let k = self.config.top_k;
        let threshold = self.config.relevance_threshold;
        let all: Vec<Vec<f64>> = results.iter().map(|r| r.relevance_scores.clone()).collect();

        RetrievalMetrics {
            k,
            ndcg_at_k: mean_of(results, |r| metrics::ndcg_at_k(&r.relevance_scores, k)),
            mrr: mean_of(results, |r| metrics::mrr(&r.relevance_scores, threshold)),
            precision_at_k: mean_of(results, |r| {
                metrics::precision_at_k(&r.relevance_scores, k, threshold)
            }),
            recall_at_k: mean_of(results, |r| {
                metrics::recall_at_k(&r.relevance_scores, k, threshold, r.ground_truth_doc_ids.len())
            }),
            hit_rate: mean_of(results, |r| metrics::hit_rate(&r.relevance_scores, threshold)),
            map: metrics::map(&all, threshold),
            num_queries: results.len(),
        }
    }

    fn efficiency_metrics(
        indexing: &IndexingStats,
        results: &[QueryResult],
        dimension: usize,
    ) -> EfficiencyMetrics {
        let latencies: Vec<f64> = results.iter().map(|r| r.retrieval_time_ms).collect();
        let memory_usage_bytes = (indexing.total_chunks * dimension * 4) as u64;
        let avg_chunk_size = if indexing.total_chunks == 0 {
            0.0
        } else {
            indexing.token_sum as f64 / indexing.total_chunks as f64
        };

        EfficiencyMetrics {
            indexing_time_secs: indexing.elapsed.as_secs_f64(),
            query_latency_ms: metrics::mean(&latencies),
            total_chunks: indexing.total_chunks,
            avg_chunk_size,
            memory_usage_bytes,
            memory_usage_mb: memory_usage_bytes as f64 / (1024.0 * 1024.0),
        }
    }

    /// Best effort: judge failures become warnings, and too few successful
    /// samples yields `None`.
    async fn rag_metrics(
        &self,
        queries: &QueryPhase,
        warnings: &mut Vec<EvaluationWarning>,
    ) -> Option<RagMetrics> {
        let Some(judge) = &self.judge else {
            warnings.push(EvaluationWarning::new(
                WarningKind::RagSkipped,
                &self.strategy.name,
                "no judge configured",
            ));
            return None;
        };

        let samples = queries
            .results
            .iter()
            .zip(&queries.contexts)
            .zip(&queries.expected_answers)
            .filter(|((_, contexts), _)| !contexts.is_empty())
            .take(self.config.rag_max_samples)
            .map(|((result, contexts), expected)| RagSample {
                question: result.query_text.clone(),
                contexts: contexts.clone(),
                expected_answer: expected.clone(),
            });

        let mut assessments = Vec::new();
        for sample in samples {
            match judge.assess(&sample).await {
                Ok(assessment) => assessments.push(assessment),
                Err(e) => {
                    warn!(query = %sample.question, error = %e, "RAG judge failed");
                    warnings.push(EvaluationWarning::new(
                        WarningKind::RagSampleFailed,
                        &sample.question,
                        e.to_string(),
                    ));
                }
            }
        }

        if assessments.len() < self.config.rag_min_samples.max(1) {
            warnings.push(EvaluationWarning::new(
                WarningKind::RagSkipped,
                &self.strategy.name,
                format!(
                    "only {} judged samples, need {}",
                    assessments.len(),
                    self.config.rag_min_samples
                ),
            ));
            return None;
        }

        Some(RagMetrics {
            faithfulness: mean_of(&assessments, |a| a.faithfulness).clamp(0.0, 1.0),
            answer_relevance: mean_of(&assessments, |a| a.answer_relevance).clamp(0.0, 1.0),
            context_relevance: mean_of(&assessments, |a| a.context_relevance).clamp(0.0, 1.0),
            samples_evaluated: assessments.len(),
        })
    }
}

fn mean_of<T>(items: &[T], f: impl Fn(&T) -> f64) -> f64 {
    metrics::mean(&items.iter().map(f).collect::<Vec<_>>())
}
