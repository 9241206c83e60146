//! Multi-strategy comparison with failure isolation.
//!
//! Sequential runs stop at the first failing strategy. Parallel runs hand
//! each worker an encoded strategy descriptor and the shared dataset, bound
//! concurrency with a semaphore, and turn every worker error, timeout or
//! panic into a [`StrategyFailure`] so one bad strategy cannot take the
//! others down.

use crate::cancel::CancellationToken;
use crate::dataset::EvaluationDataset;
use crate::error::{BenchError, Result, StrategyFailure};
use crate::evaluator::{EvaluationConfig, EvaluationResult, Evaluator};
use crate::factory::CollaboratorFactory;
use crate::strategy::{StrategyConfig, StrategyDescriptor};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Per-strategy time limit unless configured otherwise.
pub const DEFAULT_WORKER_TIMEOUT: Duration = Duration::from_secs(600);

/// Settings shared by every evaluation in a comparison.
#[derive(Debug, Clone)]
pub struct ComparisonOptions {
    pub evaluation: EvaluationConfig,
    /// Soft per-strategy limit; cleanup still runs after it fires. `None`
    /// lets a stuck strategy run forever.
    pub worker_timeout: Option<Duration>,
    /// Extra time after `worker_timeout` before a worker is abandoned.
    pub cleanup_grace: Duration,
}

impl Default for ComparisonOptions {
    fn default() -> Self {
        Self {
            evaluation: EvaluationConfig::default(),
            worker_timeout: Some(DEFAULT_WORKER_TIMEOUT),
            cleanup_grace: Duration::from_secs(10),
        }
    }
}

/// What a parallel worker hands back to the coordinator.
#[derive(Debug)]
pub enum WorkerOutcome {
    Success(Box<EvaluationResult>),
    Failure(StrategyFailure),
}

/// One row of the comparison table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub strategy: String,
    pub ndcg_at_k: f64,
    pub mrr: f64,
    pub precision_at_k: f64,
    pub recall_at_k: f64,
    pub hit_rate: f64,
    pub map: f64,
    pub num_queries: usize,
    pub indexing_time_secs: f64,
    pub query_latency_ms: f64,
    pub total_chunks: usize,
    pub avg_chunk_size: f64,
    pub memory_usage_mb: f64,
}

impl ComparisonRow {
    pub(crate) fn from_result(result: &EvaluationResult) -> Self {
        let r = &result.metrics.retrieval;
        let e = &result.metrics.efficiency;
        Self {
            strategy: result.strategy_name.clone(),
            ndcg_at_k: r.ndcg_at_k,
            mrr: r.mrr,
            precision_at_k: r.precision_at_k,
            recall_at_k: r.recall_at_k,
            hit_rate: r.hit_rate,
            map: r.map,
            num_queries: r.num_queries,
            indexing_time_secs: e.indexing_time_secs,
            query_latency_ms: e.query_latency_ms,
            total_chunks: e.total_chunks,
            avg_chunk_size: e.avg_chunk_size,
            memory_usage_mb: e.memory_usage_mb,
        }
    }
}

/// Results for every strategy that succeeded, plus the ones that did not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub dataset_name: String,
    /// Successful results in input order.
    pub results: Vec<EvaluationResult>,
    /// Sorted by NDCG@K, best first.
    pub comparison_table: Vec<ComparisonRow>,
    pub winner: String,
    pub failures: Vec<StrategyFailure>,
}

impl ComparisonResult {
    fn build(
        dataset_name: &str,
        results: Vec<EvaluationResult>,
        failures: Vec<StrategyFailure>,
    ) -> Result<Self> {
        let mut best: Option<&EvaluationResult> = None;
        for result in &results {
            match best {
                Some(b) if result.metrics.retrieval.ndcg_at_k <= b.metrics.retrieval.ndcg_at_k => {}
                _ => best = Some(result),
            }
        }
        let winner = best
            .map(|b| b.strategy_name.clone())
            .ok_or_else(|| BenchError::AllStrategiesFailed {
                failures: failures.clone(),
            })?;

        let mut comparison_table: Vec<ComparisonRow> =
            results.iter().map(ComparisonRow::from_result).collect();
        comparison_table.sort_by(|a, b| {
            b.ndcg_at_k
                .partial_cmp(&a.ndcg_at_k)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(Self {
            dataset_name: dataset_name.to_string(),
            results,
            comparison_table,
            winner,
            failures,
        })
    }

    pub fn get(&self, strategy: &str) -> Option<&EvaluationResult> {
        self.results.iter().find(|r| r.strategy_name == strategy)
    }

    /// Print summary to stdout.
    pub fn print_summary(&self) {
        println!("\n========== Strategy Comparison ==========");
        println!("Dataset: {}", self.dataset_name);
        println!("Strategies: {} succeeded, {} failed", self.results.len(), self.failures.len());
        println!("------------------------------------------");
        println!(
            "{:<24} {:>8} {:>8} {:>8} {:>8} {:>10}",
            "Strategy", "NDCG", "MRR", "P@K", "R@K", "Latency"
        );
        for row in &self.comparison_table {
            println!(
                "{:<24} {:>8.4} {:>8.4} {:>8.4} {:>8.4} {:>8.1}ms",
                row.strategy, row.ndcg_at_k, row.mrr, row.precision_at_k, row.recall_at_k, row.query_latency_ms
            );
        }
        println!("------------------------------------------");
        println!("Winner: {}", self.winner);
        for failure in &self.failures {
            println!("Failed: {}", failure);
        }
        println!("==========================================\n");
    }
}

/// Runs several strategies over one dataset.
pub struct Comparator {
    factory: Arc<dyn CollaboratorFactory>,
    options: ComparisonOptions,
    cancel: CancellationToken,
}

impl Comparator {
    pub fn new(factory: Arc<dyn CollaboratorFactory>) -> Self {
        Self {
            factory,
            options: ComparisonOptions::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_options(mut self, options: ComparisonOptions) -> Self {
        self.options = options;
        self
    }

    /// Use `token` to stop every running and queued evaluation.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Evaluate every strategy and rank the successes.
    pub async fn compare(
        &self,
        strategies: &[StrategyConfig],
        dataset: Arc<EvaluationDataset>,
        parallel: bool,
        max_parallel: usize,
    ) -> Result<ComparisonResult> {
        check_strategies(strategies)?;
        let violations = dataset.validate();
        if !violations.is_empty() {
            return Err(BenchError::Validation { violations });
        }

        info!(
            dataset = %dataset.name,
            strategies = strategies.len(),
            parallel,
            "Starting comparison"
        );

        let comparison = if parallel {
            if max_parallel == 0 {
                return Err(BenchError::InvalidConfig(
                    "max_parallel must be at least 1".to_string(),
                ));
            }
            self.compare_parallel(strategies, dataset, max_parallel).await?
        } else {
            self.compare_sequential(strategies, &dataset).await?
        };

        info!(winner = %comparison.winner, "Comparison complete");
        Ok(comparison)
    }

    async fn compare_sequential(
        &self,
        strategies: &[StrategyConfig],
        dataset: &EvaluationDataset,
    ) -> Result<ComparisonResult> {
        let mut results = Vec::with_capacity(strategies.len());
        for strategy in strategies {
            let evaluation = evaluate_strategy(
                self.factory.as_ref(),
                strategy,
                dataset,
                &self.options,
                &self.cancel,
            );
            let result = within_hard_limit(&strategy.name, &self.options, evaluation)
                .await
                .and_then(|outcome| outcome)
                .map_err(|e| BenchError::StrategyEvaluation {
                strategy: strategy.name.clone(),
                source: Box::new(e),
            })?;
            results.push(result);
        }
        ComparisonResult::build(&dataset.name, results, Vec::new())
    }

    async fn compare_parallel(
        &self,
        strategies: &[StrategyConfig],
        dataset: Arc<EvaluationDataset>,
        max_parallel: usize,
    ) -> Result<ComparisonResult> {
        let semaphore = Arc::new(Semaphore::new(max_parallel));
        let mut workers = JoinSet::new();

        for (index, strategy) in strategies.iter().enumerate() {
            let descriptor = strategy.to_descriptor().encode()?;
            let name = strategy.name.clone();
            let semaphore = Arc::clone(&semaphore);
            let factory = Arc::clone(&self.factory);
            let dataset = Arc::clone(&dataset);
            let options = self.options.clone();
            let cancel = self.cancel.clone();

            workers.spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };
                let outcome = match permit {
                    Some(_permit) => {
                        run_worker(&name, descriptor, factory, dataset, options, cancel).await
                    }
                    None => WorkerOutcome::Failure(StrategyFailure {
                        strategy_name: name,
                        error_kind: "cancelled".to_string(),
                        error_message: "cancelled before a worker slot was free".to_string(),
                    }),
                };
                (index, outcome)
            });
        }

        let mut slots: Vec<Option<WorkerOutcome>> = strategies.iter().map(|_| None).collect();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(e) => error!(error = %e, "Worker task ended abnormally"),
            }
        }

        let mut results = Vec::new();
        let mut failures = Vec::new();
        for (strategy, slot) in strategies.iter().zip(slots) {
            match slot {
                Some(WorkerOutcome::Success(result)) => results.push(*result),
                Some(WorkerOutcome::Failure(failure)) => failures.push(failure),
                None => failures.push(StrategyFailure {
                    strategy_name: strategy.name.clone(),
                    error_kind: "panic".to_string(),
                    error_message: "worker task ended without reporting".to_string(),
                }),
            }
        }

        if results.is_empty() {
            return Err(BenchError::AllStrategiesFailed { failures });
        }
        if !failures.is_empty() {
            let failed: Vec<String> = failures
                .iter()
                .map(|f| format!("{} ({})", f.strategy_name, f.error_kind))
                .collect();
            warn!(
                failed = %failed.join(", "),
                succeeded = results.len(),
                "Some strategies failed; comparing the rest"
            );
        }

        ComparisonResult::build(&dataset.name, results, failures)
    }
}

fn check_strategies(strategies: &[StrategyConfig]) -> Result<()> {
    if strategies.is_empty() {
        return Err(BenchError::InvalidConfig("no strategies to compare".to_string()));
    }
    let mut seen = HashSet::new();
    for strategy in strategies {
        if !seen.insert(strategy.name.as_str()) {
            return Err(BenchError::InvalidConfig(format!(
                "duplicate strategy name '{}'",
                strategy.name
            )));
        }
    }
    Ok(())
}

/// Build collaborators for `strategy` and run one evaluation.
///
/// Cancellation is honoured while collaborators are being built as well as
/// during the evaluation itself.
async fn evaluate_strategy(
    factory: &dyn CollaboratorFactory,
    strategy: &StrategyConfig,
    dataset: &EvaluationDataset,
    options: &ComparisonOptions,
    cancel: &CancellationToken,
) -> Result<EvaluationResult> {
    let build = async {
        let chunker = factory.chunker(&strategy.chunker).await?;
        let embedder = factory.embedder(&strategy.embedder).await?;
        let store = factory.vector_store().await?;
        let judge = if options.evaluation.use_rag_metrics {
            factory.judge().await?
        } else {
            None
        };
        Ok::<_, BenchError>((chunker, embedder, store, judge))
    };

    let (chunker, embedder, store, judge) = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(BenchError::Cancelled(strategy.name.clone())),
        built = build => built?,
    };

    let mut evaluator = Evaluator::new(
        strategy.clone(),
        chunker,
        embedder,
        store,
        options.evaluation.clone(),
    );
    if let Some(judge) = judge {
        evaluator = evaluator.with_judge(judge);
    }

    evaluator
        .evaluate_until(dataset, cancel, options.worker_timeout)
        .await
}

/// Bound `work` by `worker_timeout + cleanup_grace` when a timeout is set.
/// This catches collaborators that hang before the evaluator's own deadline
/// starts, or that hang during cleanup.
async fn within_hard_limit<F>(name: &str, options: &ComparisonOptions, work: F) -> Result<F::Output>
where
    F: std::future::Future,
{
    match options.worker_timeout {
        Some(limit) => {
            let hard_limit = limit + options.cleanup_grace;
            tokio::time::timeout(hard_limit, work)
                .await
                .map_err(|_| BenchError::Timeout {
                    strategy: name.to_string(),
                    after: hard_limit,
                })
        }
        None => Ok(work.await),
    }
}

async fn run_worker(
    name: &str,
    descriptor: Vec<u8>,
    factory: Arc<dyn CollaboratorFactory>,
    dataset: Arc<EvaluationDataset>,
    options: ComparisonOptions,
    cancel: CancellationToken,
) -> WorkerOutcome {
    let work = async {
        let strategy = StrategyConfig::from_descriptor(&StrategyDescriptor::decode(&descriptor)?)?;
        evaluate_strategy(factory.as_ref(), &strategy, &dataset, &options, &cancel).await
    };
    let guarded = AssertUnwindSafe(work).catch_unwind();

    let outcome = match within_hard_limit(name, &options, guarded).await {
        Ok(caught) => caught,
        Err(timeout) => Ok(Err(timeout)),
    };

    match outcome {
        Ok(Ok(result)) => WorkerOutcome::Success(Box::new(result)),
        Ok(Err(e)) => WorkerOutcome::Failure(StrategyFailure {
            strategy_name: name.to_string(),
            error_kind: e.kind().to_string(),
            error_message: e.to_string(),
        }),
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!(strategy = name, panic = %message, "Strategy worker panicked");
            WorkerOutcome::Failure(StrategyFailure {
                strategy_name: name.to_string(),
                error_kind: "panic".to_string(),
                error_message: message,
            })
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::create_sample_dataset;
    use crate::evaluator::collection_name;
    use crate::strategy::ChunkerConfig;
    use crate::test_utils::{Fault, TestFactory, hashing_strategy, sample_result};

    fn strategies() -> Vec<StrategyConfig> {
        vec![
            hashing_strategy("small", 64),
            hashing_strategy("broken", 32),
            hashing_strategy("large", 256),
        ]
    }

    #[tokio::test]
    async fn test_parallel_isolates_failing_strategy() {
        let factory = Arc::new(TestFactory::new().with_fault(32, Fault::FailContaining(String::new())));
        let comparator = Comparator::new(factory.clone());

        let result = comparator
            .compare(&strategies(), Arc::new(create_sample_dataset()), true, 2)
            .await
            .unwrap();

        assert_eq!(result.results.len(), 2);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].strategy_name, "broken");
        assert_eq!(result.failures[0].error_kind, "no_usable_data");
        assert!(["small", "large"].contains(&result.winner.as_str()));
        assert_eq!(result.results[0].strategy_name, "small");
        assert_eq!(result.results[1].strategy_name, "large");

        // Every collection, including the failed one, was deleted.
        assert_eq!(factory.store.live_collections().await, 0);
        let deleted = factory.store.deleted();
        assert!(deleted.contains(&collection_name(&hashing_strategy("broken", 32))));
    }

    #[tokio::test]
    async fn test_parallel_all_failed_names_every_strategy() {
        let factory = Arc::new(
            TestFactory::new()
                .with_fault(64, Fault::FailContaining(String::new()))
                .with_fault(32, Fault::WrongDimension),
        );
        let strategies = vec![hashing_strategy("a", 64), hashing_strategy("b", 32)];

        let err = Comparator::new(factory)
            .compare(&strategies, Arc::new(create_sample_dataset()), true, 4)
            .await
            .unwrap_err();

        match &err {
            BenchError::AllStrategiesFailed { failures } => {
                let names: Vec<&str> = failures.iter().map(|f| f.strategy_name.as_str()).collect();
                assert_eq!(names, vec!["a", "b"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        let message = err.to_string();
        assert!(message.contains("a [") && message.contains("b ["));
    }

    #[tokio::test]
    async fn test_parallel_panic_becomes_failure() {
        let factory = Arc::new(TestFactory::new().with_fault(32, Fault::PanicContaining("Rust".to_string())));

        let result = Comparator::new(factory.clone())
            .compare(&strategies(), Arc::new(create_sample_dataset()), true, 3)
            .await
            .unwrap();

        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].error_kind, "panic");
        assert!(result.failures[0].error_message.contains("injected panic"));
        assert_eq!(factory.store.live_collections().await, 0);
    }

    #[tokio::test]
    async fn test_parallel_timeout_still_cleans_up() {
        let factory = Arc::new(TestFactory::new().with_fault(32, Fault::Delay(Duration::from_secs(10))));
        let options = ComparisonOptions {
            worker_timeout: Some(Duration::from_millis(200)),
            cleanup_grace: Duration::from_secs(5),
            ..Default::default()
        };

        let result = Comparator::new(factory.clone())
            .with_options(options)
            .compare(&strategies(), Arc::new(create_sample_dataset()), true, 3)
            .await
            .unwrap();

        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].strategy_name, "broken");
        assert_eq!(result.failures[0].error_kind, "timeout");
        assert!(
            factory
                .store
                .deleted()
                .contains(&collection_name(&hashing_strategy("broken", 32)))
        );
    }

    #[tokio::test]
    async fn test_sequential_fails_fast() {
        let factory = Arc::new(TestFactory::new().with_fault(32, Fault::FailContaining(String::new())));

        let err = Comparator::new(factory.clone())
            .compare(&strategies(), Arc::new(create_sample_dataset()), false, 1)
            .await
            .unwrap_err();

        match err {
            BenchError::StrategyEvaluation { strategy, source } => {
                assert_eq!(strategy, "broken");
                assert_eq!(source.kind(), "no_usable_data");
            }
            other => panic!("unexpected error: {other}"),
        }
        // "large" never ran.
        assert!(
            !factory
                .store
                .deleted()
                .contains(&collection_name(&hashing_strategy("large", 256)))
        );
    }

    #[tokio::test]
    async fn test_sequential_success_and_ranking() {
        let factory = Arc::new(TestFactory::new());
        let strategies = vec![hashing_strategy("first", 64), hashing_strategy("second", 64)];

        let result = Comparator::new(factory)
            .compare(&strategies, Arc::new(create_sample_dataset()), false, 1)
            .await
            .unwrap();

        // Identical embedders give identical scores: the tie goes to input order.
        assert_eq!(result.winner, "first");
        let table: Vec<&str> = result.comparison_table.iter().map(|r| r.strategy.as_str()).collect();
        assert_eq!(table, vec!["first", "second"]);
        assert!(result.failures.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_bad_strategy_lists() {
        let factory = Arc::new(TestFactory::new());
        let comparator = Comparator::new(factory);
        let dataset = Arc::new(create_sample_dataset());

        let err = comparator.compare(&[], Arc::clone(&dataset), false, 1).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_config");

        let dupes = vec![hashing_strategy("same", 16), hashing_strategy("same", 32)];
        let err = comparator.compare(&dupes, Arc::clone(&dataset), true, 2).await.unwrap_err();
        assert!(err.to_string().contains("duplicate strategy name 'same'"));

        let err = comparator
            .compare(&[hashing_strategy("x", 16)], dataset, true, 0)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_config");
    }

    #[tokio::test]
    async fn test_unsupported_chunker_is_isolated() {
        let factory = Arc::new(TestFactory::new());
        let mut semantic = hashing_strategy("semantic", 16);
        semantic.chunker = ChunkerConfig::Semantic {
            similarity_threshold: 0.8,
            max_chunk_size: 512,
        };
        let strategies = vec![hashing_strategy("plain", 16), semantic];

        let result = Comparator::new(factory)
            .compare(&strategies, Arc::new(create_sample_dataset()), true, 2)
            .await
            .unwrap();
        assert_eq!(result.winner, "plain");
        assert_eq!(result.failures[0].error_kind, "unsupported");
    }

    #[tokio::test]
    async fn test_cancellation_fails_everything() {
        let factory = Arc::new(TestFactory::new());
        let token = CancellationToken::new();
        token.cancel();

        let err = Comparator::new(factory)
            .with_cancellation(token)
            .compare(&strategies(), Arc::new(create_sample_dataset()), true, 2)
            .await
            .unwrap_err();
        match err {
            BenchError::AllStrategiesFailed { failures } => {
                assert!(failures.iter().all(|f| f.error_kind == "cancelled"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_options_time_out_stuck_worker() {
        let factory = Arc::new(TestFactory::new().with_fault(32, Fault::Delay(Duration::from_secs(3600))));
        let strategies = vec![hashing_strategy("ok", 64), hashing_strategy("stuck", 32)];

        let result = tokio::time::timeout(
            Duration::from_secs(3000),
            Comparator::new(factory.clone()).compare(
                &strategies,
                Arc::new(create_sample_dataset()),
                true,
                2,
            ),
        )
        .await
        .expect("comparison stalled")
        .unwrap();

        assert_eq!(result.winner, "ok");
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].strategy_name, "stuck");
        assert_eq!(result.failures[0].error_kind, "timeout");
        assert_eq!(factory.store.live_collections().await, 0);
    }

    fn cancel_after(token: &CancellationToken, delay: Duration) {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            token.cancel();
        });
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_reaches_workers_building_or_queued() {
        let factory = Arc::new(TestFactory::new().with_build_delay(32, Duration::from_secs(3600)));
        let strategies = vec![hashing_strategy("building", 32), hashing_strategy("queued", 32)];
        let token = CancellationToken::new();
        cancel_after(&token, Duration::from_millis(100));

        let err = tokio::time::timeout(
            Duration::from_secs(60),
            Comparator::new(factory)
                .with_cancellation(token)
                .compare(&strategies, Arc::new(create_sample_dataset()), true, 1),
        )
        .await
        .expect("cancellation did not stop the comparison")
        .unwrap_err();

        match err {
            BenchError::AllStrategiesFailed { failures } => {
                assert_eq!(failures.len(), 2);
                assert!(failures.iter().all(|f| f.error_kind == "cancelled"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_cancel_during_build() {
        let factory = Arc::new(TestFactory::new().with_build_delay(32, Duration::from_secs(3600)));
        let token = CancellationToken::new();
        cancel_after(&token, Duration::from_millis(100));

        let err = tokio::time::timeout(
            Duration::from_secs(60),
            Comparator::new(factory).with_cancellation(token).compare(
                &[hashing_strategy("building", 32)],
                Arc::new(create_sample_dataset()),
                false,
                1,
            ),
        )
        .await
        .expect("cancellation did not stop the comparison")
        .unwrap_err();

        match err {
            BenchError::StrategyEvaluation { source, .. } => assert_eq!(source.kind(), "cancelled"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_hard_limit_covers_build() {
        let factory = Arc::new(TestFactory::new().with_build_delay(32, Duration::from_secs(3600)));
        let options = ComparisonOptions {
            worker_timeout: Some(Duration::from_secs(5)),
            cleanup_grace: Duration::from_secs(1),
            ..Default::default()
        };

        let err = tokio::time::timeout(
            Duration::from_secs(60),
            Comparator::new(factory).with_options(options).compare(
                &[hashing_strategy("building", 32)],
                Arc::new(create_sample_dataset()),
                false,
                1,
            ),
        )
        .await
        .expect("hard limit did not fire")
        .unwrap_err();

        match err {
            BenchError::StrategyEvaluation { source, .. } => assert_eq!(source.kind(), "timeout"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_table_sorted_with_stable_ties() {
        let results = vec![
            sample_result("a", 0.5),
            sample_result("b", 0.9),
            sample_result("c", 0.5),
            sample_result("d", 0.9),
        ];
        let comparison = ComparisonResult::build("ds", results, Vec::new()).unwrap();

        let order: Vec<&str> = comparison.comparison_table.iter().map(|r| r.strategy.as_str()).collect();
        assert_eq!(order, vec!["b", "d", "a", "c"]);
        assert_eq!(comparison.winner, "b");
    }
}
