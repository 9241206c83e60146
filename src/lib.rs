//! RAG Strategy Bench - measure and compare retrieval strategies.
//!
//! A strategy pairs a chunker with an embedder. Each strategy indexes a
//! labeled dataset into a vector collection of its own, runs every query
//! against it, and is scored with standard ranking metrics (NDCG, MRR,
//! precision, recall, hit rate, MAP) plus efficiency figures. An optional LLM
//! judge adds faithfulness and relevance scores.
//!
//! # Quick Start
//!
//! ```no_run
//! use rag_strategy_bench::{
//!     Comparator, StandardFactory,
//!     config::Config,
//!     dataset::create_sample_dataset,
//!     persistence::load_strategies,
//! };
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     config.validate()?;
//!
//!     let dataset = Arc::new(create_sample_dataset());
//!     let strategies = load_strategies(Path::new("demos/strategies.yaml"))?;
//!
//!     let factory = Arc::new(StandardFactory::new(config.embedding.clone()));
//!     let comparator = Comparator::new(factory).with_options(config.comparison_options());
//!
//!     let result = comparator.compare(&strategies, dataset, true, 4).await?;
//!     result.print_summary();
//!     println!("winner: {}", result.winner);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **dataset** / **persistence**: labeled documents and queries, JSON and YAML files
//! - **strategy**: chunker and embedder configurations and their portable descriptors
//! - **chunking**, **embedding**, **store**, **judge**: the collaborators a run uses
//! - **evaluator**: one strategy end to end, with cleanup on every exit path
//! - **comparator**: many strategies, sequential or isolated parallel workers
//! - **report**: CSV, JSON and Markdown output

pub mod cancel;
pub mod chunking;
pub mod comparator;
pub mod config;
pub mod dataset;
pub mod embedding;
pub mod error;
pub mod evaluator;
pub mod factory;
pub mod judge;
pub mod metrics;
pub mod persistence;
pub mod report;
pub mod store;
pub mod strategy;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types
pub use cancel::CancellationToken;
pub use comparator::{ComparisonOptions, ComparisonResult, Comparator};
pub use config::Config;
pub use dataset::{EvaluationDataset, EvaluationDocument, EvaluationQuery};
pub use error::{BenchError, Result, StrategyFailure};
pub use evaluator::{EvaluationConfig, EvaluationResult, Evaluator};
pub use factory::{CollaboratorFactory, StandardFactory};
pub use persistence::{load_dataset, load_strategies, save_dataset};
pub use strategy::{ChunkerConfig, EmbedderConfig, StrategyConfig};
