//! RAG Strategy Bench CLI
//!
//! Benchmarks chunking and embedding strategies against a labeled dataset.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rag_strategy_bench::{
    cancel::CancellationToken,
    comparator::Comparator,
    config::Config,
    dataset::{EvaluationDataset, create_sample_dataset},
    evaluator::Evaluator,
    factory::{CollaboratorFactory, StandardFactory},
    persistence::{load_dataset, load_strategies, save_dataset},
    report::{print_evaluation, save_reports},
    strategy::StrategyConfig,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// RAG Strategy Bench - compare retrieval strategies on a labeled dataset
#[derive(Parser)]
#[command(name = "rag-bench")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the built-in sample dataset to a file
    Sample {
        #[arg(short, long, default_value = "data/sample_dataset.json")]
        output: PathBuf,
    },

    /// Check a dataset for structural problems and print statistics
    Validate {
        /// Path to the dataset JSON file
        dataset: PathBuf,
    },

    /// Evaluate one strategy
    Evaluate {
        /// Dataset JSON file (defaults to the built-in sample)
        #[arg(short, long)]
        dataset: Option<PathBuf>,

        /// Strategies file (YAML or JSON)
        #[arg(short, long)]
        strategies: PathBuf,

        /// Strategy to run (defaults to the first in the file)
        #[arg(short, long)]
        name: Option<String>,

        /// Number of results retrieved per query
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Compute RAG metrics with the configured LLM judge
        #[arg(long)]
        rag: bool,

        /// Keep the vector collection after the run
        #[arg(long)]
        keep_collection: bool,

        /// Write the full result as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compare every strategy in a strategies file
    Compare {
        /// Dataset JSON file (defaults to the built-in sample)
        #[arg(short, long)]
        dataset: Option<PathBuf>,

        /// Strategies file (YAML or JSON)
        #[arg(short, long)]
        strategies: PathBuf,

        /// Run strategies concurrently
        #[arg(long)]
        parallel: bool,

        /// Maximum concurrent strategies in parallel mode
        #[arg(long)]
        max_parallel: Option<usize>,

        /// Per-strategy timeout in seconds (0 disables it)
        #[arg(long)]
        timeout: Option<u64>,

        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        #[arg(long)]
        rag: bool,

        /// Directory for comparison.csv, detailed_results.json and report.md
        #[arg(short, long, default_value = "reports")]
        output_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rag_strategy_bench=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sample { output } => cmd_sample(output),
        Commands::Validate { dataset } => cmd_validate(dataset),
        Commands::Evaluate {
            dataset,
            strategies,
            name,
            top_k,
            rag,
            keep_collection,
            output,
        } => {
            let mut config = load_config(top_k, rag)?;
            if keep_collection {
                config.evaluation.cleanup_after = false;
            }
            cmd_evaluate(config, dataset, strategies, name, output).await
        }
        Commands::Compare {
            dataset,
            strategies,
            parallel,
            max_parallel,
            timeout,
            top_k,
            rag,
            output_dir,
        } => {
            let mut config = load_config(top_k, rag)?;
            config.comparison.parallel |= parallel;
            if let Some(n) = max_parallel {
                config.comparison.max_parallel = n;
            }
            if let Some(secs) = timeout {
                config.comparison.worker_timeout_secs = Some(secs);
            }
            config.validate().context("Invalid configuration")?;
            cmd_compare(config, dataset, strategies, output_dir).await
        }
    }
}

fn load_config(top_k: Option<usize>, rag: bool) -> Result<Config> {
    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(k) = top_k {
        config.evaluation.top_k = k;
    }
    config.evaluation.use_rag_metrics |= rag;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn load_dataset_or_sample(path: Option<&Path>) -> Result<EvaluationDataset> {
    match path {
        Some(path) => {
            load_dataset(path).with_context(|| format!("Failed to load dataset {}", path.display()))
        }
        None => {
            println!("No dataset given, using the built-in sample dataset");
            Ok(create_sample_dataset())
        }
    }
}

fn build_factory(config: &Config) -> StandardFactory {
    let factory = StandardFactory::new(config.embedding.clone());
    if config.evaluation.use_rag_metrics {
        factory.with_llm(config.llm.clone())
    } else {
        factory
    }
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted, cancelling running evaluations...");
            token.cancel();
        }
    });
}

fn cmd_sample(output: PathBuf) -> Result<()> {
    let dataset = create_sample_dataset();
    save_dataset(&dataset, &output).context("Failed to save sample dataset")?;
    println!(
        "Sample dataset ({} documents, {} queries) written to {}",
        dataset.documents.len(),
        dataset.queries.len(),
        output.display()
    );
    Ok(())
}

fn cmd_validate(path: PathBuf) -> Result<()> {
    let dataset = load_dataset(&path).context("Failed to load dataset")?;
    let stats = dataset.stats();

    println!("Dataset: {}", dataset.name);
    if !dataset.description.is_empty() {
        println!("  {}", dataset.description);
    }
    println!("  Documents:           {}", stats.document_count);
    println!("  Queries:             {}", stats.query_count);
    println!("  Relevant per query:  {:.2}", stats.avg_relevant_per_query);
    println!("  Tokens per document: {:.1}", stats.avg_document_tokens);
    for (difficulty, count) in &stats.queries_by_difficulty {
        println!("  {:<10} {}", difficulty.as_str(), count);
    }
    for (query_type, count) in &stats.queries_by_type {
        println!("  {:<10} {}", query_type, count);
    }

    let violations = dataset.validate();
    if violations.is_empty() {
        println!("\nDataset is valid.");
        Ok(())
    } else {
        println!("\n{} problem(s):", violations.len());
        for violation in &violations {
            println!("  - {}", violation);
        }
        bail!("dataset {} is invalid", path.display())
    }
}

async fn cmd_evaluate(
    config: Config,
    dataset: Option<PathBuf>,
    strategies: PathBuf,
    name: Option<String>,
    output: Option<PathBuf>,
) -> Result<()> {
    let dataset = load_dataset_or_sample(dataset.as_deref())?;
    let strategies = load_strategies(&strategies).context("Failed to load strategies")?;
    let strategy: StrategyConfig = match &name {
        Some(name) => strategies
            .into_iter()
            .find(|s| &s.name == name)
            .with_context(|| format!("No strategy named '{}'", name))?,
        None => strategies
            .into_iter()
            .next()
            .context("Strategies file is empty")?,
    };

    println!("Evaluating '{}' on '{}'", strategy.name, dataset.name);

    let factory = build_factory(&config);
    let mut evaluator = Evaluator::new(
        strategy.clone(),
        factory.chunker(&strategy.chunker).await?,
        factory.embedder(&strategy.embedder).await?,
        factory.vector_store().await?,
        config.evaluation.clone(),
    );
    if let Some(judge) = factory.judge().await? {
        evaluator = evaluator.with_judge(judge);
    }

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());
    let deadline = config.comparison_options().worker_timeout;

    let result = evaluator
        .evaluate_until(&dataset, &cancel, deadline)
        .await
        .with_context(|| format!("Evaluation of '{}' failed", strategy.name))?;

    print_evaluation(&result);

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&result)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Result written to {}", path.display());
    }
    Ok(())
}

async fn cmd_compare(
    config: Config,
    dataset: Option<PathBuf>,
    strategies: PathBuf,
    output_dir: PathBuf,
) -> Result<()> {
    let dataset = Arc::new(load_dataset_or_sample(dataset.as_deref())?);
    let strategies = load_strategies(&strategies).context("Failed to load strategies")?;

    println!(
        "Comparing {} strategies on '{}' ({})",
        strategies.len(),
        dataset.name,
        if config.comparison.parallel {
            format!("parallel, up to {}", config.comparison.max_parallel)
        } else {
            "sequential".to_string()
        }
    );

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let comparator = Comparator::new(Arc::new(build_factory(&config)))
        .with_options(config.comparison_options())
        .with_cancellation(cancel);

    let result = comparator
        .compare(
            &strategies,
            dataset,
            config.comparison.parallel,
            config.comparison.max_parallel,
        )
        .await
        .context("Comparison failed")?;

    result.print_summary();

    let written = save_reports(&result, &output_dir).context("Failed to write reports")?;
    for path in written {
        println!("Wrote {}", path.display());
    }
    Ok(())
}
