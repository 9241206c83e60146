//! Report rendering for comparison results.
//!
//! All reports are derived from [`ComparisonResult`]; none of them is read
//! back by the engine.

use crate::comparator::{ComparisonResult, ComparisonRow};
use crate::error::{BenchError, Result};
use crate::evaluator::EvaluationResult;
use crate::persistence::ensure_parent;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

pub const CSV_FILE: &str = "comparison.csv";
pub const JSON_FILE: &str = "detailed_results.json";
pub const MARKDOWN_FILE: &str = "report.md";

const CSV_HEADER: [&str; 13] = [
    "strategy",
    "ndcg_at_k",
    "mrr",
    "precision_at_k",
    "recall_at_k",
    "hit_rate",
    "map",
    "num_queries",
    "indexing_time_secs",
    "query_latency_ms",
    "total_chunks",
    "avg_chunk_size",
    "memory_usage_mb",
];

fn csv_record(row: &ComparisonRow) -> Vec<String> {
    vec![
        row.strategy.clone(),
        format!("{:.4}", row.ndcg_at_k),
        format!("{:.4}", row.mrr),
        format!("{:.4}", row.precision_at_k),
        format!("{:.4}", row.recall_at_k),
        format!("{:.4}", row.hit_rate),
        format!("{:.4}", row.map),
        row.num_queries.to_string(),
        format!("{:.4}", row.indexing_time_secs),
        format!("{:.4}", row.query_latency_ms),
        row.total_chunks.to_string(),
        format!("{:.4}", row.avg_chunk_size),
        format!("{:.4}", row.memory_usage_mb),
    ]
}

/// Comparison table as CSV, one row per successful strategy.
pub fn to_csv(result: &ComparisonResult) -> Result<String> {
    let csv_err = |e: csv::Error| BenchError::Serialization(format!("CSV error: {}", e));

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER).map_err(csv_err)?;
    for row in &result.comparison_table {
        writer.write_record(csv_record(row)).map_err(csv_err)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| BenchError::Serialization(format!("CSV error: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| BenchError::Serialization(e.to_string()))
}

/// Full results, failures included, as pretty JSON.
pub fn to_json(result: &ComparisonResult) -> Result<String> {
    Ok(serde_json::to_string_pretty(result)?)
}

fn pick<F>(rows: &[ComparisonRow], key: F) -> Option<&ComparisonRow>
where
    F: Fn(&ComparisonRow) -> f64,
{
    rows.iter().fold(None, |best: Option<&ComparisonRow>, row| match best {
        Some(b) if key(row) >= key(b) => Some(b),
        _ => Some(row),
    })
}

/// Narrative report: ranking table, winner, fastest and leanest strategies,
/// and the tradeoffs between them.
pub fn to_markdown(result: &ComparisonResult) -> String {
    let rows = &result.comparison_table;
    let mut md = String::new();

    let _ = writeln!(md, "# Strategy Comparison: {}\n", result.dataset_name);
    let _ = writeln!(
        md,
        "{} strategies evaluated, {} failed.\n",
        result.results.len() + result.failures.len(),
        result.failures.len()
    );

    let _ = writeln!(md, "## Results\n");
    let _ = writeln!(
        md,
        "| Strategy | NDCG@K | MRR | P@K | R@K | Hit rate | MAP | Index (s) | Latency (ms) | Chunks | Memory (MB) |"
    );
    let _ = writeln!(md, "|---|---|---|---|---|---|---|---|---|---|---|");
    for row in rows {
        let _ = writeln!(
            md,
            "| {} | {:.4} | {:.4} | {:.4} | {:.4} | {:.4} | {:.4} | {:.2} | {:.2} | {} | {:.3} |",
            row.strategy,
            row.ndcg_at_k,
            row.mrr,
            row.precision_at_k,
            row.recall_at_k,
            row.hit_rate,
            row.map,
            row.indexing_time_secs,
            row.query_latency_ms,
            row.total_chunks,
            row.memory_usage_mb
        );
    }

    let _ = writeln!(md, "\n## Highlights\n");
    let _ = writeln!(md, "- **Best quality:** {} (highest NDCG@K)", result.winner);

    let fastest = pick(rows, |r| r.query_latency_ms);
    let leanest = pick(rows, |r| r.memory_usage_mb);
    if let Some(fast) = fastest {
        let _ = writeln!(
            md,
            "- **Fastest:** {} ({:.2} ms per query)",
            fast.strategy, fast.query_latency_ms
        );
    }
    if let Some(lean) = leanest {
        let _ = writeln!(
            md,
            "- **Most memory-efficient:** {} ({:.3} MB)",
            lean.strategy, lean.memory_usage_mb
        );
    }

    let _ = writeln!(md, "\n## Tradeoffs\n");
    let best = rows.iter().find(|r| r.strategy == result.winner);
    match (best, fastest, leanest) {
        (Some(best), Some(fast), Some(lean)) => {
            if best.strategy == fast.strategy && best.strategy == lean.strategy {
                let _ = writeln!(
                    md,
                    "{} leads on quality, latency and memory; there is no tradeoff to make.",
                    best.strategy
                );
            } else {
                if fast.strategy != best.strategy {
                    let _ = writeln!(
                        md,
                        "- {} answers {:.2} ms faster per query than {} at {:.4} lower NDCG@K.",
                        fast.strategy,
                        best.query_latency_ms - fast.query_latency_ms,
                        best.strategy,
                        best.ndcg_at_k - fast.ndcg_at_k
                    );
                }
                if lean.strategy != best.strategy {
                    let _ = writeln!(
                        md,
                        "- {} uses {:.3} MB less memory than {} at {:.4} lower NDCG@K.",
                        lean.strategy,
                        best.memory_usage_mb - lean.memory_usage_mb,
                        best.strategy,
                        best.ndcg_at_k - lean.ndcg_at_k
                    );
                }
            }
        }
        _ => {
            let _ = writeln!(md, "No successful strategies to compare.");
        }
    }

    if !result.failures.is_empty() {
        let _ = writeln!(md, "\n## Failures\n");
        for failure in &result.failures {
            let _ = writeln!(
                md,
                "- **{}** (`{}`): {}",
                failure.strategy_name, failure.error_kind, failure.error_message
            );
        }
    }

    md
}

/// Write the CSV, JSON and Markdown reports into `dir`.
pub fn save_reports(result: &ComparisonResult, dir: &Path) -> Result<Vec<PathBuf>> {
    let outputs = [
        (dir.join(CSV_FILE), to_csv(result)?),
        (dir.join(JSON_FILE), to_json(result)?),
        (dir.join(MARKDOWN_FILE), to_markdown(result)),
    ];

    let mut written = Vec::with_capacity(outputs.len());
    for (path, content) in outputs {
        ensure_parent(&path)?;
        std::fs::write(&path, content).map_err(|e| BenchError::io(&path, e))?;
        written.push(path);
    }
    Ok(written)
}

/// Print a single evaluation to stdout.
pub fn print_evaluation(result: &EvaluationResult) {
    let r = &result.metrics.retrieval;
    let e = &result.metrics.efficiency;
    let m = &result.metadata;

    println!("\n========== Evaluation: {} ==========", result.strategy_name);
    println!("Dataset: {}", result.dataset_name);
    println!(
        "Documents: {} indexed, {} skipped | Queries: {} evaluated, {} failed",
        m.documents_indexed, m.documents_skipped, m.queries_evaluated, m.queries_failed
    );
    println!("----------------------------------------");
    println!("NDCG@{}:      {:.4}", r.k, r.ndcg_at_k);
    println!("MRR:          {:.4}", r.mrr);
    println!("Precision@{}: {:.4}", r.k, r.precision_at_k);
    println!("Recall@{}:    {:.4}", r.k, r.recall_at_k);
    println!("Hit rate:     {:.4}", r.hit_rate);
    println!("MAP:          {:.4}", r.map);
    println!("----------------------------------------");
    println!("Indexing time: {:.2}s", e.indexing_time_secs);
    println!("Query latency: {:.2}ms", e.query_latency_ms);
    println!("Chunks: {} (avg {:.1} tokens)", e.total_chunks, e.avg_chunk_size);
    println!("Memory: {:.3} MB", e.memory_usage_mb);
    if let Some(rag) = &result.metrics.rag {
        println!("----------------------------------------");
        println!("Faithfulness:      {:.3}", rag.faithfulness);
        println!("Answer relevance:  {:.3}", rag.answer_relevance);
        println!("Context relevance: {:.3}", rag.context_relevance);
        println!("Samples judged:    {}", rag.samples_evaluated);
    }
    for warning in &m.warnings {
        println!("Warning [{:?}] {}: {}", warning.kind, warning.subject, warning.message);
    }
    println!("========================================\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StrategyFailure;
    use crate::test_utils::sample_result;

    fn comparison() -> ComparisonResult {
        let mut fast = sample_result("fast", 0.6);
        fast.metrics.efficiency.query_latency_ms = 0.5;
        let mut accurate = sample_result("accurate", 0.9);
        accurate.metrics.efficiency.query_latency_ms = 3.0;
        accurate.metrics.efficiency.memory_usage_mb = 2.0;

        ComparisonResult {
            dataset_name: "ds".to_string(),
            comparison_table: vec![
                ComparisonRow::from_result(&accurate),
                ComparisonRow::from_result(&fast),
            ],
            winner: "accurate".to_string(),
            results: vec![fast, accurate],
            failures: vec![StrategyFailure {
                strategy_name: "broken".to_string(),
                error_kind: "timeout".to_string(),
                error_message: "took too long".to_string(),
            }],
        }
    }

    #[test]
    fn test_csv_has_every_strategy() {
        let csv = to_csv(&comparison()).unwrap();
        let mut reader = csv::Reader::from_reader(csv.as_bytes());
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.len(), CSV_HEADER.len());

        let names: Vec<String> = reader
            .records()
            .map(|r| r.unwrap().get(0).unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["accurate", "fast"]);
        assert!(csv.contains("0.9000"));
    }

    #[test]
    fn test_markdown_narrative() {
        let md = to_markdown(&comparison());
        assert!(md.contains("| accurate |"));
        assert!(md.contains("| fast |"));
        assert!(md.contains("**Best quality:** accurate"));
        assert!(md.contains("**Fastest:** fast"));
        assert!(md.contains("**Most memory-efficient:** fast"));
        assert!(md.contains("fast answers 2.50 ms faster"));
        assert!(md.contains("**broken** (`timeout`)"));
    }

    #[test]
    fn test_json_round_trips() {
        let original = comparison();
        let json = to_json(&original).unwrap();
        let parsed: ComparisonResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.winner, "accurate");
        assert_eq!(parsed.results.len(), 2);
        assert_eq!(parsed.failures, original.failures);
    }

    #[test]
    fn test_save_reports_writes_three_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("reports");
        let written = save_reports(&comparison(), &out).unwrap();

        assert_eq!(written.len(), 3);
        for name in [CSV_FILE, JSON_FILE, MARKDOWN_FILE] {
            assert!(out.join(name).exists(), "missing {}", name);
        }
    }
}
