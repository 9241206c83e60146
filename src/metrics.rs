//! Ranking-quality metrics over judged relevance sequences.
//!
//! Every function takes the relevance of retrieved items in the exact rank
//! order the retriever produced (`1.0` relevant, `0.0` not relevant by
//! default) and never re-orders ties.
//!
//! - NDCG@k (Normalized Discounted Cumulative Gain)
//! - MRR (reciprocal rank of the first hit)
//! - Precision@k, Recall@k
//! - Hit rate
//! - MAP (Mean Average Precision)

use std::collections::HashSet;

/// Binary relevance of each retrieved id against the ground truth.
pub fn binary_relevance<S: AsRef<str>>(retrieved: &[S], ground_truth: &[S]) -> Vec<f64> {
    let relevant: HashSet<&str> = ground_truth.iter().map(|s| s.as_ref()).collect();
    retrieved
        .iter()
        .map(|id| {
            if relevant.contains(id.as_ref()) {
                1.0
            } else {
                0.0
            }
        })
        .collect()
}

/// Discounted cumulative gain: `sum(r[i] / log2(i + 2))`.
pub fn dcg(relevance: &[f64]) -> f64 {
    relevance
        .iter()
        .enumerate()
        .map(|(i, rel)| rel / (i as f64 + 2.0).log2())
        .sum()
}

/// NDCG over the first `k` positions.
///
/// The ideal ordering is the same top-`k` slice sorted descending. Returns
/// `0.0` when nothing relevant was retrieved.
pub fn ndcg_at_k(relevance: &[f64], k: usize) -> f64 {
    let top = &relevance[..k.min(relevance.len())];
    let mut ideal = top.to_vec();
    ideal.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

    let idcg = dcg(&ideal);
    if idcg == 0.0 {
        return 0.0;
    }
    dcg(top) / idcg
}

/// Reciprocal rank of the first item at or above `threshold`.
pub fn mrr(relevance: &[f64], threshold: f64) -> f64 {
    relevance
        .iter()
        .position(|&rel| rel >= threshold)
        .map(|i| 1.0 / (i + 1) as f64)
        .unwrap_or(0.0)
}

fn hits_at_k(relevance: &[f64], k: usize, threshold: f64) -> usize {
    relevance
        .iter()
        .take(k)
        .filter(|&&rel| rel >= threshold)
        .count()
}

/// Fraction of the first `k` positions that are relevant.
pub fn precision_at_k(relevance: &[f64], k: usize, threshold: f64) -> f64 {
    if k == 0 {
        return 0.0;
    }
    hits_at_k(relevance, k, threshold) as f64 / k as f64
}

/// Fraction of all relevant items found in the first `k` positions.
pub fn recall_at_k(relevance: &[f64], k: usize, threshold: f64, total_relevant: usize) -> f64 {
    if total_relevant == 0 {
        return 0.0;
    }
    hits_at_k(relevance, k, threshold) as f64 / total_relevant as f64
}

/// `1.0` if anything at or above `threshold` was retrieved.
pub fn hit_rate(relevance: &[f64], threshold: f64) -> f64 {
    if relevance.iter().any(|&rel| rel >= threshold) {
        1.0
    } else {
        0.0
    }
}

/// Mean of precision@(i+1) over every rank `i` that is a hit.
pub fn average_precision(relevance: &[f64], threshold: f64) -> f64 {
    let mut hits = 0usize;
    let mut sum = 0.0;

    for (i, &rel) in relevance.iter().enumerate() {
        if rel >= threshold {
            hits += 1;
            sum += hits as f64 / (i + 1) as f64;
        }
    }

    if hits == 0 { 0.0 } else { sum / hits as f64 }
}

/// Mean average precision across queries.
pub fn map(all_relevance: &[Vec<f64>], threshold: f64) -> f64 {
    if all_relevance.is_empty() {
        return 0.0;
    }
    let total: f64 = all_relevance
        .iter()
        .map(|r| average_precision(r, threshold))
        .sum();
    total / all_relevance.len() as f64
}

/// Arithmetic mean, `0.0` for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
