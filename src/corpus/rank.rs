//! Benchmark ordering for presentation.

use super::types::{BenchmarkMatch, CorpusQueryResult};

/// Benchmarks of a scan result by match count, descending
pub fn rank(result: &CorpusQueryResult) -> Vec<BenchmarkMatch> {
    result.ordered_benchmarks.clone()
}

/// Stable sort of `(name, count)` pairs by count, descending.
/// Equal counts keep their input order.
pub fn rank_counts(counts: impl IntoIterator<Item = (String, usize)>) -> Vec<BenchmarkMatch> {
    let mut ranked: Vec<BenchmarkMatch> = counts
        .into_iter()
        .map(|(name, count)| BenchmarkMatch { name, count })
        .collect();
    // sort_by is stable
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked
}
