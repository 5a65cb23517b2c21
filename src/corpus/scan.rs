//! Parallel corpus scanning.
//!
//! Work is split per file and run on a dedicated rayon pool. Each unit
//! returns its benchmark index alongside the count, so the fold never relies
//! on completion order. The first failure stops scheduling of further units.

use ahash::{AHashMap, AHashSet};
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use thiserror::Error;

use super::rank::rank_counts;
use super::source::CorpusSource;
use super::types::{Benchmark, CorpusQueryResult, SourceFile};
use crate::query::{CompiledQuery, QueryError};
use crate::tree::LoadError;
use crate::utils::progress::{ProgressBar, ProgressStyle};

#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("scan cancelled")]
    Cancelled,

    #[error("failed to start worker pool: {0}")]
    Pool(String),
}

/// Cooperative cancellation flag shared between a caller and running scans
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Runs compiled queries over every file of a corpus
pub struct CorpusScanner<S> {
    source: S,
    pool: rayon::ThreadPool,
    workers: usize,
    show_progress: bool,
}

impl<S: CorpusSource> CorpusScanner<S> {
    /// Scanner with `workers` threads; 0 uses one per CPU
    pub fn new(source: S, workers: usize) -> Result<Self, ScanError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("mcbench-scan-{i}"))
            .build()
            .map_err(|e| ScanError::Pool(e.to_string()))?;
        let workers = pool.current_num_threads();
        tracing::debug!(workers, "created scan pool");
        Ok(Self {
            source,
            pool,
            workers,
            show_progress: false,
        })
    }

    /// Draw a progress bar on stderr while scanning
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Scan every benchmark the source supplies
    pub fn scan_all(&self, query: &CompiledQuery) -> Result<CorpusQueryResult, ScanError> {
        let benchmarks = self.source.benchmarks()?;
        self.scan(query, &benchmarks)
    }

    pub fn scan(
        &self,
        query: &CompiledQuery,
        benchmarks: &[Benchmark],
    ) -> Result<CorpusQueryResult, ScanError> {
        self.scan_with_cancel(query, benchmarks, &CancelToken::new())
    }

    /// Count matches per benchmark. Fails on the first query or load error;
    /// no partial result is returned.
    pub fn scan_with_cancel(
        &self,
        query: &CompiledQuery,
        benchmarks: &[Benchmark],
        cancel: &CancelToken,
    ) -> Result<CorpusQueryResult, ScanError> {
        let start = Instant::now();

        // A repeated name is scanned once
        let mut seen = AHashSet::new();
        let benchmarks: Vec<&Benchmark> = benchmarks
            .iter()
            .filter(|b| seen.insert(b.name.as_str()))
            .collect();

        let mut work: Vec<(usize, SourceFile)> = Vec::new();
        for (index, benchmark) in benchmarks.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(ScanError::Cancelled);
            }
            work.extend(self.source.files(benchmark)?.into_iter().map(|f| (index, f)));
        }
        tracing::debug!(
            query = query.source(),
            benchmarks = benchmarks.len(),
            files = work.len(),
            "scanning corpus"
        );

        let progress = self.progress_bar(work.len());
        let counts: Vec<(usize, usize)> = self.pool.install(|| {
            work.par_iter()
                .map(|(index, file)| {
                    if cancel.is_cancelled() {
                        return Err(ScanError::Cancelled);
                    }
                    let count = count_matches(&self.source, query, file)?;
                    if let Some(pb) = &progress {
                        pb.inc(1);
                    }
                    Ok((*index, count))
                })
                .collect::<Result<Vec<_>, ScanError>>()
        })?;
        if let Some(pb) = progress {
            pb.finish_and_clear();
        }

        let mut totals: AHashMap<usize, usize> = AHashMap::new();
        for (index, count) in counts {
            *totals.entry(index).or_insert(0) += count;
        }

        let per_benchmark: Vec<(&Benchmark, usize)> = benchmarks
            .iter()
            .enumerate()
            .map(|(index, b)| (*b, totals.get(&index).copied().unwrap_or(0)))
            .collect();
        let result = fold_counts(&per_benchmark);

        tracing::info!(
            query = query.source(),
            total_matches = result.total_matches,
            matching_benchmarks = result.matches_by_benchmark.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "scan complete"
        );
        Ok(result)
    }

    fn progress_bar(&self, len: usize) -> Option<ProgressBar> {
        if !self.show_progress {
            return None;
        }
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files {msg}")
        {
            pb.set_style(style.progress_chars("█▓▒░  "));
        }
        Some(pb)
    }
}

/// Matches of `query` in one file
pub fn count_matches<S: CorpusSource + ?Sized>(
    source: &S,
    query: &CompiledQuery,
    file: &SourceFile,
) -> Result<usize, ScanError> {
    let tree = source.load_tree(file)?;
    Ok(query.execute(&tree)?.len())
}

/// Build the result from per-benchmark totals given in corpus order
pub(crate) fn fold_counts(per_benchmark: &[(&Benchmark, usize)]) -> CorpusQueryResult {
    let retained: Vec<(String, usize)> = per_benchmark
        .iter()
        .filter(|(_, count)| *count > 0)
        .map(|(b, count)| (b.name.clone(), *count))
        .collect();

    CorpusQueryResult {
        total_matches: retained.iter().map(|(_, c)| c).sum(),
        matches_by_benchmark: retained.iter().cloned().collect(),
        ordered_benchmarks: rank_counts(retained),
        total_benchmarks: per_benchmark.len(),
    }
}
