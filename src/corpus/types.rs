use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A named corpus unit: one project's set of source files
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Benchmark {
    pub name: String,
}

impl Benchmark {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// One source file of a benchmark and its serialized AST
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub benchmark: String,
    /// Benchmark-relative path without extension, `/`-separated (e.g. `sub/repmf`)
    pub name: String,
    pub source_path: PathBuf,
    pub xml_path: PathBuf,
}

/// Match count for one benchmark
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkMatch {
    pub name: String,
    pub count: usize,
}

/// Aggregated outcome of scanning one query over a corpus
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusQueryResult {
    /// Benchmarks with at least one match
    pub matches_by_benchmark: BTreeMap<String, usize>,
    pub total_matches: usize,
    /// By count descending; ties keep corpus order
    pub ordered_benchmarks: Vec<BenchmarkMatch>,
    /// Benchmarks scanned, including those without matches
    pub total_benchmarks: usize,
}

impl CorpusQueryResult {
    pub fn is_empty(&self) -> bool {
        self.total_matches == 0
    }

    pub fn count_for(&self, benchmark: &str) -> usize {
        self.matches_by_benchmark.get(benchmark).copied().unwrap_or(0)
    }
}

/// Matched lines within one file, in match order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMatches {
    /// Logical line from the node's `line` attribute, 1 when absent
    pub lines: Vec<u32>,
    /// Line of the node's start tag in the XML file
    pub source_lines: Vec<u32>,
}
