//! Benchmark corpora and query scanning.
//!
//! - [`source`] - where benchmarks and their trees come from
//! - [`scan`] - parallel per-file evaluation and aggregation
//! - [`rank`] - ordering benchmarks by match count
//! - [`lines`] - matched lines per file for one benchmark

pub mod lines;
pub mod rank;
pub mod scan;
pub mod source;
pub mod types;

pub use lines::matching_lines;
pub use rank::{rank, rank_counts};
pub use scan::{CancelToken, CorpusScanner, ScanError, count_matches};
pub use source::{CorpusSource, DataRoot, MemoryCorpus};
pub use types::{Benchmark, BenchmarkMatch, CorpusQueryResult, FileMatches, SourceFile};
