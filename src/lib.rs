//! # mcbench - structural queries over a MATLAB corpus
//!
//! mcbench runs XPath 1.0 queries, extended with MATLAB-aware functions such
//! as `is_call` and `loopvars`, against the syntax trees of a set of
//! benchmark programs, and reports how often each benchmark matches.
//!
//! ## Architecture
//!
//! - [`tree`] - arena syntax trees loaded from their XML serialization
//! - [`query`] - lexing, parsing, compiling and evaluating queries
//! - [`corpus`] - benchmark sources, parallel scanning and ranking
//! - [`store`] - saved queries with cached results, and the [`store::Querier`] service
//! - [`output`] - terminal formatting
//! - [`utils`] - configuration and the data directory
//!
//! ## Quick Start
//!
//! ```no_run
//! use mcbench::corpus::{CorpusScanner, DataRoot};
//! use mcbench::query::{ExtensionRegistry, compile};
//!
//! let registry = ExtensionRegistry::with_builtins();
//! let query = compile("//ParameterizedExpr[is_call('eval')]", &registry).unwrap();
//!
//! let scanner = CorpusScanner::new(DataRoot::new("/path/to/benchmarks"), 0).unwrap();
//! let result = scanner.scan_all(&query).unwrap();
//!
//! for benchmark in &result.ordered_benchmarks {
//!     println!("{}: {}", benchmark.name, benchmark.count);
//! }
//! ```

pub mod corpus;
pub mod output;
pub mod query;
pub mod store;
pub mod tree;
pub mod utils;
