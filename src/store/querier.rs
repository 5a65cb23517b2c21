//! Host-facing query service.
//!
//! Ties the extension registry, the corpus scanner and the query store
//! together: queries are compiled once (LRU cached), scanned on demand and
//! their ranked counts are cached in the store.

use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use super::queries::{QueryId, QueryStore, StoreError};
use crate::corpus::{BenchmarkMatch, CorpusScanner, CorpusSource, FileMatches, ScanError};
use crate::query::{CompiledQuery, ExtensionRegistry, QueryError, compile};
use crate::tree::LoadError;

/// Queries seeded by [`Querier::load_initial_queries`]
pub const EXAMPLE_QUERIES: &[(&str, &str)] = &[
    ("Calls to eval", "//ParameterizedExpr[is_call('eval')]"),
    (
        "Calls to feval with a string literal target",
        "//ParameterizedExpr[is_call('feval') and name(arg(1))='StringLiteralExpr']",
    ),
    (
        "Copy statements inside loops",
        "//ForStmt//AssignStmt[name(lhs())='NameExpr' and name(rhs())='NameExpr' and rhs()/@kind='VAR']",
    ),
    (
        "Recursive calls",
        "//ParameterizedExpr[is_call(ancestor::Function/Name/@nameId)]",
    ),
    (
        "Functions with multiple return values",
        "//Function[./OutputParamList[count(Name) > 1]]",
    ),
];

pub const DEFAULT_COMPILED_CACHE_SIZE: usize = 64;

#[derive(Debug, Error)]
pub enum QuerierError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Scan(ScanError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("benchmark does not exist: {0}")]
    UnknownBenchmark(String),
}

impl From<ScanError> for QuerierError {
    fn from(error: ScanError) -> Self {
        match error {
            ScanError::Query(e) => QuerierError::Query(e),
            other => QuerierError::Scan(other),
        }
    }
}

impl From<LoadError> for QuerierError {
    fn from(error: LoadError) -> Self {
        QuerierError::Scan(ScanError::Load(error))
    }
}

impl QuerierError {
    /// The query diagnostic, if this failure came from the query itself
    pub fn query_error(&self) -> Option<&QueryError> {
        match self {
            QuerierError::Query(e) => Some(e),
            _ => None,
        }
    }
}

/// Ranked counts for one query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResults {
    pub matches: Vec<BenchmarkMatch>,
    pub total_matches: usize,
    /// Served from the store without scanning
    pub cached: bool,
}

impl QueryResults {
    fn new(matches: Vec<BenchmarkMatch>, cached: bool) -> Self {
        Self {
            total_matches: matches.iter().map(|m| m.count).sum(),
            matches,
            cached,
        }
    }
}

pub struct Querier<S> {
    registry: ExtensionRegistry,
    scanner: CorpusScanner<S>,
    store: QueryStore,
    compiled: Mutex<LruCache<String, Arc<CompiledQuery>>>,
}

impl<S: CorpusSource> Querier<S> {
    pub fn new(registry: ExtensionRegistry, scanner: CorpusScanner<S>, store: QueryStore) -> Self {
        Self::with_cache_size(registry, scanner, store, DEFAULT_COMPILED_CACHE_SIZE)
    }

    pub fn with_cache_size(
        registry: ExtensionRegistry,
        scanner: CorpusScanner<S>,
        store: QueryStore,
        cache_size: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            registry,
            scanner,
            store,
            compiled: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }

    pub fn scanner(&self) -> &CorpusScanner<S> {
        &self.scanner
    }

    pub fn store(&self) -> &QueryStore {
        &self.store
    }

    /// Compile `xpath`, reusing a previous compilation of the same text
    pub fn compile(&self, xpath: &str) -> Result<Arc<CompiledQuery>, QueryError> {
        if let Ok(mut cache) = self.compiled.lock()
            && let Some(query) = cache.get(xpath)
        {
            return Ok(Arc::clone(query));
        }

        let query = Arc::new(compile(xpath, &self.registry)?);
        if let Ok(mut cache) = self.compiled.lock() {
            cache.put(xpath.to_string(), Arc::clone(&query));
        }
        Ok(query)
    }

    fn compute_matches(&self, xpath: &str) -> Result<Vec<BenchmarkMatch>, QuerierError> {
        let query = self.compile(xpath)?;
        Ok(self.scanner.scan_all(&query)?.ordered_benchmarks)
    }

    /// Ranked counts for `xpath`.
    ///
    /// Cached counts are returned as is. Otherwise the query is scanned and
    /// its counts are stored on the record, which is created unsaved if the
    /// query has not been seen before.
    pub fn get_matches(&mut self, xpath: &str) -> Result<QueryResults, QuerierError> {
        if let Some(record) = self.store.find_by_xpath(xpath)
            && let Some(matches) = self.store.cached_matches(record.id)
        {
            tracing::debug!(query = xpath, "serving cached matches");
            return Ok(QueryResults::new(matches, true));
        }

        let matches = self.compute_matches(xpath)?;
        let id = self.store.create(xpath, "");
        self.store.cache_matches(id, matches.clone())?;
        self.store.flush()?;
        Ok(QueryResults::new(matches, false))
    }

    /// Matched lines per file of one benchmark. `None` or a blank query
    /// yields an empty map.
    pub fn matching_lines(
        &self,
        benchmark_name: &str,
        xpath: Option<&str>,
    ) -> Result<BTreeMap<String, FileMatches>, QuerierError> {
        let source = self.scanner.source();
        let benchmark = source
            .benchmark(benchmark_name)?
            .ok_or_else(|| QuerierError::UnknownBenchmark(benchmark_name.to_string()))?;

        let query = match xpath.filter(|x| !x.trim().is_empty()) {
            Some(xpath) => Some(self.compile(xpath)?),
            None => None,
        };
        Ok(crate::corpus::matching_lines(
            source,
            &benchmark,
            query.as_deref(),
        )?)
    }

    /// Name a query that has already been run
    pub fn save_query(&mut self, xpath: &str, name: &str) -> Result<QueryId, QuerierError> {
        let id = self.store.save_name(xpath, name)?;
        self.store.flush()?;
        tracing::info!(query = xpath, name, "saved query");
        Ok(id)
    }

    /// Unsave a query. Its cached results stay until the next purge.
    pub fn delete_query(&mut self, xpath: &str) -> Result<String, QuerierError> {
        let name = self.store.unsave(xpath)?;
        self.store.flush()?;
        tracing::info!(query = xpath, name = %name, "unsaved query");
        Ok(name)
    }

    /// Expire and recompute the cached counts of every record.
    ///
    /// A query that no longer evaluates is left expired and skipped; load
    /// failures abort the refresh.
    pub fn refresh_query_results(&mut self) -> Result<usize, QuerierError> {
        let records: Vec<(QueryId, String)> = self
            .store
            .all()
            .iter()
            .map(|r| (r.id, r.xpath.clone()))
            .collect();

        let mut refreshed = 0;
        for (id, xpath) in records {
            self.store.expire_matches(id)?;
            match self.compute_matches(&xpath) {
                Ok(matches) => {
                    self.store.cache_matches(id, matches)?;
                    refreshed += 1;
                }
                Err(QuerierError::Query(e)) => {
                    tracing::warn!(
                        query = %xpath,
                        error = %e,
                        "query no longer evaluates; left uncached"
                    );
                }
                Err(e) => {
                    self.store.flush()?;
                    return Err(e);
                }
            }
        }
        self.store.flush()?;
        tracing::info!(refreshed, "refreshed query results");
        Ok(refreshed)
    }

    /// Remove every unsaved query and its cached results
    pub fn purge_unsaved_queries(&mut self) -> Result<usize, QuerierError> {
        let purged = self.store.purge_unsaved();
        self.store.flush()?;
        tracing::info!(purged, "purged unsaved queries");
        Ok(purged)
    }

    /// Seed the store with [`EXAMPLE_QUERIES`] and cache their results
    pub fn load_initial_queries(&mut self) -> Result<usize, QuerierError> {
        for (name, xpath) in EXAMPLE_QUERIES {
            let matches = self.compute_matches(xpath)?;
            let id = self.store.create(xpath, name);
            self.store.cache_matches(id, matches)?;
        }
        self.store.flush()?;
        Ok(EXAMPLE_QUERIES.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::MemoryCorpus;
    use crate::query::QueryErrorKind;

    fn for_loops(n: usize) -> String {
        let mut xml = String::from("<Script><StmtList>");
        for i in 0..n {
            xml.push_str(&format!("<ForStmt line=\"{}\"/>", i + 1));
        }
        xml.push_str("</StmtList></Script>");
        xml
    }

    fn querier() -> Querier<MemoryCorpus> {
        let mut corpus = MemoryCorpus::new();
        corpus
            .add_file("A", "f1", for_loops(9))
            .add_file("A", "f2", for_loops(7))
            .add_file("B", "f1", for_loops(0));
        let scanner = CorpusScanner::new(corpus, 2).unwrap();
        Querier::new(
            ExtensionRegistry::with_builtins(),
            scanner,
            QueryStore::in_memory(),
        )
    }

    #[test]
    fn test_get_matches_totals() {
        let mut q = querier();
        let results = q.get_matches("//ForStmt").unwrap();
        assert_eq!(results.total_matches, 16);
        assert_eq!(results.matches.len(), 1);
        assert_eq!(results.matches[0].name, "A");
        assert!(!results.cached);
    }

    #[test]
    fn test_malformed_query_fails() {
        let mut q = querier();
        let err = q.get_matches("\\ForStmt").unwrap_err();
        assert_eq!(err.query_error().unwrap().kind, QueryErrorKind::SyntaxError);
        assert!(q.store().all().is_empty());
    }

    #[test]
    fn test_running_a_query_caches_results() {
        let mut q = querier();
        q.get_matches("//ForStmt").unwrap();
        let record = q.store().find_by_xpath("//ForStmt").unwrap();
        assert!(!record.is_saved());
        assert!(record.matches.is_some());

        let again = q.get_matches("//ForStmt").unwrap();
        assert!(again.cached);
        assert_eq!(again.total_matches, 16);
    }

    #[test]
    fn test_unsaving_keeps_cached_results() {
        let mut q = querier();
        q.get_matches("//ForStmt").unwrap();
        q.save_query("//ForStmt", "For loops").unwrap();
        assert_eq!(q.store().saved().count(), 1);
        assert_eq!(q.delete_query("//ForStmt").unwrap(), "For loops");
        assert_eq!(q.store().saved().count(), 0);
        assert!(q.get_matches("//ForStmt").unwrap().cached);
    }

    #[test]
    fn test_save_unknown_query() {
        let mut q = querier();
        assert!(matches!(
            q.save_query("//WhileStmt", "While loops"),
            Err(QuerierError::Store(StoreError::NoSuchQuery(_)))
        ));
    }

    #[test]
    fn test_purge_then_rescan() {
        let mut q = querier();
        q.get_matches("//ForStmt").unwrap();
        assert_eq!(q.purge_unsaved_queries().unwrap(), 1);
        assert!(!q.get_matches("//ForStmt").unwrap().cached);
    }

    #[test]
    fn test_refresh_recomputes() {
        let mut q = querier();
        q.get_matches("//ForStmt").unwrap();
        q.get_matches("//StmtList").unwrap();
        assert_eq!(q.refresh_query_results().unwrap(), 2);
        let record = q.store().find_by_xpath("//StmtList").unwrap();
        assert_eq!(q.store().cached_matches(record.id).unwrap().len(), 2);
    }

    #[test]
    fn test_load_initial_queries() {
        let mut q = querier();
        assert_eq!(q.load_initial_queries().unwrap(), EXAMPLE_QUERIES.len());
        let names: Vec<_> = q.store().saved().map(|r| r.name.as_str()).collect();
        assert_eq!(names.len(), 5);
        assert!(names.contains(&"Recursive calls"));
        // nothing in this corpus matches, but the empty results are cached
        for record in q.store().all() {
            assert_eq!(q.store().cached_matches(record.id), Some(vec![]));
        }
    }

    #[test]
    fn test_matching_lines_unknown_benchmark() {
        let q = querier();
        assert!(matches!(
            q.matching_lines("missing", Some("//ForStmt")),
            Err(QuerierError::UnknownBenchmark(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_matching_lines() {
        let q = querier();
        let lines = q.matching_lines("A", Some("//ForStmt")).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines["f2"].lines, [1, 2, 3, 4, 5, 6, 7]);
        assert!(q.matching_lines("A", Some("  ")).unwrap().is_empty());
        assert!(q.matching_lines("B", None).unwrap().is_empty());
    }

    #[test]
    fn test_compile_is_cached() {
        let q = querier();
        let first = q.compile("//ForStmt").unwrap();
        let second = q.compile("//ForStmt").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
