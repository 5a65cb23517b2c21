//! Saved queries and their cached per-benchmark match counts.
//!
//! Every query that has been run gets a record, keyed by its text. A record
//! with an empty name is "unsaved": it only exists to hold cached results
//! and is removed by [`QueryStore::purge_unsaved`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::corpus::{BenchmarkMatch, rank_counts};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access query store {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid query store {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no such query: {0}")]
    NoSuchQuery(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryId(pub u64);

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub id: QueryId,
    pub xpath: String,
    /// Empty for queries that were run but never saved
    #[serde(default)]
    pub name: String,
    /// Cached counts; `None` when never computed or expired
    #[serde(default)]
    pub matches: Option<Vec<BenchmarkMatch>>,
}

impl QueryRecord {
    pub fn is_saved(&self) -> bool {
        !self.name.is_empty()
    }

    /// Display label: the name, or the query text for unsaved queries
    pub fn label(&self) -> &str {
        if self.is_saved() { &self.name } else { &self.xpath }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    next_id: u64,
    #[serde(default)]
    queries: Vec<QueryRecord>,
}

/// Query records, persisted as one JSON document
#[derive(Debug, Default)]
pub struct QueryStore {
    path: Option<PathBuf>,
    data: StoreData,
}

impl QueryStore {
    /// A store that is never written to disk
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the store at `path`, starting empty if the file does not exist yet
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let data = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&content).map_err(|source| StoreError::Json {
                path: path.clone(),
                source,
            })?
        } else {
            StoreData::default()
        };
        tracing::debug!(path = %path.display(), queries = data.queries.len(), "opened query store");
        Ok(Self {
            path: Some(path),
            data,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn all(&self) -> &[QueryRecord] {
        &self.data.queries
    }

    pub fn saved(&self) -> impl Iterator<Item = &QueryRecord> {
        self.data.queries.iter().filter(|q| q.is_saved())
    }

    pub fn unsaved(&self) -> impl Iterator<Item = &QueryRecord> {
        self.data.queries.iter().filter(|q| !q.is_saved())
    }

    pub fn find_by_xpath(&self, xpath: &str) -> Option<&QueryRecord> {
        self.data.queries.iter().find(|q| q.xpath == xpath)
    }

    pub fn find(&self, id: QueryId) -> Option<&QueryRecord> {
        self.data.queries.iter().find(|q| q.id == id)
    }

    fn find_mut(&mut self, id: QueryId) -> Result<&mut QueryRecord, StoreError> {
        self.data
            .queries
            .iter_mut()
            .find(|q| q.id == id)
            .ok_or_else(|| StoreError::NoSuchQuery(format!("#{id}")))
    }

    fn find_by_xpath_mut(&mut self, xpath: &str) -> Result<&mut QueryRecord, StoreError> {
        self.data
            .queries
            .iter_mut()
            .find(|q| q.xpath == xpath)
            .ok_or_else(|| StoreError::NoSuchQuery(xpath.to_string()))
    }

    /// Record for `xpath`, creating it if needed. A non-empty `name`
    /// replaces the name of an existing record.
    pub fn create(&mut self, xpath: &str, name: &str) -> QueryId {
        if let Ok(existing) = self.find_by_xpath_mut(xpath) {
            if !name.is_empty() {
                existing.name = name.to_string();
            }
            return existing.id;
        }
        self.data.next_id += 1;
        let id = QueryId(self.data.next_id);
        self.data.queries.push(QueryRecord {
            id,
            xpath: xpath.to_string(),
            name: name.to_string(),
            matches: None,
        });
        id
    }

    /// Name an existing query
    pub fn save_name(&mut self, xpath: &str, name: &str) -> Result<QueryId, StoreError> {
        let record = self.find_by_xpath_mut(xpath)?;
        record.name = name.to_string();
        Ok(record.id)
    }

    /// Clear the name, keeping the record and its cached results.
    /// Returns the previous name.
    pub fn unsave(&mut self, xpath: &str) -> Result<String, StoreError> {
        let record = self.find_by_xpath_mut(xpath)?;
        Ok(std::mem::take(&mut record.name))
    }

    /// Remove a record together with its cached results
    pub fn delete(&mut self, id: QueryId) -> Result<QueryRecord, StoreError> {
        let index = self
            .data
            .queries
            .iter()
            .position(|q| q.id == id)
            .ok_or_else(|| StoreError::NoSuchQuery(format!("#{id}")))?;
        Ok(self.data.queries.remove(index))
    }

    pub fn cache_matches(
        &mut self,
        id: QueryId,
        matches: Vec<BenchmarkMatch>,
    ) -> Result<(), StoreError> {
        self.find_mut(id)?.matches = Some(matches);
        Ok(())
    }

    /// Cached counts by count descending, `None` if nothing is cached
    pub fn cached_matches(&self, id: QueryId) -> Option<Vec<BenchmarkMatch>> {
        let matches = self.find(id)?.matches.as_ref()?;
        Some(rank_counts(
            matches.iter().map(|m| (m.name.clone(), m.count)),
        ))
    }

    pub fn expire_matches(&mut self, id: QueryId) -> Result<(), StoreError> {
        self.find_mut(id)?.matches = None;
        Ok(())
    }

    /// Drop every unsaved record; returns how many were removed
    pub fn purge_unsaved(&mut self) -> usize {
        let before = self.data.queries.len();
        self.data.queries.retain(QueryRecord::is_saved);
        before - self.data.queries.len()
    }

    /// Write the store to its file. No-op for in-memory stores.
    pub fn flush(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let io_error = |source| StoreError::Io {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let content = serde_json::to_string_pretty(&self.data).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;
        // Write then rename so a crash never leaves a truncated store
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(io_error)?;
        fs::rename(&tmp, path).map_err(io_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn bm(name: &str, count: usize) -> BenchmarkMatch {
        BenchmarkMatch {
            name: name.to_string(),
            count,
        }
    }

    #[test]
    fn test_create_is_keyed_by_xpath() {
        let mut store = QueryStore::in_memory();
        let a = store.create("//ForStmt", "");
        let b = store.create("//ForStmt", "For loops");
        assert_eq!(a, b);
        assert_eq!(store.all().len(), 1);
        assert_eq!(store.find(a).unwrap().name, "For loops");
        // an empty name does not clear an existing one
        store.create("//ForStmt", "");
        assert!(store.find(a).unwrap().is_saved());
    }

    #[test]
    fn test_saved_and_unsaved() {
        let mut store = QueryStore::in_memory();
        store.create("//ForStmt", "For loops");
        store.create("//WhileStmt", "");
        assert_eq!(store.saved().map(|q| q.xpath.as_str()).collect::<Vec<_>>(), ["//ForStmt"]);
        assert_eq!(store.unsaved().map(|q| q.label()).collect::<Vec<_>>(), ["//WhileStmt"]);
    }

    #[test]
    fn test_save_unknown_query_fails() {
        let mut store = QueryStore::in_memory();
        assert!(matches!(
            store.save_name("//ForStmt", "For loops"),
            Err(StoreError::NoSuchQuery(_))
        ));
    }

    #[test]
    fn test_unsave_keeps_cached_matches() {
        let mut store = QueryStore::in_memory();
        let id = store.create("//ForStmt", "");
        store.cache_matches(id, vec![bm("a", 1), bm("b", 3)]).unwrap();
        store.save_name("//ForStmt", "For loops").unwrap();
        assert_eq!(store.unsave("//ForStmt").unwrap(), "For loops");
        let cached = store.cached_matches(id).unwrap();
        assert_eq!(cached, [bm("b", 3), bm("a", 1)]);
    }

    #[test]
    fn test_delete_drops_cached_matches() {
        let mut store = QueryStore::in_memory();
        let id = store.create("//ForStmt", "For loops");
        store.cache_matches(id, vec![bm("a", 1)]).unwrap();
        store.delete(id).unwrap();
        assert!(store.cached_matches(id).is_none());
        assert!(store.find_by_xpath("//ForStmt").is_none());
        assert!(store.delete(id).is_err());
    }

    #[test]
    fn test_expire_and_purge() {
        let mut store = QueryStore::in_memory();
        let saved = store.create("//ForStmt", "For loops");
        store.create("//WhileStmt", "");
        store.cache_matches(saved, vec![bm("a", 2)]).unwrap();
        store.expire_matches(saved).unwrap();
        assert!(store.cached_matches(saved).is_none());
        assert_eq!(store.purge_unsaved(), 1);
        assert_eq!(store.all().len(), 1);
    }

    #[test]
    fn test_ids_not_reused_after_delete() {
        let mut store = QueryStore::in_memory();
        let first = store.create("//A", "");
        store.delete(first).unwrap();
        let second = store.create("//B", "");
        assert_ne!(first, second);
    }

    #[test]
    fn test_flush_and_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("queries.json");

        let mut store = QueryStore::open(&path).unwrap();
        assert!(store.all().is_empty());
        let id = store.create("//ForStmt", "For loops");
        store.cache_matches(id, vec![bm("a", 16)]).unwrap();
        store.flush().unwrap();

        let reopened = QueryStore::open(&path).unwrap();
        assert_eq!(reopened.all(), store.all());
        assert_eq!(reopened.cached_matches(id).unwrap(), [bm("a", 16)]);
    }

    #[test]
    fn test_open_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queries.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(QueryStore::open(&path), Err(StoreError::Json { .. })));
    }
}
