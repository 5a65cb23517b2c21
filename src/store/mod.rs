//! Persisted queries and the service that runs them.

pub mod querier;
pub mod queries;

pub use querier::{
    DEFAULT_COMPILED_CACHE_SIZE, EXAMPLE_QUERIES, Querier, QuerierError, QueryResults,
};
pub use queries::{QueryId, QueryRecord, QueryStore, StoreError};
