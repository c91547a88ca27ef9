//! Narrow interface to the backing index/search engine.
//!
//! All core components (vocabularies, patients, trust entries) persist and
//! query through [`SearchBackend`]; nothing else in the crate knows what the
//! engine actually is. [`MemoryBackend`] is the bundled implementation used
//! by tests and single-node deployments.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub mod memory;

pub use memory::MemoryBackend;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("index does not exist: {0}")]
    IndexMissing(String),

    #[error("datastore IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse datastore snapshot: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A single term clause: matches documents whose `field` equals `value`,
/// either directly or as an element of an array field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub field: String,
    pub value: String,
}

impl Clause {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// A boolean query against one index.
///
/// `should` clauses are OR-ed and contribute to the relevance score;
/// `filter` clauses are AND-ed and do not. A query with at least one
/// `should` clause only returns documents matching at least one of them.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub should: Vec<Clause>,
    pub filter: Vec<Clause>,
}

impl Query {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn should(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.should.push(Clause::new(field, value));
        self
    }

    #[must_use]
    pub fn filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filter.push(Clause::new(field, value));
        self
    }
}

/// One ranked search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hit {
    /// Document id within the index
    pub id: String,

    /// Raw relevance score assigned by the engine (>= 0)
    pub score: f64,

    /// The stored document
    pub source: Value,
}

/// The operations the crate needs from the index engine.
///
/// Mutations are atomic per document; there is no cross-document
/// transaction. Freshly upserted documents only become searchable after
/// [`SearchBackend::refresh`] — callers must not assume read-after-write
/// visibility.
pub trait SearchBackend: Send + Sync {
    /// # Errors
    ///
    /// Returns `BackendError::Io`/`Parse` on storage failures.
    fn index_exists(&self, name: &str) -> Result<bool, BackendError>;

    /// # Errors
    ///
    /// Returns `BackendError` on storage failures.
    fn create_index(&self, name: &str, config: &Value) -> Result<(), BackendError>;

    /// Replace-by-id persistence: any prior document under `id` is fully
    /// replaced.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::IndexMissing` if the index was never created.
    fn upsert(&self, name: &str, id: &str, doc: Value) -> Result<(), BackendError>;

    /// # Errors
    ///
    /// Returns `BackendError::IndexMissing` if the index was never created.
    fn delete(&self, name: &str, id: &str) -> Result<(), BackendError>;

    /// Make all pending mutations visible to subsequent searches.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` on storage failures.
    fn refresh(&self, name: &str) -> Result<(), BackendError>;

    /// Number of visible documents in the index.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::IndexMissing` if the index was never created.
    fn count(&self, name: &str) -> Result<usize, BackendError>;

    /// Execute a boolean query, returning at most `limit` hits ranked by
    /// descending relevance.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::IndexMissing` if the index was never created.
    fn search(&self, name: &str, query: &Query, limit: usize) -> Result<Vec<Hit>, BackendError>;

    /// Create the index with `config` if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` on storage failures.
    fn ensure_index(&self, name: &str, config: &Value) -> Result<(), BackendError> {
        if !self.index_exists(name)? {
            self.create_index(name, config)?;
        }
        Ok(())
    }
}
