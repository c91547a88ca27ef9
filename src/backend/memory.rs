//! In-memory [`SearchBackend`] with an optional JSON snapshot on disk.
//!
//! Documents are staged in a pending buffer on upsert and only become
//! searchable after `refresh`, matching the visibility contract of the
//! external engines this trait abstracts. When opened with a snapshot path,
//! `refresh` also writes the visible state back to disk; pending documents
//! are never persisted.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::backend::{BackendError, Hit, Query, SearchBackend};

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexData {
    config: Value,

    /// Documents visible to search
    docs: BTreeMap<String, Value>,

    /// Upserted but not yet refreshed
    #[serde(skip)]
    pending: BTreeMap<String, Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Store {
    indices: BTreeMap<String, IndexData>,
}

#[derive(Debug)]
pub struct MemoryBackend {
    path: Option<PathBuf>,
    store: Mutex<Store>,
}

impl MemoryBackend {
    /// Create a purely in-memory backend (no durability)
    #[must_use]
    pub fn new() -> Self {
        Self {
            path: None,
            store: Mutex::new(Store::default()),
        }
    }

    /// Open a disk-backed backend, loading the snapshot at `path` if present
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Io` if the snapshot cannot be read, or
    /// `BackendError::Parse` if it is not valid JSON.
    pub fn open(path: &Path) -> Result<Self, BackendError> {
        let store = if path.is_file() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            Store::default()
        };

        Ok(Self {
            path: Some(path.to_path_buf()),
            store: Mutex::new(store),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Store> {
        // A poisoned lock means another thread panicked mid-mutation; the
        // store itself is still structurally valid JSON values.
        self.store.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn snapshot(&self, store: &Store) -> Result<(), BackendError> {
        if let Some(path) = &self.path {
            let content = serde_json::to_string(store)?;
            std::fs::write(path, content)?;
        }
        Ok(())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Does `doc.field` equal `value`, directly or as an array element?
fn field_matches(doc: &Value, field: &str, value: &str) -> bool {
    match doc.get(field) {
        Some(Value::String(s)) => s == value,
        Some(Value::Array(items)) => items.iter().any(|v| v.as_str() == Some(value)),
        _ => false,
    }
}

impl SearchBackend for MemoryBackend {
    fn index_exists(&self, name: &str) -> Result<bool, BackendError> {
        Ok(self.lock().indices.contains_key(name))
    }

    fn create_index(&self, name: &str, config: &Value) -> Result<(), BackendError> {
        info!("Creating index: {name:?}");
        let mut store = self.lock();
        store.indices.entry(name.to_string()).or_insert_with(|| IndexData {
            config: config.clone(),
            ..IndexData::default()
        });
        Ok(())
    }

    fn upsert(&self, name: &str, id: &str, doc: Value) -> Result<(), BackendError> {
        let mut store = self.lock();
        let index = store
            .indices
            .get_mut(name)
            .ok_or_else(|| BackendError::IndexMissing(name.to_string()))?;
        index.pending.insert(id.to_string(), doc);
        Ok(())
    }

    fn delete(&self, name: &str, id: &str) -> Result<(), BackendError> {
        let mut store = self.lock();
        let index = store
            .indices
            .get_mut(name)
            .ok_or_else(|| BackendError::IndexMissing(name.to_string()))?;
        index.pending.remove(id);
        index.docs.remove(id);
        self.snapshot(&store)
    }

    fn refresh(&self, name: &str) -> Result<(), BackendError> {
        let mut store = self.lock();
        let index = store
            .indices
            .get_mut(name)
            .ok_or_else(|| BackendError::IndexMissing(name.to_string()))?;
        let pending = std::mem::take(&mut index.pending);
        index.docs.extend(pending);
        self.snapshot(&store)
    }

    fn count(&self, name: &str) -> Result<usize, BackendError> {
        let store = self.lock();
        let index = store
            .indices
            .get(name)
            .ok_or_else(|| BackendError::IndexMissing(name.to_string()))?;
        Ok(index.docs.len())
    }

    fn search(&self, name: &str, query: &Query, limit: usize) -> Result<Vec<Hit>, BackendError> {
        let store = self.lock();
        let index = store
            .indices
            .get(name)
            .ok_or_else(|| BackendError::IndexMissing(name.to_string()))?;

        let mut hits: Vec<Hit> = Vec::new();
        for (id, doc) in &index.docs {
            if !query
                .filter
                .iter()
                .all(|c| field_matches(doc, &c.field, &c.value))
            {
                continue;
            }

            let matched = query
                .should
                .iter()
                .filter(|c| field_matches(doc, &c.field, &c.value))
                .count();
            if !query.should.is_empty() && matched == 0 {
                continue;
            }

            #[allow(clippy::cast_precision_loss)]
            let score = matched as f64;
            hits.push(Hit {
                id: id.clone(),
                score,
                source: doc.clone(),
            });
        }

        // Ranked by score; ties keep the deterministic id order of the scan
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }
}
