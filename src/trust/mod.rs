//! Partner trust registry: per-partner credentials keyed by identity and
//! traffic direction, persisted in the `servers` index.

use std::fmt;
use std::sync::Arc;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, info};

use crate::backend::{BackendError, Query, SearchBackend};

/// Index holding trust entries
pub const SERVER_INDEX: &str = "servers";

/// Traffic direction a trust entry applies to.
///
/// `In`: the partner may send requests to this server. `Out`: this server
/// may send requests to the partner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::In => write!(f, "in"),
            Self::Out => write!(f, "out"),
        }
    }
}

/// One registered partner credential
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartnerServer {
    pub server_id: String,

    /// Display name; defaults to the server id
    pub server_label: String,

    /// Shared secret attached to (Out) or verified on (In) requests
    pub server_key: String,

    pub direction: Direction,

    /// Where to send match requests; required for Out entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    pub created_at: String,
}

#[derive(Error, Debug)]
pub enum TrustError {
    #[error("base URL must start with \"https://\": {0:?}")]
    InsecureBaseUrl(String),

    #[error("base URL must be specified for outgoing partners")]
    MissingBaseUrl,

    #[error("found two or more trust entries for {server_id:?} ({direction})")]
    DuplicateEntries {
        server_id: String,
        direction: Direction,
    },

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// A request to authorize (or re-authorize) one partner
#[derive(Debug, Clone)]
pub struct AddPartner {
    pub server_id: String,
    pub direction: Direction,
    /// Generated securely when omitted
    pub key: Option<String>,
    pub label: Option<String>,
    pub base_url: Option<String>,
}

/// Handle to the trust-entry index.
#[derive(Clone)]
pub struct TrustRegistry {
    backend: Arc<dyn SearchBackend>,
}

impl TrustRegistry {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self { backend }
    }

    fn index_config() -> Value {
        json!({
            "properties": {
                "server_id": {"type": "keyword"},
                "server_label": {"type": "keyword"},
                "server_key": {"type": "keyword"},
                "direction": {"type": "keyword"},
                "base_url": {"type": "keyword"},
            }
        })
    }

    /// Authorize a partner, updating in place when an entry for the same
    /// (server id, direction) already exists.
    ///
    /// # Errors
    ///
    /// Returns `TrustError::MissingBaseUrl`/`InsecureBaseUrl` for invalid
    /// outbound configuration, and `TrustError::DuplicateEntries` when the
    /// registry already holds more than one matching entry — a consistency
    /// violation that is never silently resolved.
    pub fn add(&self, request: AddPartner) -> Result<PartnerServer, TrustError> {
        if request.direction == Direction::Out {
            let base_url = request.base_url.as_deref().ok_or(TrustError::MissingBaseUrl)?;
            if !base_url.starts_with("https://") {
                return Err(TrustError::InsecureBaseUrl(base_url.to_string()));
            }
        }

        self.backend.ensure_index(SERVER_INDEX, &Self::index_config())?;

        let existing = self.find(&request.server_id, request.direction)?;
        if existing.len() > 1 {
            return Err(TrustError::DuplicateEntries {
                server_id: request.server_id,
                direction: request.direction,
            });
        }

        let entry = PartnerServer {
            server_label: request.label.unwrap_or_else(|| request.server_id.clone()),
            server_key: request.key.unwrap_or_else(generate_key),
            server_id: request.server_id,
            direction: request.direction,
            base_url: request.base_url,
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        let doc_id = existing
            .first()
            .map_or_else(random_doc_id, |hit| hit.id.clone());
        let doc = serde_json::to_value(&entry)
            .map_err(|e| TrustError::Backend(BackendError::Parse(e)))?;
        self.backend.upsert(SERVER_INDEX, &doc_id, doc)?;
        // Refresh so the authorization is immediately usable
        self.backend.refresh(SERVER_INDEX)?;

        info!(
            "Authorized partner {:?} ({})",
            entry.server_id, entry.direction
        );
        Ok(entry)
    }

    /// Delete every entry matching (server id, direction); returns how many
    /// were removed.
    ///
    /// # Errors
    ///
    /// Returns `TrustError::Backend` on storage failures.
    pub fn remove(&self, server_id: &str, direction: Direction) -> Result<usize, TrustError> {
        if !self.backend.index_exists(SERVER_INDEX)? {
            return Ok(0);
        }

        let hits = self.find(server_id, direction)?;
        let n = hits.len();
        for hit in hits {
            self.backend.delete(SERVER_INDEX, &hit.id)?;
            info!("Deleted partner {server_id:?} ({direction})");
        }
        self.backend.refresh(SERVER_INDEX)?;
        Ok(n)
    }

    /// All entries for the given direction.
    ///
    /// # Errors
    ///
    /// Returns `TrustError::Backend` on storage failures.
    pub fn list(&self, direction: Direction) -> Result<Vec<PartnerServer>, TrustError> {
        if !self.backend.index_exists(SERVER_INDEX)? {
            return Ok(Vec::new());
        }

        let query = Query::new().filter("direction", direction.to_string());
        let hits = self.backend.search(SERVER_INDEX, &query, usize::MAX)?;
        Ok(hits
            .iter()
            .filter_map(|hit| serde_json::from_value(hit.source.clone()).ok())
            .collect())
    }

    /// Look up the inbound entry whose secret key matches `token`.
    ///
    /// Key uniqueness across entries is not enforced; if several inbound
    /// entries share a key, the first match wins.
    #[must_use]
    pub fn verify(&self, token: &str) -> Option<PartnerServer> {
        if token.is_empty() {
            return None;
        }
        match self.backend.index_exists(SERVER_INDEX) {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => {
                error!("Trust lookup failed: {e}");
                return None;
            }
        }

        let query = Query::new()
            .filter("server_key", token)
            .filter("direction", "in");
        match self.backend.search(SERVER_INDEX, &query, 1) {
            Ok(hits) => hits
                .first()
                .and_then(|hit| serde_json::from_value(hit.source.clone()).ok()),
            Err(e) => {
                error!("Trust lookup failed: {e}");
                None
            }
        }
    }

    fn find(
        &self,
        server_id: &str,
        direction: Direction,
    ) -> Result<Vec<crate::backend::Hit>, TrustError> {
        let query = Query::new()
            .filter("server_id", server_id)
            .filter("direction", direction.to_string());
        Ok(self.backend.search(SERVER_INDEX, &query, usize::MAX)?)
    }
}

/// 30 random bytes, hex encoded
fn generate_key() -> String {
    let mut bytes = [0u8; 30];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn random_doc_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
