//! Gene registry: alias-to-canonical-id resolution over the `genes` index.

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{error, info};

use crate::backend::{BackendError, Query, SearchBackend};
use crate::genes::table::{parse_table, ParseError, GENE_COLUMNS};

/// Index holding gene crosswalk records
pub const GENE_INDEX: &str = "genes";

#[derive(thiserror::Error, Debug)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid gene crosswalk: {0}")]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// A resolved gene: the canonical id and its approved name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneRecord {
    pub id: String,
    pub name: Option<String>,
}

/// Handle to the gene crosswalk index.
///
/// Like the ontology, ingestion parses the whole source before committing,
/// so a malformed file never leaves a partially-built registry behind.
#[derive(Clone)]
pub struct GeneRegistry {
    backend: Arc<dyn SearchBackend>,
}

impl GeneRegistry {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self { backend }
    }

    fn index_config() -> Value {
        json!({
            "properties": {
                "id": {"type": "keyword"},
                "name": {"type": "text"},
                "alt_id": {"type": "keyword"},
            }
        })
    }

    /// Ingest a gene crosswalk file.
    ///
    /// # Errors
    ///
    /// Returns `IngestError` if the file cannot be read or parsed; nothing
    /// is committed in that case.
    pub fn ingest_file(&self, path: &Path) -> Result<usize, IngestError> {
        info!("Parsing gene crosswalk from: {path:?}");
        let file = std::fs::File::open(path)?;
        self.ingest_reader(std::io::BufReader::new(file))
    }

    /// Ingest a gene crosswalk from any buffered reader.
    ///
    /// # Errors
    ///
    /// Returns `IngestError` on malformed input; nothing is committed.
    pub fn ingest_reader(&self, reader: impl BufRead) -> Result<usize, IngestError> {
        let rows = parse_table(reader, GENE_COLUMNS)?;

        self.backend.ensure_index(GENE_INDEX, &Self::index_config())?;
        for row in &rows {
            let doc = json!({
                "id": row.id,
                "name": row.names,
                "alt_id": row.alt_ids,
            });
            self.backend.upsert(GENE_INDEX, &row.id, doc)?;
        }
        self.backend.refresh(GENE_INDEX)?;

        info!("Indexed {} gene records", rows.len());
        Ok(rows.len())
    }

    /// Resolve any accepted alias (or the canonical id itself) to its gene.
    ///
    /// Exact-string lookup. An alias matching zero or multiple records is an
    /// unresolved lookup, logged and reported as `None`.
    #[must_use]
    pub fn resolve(&self, alias: &str) -> Option<GeneRecord> {
        let query = Query::new().should("id", alias).should("alt_id", alias);
        let hits = match self.backend.search(GENE_INDEX, &query, 2) {
            Ok(hits) => hits,
            Err(e) => {
                error!("Gene lookup failed for {alias:?}: {e}");
                return None;
            }
        };

        if hits.len() == 1 {
            let source = &hits[0].source;
            Some(GeneRecord {
                id: source.get("id")?.as_str()?.to_string(),
                name: source
                    .get("name")
                    .and_then(Value::as_array)
                    .and_then(|names| names.first())
                    .and_then(Value::as_str)
                    .map(String::from),
            })
        } else {
            error!("Unable to uniquely resolve gene: {alias:?}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    const HEADER: &str = "HGNC ID\tApproved Symbol\tApproved Name\tPrevious Symbols\tSynonyms\tEntrez Gene ID(supplied by NCBI)\tEnsembl ID(supplied by Ensembl)";

    fn registry_with(rows: &str) -> GeneRegistry {
        let registry = GeneRegistry::new(Arc::new(MemoryBackend::new()));
        let text = format!("{HEADER}\n{rows}");
        registry.ingest_reader(text.as_bytes()).unwrap();
        registry
    }

    #[test]
    fn test_resolve_by_symbol_and_aliases() {
        let registry = registry_with(
            "HGNC:17646\tNGLY1\tN-glycanase 1\tCDG1V\tCDDG, PNG1\t55768\tENSG00000151092\n",
        );

        for alias in ["NGLY1", "CDG1V", "PNG1", "NCBIGene:55768", "HGNC:17646", "ENSG00000151092"] {
            let record = registry.resolve(alias).unwrap();
            assert_eq!(record.id, "ENSG00000151092");
            assert_eq!(record.name.as_deref(), Some("N-glycanase 1"));
        }
    }

    #[test]
    fn test_unknown_alias_is_none() {
        let registry = registry_with(
            "HGNC:17646\tNGLY1\tN-glycanase 1\t\t\t55768\tENSG00000151092\n",
        );
        assert!(registry.resolve("NOPE1").is_none());
    }

    #[test]
    fn test_ambiguous_alias_is_none() {
        let registry = registry_with(
            "HGNC:1\tGENE1\tfirst gene\tSHARED\t\t\tENSG00000000001\n\
             HGNC:2\tGENE2\tsecond gene\tSHARED\t\t\tENSG00000000002\n",
        );
        assert!(registry.resolve("SHARED").is_none());
        assert!(registry.resolve("GENE1").is_some());
    }

    #[test]
    fn test_nothing_committed_on_parse_error() {
        let registry = GeneRegistry::new(Arc::new(MemoryBackend::new()));
        let text = format!("{HEADER}\nHGNC:1\tGENE1\tbad\t\t\t\tENS_TOO_SHORT\n");
        assert!(registry.ingest_reader(text.as_bytes()).is_err());
        assert!(registry.resolve("GENE1").is_none());
    }
}
