//! Persisted patient corpus and ranked similarity queries.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::backend::{BackendError, Query, SearchBackend};
use crate::core::patient::{Patient, PatientError, PatientSubmission};
use crate::matching::normalize::{Normalizer, ValidationError};
use crate::matching::scoring::normalize_score;

/// Index holding normalized patient records
pub const PATIENT_INDEX: &str = "patients";

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid patient source: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid patient record: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Patient(#[from] PatientError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// One ranked match from the local corpus
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub patient: Patient,

    /// Renormalized relevance, in `[0, 1)`
    pub score: f64,
}

impl MatchResult {
    /// The wire form: `{score: {patient}, patient}`.
    ///
    /// # Errors
    ///
    /// Returns `PatientError` if the patient cannot be serialized.
    pub fn to_wire(&self) -> Result<Value, PatientError> {
        Ok(json!({
            "score": {"patient": self.score},
            "patient": self.patient.to_wire()?,
        }))
    }
}

/// Handle to the patient corpus.
#[derive(Clone)]
pub struct MatchIndex {
    backend: Arc<dyn SearchBackend>,
}

impl MatchIndex {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self { backend }
    }

    fn index_config() -> Value {
        json!({
            "properties": {
                "phenotype": {"type": "keyword"},
                "gene": {"type": "keyword"},
                "doc": {"type": "object", "enabled": false},
            }
        })
    }

    /// Persist a normalized patient, fully replacing any prior snapshot
    /// under the same id.
    ///
    /// The new snapshot becomes searchable after the next [`refresh`];
    /// callers must not assume immediate visibility.
    ///
    /// [`refresh`]: MatchIndex::refresh
    ///
    /// # Errors
    ///
    /// Returns `IngestError` if the record cannot be serialized or stored.
    pub fn upsert(&self, patient: &Patient) -> Result<(), IngestError> {
        self.backend.ensure_index(PATIENT_INDEX, &Self::index_config())?;
        self.backend
            .upsert(PATIENT_INDEX, patient.id(), patient.to_index()?)?;
        info!("Indexed patient: {:?}", patient.id());
        Ok(())
    }

    /// Make pending upserts searchable.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` on storage failures.
    pub fn refresh(&self) -> Result<(), BackendError> {
        self.backend.refresh(PATIENT_INDEX)
    }

    /// Number of searchable patient records.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` on storage failures.
    pub fn count(&self) -> Result<usize, BackendError> {
        self.backend.count(PATIENT_INDEX)
    }

    /// Populate the corpus from a JSON file holding an array of wire-format
    /// patients, normalizing each through `normalizer`.
    ///
    /// # Errors
    ///
    /// Returns `IngestError` if the file cannot be read or parsed, or if a
    /// record fails validation.
    pub fn ingest_file(&self, path: &Path, normalizer: &Normalizer<'_>) -> Result<usize, IngestError> {
        info!("Loading patient records from: {path:?}");
        let content = std::fs::read_to_string(path)?;
        let records: Vec<PatientSubmission> = serde_json::from_str(&content)?;

        for record in records {
            let patient = normalizer.normalize(record)?;
            self.upsert(&patient)?;
        }

        self.refresh()?;
        let n = self.count()?;
        info!("Corpus now contains {n} patient records");
        Ok(n)
    }

    /// Rank the corpus against a phenotype closure and candidate gene set.
    ///
    /// Builds a boolean-OR query across the phenotype and gene fields,
    /// takes the engine's top `limit` hits, and renormalizes each raw
    /// relevance score onto `[0, 1)`. Equal scores keep the engine's
    /// ordering.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the query cannot be executed.
    pub fn query(
        &self,
        phenotypes: &BTreeSet<String>,
        genes: &BTreeSet<String>,
        limit: usize,
    ) -> Result<Vec<MatchResult>, BackendError> {
        if !self.backend.index_exists(PATIENT_INDEX)? {
            return Ok(Vec::new());
        }

        let mut query = Query::new();
        for term in phenotypes {
            query = query.should("phenotype", term);
        }
        for gene in genes {
            query = query.should("gene", gene);
        }

        let hits = self.backend.search(PATIENT_INDEX, &query, limit)?;

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            match Patient::from_index(&hit.source) {
                Ok(patient) => results.push(MatchResult {
                    patient,
                    score: normalize_score(hit.score),
                }),
                Err(e) => warn!("Skipping unreadable patient record {:?}: {e}", hit.id),
            }
        }

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::genes::GeneRegistry;
    use crate::ontology::OntologyStore;
    use serde_json::json;

    const ONTOLOGY: &str = "\
[Term]
id: HP:0000001
name: All

[Term]
id: HP:0000118
name: Phenotypic abnormality
is_a: HP:0000001

[Term]
id: HP:0000252
name: Microcephaly
is_a: HP:0000118

[Term]
id: HP:0000522
name: Alacrima
is_a: HP:0000118
";

    const GENES: &str = "HGNC ID\tApproved Symbol\tApproved Name\tPrevious Symbols\tSynonyms\tEntrez Gene ID(supplied by NCBI)\tEnsembl ID(supplied by Ensembl)\n\
HGNC:17646\tNGLY1\tN-glycanase 1\tCDG1V\tCDDG, PNG1\t55768\tENSG00000151092\n\
HGNC:3477\tEFTUD2\telongation factor Tu GTP binding domain containing 2\t\t\t9343\tENSG00000108883\n";

    struct Fixture {
        ontology: OntologyStore,
        genes: GeneRegistry,
        index: MatchIndex,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(MemoryBackend::new());
        let ontology = OntologyStore::new(backend.clone());
        ontology.ingest_reader(ONTOLOGY.as_bytes()).unwrap();
        let genes = GeneRegistry::new(backend.clone());
        genes.ingest_reader(GENES.as_bytes()).unwrap();
        let index = MatchIndex::new(backend);
        Fixture { ontology, genes, index }
    }

    fn wire_patient(id: &str, term: &str, gene: &str) -> PatientSubmission {
        serde_json::from_value(json!({
            "id": id,
            "contact": {"name": "First Last", "href": "mailto:fl@example.com"},
            "features": [{"id": term}],
            "genomicFeatures": [{"gene": {"id": gene}}],
        }))
        .unwrap()
    }

    #[test]
    fn test_query_ranks_by_overlap() {
        let f = fixture();
        let normalizer = Normalizer::new(&f.ontology, &f.genes);

        for (id, term, gene) in [
            ("close", "HP:0000252", "NGLY1"),
            ("related", "HP:0000522", "EFTUD2"),
        ] {
            let patient = normalizer.normalize(wire_patient(id, term, gene)).unwrap();
            f.index.upsert(&patient).unwrap();
        }
        f.index.refresh().unwrap();

        let query = normalizer
            .normalize(wire_patient("query", "HP:0000252", "NGLY1"))
            .unwrap();
        let results = f
            .index
            .query(&query.phenotype_closure, &query.gene_set, 10)
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].patient.id(), "close");
        assert!(results[0].score > results[1].score);
        for result in &results {
            assert!(result.score > 0.0 && result.score < 1.0);
        }
    }

    #[test]
    fn test_upsert_replaces_snapshot() {
        let f = fixture();
        let normalizer = Normalizer::new(&f.ontology, &f.genes);

        let first = normalizer
            .normalize(wire_patient("p1", "HP:0000252", "NGLY1"))
            .unwrap();
        f.index.upsert(&first).unwrap();
        f.index.refresh().unwrap();

        let second = normalizer
            .normalize(wire_patient("p1", "HP:0000522", "EFTUD2"))
            .unwrap();
        f.index.upsert(&second).unwrap();
        f.index.refresh().unwrap();

        assert_eq!(f.index.count().unwrap(), 1);
        let results = f
            .index
            .query(&second.phenotype_closure, &second.gene_set, 10)
            .unwrap();
        assert!(results[0]
            .patient
            .gene_set
            .contains("ENSG00000108883"));
    }

    #[test]
    fn test_query_empty_corpus() {
        let f = fixture();
        let results = f
            .index
            .query(&BTreeSet::new(), &BTreeSet::new(), 10)
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_ingest_file() {
        let f = fixture();
        let normalizer = Normalizer::new(&f.ontology, &f.genes);

        let records = json!([
            {
                "id": "P0001",
                "contact": {"name": "First Last", "href": "mailto:fl@example.com"},
                "features": [{"id": "HP:0000252"}],
            },
            {
                "id": "P0002",
                "contact": {"name": "First Last", "href": "mailto:fl@example.com"},
                "genomicFeatures": [{"gene": {"id": "NGLY1"}}],
            },
        ]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patients.json");
        std::fs::write(&path, records.to_string()).unwrap();

        let n = f.index.ingest_file(&path, &normalizer).unwrap();
        assert_eq!(n, 2);
    }
}
