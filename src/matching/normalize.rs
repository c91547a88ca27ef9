//! Case normalization: resolve submitted phenotype and gene references and
//! derive the matching sets.
//!
//! Resolution is permissive by design: a reference that cannot be uniquely
//! resolved stays in the canonical form as submitted but contributes nothing
//! to `phenotype_closure`/`gene_set`. Availability is favored over strict
//! completeness; the resolving stores log each failure.

use std::collections::BTreeSet;

use thiserror::Error;
use tracing::debug;

use crate::core::patient::{Patient, PatientSubmission};
use crate::genes::GeneRegistry;
use crate::ontology::OntologyStore;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("patient must have at least one phenotype or genomic feature")]
    NoFeatures,
}

/// Outcome of resolving one submitted reference
enum Resolution<T> {
    Resolved(T),
    Unresolved,
}

/// Normalizes raw submissions against explicit collaborator handles.
pub struct Normalizer<'a> {
    ontology: &'a OntologyStore,
    genes: &'a GeneRegistry,
}

impl<'a> Normalizer<'a> {
    pub fn new(ontology: &'a OntologyStore, genes: &'a GeneRegistry) -> Self {
        Self { ontology, genes }
    }

    /// Convert a raw submission into canonical form.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::NoFeatures` if the submission carries
    /// neither phenotype nor genomic features.
    pub fn normalize(&self, mut raw: PatientSubmission) -> Result<Patient, ValidationError> {
        if raw.features.is_empty() && raw.genomic_features.is_empty() {
            return Err(ValidationError::NoFeatures);
        }

        let mut phenotype_closure = BTreeSet::new();
        for feature in &mut raw.features {
            match self.resolve_term(&mut feature.id, &mut feature.label) {
                Resolution::Resolved(closure) => {
                    if feature.observed {
                        phenotype_closure.extend(closure);
                    }
                }
                Resolution::Unresolved => {}
            }
            self.canonicalize_onset(&mut feature.age_of_onset);
        }
        self.canonicalize_onset(&mut raw.age_of_onset);

        let mut gene_set = BTreeSet::new();
        for genomic in &mut raw.genomic_features {
            let Some(gene) = genomic.gene.as_mut() else {
                continue;
            };
            match self.genes.resolve(&gene.id) {
                Some(record) => {
                    gene.id = record.id.clone();
                    if record.name.is_some() {
                        gene.label = record.name;
                    }
                    gene_set.insert(record.id);
                }
                None => debug!("Keeping unresolved gene reference: {:?}", gene.id),
            }
        }

        Ok(Patient {
            submission: raw,
            phenotype_closure,
            gene_set,
        })
    }

    /// Resolve a phenotype term id in place, returning its closure
    fn resolve_term(
        &self,
        id: &mut String,
        label: &mut Option<String>,
    ) -> Resolution<BTreeSet<String>> {
        match self.ontology.get_term(id) {
            Some(term) => {
                *id = term.id;
                if let Some(name) = term.name {
                    *label = Some(name);
                }
                Resolution::Resolved(term.closure)
            }
            None => {
                debug!("Keeping unresolved phenotype reference: {id:?}");
                Resolution::Unresolved
            }
        }
    }

    /// Rewrite an onset term to its canonical id when it resolves
    fn canonicalize_onset(&self, onset: &mut Option<String>) {
        if let Some(id) = onset.as_mut() {
            if let Some(term) = self.ontology.get_term(id) {
                *id = term.id;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use serde_json::json;
    use std::sync::Arc;

    const ONTOLOGY: &str = "\
[Term]
id: HP:0000001
name: All

[Term]
id: HP:0000118
name: Phenotypic abnormality
is_a: HP:0000001

[Term]
id: HP:0000240
name: Abnormality of skull size
is_a: HP:0000118

[Term]
id: HP:0000252
name: Microcephaly
alt_id: HP:0005484
is_a: HP:0000240

[Term]
id: HP:0003577
name: Congenital onset
";

    const GENES: &str = "HGNC ID\tApproved Symbol\tApproved Name\tPrevious Symbols\tSynonyms\tEntrez Gene ID(supplied by NCBI)\tEnsembl ID(supplied by Ensembl)\n\
HGNC:17646\tNGLY1\tN-glycanase 1\tCDG1V\tCDDG, PNG1\t55768\tENSG00000151092\n";

    fn fixtures() -> (OntologyStore, GeneRegistry) {
        let backend = Arc::new(MemoryBackend::new());
        let ontology = OntologyStore::new(backend.clone());
        ontology.ingest_reader(ONTOLOGY.as_bytes()).unwrap();
        let genes = GeneRegistry::new(backend);
        genes.ingest_reader(GENES.as_bytes()).unwrap();
        (ontology, genes)
    }

    fn submission(value: serde_json::Value) -> PatientSubmission {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_normalize_derives_closure_and_genes() {
        let (ontology, genes) = fixtures();
        let normalizer = Normalizer::new(&ontology, &genes);

        let patient = normalizer
            .normalize(submission(json!({
                "id": "P0001",
                "contact": {"name": "First Last", "href": "mailto:fl@example.com"},
                "features": [{"id": "HP:0000252"}],
                "genomicFeatures": [{"gene": {"id": "NGLY1"}}],
            })))
            .unwrap();

        assert!(patient.phenotype_closure.contains("HP:0000252"));
        assert!(patient.phenotype_closure.contains("HP:0000118"));
        assert!(patient.phenotype_closure.contains("HP:0000001"));
        assert_eq!(
            patient.gene_set.iter().collect::<Vec<_>>(),
            vec!["ENSG00000151092"]
        );
        // Canonical form carries resolved ids and labels
        assert_eq!(patient.submission.genomic_features[0].gene.as_ref().unwrap().id, "ENSG00000151092");
        assert_eq!(
            patient.submission.features[0].label.as_deref(),
            Some("Microcephaly")
        );
    }

    #[test]
    fn test_alt_id_rewritten_to_canonical() {
        let (ontology, genes) = fixtures();
        let normalizer = Normalizer::new(&ontology, &genes);

        let patient = normalizer
            .normalize(submission(json!({
                "id": "P0002",
                "contact": {"name": "First Last", "href": "mailto:fl@example.com"},
                "features": [{"id": "HP:0005484"}],
            })))
            .unwrap();

        assert_eq!(patient.submission.features[0].id, "HP:0000252");
    }

    #[test]
    fn test_unobserved_feature_excluded_from_closure() {
        let (ontology, genes) = fixtures();
        let normalizer = Normalizer::new(&ontology, &genes);

        let patient = normalizer
            .normalize(submission(json!({
                "id": "P0003",
                "contact": {"name": "First Last", "href": "mailto:fl@example.com"},
                "features": [{"id": "HP:0000252", "observed": false}],
            })))
            .unwrap();

        assert!(patient.phenotype_closure.is_empty());
        // Still present in canonical form
        assert_eq!(patient.submission.features.len(), 1);
    }

    #[test]
    fn test_unresolved_references_retained_but_excluded() {
        let (ontology, genes) = fixtures();
        let normalizer = Normalizer::new(&ontology, &genes);

        let patient = normalizer
            .normalize(submission(json!({
                "id": "P0004",
                "contact": {"name": "First Last", "href": "mailto:fl@example.com"},
                "features": [{"id": "HP:7777777"}, {"id": "HP:0000252"}],
                "genomicFeatures": [{"gene": {"id": "NOSUCHGENE"}}],
            })))
            .unwrap();

        // The unresolved term contributes nothing but stays in the record
        assert!(!patient.phenotype_closure.contains("HP:7777777"));
        assert!(patient.phenotype_closure.contains("HP:0000252"));
        assert_eq!(patient.submission.features[0].id, "HP:7777777");
        assert!(patient.gene_set.is_empty());
        assert_eq!(
            patient.submission.genomic_features[0].gene.as_ref().unwrap().id,
            "NOSUCHGENE"
        );
    }

    #[test]
    fn test_onset_terms_canonicalized() {
        let (ontology, genes) = fixtures();
        let normalizer = Normalizer::new(&ontology, &genes);

        let patient = normalizer
            .normalize(submission(json!({
                "id": "P0005",
                "contact": {"name": "First Last", "href": "mailto:fl@example.com"},
                "ageOfOnset": "HP:0003577",
                "features": [{"id": "HP:0000252", "ageOfOnset": "HP:0003577"}],
            })))
            .unwrap();

        assert_eq!(patient.submission.age_of_onset.as_deref(), Some("HP:0003577"));
        assert_eq!(
            patient.submission.features[0].age_of_onset.as_deref(),
            Some("HP:0003577")
        );
    }

    #[test]
    fn test_empty_submission_rejected() {
        let (ontology, genes) = fixtures();
        let normalizer = Normalizer::new(&ontology, &genes);

        let result = normalizer.normalize(submission(json!({
            "id": "P0006",
            "contact": {"name": "First Last", "href": "mailto:fl@example.com"},
        })));
        assert!(matches!(result, Err(ValidationError::NoFeatures)));
    }

    #[test]
    fn test_round_trip_preserves_derived_sets() {
        let (ontology, genes) = fixtures();
        let normalizer = Normalizer::new(&ontology, &genes);

        let patient = normalizer
            .normalize(submission(json!({
                "id": "P0007",
                "contact": {"name": "First Last", "href": "mailto:fl@example.com"},
                "features": [{"id": "HP:0000252"}],
                "genomicFeatures": [{"gene": {"id": "PNG1"}}],
            })))
            .unwrap();

        let restored = Patient::from_index(&patient.to_index().unwrap()).unwrap();
        assert_eq!(restored.phenotype_closure, patient.phenotype_closure);
        assert_eq!(restored.gene_set, patient.gene_set);
    }
}
