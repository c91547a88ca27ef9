//! Wire-format case submission types and the canonical patient form.
//!
//! The wire structs mirror the JSON API exactly (camelCase fields); unknown
//! submission fields are carried through `extra` maps so a canonicalized
//! patient round-trips everything the submitter sent.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PatientError {
    #[error("invalid persisted patient record: {0}")]
    InvalidRecord(String),

    #[error("failed to decode patient: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Who to get in touch with about a case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,

    /// Contact method, e.g. a `mailto:` or institutional URL
    pub href: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub institution: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One submitted phenotype observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhenotypeFeature {
    /// Ontology term id as submitted; rewritten to the canonical id when
    /// the term resolves
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Absent means observed
    #[serde(default = "default_observed", skip_serializing_if = "is_true")]
    pub observed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_of_onset: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

const fn default_observed() -> bool {
    true
}

#[allow(clippy::trivially_copy_pass_by_ref)] // signature dictated by serde
fn is_true(v: &bool) -> bool {
    *v
}

/// A candidate gene reference within a genomic feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneRef {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One submitted genomic finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenomicFeature {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gene: Option<GeneRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zygosity: Option<Value>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A case submission as it appears on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientSubmission {
    pub id: String,

    pub contact: Contact,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_of_onset: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<PhenotypeFeature>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub genomic_features: Vec<GenomicFeature>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disorders: Vec<Value>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub test: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The top-level match request envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRequest {
    pub patient: PatientSubmission,
}

/// A canonicalized patient: the normalized submission plus the derived sets
/// used for matching.
#[derive(Debug, Clone, PartialEq)]
pub struct Patient {
    /// Canonical form of the submission (resolved ids and labels)
    pub submission: PatientSubmission,

    /// Union of ancestor closures over observed, resolved phenotype features
    pub phenotype_closure: BTreeSet<String>,

    /// Canonical ids of resolved candidate genes
    pub gene_set: BTreeSet<String>,
}

impl Patient {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.submission.id
    }

    /// The persisted form: `{phenotype, gene, doc}`.
    ///
    /// # Errors
    ///
    /// Returns `PatientError::Decode` if the submission cannot be
    /// serialized (it always can for values built from valid JSON).
    pub fn to_index(&self) -> Result<Value, PatientError> {
        Ok(json!({
            "phenotype": self.phenotype_closure.iter().collect::<Vec<_>>(),
            "gene": self.gene_set.iter().collect::<Vec<_>>(),
            "doc": serde_json::to_value(&self.submission)?,
        }))
    }

    /// Rebuild a patient from its persisted form.
    ///
    /// # Errors
    ///
    /// Returns `PatientError` if the record is structurally invalid.
    pub fn from_index(record: &Value) -> Result<Self, PatientError> {
        let string_set = |field: &str| -> Result<BTreeSet<String>, PatientError> {
            record
                .get(field)
                .and_then(Value::as_array)
                .ok_or_else(|| PatientError::InvalidRecord(format!("missing {field:?} field")))?
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(String::from)
                        .ok_or_else(|| PatientError::InvalidRecord(format!("non-string {field:?} entry")))
                })
                .collect()
        };

        let doc = record
            .get("doc")
            .ok_or_else(|| PatientError::InvalidRecord("missing \"doc\" field".to_string()))?;
        let submission: PatientSubmission = serde_json::from_value(doc.clone())?;

        Ok(Self {
            submission,
            phenotype_closure: string_set("phenotype")?,
            gene_set: string_set("gene")?,
        })
    }

    /// The canonical wire representation of this patient.
    ///
    /// # Errors
    ///
    /// Returns `PatientError::Decode` if serialization fails.
    pub fn to_wire(&self) -> Result<Value, PatientError> {
        Ok(serde_json::to_value(&self.submission)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observed_defaults_to_true() {
        let feature: PhenotypeFeature =
            serde_json::from_value(json!({"id": "HP:0000252"})).unwrap();
        assert!(feature.observed);

        let feature: PhenotypeFeature =
            serde_json::from_value(json!({"id": "HP:0000252", "observed": false})).unwrap();
        assert!(!feature.observed);
    }

    #[test]
    fn test_unknown_fields_round_trip() {
        let wire = json!({
            "id": "P0001",
            "contact": {"name": "First Last", "href": "mailto:fl@example.com"},
            "inheritanceMode": "HP:0000006",
            "features": [{"id": "HP:0000252", "evidence": "clinical"}],
        });
        let submission: PatientSubmission = serde_json::from_value(wire.clone()).unwrap();
        assert_eq!(
            submission.extra.get("inheritanceMode"),
            Some(&json!("HP:0000006"))
        );

        let back = serde_json::to_value(&submission).unwrap();
        assert_eq!(back.get("inheritanceMode"), wire.get("inheritanceMode"));
        assert_eq!(
            back["features"][0].get("evidence"),
            Some(&json!("clinical"))
        );
    }

    #[test]
    fn test_genomic_feature_type_field() {
        let wire = json!({
            "gene": {"id": "NGLY1"},
            "type": {"id": "SO:0001587", "label": "STOPGAIN"},
            "zygosity": 1,
        });
        let feature: GenomicFeature = serde_json::from_value(wire).unwrap();
        assert_eq!(feature.kind.unwrap()["id"], "SO:0001587");
        assert_eq!(feature.zygosity, Some(json!(1)));
    }

    #[test]
    fn test_index_round_trip() {
        let submission: PatientSubmission = serde_json::from_value(json!({
            "id": "P0001",
            "contact": {"name": "First Last", "href": "mailto:fl@example.com"},
            "features": [{"id": "HP:0000252"}],
        }))
        .unwrap();

        let patient = Patient {
            submission,
            phenotype_closure: ["HP:0000252", "HP:0000001"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            gene_set: ["ENSG00000151092"].iter().map(ToString::to_string).collect(),
        };

        let record = patient.to_index().unwrap();
        let restored = Patient::from_index(&record).unwrap();
        assert_eq!(restored, patient);
    }

    #[test]
    fn test_from_index_rejects_malformed_record() {
        assert!(Patient::from_index(&json!({"phenotype": []})).is_err());
        assert!(Patient::from_index(&json!({
            "phenotype": [], "gene": [42], "doc": {}
        }))
        .is_err());
    }
}
