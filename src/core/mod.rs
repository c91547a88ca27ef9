//! Core data types for case submissions and canonical patients.

pub mod patient;

/// Versioned vendor media type of the match API
pub const API_MIME_TYPE: &str = "application/vnd.ga4gh.matchmaker.v1.0+json";

pub use patient::{
    Contact, GeneRef, GenomicFeature, MatchRequest, Patient, PatientError, PatientSubmission,
    PhenotypeFeature,
};
