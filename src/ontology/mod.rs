//! Ontology ingestion, ancestor closures, and term resolution.

pub mod obo;
pub mod store;

pub use store::{IngestError, OntologyStore, Term, TERM_INDEX};
