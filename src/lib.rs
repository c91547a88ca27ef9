//! # pheno-match
//!
//! A library implementing the core of a federated rare-disease
//! patient-matching protocol.
//!
//! Clinical case submissions name phenotypes and candidate genes using a mix
//! of current ids, retired ids, and informal aliases. `pheno-match`
//! normalizes each submission against an ontology (expanding observed
//! phenotypes into their full ancestor closure) and a gene-alias crosswalk,
//! ranks candidate matches from the corpus of previously submitted cases,
//! and can fan a query out across a trust-managed network of partner
//! servers.
//!
//! ## Features
//!
//! - **Ontology closures**: observed phenotypes match through their
//!   transitive is-a ancestors, not just exact term ids
//! - **Alias resolution**: any accepted gene alias resolves to one canonical
//!   id; ambiguous references are dropped from scoring, never fatal
//! - **Ranked matching**: relevance scores from the backing index engine,
//!   renormalized onto `[0, 1)` so they compare across servers
//! - **Trust registry**: per-partner shared-secret credentials, keyed by
//!   identity and traffic direction
//! - **Isolated fan-out**: bounded concurrency, per-call timeouts, and an
//!   overall batch deadline; one slow partner cannot stall the rest
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use pheno_match::backend::MemoryBackend;
//! use pheno_match::matching::Normalizer;
//! use pheno_match::services::Services;
//!
//! let services = Services::new(Arc::new(MemoryBackend::new()));
//! services.ontology.ingest_file(Path::new("hp.obo")).unwrap();
//! services.genes.ingest_file(Path::new("genes.tsv")).unwrap();
//!
//! let normalizer = Normalizer::new(&services.ontology, &services.genes);
//! let submission = serde_json::from_str(r#"{
//!     "id": "P0001",
//!     "contact": {"name": "First Last", "href": "mailto:fl@example.com"},
//!     "features": [{"id": "HP:0000252"}],
//!     "genomicFeatures": [{"gene": {"id": "NGLY1"}}]
//! }"#).unwrap();
//!
//! let patient = normalizer.normalize(submission).unwrap();
//! let matches = services.patients
//!     .query(&patient.phenotype_closure, &patient.gene_set, 5)
//!     .unwrap();
//! for m in matches {
//!     println!("{}: {:.3}", m.patient.id(), m.score);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`backend`]: narrow interface to the index/storage engine
//! - [`core`]: wire-format and canonical patient types
//! - [`ontology`]: ontology ingestion and ancestor closures
//! - [`genes`]: gene-alias crosswalk and canonical-id resolution
//! - [`matching`]: normalization, the match index, and scoring
//! - [`trust`]: partner trust registry
//! - [`federation`]: concurrent fan-out across partner servers
//! - [`web`]: the match API server
//! - [`cli`]: command-line interface implementation

pub mod backend;
pub mod cli;
pub mod core;
pub mod federation;
pub mod genes;
pub mod matching;
pub mod ontology;
pub mod services;
pub mod trust;
pub mod web;

// Re-export commonly used types for convenience
pub use backend::{MemoryBackend, SearchBackend};
pub use core::patient::{Patient, PatientSubmission};
pub use federation::{FederationProxy, PartnerFailure};
pub use matching::{MatchIndex, MatchResult, Normalizer};
pub use ontology::OntologyStore;
pub use services::Services;
pub use trust::{Direction, PartnerServer, TrustRegistry};
