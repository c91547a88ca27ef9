//! The service context: every component handle, constructed once at startup
//! over a single backend and passed down by reference.

use std::sync::Arc;

use crate::backend::SearchBackend;
use crate::genes::GeneRegistry;
use crate::matching::MatchIndex;
use crate::ontology::OntologyStore;
use crate::trust::TrustRegistry;

/// Handles to all persistent components.
#[derive(Clone)]
pub struct Services {
    pub ontology: OntologyStore,
    pub genes: GeneRegistry,
    pub patients: MatchIndex,
    pub servers: TrustRegistry,
}

impl Services {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self {
            ontology: OntologyStore::new(backend.clone()),
            genes: GeneRegistry::new(backend.clone()),
            patients: MatchIndex::new(backend.clone()),
            servers: TrustRegistry::new(backend),
        }
    }
}
