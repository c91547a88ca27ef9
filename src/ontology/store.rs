//! Ontology term store: ingestion, ancestor closures, and term resolution.

use std::collections::{BTreeMap, BTreeSet};
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::backend::{BackendError, Query, SearchBackend};
use crate::ontology::obo::{ParseError, Parser, Stanza};

/// Index holding ontology terms
pub const TERM_INDEX: &str = "hpo";

#[derive(thiserror::Error, Debug)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid ontology source: {0}")]
    Parse(#[from] ParseError),

    #[error("term stanza without an id tag")]
    MissingId,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// An ontology term with its precomputed ancestor closure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    pub id: String,
    pub name: Option<String>,
    pub synonyms: Vec<String>,
    pub alt_ids: Vec<String>,
    pub parents: Vec<String>,

    /// The term itself plus all transitive is-a ancestors
    pub closure: BTreeSet<String>,
}

impl Term {
    fn to_doc(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name.as_deref().map_or_else(Vec::new, |n| vec![n]),
            "synonym": self.synonyms,
            "alt_id": self.alt_ids,
            "is_a": self.parents,
            "term_category": self.closure.iter().collect::<Vec<_>>(),
        })
    }

    fn from_doc(doc: &Value) -> Option<Self> {
        let strings = |field: &str| -> Vec<String> {
            doc.get(field)
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default()
        };

        Some(Self {
            id: doc.get("id")?.as_str()?.to_string(),
            name: strings("name").into_iter().next(),
            synonyms: strings("synonym"),
            alt_ids: strings("alt_id"),
            parents: strings("is_a"),
            closure: strings("term_category").into_iter().collect(),
        })
    }
}

/// Handle to the ontology term index.
///
/// Ingestion is a batch operation: the whole source is parsed and closed
/// before anything is committed, so a malformed file never leaves a
/// partially-built ontology behind.
#[derive(Clone)]
pub struct OntologyStore {
    backend: Arc<dyn SearchBackend>,
}

impl OntologyStore {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self { backend }
    }

    fn index_config() -> Value {
        json!({
            "properties": {
                "id": {"type": "keyword"},
                "name": {"type": "text"},
                "synonym": {"type": "text"},
                "alt_id": {"type": "keyword"},
                "is_a": {"type": "keyword"},
                "term_category": {"type": "keyword"},
            }
        })
    }

    /// Ingest an ontology definition file.
    ///
    /// # Errors
    ///
    /// Returns `IngestError` if the file cannot be read or parsed; nothing
    /// is committed in that case.
    pub fn ingest_file(&self, path: &Path) -> Result<usize, IngestError> {
        info!("Parsing ontology from: {path:?}");
        let file = std::fs::File::open(path)?;
        self.ingest_reader(std::io::BufReader::new(file))
    }

    /// Ingest an ontology definition from any buffered reader.
    ///
    /// # Errors
    ///
    /// Returns `IngestError` on malformed input; nothing is committed.
    pub fn ingest_reader(&self, reader: impl BufRead) -> Result<usize, IngestError> {
        let terms = parse_terms(reader)?;

        self.backend.ensure_index(TERM_INDEX, &Self::index_config())?;
        for term in terms.values() {
            self.backend.upsert(TERM_INDEX, &term.id, term.to_doc())?;
        }
        self.backend.refresh(TERM_INDEX)?;

        info!("Indexed {} ontology terms", terms.len());
        Ok(terms.len())
    }

    /// Resolve a term by id or alt-id.
    ///
    /// Returns the term only when exactly one entry matches; zero or
    /// multiple matches is a resolution failure, logged and reported as
    /// `None` so the caller can drop the reference and continue.
    #[must_use]
    pub fn get_term(&self, id: &str) -> Option<Term> {
        let query = Query::new().should("id", id).should("alt_id", id);
        let hits = match self.backend.search(TERM_INDEX, &query, 2) {
            Ok(hits) => hits,
            Err(e) => {
                error!("Term lookup failed for {id:?}: {e}");
                return None;
            }
        };

        if hits.len() == 1 {
            Term::from_doc(&hits[0].source)
        } else {
            error!("Unable to uniquely resolve term: {id:?}");
            None
        }
    }
}

/// Raw stanza fields prior to closure computation
struct ParsedTerm {
    name: Option<String>,
    synonyms: Vec<String>,
    alt_ids: Vec<String>,
    parents: Vec<String>,
}

fn parse_terms(reader: impl BufRead) -> Result<BTreeMap<String, Term>, IngestError> {
    let parser = Parser::new(reader)?;

    let mut parsed: BTreeMap<String, ParsedTerm> = BTreeMap::new();
    for stanza in parser {
        let stanza = stanza?;
        if stanza.name != "Term" {
            continue;
        }
        if stanza.values("is_obsolete").contains(&"true") {
            continue;
        }

        let id = stanza.first("id").ok_or(IngestError::MissingId)?.to_string();
        parsed.insert(
            id,
            ParsedTerm {
                name: stanza.first("name").map(String::from),
                synonyms: owned(&stanza, "synonym"),
                alt_ids: owned(&stanza, "alt_id"),
                parents: owned(&stanza, "is_a"),
            },
        );
    }

    let mut terms = BTreeMap::new();
    for id in parsed.keys() {
        let closure = ancestor_closure(id, &parsed);
        let raw = &parsed[id];
        terms.insert(
            id.clone(),
            Term {
                id: id.clone(),
                name: raw.name.clone(),
                synonyms: raw.synonyms.clone(),
                alt_ids: raw.alt_ids.clone(),
                parents: raw.parents.clone(),
                closure,
            },
        );
    }
    Ok(terms)
}

fn owned(stanza: &Stanza, tag: &str) -> Vec<String> {
    stanza.values(tag).into_iter().map(String::from).collect()
}

/// The term itself plus all transitive is-a ancestors.
///
/// Iterative traversal with an explicit visited set: terminates even if the
/// source graph contains a cycle. An edge to an unknown term (e.g. an
/// obsolete parent dropped at parse time) ends that path.
fn ancestor_closure(id: &str, terms: &BTreeMap<String, ParsedTerm>) -> BTreeSet<String> {
    let mut closure = BTreeSet::new();
    let mut stack = vec![id.to_string()];

    while let Some(current) = stack.pop() {
        if !closure.insert(current.clone()) {
            continue;
        }
        let Some(term) = terms.get(&current) else {
            debug!("is-a edge to unknown term {current:?} (dropped or missing)");
            continue;
        };
        for parent in &term.parents {
            if !closure.contains(parent) {
                stack.push(parent.clone());
            }
        }
    }

    // Edges to unknown ids contribute nothing
    closure.retain(|t| terms.contains_key(t));
    closure
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    const ONTOLOGY: &str = "\
format-version: 1.2

[Term]
id: HP:0000001
name: All

[Term]
id: HP:0000118
name: Phenotypic abnormality
is_a: HP:0000001 ! All

[Term]
id: HP:0000240
name: Abnormality of skull size
is_a: HP:0000118

[Term]
id: HP:0000252
name: Microcephaly
alt_id: HP:0005484
synonym: \"Small head\" EXACT []
is_a: HP:0000240

[Term]
id: HP:0009999
name: Retired term
is_obsolete: true
";

    fn store_with_ontology() -> OntologyStore {
        let store = OntologyStore::new(Arc::new(MemoryBackend::new()));
        store.ingest_reader(ONTOLOGY.as_bytes()).unwrap();
        store
    }

    #[test]
    fn test_closure_contains_self_and_ancestors() {
        let store = store_with_ontology();
        let term = store.get_term("HP:0000252").unwrap();

        assert!(term.closure.contains("HP:0000252"));
        assert!(term.closure.contains("HP:0000240"));
        assert!(term.closure.contains("HP:0000118"));
        assert!(term.closure.contains("HP:0000001"));
        assert_eq!(term.closure.len(), 4);
    }

    #[test]
    fn test_parent_closure_is_subset() {
        let store = store_with_ontology();
        let child = store.get_term("HP:0000252").unwrap();
        let parent = store.get_term("HP:0000240").unwrap();

        assert!(parent.closure.is_subset(&child.closure));
    }

    #[test]
    fn test_resolves_alt_id() {
        let store = store_with_ontology();
        let term = store.get_term("HP:0005484").unwrap();
        assert_eq!(term.id, "HP:0000252");
        assert_eq!(term.name.as_deref(), Some("Microcephaly"));
    }

    #[test]
    fn test_obsolete_terms_dropped() {
        let store = store_with_ontology();
        assert!(store.get_term("HP:0009999").is_none());
    }

    #[test]
    fn test_unknown_term_is_none() {
        let store = store_with_ontology();
        assert!(store.get_term("HP:7777777").is_none());
    }

    #[test]
    fn test_closure_terminates_on_cycle() {
        let cyclic = "\
[Term]
id: A:1
is_a: A:2

[Term]
id: A:2
is_a: A:1
";
        let store = OntologyStore::new(Arc::new(MemoryBackend::new()));
        store.ingest_reader(cyclic.as_bytes()).unwrap();

        let term = store.get_term("A:1").unwrap();
        assert_eq!(term.closure.len(), 2);
        assert!(term.closure.contains("A:1"));
        assert!(term.closure.contains("A:2"));
    }

    #[test]
    fn test_dangling_parent_edge_ignored() {
        let dangling = "\
[Term]
id: B:1
is_a: B:404
";
        let store = OntologyStore::new(Arc::new(MemoryBackend::new()));
        store.ingest_reader(dangling.as_bytes()).unwrap();

        let term = store.get_term("B:1").unwrap();
        assert_eq!(term.closure.len(), 1);
        assert!(term.closure.contains("B:1"));
    }

    #[test]
    fn test_nothing_committed_on_parse_error() {
        let malformed = "\
[Term]
id: C:1
synonym: \"never closed
";
        let store = OntologyStore::new(Arc::new(MemoryBackend::new()));
        assert!(store.ingest_reader(malformed.as_bytes()).is_err());
        assert!(store.get_term("C:1").is_none());
    }
}
