//! Knowledge graph: clinical rows → RDF triples, Turtle persistence, SPARQL.
//!
//! - **Builder** ([`builder`]): one patient node per row, linked to its
//!   diagnosis code in the ontology namespace
//! - **Persistence** ([`persist`]): Turtle with bound prefixes, atomic writes
//! - **Query** ([`query`]): SPARQL over the persisted graph via `oxigraph`
//!
//! The in-memory triple set is [`oxigraph::model::Graph`], so two graphs can
//! be compared as sets and rebuilding from the same rows is idempotent.

pub mod builder;
pub mod persist;
pub mod query;

use oxigraph::model::NamedNode;

use crate::error::{GraphError, GraphResult};

pub use builder::{BuildReport, ClinicalRecord, UnresolvedPolicy, build_graph};
pub use persist::{load, serialize, to_turtle_string};
pub use query::{QueryExecutor, QueryOutcome, ToolResponse, local_name};

/// Patient data namespace.
pub const OG_NS: &str = "http://www.oncograph.net/hospital-data/";
/// NCI Thesaurus namespace for diagnosis codes.
pub const NCIT_NS: &str = "https://evs.nci.nih.gov/ftp1/NCI_Thesaurus/Thesaurus_25.11d.OWL#";
/// schema.org vocabulary.
pub const SCHEMA_NS: &str = "https://schema.org/";
pub const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const RDFS_NS: &str = "http://www.w3.org/2000/01/rdf-schema#";
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema#";

/// Prefixes bound in serialized Turtle and offered to query authors.
pub const PREFIXES: &[(&str, &str)] = &[
    ("ncit", NCIT_NS),
    ("og", OG_NS),
    ("schema", SCHEMA_NS),
    ("rdf", RDF_NS),
    ("rdfs", RDFS_NS),
    ("xsd", XSD_NS),
];

/// `PREFIX` declarations for every namespace the graph uses.
///
/// Queries are run exactly as given; callers that want the standard prefixes
/// prepend this themselves.
pub fn prefix_header() -> String {
    PREFIXES
        .iter()
        .map(|(name, iri)| format!("PREFIX {name}: <{iri}>\n"))
        .collect()
}

/// Build an IRI in a namespace, rejecting invalid results.
pub(crate) fn iri(namespace: &str, local: &str) -> GraphResult<NamedNode> {
    let full = format!("{namespace}{local}");
    NamedNode::new(&full).map_err(|e| GraphError::InvalidIri {
        iri: full,
        message: e.to_string(),
    })
}
