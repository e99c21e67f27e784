//! Ontology resolution: free-text diagnosis labels → standardized codes.
//!
//! Lookups are memoized per distinct label in [`OntologyMapping`], which is
//! persisted as `ontology_mapping.json`. Doubtful results go to the
//! [`ReviewQueue`].

pub mod error;
pub mod lookup;
pub mod mapping;
pub mod review;

pub use error::{OntologyError, OntologyResult};
pub use lookup::{Candidate, OlsClient, OntologyLookup, StaticLookup};
pub use mapping::{MappingReport, NO_MATCH, OntologyMapping, Resolution, ResolveOptions, resolve_label};
pub use review::{ReviewItem, ReviewQueue, ReviewReason};
