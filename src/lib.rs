// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # oncograph
//!
//! Turns GDC clinical oncology records into an RDF knowledge graph whose
//! diagnoses are coded against the NCI Thesaurus, and answers SPARQL queries
//! over it.
//!
//! ## Architecture
//!
//! - **Record ingestion** (`ingest`): manifest → bulk download → flat extraction → merged table
//! - **Ontology resolution** (`ontology`): memoized label → NCIt code lookups via OLS
//! - **Knowledge graph** (`graph`): triple building, Turtle persistence, SPARQL via `oxigraph`
//! - **Pipeline** (`pipeline`): checkpointed stages tying the above together
//!
//! ## Library usage
//!
//! ```no_run
//! use oncograph::config::PipelineConfig;
//! use oncograph::graph::{QueryExecutor, prefix_header};
//! use oncograph::paths::DataPaths;
//! use oncograph::pipeline::{Pipeline, RunOptions};
//!
//! let paths = DataPaths::new("data");
//! let pipeline = Pipeline::new(paths.clone(), PipelineConfig::default());
//! pipeline.run_all(&pipeline.lookup_client(), RunOptions::default()).unwrap();
//!
//! let executor = QueryExecutor::new(&paths.graph_file);
//! let response = executor.execute_sparql_query(&format!(
//!     "{}SELECT ?p WHERE {{ ?p og:hasDiagnosis ncit:C65151 }}",
//!     prefix_header()
//! ));
//! println!("{}", serde_json::to_string(&response).unwrap());
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod ontology;
pub mod paths;
pub mod pipeline;
