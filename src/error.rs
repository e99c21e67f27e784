//! Rich diagnostic error types for the oncograph pipeline.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so users know exactly what
//! went wrong and how to fix it. Ingestion and ontology errors live next to their
//! subsystems (`ingest::error`, `ontology::error`).

use miette::Diagnostic;
use thiserror::Error;

use crate::ingest::IngestError;
use crate::ontology::OntologyError;

/// Top-level error type for the oncograph pipeline.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text, source spans) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum OncoError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Ontology(#[from] OntologyError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Query(#[from] QueryError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(onco::config::read),
        help("Ensure the config file exists. Create a default one with `oncograph init`.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    #[diagnostic(
        code(onco::config::parse),
        help("Check the TOML syntax in the config file.")
    )]
    Parse { path: String, message: String },

    #[error("failed to serialize config for {path}: {message}")]
    #[diagnostic(
        code(onco::config::serialize),
        help("A config value cannot be represented in TOML. {message}")
    )]
    Serialize { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(onco::config::write),
        help("Ensure you have write permissions to the data directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {message}")]
    #[diagnostic(code(onco::config::invalid), help("Check the config fields. {message}"))]
    Invalid { message: String },

    #[error("failed to create directory: {path}")]
    #[diagnostic(
        code(onco::config::create_dir),
        help("Check that the parent directory exists and you have write permissions.")
    )]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Graph errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("invalid IRI \"{iri}\": {message}")]
    #[diagnostic(
        code(onco::graph::invalid_iri),
        help(
            "A patient identifier or ontology code produced an IRI that is not valid. \
             Check the source row for whitespace or control characters."
        )
    )]
    InvalidIri { iri: String, message: String },

    #[error("enriched table has no column \"{column}\"")]
    #[diagnostic(
        code(onco::graph::missing_column),
        help(
            "The graph is built from the enriched table. Check the `columns` section of \
             oncograph.toml and re-run `oncograph map` to add the code column."
        )
    )]
    MissingColumn { column: String },

    #[error("row {row}: {message}")]
    #[diagnostic(
        code(onco::graph::bad_row),
        help("The row is missing a required column or holds a malformed value.")
    )]
    BadRow { row: usize, message: String },

    #[error("serialization error for {path}: {message}")]
    #[diagnostic(
        code(onco::graph::serialize),
        help("The graph could not be written as Turtle. Check disk space and permissions.")
    )]
    Serialize { path: String, message: String },

    #[error("failed to parse graph file {path}: {message}")]
    #[diagnostic(
        code(onco::graph::parse),
        help(
            "The persisted graph is not valid Turtle. It may be truncated; \
             rebuild it with `oncograph graph`."
        )
    )]
    Parse { path: String, message: String },

    #[error("oxigraph store error: {message}")]
    #[diagnostic(
        code(onco::graph::store),
        help("The in-memory oxigraph store could not be created or loaded.")
    )]
    Store { message: String },

    #[error("I/O error on {path}: {source}")]
    #[diagnostic(
        code(onco::graph::io),
        help("A filesystem operation failed. Check file paths and permissions.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Query errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum QueryError {
    #[error("SPARQL syntax error: {message}")]
    #[diagnostic(
        code(onco::query::syntax),
        help(
            "The query could not be parsed. Every prefix used (og:, ncit:, schema:, ...) \
             must be declared with PREFIX; none are injected automatically."
        )
    )]
    Syntax { message: String },

    #[error("SPARQL evaluation failed: {message}")]
    #[diagnostic(code(onco::query::evaluation), help("The query failed while running."))]
    Evaluation { message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),
}

/// Convenience alias for functions returning oncograph results.
pub type OncoResult<T> = std::result::Result<T, OncoError>;

/// Result alias for graph building and persistence.
pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// Result alias for query execution.
pub type QueryResult<T> = std::result::Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_error_converts_to_onco_error() {
        let err = GraphError::InvalidIri {
            iri: "http://www.oncograph.net/hospital-data/AD 1".into(),
            message: "invalid character".into(),
        };
        let onco: OncoError = err.into();
        assert!(matches!(onco, OncoError::Graph(GraphError::InvalidIri { .. })));
    }

    #[test]
    fn query_error_wraps_graph_error() {
        let graph_err = GraphError::Store {
            message: "boom".into(),
        };
        let query_err: QueryError = graph_err.into();
        assert!(matches!(query_err, QueryError::Graph(GraphError::Store { .. })));
    }

    #[test]
    fn error_display_messages_are_descriptive() {
        let err = GraphError::BadRow {
            row: 17,
            message: "age \"abc\" is not an integer".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("17"));
        assert!(msg.contains("abc"));
    }
}
