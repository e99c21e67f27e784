//! Rich diagnostic error types for ontology resolution.

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum OntologyError {
    #[error("ontology lookup for \"{label}\" failed: {message}")]
    #[diagnostic(
        code(onco::ontology::request),
        help(
            "The ontology search service could not be reached or timed out. \
             The label is recorded as NO_MATCH; re-run `oncograph map --retry-unresolved` later."
        )
    )]
    Request { label: String, message: String },

    #[error("malformed ontology response for \"{label}\": {message}")]
    #[diagnostic(
        code(onco::ontology::response),
        help("The search service answered with JSON that does not follow the OLS search schema.")
    )]
    Response { label: String, message: String },

    #[error("no ontology mapping for diagnosis label \"{label}\"")]
    #[diagnostic(
        code(onco::ontology::unmapped_label),
        help(
            "Every diagnosis label must be resolved (or marked NO_MATCH) before the \
             graph is built. Re-run `oncograph map` to refresh the mapping."
        )
    )]
    UnmappedLabel { label: String },

    #[error("table has no diagnosis label column \"{column}\"")]
    #[diagnostic(
        code(onco::ontology::missing_column),
        help("Check `columns.primary_diagnosis` in oncograph.toml against the merged table header.")
    )]
    MissingColumn { column: String },

    #[error("mapping cache {path}: {message}")]
    #[diagnostic(
        code(onco::ontology::cache),
        help(
            "The mapping cache could not be read or written. It is a JSON object of \
             label to code; delete it to resolve every label again."
        )
    )]
    Cache { path: String, message: String },
}

/// Convenience alias for ontology results.
pub type OntologyResult<T> = std::result::Result<T, OntologyError>;
