//! Rich diagnostic error types for record ingestion.

use miette::Diagnostic;
use thiserror::Error;

/// Errors from manifest parsing, bundle download, extraction and merging.
#[derive(Debug, Error, Diagnostic)]
pub enum IngestError {
    #[error("manifest line {line}: {message}")]
    #[diagnostic(
        code(onco::ingest::manifest),
        help(
            "Manifest lines are whitespace-separated: file id first, then the file name \
             or kind tag. The first line is a header and is skipped."
        )
    )]
    Manifest { line: usize, message: String },

    #[error("manifest selects no files after excluding \"{excluded}\"")]
    #[diagnostic(
        code(onco::ingest::empty_manifest),
        help("Check that the manifest lists primary clinical files, not only supplements.")
    )]
    EmptyManifest { excluded: String },

    #[error("download from \"{url}\" failed: {message}")]
    #[diagnostic(
        code(onco::ingest::download),
        help(
            "The bulk download request failed. Check that the endpoint is reachable \
             and the file ids in the manifest are valid. Nothing was saved."
        )
    )]
    Download { url: String, message: String },

    #[error("response has no usable Content-Disposition filename: {header:?}")]
    #[diagnostic(
        code(onco::ingest::missing_filename),
        help("The download endpoint must name the bundle via `Content-Disposition: ...filename=<name>`.")
    )]
    MissingFilename { header: Option<String> },

    #[error("failed to extract {archive}: {message}")]
    #[diagnostic(
        code(onco::ingest::extract),
        help("The downloaded bundle may be truncated or not a gzip tar archive. Re-run the download.")
    )]
    Extract { archive: String, message: String },

    #[error("archive entry \"{entry}\" escapes the extraction directory")]
    #[diagnostic(
        code(onco::ingest::unsafe_entry),
        help("Archive entries must be relative paths without `..` components.")
    )]
    UnsafeEntry { entry: String },

    #[error("no files matching \"{pattern}\" in {dir}")]
    #[diagnostic(
        code(onco::ingest::no_input),
        help("Run `oncograph download` first, or adjust `file_pattern` in oncograph.toml.")
    )]
    NoInputFiles { dir: String, pattern: String },

    #[error("schema mismatch in {file}: expected columns {expected:?}, found {actual:?}")]
    #[diagnostic(
        code(onco::ingest::schema_mismatch),
        help(
            "All merged files must share the same column set. Remove or fix the \
             offending file; columns are never aligned automatically."
        )
    )]
    SchemaMismatch {
        file: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("malformed table {file} at line {line}: {message}")]
    #[diagnostic(
        code(onco::ingest::malformed_table),
        help("Each line must have as many tab-separated fields as the header.")
    )]
    MalformedTable {
        file: String,
        line: usize,
        message: String,
    },

    #[error("column \"{column}\" not found in {file}")]
    #[diagnostic(
        code(onco::ingest::missing_column),
        help("Check the `[columns]` section of oncograph.toml against the file header.")
    )]
    MissingColumn { column: String, file: String },

    #[error("I/O error on {path}: {source}")]
    #[diagnostic(
        code(onco::ingest::io),
        help("A filesystem operation failed. Check file paths and permissions.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl IngestError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Convenience alias for ingestion results.
pub type IngestResult<T> = std::result::Result<T, IngestError>;
