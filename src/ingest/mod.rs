//! Record ingestion: manifest → bulk download → flat extraction → merged table.
//!
//! The merged table is checkpointed to disk before any transformation, so the
//! later stages can be re-run without downloading again.

pub mod download;
pub mod error;
pub mod extract;
pub mod manifest;
pub mod merge;
pub mod table;

pub use download::BulkDownloader;
pub use error::{IngestError, IngestResult};
pub use extract::{ExtractReport, extract_flat, extract_fresh, flatten_dir};
pub use manifest::{Manifest, ManifestEntry};
pub use merge::merge_tables;
pub use table::Table;
