//! Data directory layout.
//!
//! Every artifact the pipeline reads or writes lives under one data directory:
//!
//! ```text
//! data/
//! ├── oncograph.toml
//! ├── manifest.txt
//! ├── raw/
//! │   ├── <bundle>.tar.gz
//! │   └── clinical/            flat directory of extracted per-case files
//! └── processed/
//!     ├── merged_clinical.tsv     checkpoint: stacked source rows
//!     ├── completed_clinical.tsv  checkpoint: rows + ontology code column
//!     ├── ontology_mapping.json   label -> code cache
//!     ├── review_queue.json       mappings needing manual curation
//!     └── knowledge_graph.ttl
//! ```

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Resolved file and directory paths for one data directory.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub root: PathBuf,
    pub config_file: PathBuf,
    pub manifest: PathBuf,
    pub raw_dir: PathBuf,
    pub clinical_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub merged_table: PathBuf,
    pub enriched_table: PathBuf,
    pub mapping_file: PathBuf,
    pub review_queue: PathBuf,
    pub graph_file: PathBuf,
}

impl DataPaths {
    /// Derive all paths from a data directory root. Nothing is created.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let raw_dir = root.join("raw");
        let processed_dir = root.join("processed");
        Self {
            config_file: root.join("oncograph.toml"),
            manifest: root.join("manifest.txt"),
            clinical_dir: raw_dir.join("clinical"),
            merged_table: processed_dir.join("merged_clinical.tsv"),
            enriched_table: processed_dir.join("completed_clinical.tsv"),
            mapping_file: processed_dir.join("ontology_mapping.json"),
            review_queue: processed_dir.join("review_queue.json"),
            graph_file: processed_dir.join("knowledge_graph.ttl"),
            raw_dir,
            processed_dir,
            root,
        }
    }

    /// Create `raw/`, `raw/clinical/` and `processed/` if missing.
    pub fn ensure_dirs(&self) -> Result<(), ConfigError> {
        for dir in [&self.raw_dir, &self.clinical_dir, &self.processed_dir] {
            create_dir(dir)?;
        }
        Ok(())
    }
}

fn create_dir(path: &Path) -> Result<(), ConfigError> {
    std::fs::create_dir_all(path).map_err(|e| ConfigError::CreateDir {
        path: path.display().to_string(),
        source: e,
    })
}

/// Write `contents` to `path` through a sibling temp file and a rename, so
/// readers never observe a partially written file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let tmp = temp_sibling(path);
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)
}

/// `<dir>/.<name>.tmp` next to `path`.
pub fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out".into());
    path.with_file_name(format!(".{name}.tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_rooted_at_data_dir() {
        let paths = DataPaths::new("/tmp/onco");
        assert_eq!(paths.clinical_dir, PathBuf::from("/tmp/onco/raw/clinical"));
        assert_eq!(
            paths.graph_file,
            PathBuf::from("/tmp/onco/processed/knowledge_graph.ttl")
        );
        assert_eq!(paths.config_file, PathBuf::from("/tmp/onco/oncograph.toml"));
    }

    #[test]
    fn ensure_dirs_creates_tree() {
        let dir = tempfile::TempDir::new().unwrap();
        let paths = DataPaths::new(dir.path().join("data"));
        paths.ensure_dirs().unwrap();
        assert!(paths.clinical_dir.is_dir());
        assert!(paths.processed_dir.is_dir());
    }

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("graph.ttl");
        write_atomic(&target, b"first").unwrap();
        write_atomic(&target, b"second").unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "second");
        assert!(!temp_sibling(&target).exists());
    }
}
