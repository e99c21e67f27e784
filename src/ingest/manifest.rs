//! GDC download manifest parsing.
//!
//! A manifest is a whitespace-separated table whose first line is a header:
//!
//! ```text
//! id  filename  md5  size  state
//! 4f3a...  FM-AD_clinical.FM-AD1004.tsv  ...
//! 9b21...  nationwidechildrens.org_clinical.Clinical_Supplement.xml  ...
//! ```

use std::path::Path;

use crate::ingest::error::{IngestError, IngestResult};

/// One file listed in a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub id: String,
    /// Second column: file name, which carries the kind tag.
    pub kind: String,
    /// Remaining columns, kept for diagnostics.
    pub rest: Vec<String>,
}

impl ManifestEntry {
    fn is_kind(&self, tag: &str) -> bool {
        self.kind.contains(tag) || self.rest.iter().any(|t| t.contains(tag))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn parse(text: &str) -> IngestResult<Self> {
        let mut entries = Vec::new();
        for (idx, line) in text.lines().enumerate().skip(1) {
            let mut tokens = line.split_whitespace();
            let Some(id) = tokens.next() else {
                continue;
            };
            let kind = tokens.next().ok_or_else(|| IngestError::Manifest {
                line: idx + 1,
                message: format!("file id \"{id}\" has no kind/file name column"),
            })?;
            entries.push(ManifestEntry {
                id: id.to_string(),
                kind: kind.to_string(),
                rest: tokens.map(str::to_string).collect(),
            });
        }
        Ok(Self { entries })
    }

    pub fn read(path: &Path) -> IngestResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| IngestError::io(path, e))?;
        Self::parse(&text)
    }

    /// Ids of every entry not tagged with `excluded_kind`, in manifest order.
    pub fn primary_ids(&self, excluded_kind: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| excluded_kind.is_empty() || !e.is_kind(excluded_kind))
            .map(|e| e.id.clone())
            .collect()
    }
}
