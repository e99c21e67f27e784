//! Pipeline configuration, persisted as TOML in `<data_dir>/oncograph.toml`.
//!
//! Every field has a default, so an empty file (or no file at all) yields the
//! GDC + OLS/NCIt setup the pipeline was written for.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::graph::builder::UnresolvedPolicy;
use crate::paths::write_atomic;

/// Source column names in the GDC clinical TSV files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnConfig {
    pub patient_id: String,
    pub gender: String,
    pub age_at_diagnosis: String,
    pub primary_site: String,
    pub primary_diagnosis: String,
    /// Column appended to the enriched table holding the resolved code.
    pub ontology_code: String,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            patient_id: "cases.submitter_id".into(),
            gender: "demographic.gender".into(),
            age_at_diagnosis: "diagnoses.age_at_diagnosis".into(),
            primary_site: "cases.primary_site".into(),
            primary_diagnosis: "diagnoses.primary_diagnosis".into(),
            ontology_code: "ncit_code".into(),
        }
    }
}

/// Configuration for all pipeline stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Bulk download endpoint (POST `{"ids": [...]}`).
    #[serde(default = "default_data_endpoint")]
    pub data_endpoint: String,
    /// Ontology search endpoint (GET `?q=&ontology=&rows=1&exact=false`).
    #[serde(default = "default_ontology_endpoint")]
    pub ontology_endpoint: String,
    /// Target vocabulary tag passed to the search service.
    #[serde(default = "default_ontology")]
    pub ontology: String,
    /// Per-label lookup timeout. Expiry counts as "no match".
    #[serde(default = "default_lookup_timeout_secs")]
    pub lookup_timeout_secs: u64,
    /// Timeout for the bulk bundle download.
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
    /// Manifest entries whose kind token contains this are skipped.
    #[serde(default = "default_excluded_kind")]
    pub excluded_kind: String,
    /// Pattern (`*` wildcard) selecting the extracted files to merge.
    #[serde(default = "default_file_pattern")]
    pub file_pattern: String,
    /// Reject top-1 candidates whose label differs from the query label.
    #[serde(default)]
    pub require_label_match: bool,
    /// What to do with rows whose diagnosis did not resolve.
    #[serde(default)]
    pub unresolved: UnresolvedPolicy,
    #[serde(default)]
    pub columns: ColumnConfig,
}

fn default_data_endpoint() -> String {
    "https://api.gdc.cancer.gov/data".into()
}
fn default_ontology_endpoint() -> String {
    "https://www.ebi.ac.uk/ols/api/search".into()
}
fn default_ontology() -> String {
    "ncit".into()
}
fn default_lookup_timeout_secs() -> u64 {
    10
}
fn default_download_timeout_secs() -> u64 {
    300
}
fn default_excluded_kind() -> String {
    "Clinical_Supplement".into()
}
fn default_file_pattern() -> String {
    "FM-AD*.tsv".into()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_endpoint: default_data_endpoint(),
            ontology_endpoint: default_ontology_endpoint(),
            ontology: default_ontology(),
            lookup_timeout_secs: default_lookup_timeout_secs(),
            download_timeout_secs: default_download_timeout_secs(),
            excluded_kind: default_excluded_kind(),
            file_pattern: default_file_pattern(),
            require_label_match: false,
            unresolved: UnresolvedPolicy::default(),
            columns: ColumnConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lookup_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "lookup_timeout_secs must be > 0".into(),
            });
        }
        if self.file_pattern.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "file_pattern must not be empty".into(),
            });
        }
        if self.ontology.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "ontology must not be empty".into(),
            });
        }
        Ok(())
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        write_atomic(path, content.as_bytes()).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config: PipelineConfig = toml::from_str("").unwrap();
        assert_eq!(config.ontology, "ncit");
        assert_eq!(config.file_pattern, "FM-AD*.tsv");
        assert_eq!(config.columns.patient_id, "cases.submitter_id");
        assert_eq!(config.unresolved, UnresolvedPolicy::Unclassified);
    }

    #[test]
    fn partial_columns_keep_other_defaults() {
        let config: PipelineConfig = toml::from_str(
            r#"
            unresolved = "skip"
            [columns]
            gender = "sex"
            "#,
        )
        .unwrap();
        assert_eq!(config.columns.gender, "sex");
        assert_eq!(config.columns.primary_site, "cases.primary_site");
        assert_eq!(config.unresolved, UnresolvedPolicy::Skip);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("oncograph.toml");
        let config = PipelineConfig {
            require_label_match: true,
            lookup_timeout_secs: 3,
            ..Default::default()
        };
        config.save(&path).unwrap();
        let loaded = PipelineConfig::load(&path).unwrap();
        assert!(loaded.require_label_match);
        assert_eq!(loaded.lookup_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn save_replaces_existing_file_atomically() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("oncograph.toml");
        std::fs::write(&path, "ontology = \"old\"\n").unwrap();

        let config = PipelineConfig {
            ontology: "mondo".into(),
            ..Default::default()
        };
        config.save(&path).unwrap();

        assert_eq!(PipelineConfig::load(&path).unwrap().ontology, "mondo");
        assert!(!crate::paths::temp_sibling(&path).exists());
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = PipelineConfig {
            lookup_timeout_secs: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }
}
