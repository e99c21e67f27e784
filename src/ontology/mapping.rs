//! Label → ontology code mapping with a persistent cache.
//!
//! Resolution runs once per distinct label, never once per row: the mapping
//! is consulted first and only labels it has never seen reach the lookup
//! service. Every label ends up with exactly one entry, either a code such as
//! `NCIT:C2929` or the [`NO_MATCH`] sentinel.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ingest::Table;
use crate::ontology::error::{OntologyError, OntologyResult};
use crate::ontology::lookup::OntologyLookup;
use crate::ontology::review::{ReviewItem, ReviewQueue, ReviewReason};

/// Sentinel code for labels the service could not map.
pub const NO_MATCH: &str = "NO_MATCH";

/// Acceptance rules for top-1 candidates.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveOptions {
    /// Reject a candidate whose preferred label differs from the query.
    pub require_label_match: bool,
}

/// Outcome of resolving one label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Top candidate accepted.
    Matched {
        code: String,
        candidate_label: Option<String>,
    },
    /// The service has no candidate.
    NoMatch,
    /// Candidate rejected by [`ResolveOptions::require_label_match`].
    Rejected {
        code: String,
        candidate_label: Option<String>,
    },
    /// The lookup failed; treated as no match.
    Failed { reason: String },
}

impl Resolution {
    /// Code to store in the mapping.
    pub fn code(&self) -> &str {
        match self {
            Self::Matched { code, .. } => code,
            _ => NO_MATCH,
        }
    }

    /// Review entry for doubtful outcomes, `None` for a clean match.
    fn review_item(&self, label: &str) -> Option<ReviewItem> {
        let item = |reason: ReviewReason,
                    candidate_code: Option<&String>,
                    candidate_label: Option<&String>| {
            ReviewItem {
                label: label.to_string(),
                reason,
                candidate_code: candidate_code.cloned(),
                candidate_label: candidate_label.cloned(),
                detail: None,
            }
        };
        match self {
            Self::Matched {
                code,
                candidate_label,
            } => match candidate_label {
                Some(found) if !labels_agree(label, found) => Some(item(
                    ReviewReason::LabelMismatch,
                    Some(code),
                    Some(found),
                )),
                _ => None,
            },
            Self::NoMatch => Some(item(ReviewReason::NoMatch, None, None)),
            Self::Rejected {
                code,
                candidate_label,
            } => Some(item(
                ReviewReason::Rejected,
                Some(code),
                candidate_label.as_ref(),
            )),
            Self::Failed { reason } => Some(ReviewItem {
                detail: Some(reason.clone()),
                ..item(ReviewReason::LookupFailed, None, None)
            }),
        }
    }
}

fn labels_agree(query: &str, found: &str) -> bool {
    query.trim().eq_ignore_ascii_case(found.trim())
}

/// Resolve one label. Never fails: lookup errors are logged and become
/// [`Resolution::Failed`], which maps to [`NO_MATCH`].
pub fn resolve_label(
    lookup: &dyn OntologyLookup,
    label: &str,
    opts: ResolveOptions,
) -> Resolution {
    if label.trim().is_empty() {
        return Resolution::NoMatch;
    }
    match lookup.lookup(label) {
        Ok(Some(candidate)) => {
            let agrees = candidate
                .label
                .as_deref()
                .is_some_and(|found| labels_agree(label, found));
            if opts.require_label_match && !agrees {
                Resolution::Rejected {
                    code: candidate.code,
                    candidate_label: candidate.label,
                }
            } else {
                Resolution::Matched {
                    code: candidate.code,
                    candidate_label: candidate.label,
                }
            }
        }
        Ok(None) => Resolution::NoMatch,
        Err(e) => {
            tracing::warn!(label, error = %e, "ontology lookup failed, recording NO_MATCH");
            Resolution::Failed {
                reason: e.to_string(),
            }
        }
    }
}

/// Counters from one [`OntologyMapping::resolve_all`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MappingReport {
    /// Distinct labels seen.
    pub distinct: usize,
    /// Labels answered from the cache.
    pub cached: usize,
    /// Labels sent to the lookup service.
    pub looked_up: usize,
    /// Newly resolved to a code.
    pub resolved: usize,
    /// Newly recorded as NO_MATCH.
    pub unresolved: usize,
    /// New entries added to the review queue.
    pub flagged: usize,
}

/// Persistent label → code mapping, stored as a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OntologyMapping {
    entries: BTreeMap<String, String>,
}

impl OntologyMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the cache at `path`, or start empty if it does not exist.
    pub fn open(path: &Path) -> OntologyResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path).map_err(|e| OntologyError::Cache {
            path: path.display().to_string(),
            message: format!("read: {e}"),
        })?;
        serde_json::from_str(&data).map_err(|e| OntologyError::Cache {
            path: path.display().to_string(),
            message: format!("parse: {e}"),
        })
    }

    /// Write the cache atomically.
    pub fn save(&self, path: &Path) -> OntologyResult<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| OntologyError::Cache {
            path: path.display().to_string(),
            message: format!("serialize: {e}"),
        })?;
        crate::paths::write_atomic(path, json.as_bytes()).map_err(|e| OntologyError::Cache {
            path: path.display().to_string(),
            message: format!("write: {e}"),
        })
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.entries.get(label).map(String::as_str)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.entries.contains_key(label)
    }

    pub fn insert(&mut self, label: impl Into<String>, code: impl Into<String>) {
        self.entries.insert(label.into(), code.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Labels currently mapped to [`NO_MATCH`].
    pub fn unresolved(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|(_, v)| v.as_str() == NO_MATCH)
            .map(|(k, _)| k.as_str())
    }

    /// Remove NO_MATCH entries so the next pass looks them up again.
    pub fn forget_unresolved(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, v| v != NO_MATCH);
        before - self.entries.len()
    }

    /// Ensure every label has an entry, calling `lookup` at most once per
    /// distinct label not already cached.
    pub fn resolve_all<'a>(
        &mut self,
        labels: impl IntoIterator<Item = &'a str>,
        lookup: &dyn OntologyLookup,
        opts: ResolveOptions,
        review: &mut ReviewQueue,
    ) -> MappingReport {
        let mut report = MappingReport::default();
        let mut seen = HashSet::new();

        for label in labels {
            if !seen.insert(label) {
                continue;
            }
            report.distinct += 1;
            if self.contains(label) {
                report.cached += 1;
                continue;
            }

            if !label.trim().is_empty() {
                report.looked_up += 1;
            }
            let resolution = resolve_label(lookup, label, opts);
            tracing::debug!(label, code = resolution.code(), "resolved label");

            if resolution.code() == NO_MATCH {
                report.unresolved += 1;
            } else {
                report.resolved += 1;
            }
            match resolution.review_item(label) {
                Some(item) => {
                    review.push(item);
                    report.flagged += 1;
                }
                None => review.clear_label(label),
            }
            self.insert(label, resolution.code());
        }

        tracing::info!(
            distinct = report.distinct,
            cached = report.cached,
            looked_up = report.looked_up,
            resolved = report.resolved,
            unresolved = report.unresolved,
            flagged = report.flagged,
            "ontology mapping complete"
        );
        report
    }

    /// Write the code for each row's label into `code_column`.
    ///
    /// Fails without touching the table if any label has no entry.
    pub fn annotate(
        &self,
        table: &mut Table,
        label_column: &str,
        code_column: &str,
    ) -> OntologyResult<()> {
        let label_idx = table
            .column(label_column)
            .ok_or_else(|| OntologyError::MissingColumn {
                column: label_column.to_string(),
            })?;
        if let Some(missing) = table.values(label_idx).find(|l| !self.contains(l)) {
            return Err(OntologyError::UnmappedLabel {
                label: missing.to_string(),
            });
        }
        table.set_column(code_column, |row| {
            self.get(&row[label_idx]).unwrap_or(NO_MATCH).to_string()
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashMap;

    use super::*;
    use crate::ontology::lookup::Candidate;

    /// Fake service that counts calls per label.
    #[derive(Default)]
    struct CountingLookup {
        answers: HashMap<&'static str, Candidate>,
        failing: Vec<&'static str>,
        calls: RefCell<HashMap<String, usize>>,
    }

    impl CountingLookup {
        fn answer(mut self, label: &'static str, code: &str, found: &str) -> Self {
            self.answers.insert(
                label,
                Candidate {
                    code: code.into(),
                    label: Some(found.into()),
                },
            );
            self
        }

        fn calls(&self, label: &str) -> usize {
            self.calls.borrow().get(label).copied().unwrap_or(0)
        }

        fn total_calls(&self) -> usize {
            self.calls.borrow().values().sum()
        }
    }

    impl OntologyLookup for CountingLookup {
        fn lookup(&self, label: &str) -> OntologyResult<Option<Candidate>> {
            *self.calls.borrow_mut().entry(label.to_string()).or_default() += 1;
            if self.failing.contains(&label) {
                return Err(OntologyError::Request {
                    label: label.into(),
                    message: "timed out".into(),
                });
            }
            Ok(self.answers.get(label).cloned())
        }
    }

    #[test]
    fn one_call_per_distinct_label() {
        let lookup = CountingLookup::default()
            .answer("Melanoma, NOS", "NCIT:C3224", "Melanoma")
            .answer("Adenocarcinoma, NOS", "NCIT:C2852", "Adenocarcinoma");
        let rows = [
            "Melanoma, NOS",
            "Adenocarcinoma, NOS",
            "Melanoma, NOS",
            "Melanoma, NOS",
            "Adenocarcinoma, NOS",
        ];

        let mut mapping = OntologyMapping::new();
        let mut review = ReviewQueue::default();
        let report = mapping.resolve_all(rows, &lookup, ResolveOptions::default(), &mut review);

        assert_eq!(report.distinct, 2);
        assert_eq!(report.looked_up, 2);
        assert_eq!(lookup.calls("Melanoma, NOS"), 1);
        assert_eq!(lookup.total_calls(), 2);
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping.get("Melanoma, NOS"), Some("NCIT:C3224"));
    }

    #[test]
    fn cached_labels_skip_the_service() {
        let lookup = CountingLookup::default().answer("Thymoma, NOS", "NCIT:C3411", "Thymoma");
        let mut mapping = OntologyMapping::new();
        mapping.insert("Thymoma, NOS", "NCIT:C3411");
        let mut review = ReviewQueue::default();

        let report = mapping.resolve_all(
            ["Thymoma, NOS"],
            &lookup,
            ResolveOptions::default(),
            &mut review,
        );
        assert_eq!(report.cached, 1);
        assert_eq!(lookup.total_calls(), 0);
    }

    #[test]
    fn failures_become_no_match_without_aborting_the_batch() {
        let lookup = CountingLookup {
            failing: vec!["Chordoma, NOS"],
            ..Default::default()
        }
        .answer("Glioma, malignant", "NCIT:C4822", "Malignant Glioma");

        let mut mapping = OntologyMapping::new();
        let mut review = ReviewQueue::default();
        let report = mapping.resolve_all(
            ["Chordoma, NOS", "Glioma, malignant", "Unheard of"],
            &lookup,
            ResolveOptions::default(),
            &mut review,
        );

        assert_eq!(mapping.get("Chordoma, NOS"), Some(NO_MATCH));
        assert_eq!(mapping.get("Unheard of"), Some(NO_MATCH));
        assert_eq!(mapping.get("Glioma, malignant"), Some("NCIT:C4822"));
        assert_eq!(report.unresolved, 2);
        assert_eq!(report.resolved, 1);

        let reasons: Vec<_> = review.items.iter().map(|i| (i.label.as_str(), i.reason)).collect();
        assert!(reasons.contains(&("Chordoma, NOS", ReviewReason::LookupFailed)));
        assert!(reasons.contains(&("Unheard of", ReviewReason::NoMatch)));
        assert!(reasons.contains(&("Glioma, malignant", ReviewReason::LabelMismatch)));
    }

    #[test]
    fn label_match_requirement_rejects_divergent_hits() {
        let lookup = CountingLookup::default()
            .answer("Serous carcinoma, NOS", "NCIT:C60367", "Carcinoma")
            .answer("Cholangiocarcinoma", "NCIT:C4436", "cholangiocarcinoma");
        let opts = ResolveOptions {
            require_label_match: true,
        };

        assert!(matches!(
            resolve_label(&lookup, "Serous carcinoma, NOS", opts),
            Resolution::Rejected { .. }
        ));
        assert_eq!(
            resolve_label(&lookup, "Cholangiocarcinoma", opts).code(),
            "NCIT:C4436"
        );
    }

    #[test]
    fn empty_label_never_reaches_the_service() {
        let lookup = CountingLookup::default();
        let mut mapping = OntologyMapping::new();
        let mut review = ReviewQueue::default();
        mapping.resolve_all(["", "  "], &lookup, ResolveOptions::default(), &mut review);
        assert_eq!(lookup.total_calls(), 0);
        assert_eq!(mapping.get(""), Some(NO_MATCH));
    }

    #[test]
    fn forget_unresolved_allows_retry() {
        let mut mapping = OntologyMapping::new();
        mapping.insert("a", NO_MATCH);
        mapping.insert("b", "NCIT:C1");
        assert_eq!(mapping.forget_unresolved(), 1);
        assert!(!mapping.contains("a"));
        assert!(mapping.contains("b"));
    }

    #[test]
    fn cache_file_is_a_plain_json_object() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ontology_mapping.json");
        let mut mapping = OntologyMapping::new();
        mapping.insert("Squamous cell carcinoma, NOS", "NCIT:C2929");
        mapping.save(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["Squamous cell carcinoma, NOS"], "NCIT:C2929");
        assert_eq!(OntologyMapping::open(&path).unwrap(), mapping);
    }

    #[test]
    fn annotate_requires_every_label() {
        let mut table = Table::parse_tsv(
            "id\tdiagnoses.primary_diagnosis\nAD1\tMelanoma, NOS\nAD2\tThymoma, NOS\n",
            "t",
        )
        .unwrap();
        let mut mapping = OntologyMapping::new();
        mapping.insert("Melanoma, NOS", "NCIT:C3224");

        let err = mapping
            .annotate(&mut table, "diagnoses.primary_diagnosis", "ncit_code")
            .unwrap_err();
        assert!(matches!(err, OntologyError::UnmappedLabel { ref label } if label == "Thymoma, NOS"));
        assert_eq!(table.headers.len(), 2);

        mapping.insert("Thymoma, NOS", NO_MATCH);
        mapping
            .annotate(&mut table, "diagnoses.primary_diagnosis", "ncit_code")
            .unwrap();
        assert_eq!(table.rows[0][2], "NCIT:C3224");
        assert_eq!(table.rows[1][2], NO_MATCH);
    }
}
