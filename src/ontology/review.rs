//! Review queue for mappings that need a human look.
//!
//! The resolver accepts the top search hit without a confidence threshold.
//! Anything doubtful (no hit, a failed lookup, or a hit whose preferred label
//! differs from the query) is queued here and written to `review_queue.json`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ontology::error::{OntologyError, OntologyResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewReason {
    /// The service returned no candidate.
    NoMatch,
    /// The lookup failed (network, timeout, malformed response).
    LookupFailed,
    /// Accepted, but the candidate's label differs from the query.
    LabelMismatch,
    /// Rejected because the candidate's label differs and label matching is required.
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewItem {
    pub label: String,
    pub reason: ReviewReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewQueue {
    pub items: Vec<ReviewItem>,
}

impl ReviewQueue {
    pub fn open(path: &Path) -> OntologyResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path).map_err(|e| cache_err(path, e))?;
        serde_json::from_str(&data).map_err(|e| cache_err(path, e))
    }

    /// Add or replace the entry for `item.label`.
    pub fn push(&mut self, item: ReviewItem) {
        self.items.retain(|i| i.label != item.label);
        self.items.push(item);
    }

    /// Drop the entry for a label, e.g. after it resolved cleanly on retry.
    pub fn clear_label(&mut self, label: &str) {
        self.items.retain(|i| i.label != label);
    }

    pub fn save(&self, path: &Path) -> OntologyResult<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| cache_err(path, e))?;
        crate::paths::write_atomic(path, json.as_bytes()).map_err(|e| cache_err(path, e))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn cache_err(path: &Path, e: impl std::fmt::Display) -> OntologyError {
    OntologyError::Cache {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(label: &str, reason: ReviewReason) -> ReviewItem {
        ReviewItem {
            label: label.into(),
            reason,
            candidate_code: None,
            candidate_label: None,
            detail: None,
        }
    }

    #[test]
    fn push_replaces_same_label() {
        let mut queue = ReviewQueue::default();
        queue.push(item("Glioma, malignant", ReviewReason::LookupFailed));
        queue.push(item("Glioma, malignant", ReviewReason::NoMatch));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.items[0].reason, ReviewReason::NoMatch);
    }

    #[test]
    fn save_and_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("review_queue.json");
        let mut queue = ReviewQueue::default();
        queue.push(ReviewItem {
            candidate_code: Some("NCIT:C60367".into()),
            candidate_label: Some("Carcinoma".into()),
            ..item("Serous carcinoma, NOS", ReviewReason::LabelMismatch)
        });
        queue.save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("label_mismatch"));
        assert_eq!(ReviewQueue::open(&path).unwrap(), queue);
    }

    #[test]
    fn missing_file_is_empty_queue() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(ReviewQueue::open(&dir.path().join("nope.json")).unwrap().is_empty());
    }
}
