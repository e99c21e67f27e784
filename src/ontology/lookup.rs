//! External ontology search.
//!
//! [`OlsClient`] talks to the EBI Ontology Lookup Service search endpoint with
//! `ureq`, asking for the single best hit in one target vocabulary. The
//! [`OntologyLookup`] trait is the seam the mapping layer depends on, so it can
//! be driven by an offline table in tests or air-gapped runs.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::ontology::error::{OntologyError, OntologyResult};

/// Best-ranked candidate returned by the search service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Canonical identifier, e.g. `NCIT:C2929`.
    pub code: String,
    /// Preferred label of the candidate term, when the service returns one.
    pub label: Option<String>,
}

/// Something that can map a free-text concept label to its top candidate.
pub trait OntologyLookup {
    /// Return the top-ranked candidate, `Ok(None)` when the service has no hit.
    fn lookup(&self, label: &str) -> OntologyResult<Option<Candidate>>;
}

/// OLS search API client.
pub struct OlsClient {
    endpoint: String,
    ontology: String,
    agent: ureq::Agent,
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    response: SearchBody,
}

#[derive(Debug, Default, Deserialize)]
struct SearchBody {
    #[serde(default)]
    docs: Vec<SearchDoc>,
}

#[derive(Debug, Deserialize)]
struct SearchDoc {
    obo_id: Option<String>,
    label: Option<String>,
}

impl OlsClient {
    pub fn new(endpoint: impl Into<String>, ontology: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            endpoint: endpoint.into(),
            ontology: ontology.into(),
            agent,
        }
    }
}

impl OntologyLookup for OlsClient {
    fn lookup(&self, label: &str) -> OntologyResult<Option<Candidate>> {
        let response = self
            .agent
            .get(&self.endpoint)
            .query("q", label)
            .query("ontology", &self.ontology)
            .query("rows", "1")
            .query("exact", "false")
            .call()
            .map_err(|e| OntologyError::Request {
                label: label.into(),
                message: match e {
                    ureq::Error::Status(code, _) => format!("HTTP {code}"),
                    ureq::Error::Transport(t) => t.to_string(),
                },
            })?;

        let body: SearchResponse = response.into_json().map_err(|e| OntologyError::Response {
            label: label.into(),
            message: e.to_string(),
        })?;
        Ok(top_candidate(body))
    }
}

fn top_candidate(body: SearchResponse) -> Option<Candidate> {
    let doc = body.response.docs.into_iter().next()?;
    let code = doc.obo_id.filter(|c| !c.trim().is_empty())?;
    Some(Candidate {
        code,
        label: doc.label,
    })
}

/// Offline lookup backed by a fixed label → code table.
///
/// An empty table backs `--offline` runs: labels missing from the mapping
/// cache then resolve to NO_MATCH without touching the network.
#[derive(Debug, Clone, Default)]
pub struct StaticLookup {
    table: HashMap<String, String>,
}

impl StaticLookup {
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            table: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl OntologyLookup for StaticLookup {
    fn lookup(&self, label: &str) -> OntologyResult<Option<Candidate>> {
        Ok(self.table.get(label).map(|code| Candidate {
            code: code.clone(),
            label: Some(label.to_string()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Option<Candidate> {
        top_candidate(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn first_doc_wins() {
        let hit = parse(
            r#"{"response": {"numFound": 2, "docs": [
                {"obo_id": "NCIT:C2929", "label": "Squamous Cell Carcinoma"},
                {"obo_id": "NCIT:C9999", "label": "Other"}
            ]}}"#,
        );
        assert_eq!(
            hit,
            Some(Candidate {
                code: "NCIT:C2929".into(),
                label: Some("Squamous Cell Carcinoma".into()),
            })
        );
    }

    #[test]
    fn empty_docs_is_no_match() {
        assert_eq!(parse(r#"{"response": {"numFound": 0, "docs": []}}"#), None);
    }

    #[test]
    fn missing_response_object_is_no_match() {
        assert_eq!(parse(r#"{"error": "bad"}"#), None);
    }

    #[test]
    fn doc_without_obo_id_is_no_match() {
        assert_eq!(parse(r#"{"response": {"docs": [{"label": "x"}]}}"#), None);
    }

    #[test]
    fn unreachable_service_is_a_request_error() {
        let client = OlsClient::new("http://127.0.0.1:9/search", "ncit", Duration::from_secs(2));
        let err = client.lookup("Melanoma, NOS").unwrap_err();
        assert!(matches!(err, OntologyError::Request { .. }));
    }

    #[test]
    fn static_lookup_is_exact() {
        let lookup = StaticLookup::new([("Melanoma, NOS", "NCIT:C3224")]);
        assert_eq!(
            lookup.lookup("Melanoma, NOS").unwrap().map(|c| c.code),
            Some("NCIT:C3224".into())
        );
        assert_eq!(lookup.lookup("melanoma, nos").unwrap(), None);
    }
}
