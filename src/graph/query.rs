//! SPARQL execution over the persisted knowledge graph.
//!
//! [`QueryExecutor`] loads `knowledge_graph.ttl` into an in-memory oxigraph
//! store and keeps it until the file changes on disk. Results are normalized
//! into ordered variables plus one `variable → value` map per solution, with
//! IRIs shortened by [`local_name`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::SystemTime;

use oxigraph::model::Term;
use oxigraph::sparql::{QueryResults, SparqlEvaluator};
use oxigraph::store::Store;
use serde::Serialize;

use crate::error::{GraphError, QueryError, QueryResult};

use super::persist::load_store;

/// Text after the last `#`, or the whole IRI when it has none.
///
/// Only `#` splits: `https://schema.org/Patient` stays whole.
pub fn local_name(iri: &str) -> &str {
    iri.rsplit_once('#').map_or(iri, |(_, local)| local)
}

fn render(term: &Term) -> String {
    match term {
        Term::NamedNode(node) => local_name(node.as_str()).to_string(),
        Term::Literal(literal) => literal.value().to_string(),
        other => other.to_string(),
    }
}

/// Normalized result of one query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryOutcome {
    /// Projected variables, in query order.
    #[serde(rename = "vars")]
    pub variables: Vec<String>,
    /// One map per solution. Unbound variables are absent from their row.
    pub rows: Vec<BTreeMap<String, String>>,
    pub row_count: usize,
}

impl QueryOutcome {
    fn from_rows(variables: Vec<String>, rows: Vec<BTreeMap<String, String>>) -> Self {
        Self {
            variables,
            row_count: rows.len(),
            rows,
        }
    }
}

/// Shape returned to the conversational layer: the outcome on success, an
/// empty JSON list on any failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ToolResponse {
    Success(QueryOutcome),
    Empty(Vec<String>),
}

impl ToolResponse {
    pub fn is_empty_sentinel(&self) -> bool {
        matches!(self, Self::Empty(_))
    }
}

/// Identity of the graph file as last loaded.
///
/// Every rebuild renames a fresh file into place, so the inode changes even
/// when size and mtime (at filesystem granularity) do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: SystemTime,
    len: u64,
    inode: u64,
}

impl FileStamp {
    fn read(path: &Path) -> Result<Self, GraphError> {
        let io_err = |e| GraphError::Io {
            path: path.display().to_string(),
            source: e,
        };
        let meta = std::fs::metadata(path).map_err(io_err)?;
        Ok(Self {
            modified: meta.modified().map_err(io_err)?,
            len: meta.len(),
            inode: inode(&meta),
        })
    }
}

#[cfg(unix)]
fn inode(meta: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.ino()
}

#[cfg(not(unix))]
fn inode(_meta: &std::fs::Metadata) -> u64 {
    0
}

struct CachedStore {
    stamp: FileStamp,
    store: Store,
}

/// Runs queries against one graph file, reloading it when it changes.
pub struct QueryExecutor {
    path: PathBuf,
    cache: RwLock<Option<CachedStore>>,
}

impl QueryExecutor {
    pub fn new(graph_path: impl Into<PathBuf>) -> Self {
        Self {
            path: graph_path.into(),
            cache: RwLock::new(None),
        }
    }

    /// Current store, loading the file if it is new or has changed.
    fn store(&self) -> Result<Store, GraphError> {
        let stamp = FileStamp::read(&self.path)?;
        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(cached) = cache.as_ref()
                && cached.stamp == stamp
            {
                return Ok(cached.store.clone());
            }
        }

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = cache.as_ref()
            && cached.stamp == stamp
        {
            return Ok(cached.store.clone());
        }
        tracing::debug!(path = %self.path.display(), "loading knowledge graph");
        let store = load_store(&self.path)?;
        *cache = Some(CachedStore {
            stamp,
            store: store.clone(),
        });
        Ok(store)
    }

    /// Number of triples in the graph.
    pub fn triple_count(&self) -> QueryResult<usize> {
        self.store()?.len().map_err(|e| {
            QueryError::Graph(GraphError::Store {
                message: e.to_string(),
            })
        })
    }

    /// Run a query exactly as given. No prefixes are added.
    pub fn execute(&self, query: &str) -> QueryResult<QueryOutcome> {
        let store = self.store()?;
        let results = SparqlEvaluator::new()
            .parse_query(query)
            .map_err(|e| QueryError::Syntax {
                message: e.to_string(),
            })?
            .on_store(&store)
            .execute()
            .map_err(|e| QueryError::Evaluation {
                message: e.to_string(),
            })?;
        let evaluation = |e: &dyn std::fmt::Display| QueryError::Evaluation {
            message: e.to_string(),
        };

        match results {
            QueryResults::Solutions(solutions) => {
                let variables: Vec<String> = solutions
                    .variables()
                    .iter()
                    .map(|v| v.as_str().to_string())
                    .collect();
                let mut rows = Vec::new();
                for solution in solutions {
                    let solution = solution.map_err(|e| evaluation(&e))?;
                    rows.push(
                        solution
                            .iter()
                            .map(|(var, term)| (var.as_str().to_string(), render(term)))
                            .collect(),
                    );
                }
                Ok(QueryOutcome::from_rows(variables, rows))
            }
            QueryResults::Boolean(answer) => Ok(QueryOutcome::from_rows(
                vec!["result".into()],
                vec![BTreeMap::from([("result".into(), answer.to_string())])],
            )),
            QueryResults::Graph(triples) => {
                let mut rows = Vec::new();
                for triple in triples {
                    let triple = triple.map_err(|e| evaluation(&e))?;
                    rows.push(BTreeMap::from([
                        ("subject".into(), render(&Term::from(triple.subject))),
                        (
                            "predicate".into(),
                            local_name(triple.predicate.as_str()).to_string(),
                        ),
                        ("object".into(), render(&triple.object)),
                    ]));
                }
                Ok(QueryOutcome::from_rows(
                    vec!["subject".into(), "predicate".into(), "object".into()],
                    rows,
                ))
            }
        }
    }

    /// Tool entry point: the outcome on success, `[]` on any failure.
    pub fn execute_sparql_query(&self, query: &str) -> ToolResponse {
        match self.execute(query) {
            Ok(outcome) => ToolResponse::Success(outcome),
            Err(e) => {
                tracing::warn!(error = %e, "SPARQL query failed, returning empty result");
                ToolResponse::Empty(Vec::new())
            }
        }
    }
}

impl std::fmt::Debug for QueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryExecutor")
            .field("path", &self.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::config::ColumnConfig;
    use crate::graph::builder::{UnresolvedPolicy, build_graph};
    use crate::graph::{persist, prefix_header};
    use crate::ingest::Table;

    const ROWS: &str = "cases.submitter_id\tdemographic.gender\tdiagnoses.age_at_diagnosis\tcases.primary_site\tdiagnoses.primary_diagnosis\tncit_code\n\
        AD1\tfemale\t100\tLung\tNon-small cell lung carcinoma\tNCIT:C2926\n\
        AD2\tmale\t200\tProstate\tProstate adenocarcinoma\tNCIT:C2919\n\
        AD3\tmale\t300\tBreast\tInvasive breast carcinoma\tNCIT:C65151\n\
        AD4\tfemale\t400\tBreast\tInvasive breast carcinoma\tNCIT:C65151\n\
        AD5\tfemale\t500\tBreast\tBreast carcinoma, invasive\tNCIT:C65151\n";

    fn executor(dir: &TempDir, rows: &str) -> QueryExecutor {
        let table = Table::parse_tsv(rows, "rows").unwrap();
        let (graph, _) =
            build_graph(&table, &ColumnConfig::default(), UnresolvedPolicy::default()).unwrap();
        let path = dir.path().join("knowledge_graph.ttl");
        persist::serialize(&graph, &path).unwrap();
        QueryExecutor::new(path)
    }

    #[test]
    fn local_name_splits_on_hash_only() {
        assert_eq!(
            local_name("https://evs.nci.nih.gov/ftp1/NCI_Thesaurus/Thesaurus_25.11d.OWL#C2929"),
            "C2929"
        );
        assert_eq!(
            local_name("http://www.oncograph.net/hospital-data/AD1004"),
            "http://www.oncograph.net/hospital-data/AD1004"
        );
    }

    #[test]
    fn counts_patients_by_diagnosis_code() {
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir, ROWS);
        let query = format!(
            "{}SELECT ?patient WHERE {{ ?patient og:hasDiagnosis ncit:C65151 . }}",
            prefix_header()
        );
        let outcome = exec.execute(&query).unwrap();
        assert_eq!(outcome.row_count, 3);
        assert_eq!(outcome.variables, vec!["patient".to_string()]);
    }

    #[test]
    fn literals_and_codes_are_shortened() {
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir, ROWS);
        let query = format!(
            "{}SELECT ?code ?age WHERE {{ og:AD2 og:hasDiagnosis ?code ; og:ageAtDiagnosisDays ?age . }}",
            prefix_header()
        );
        let outcome = exec.execute(&query).unwrap();
        assert_eq!(outcome.rows[0]["code"], "C2919");
        assert_eq!(outcome.rows[0]["age"], "200");
    }

    #[test]
    fn malformed_query_returns_empty_list() {
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir, ROWS);

        let response = exec.execute_sparql_query("SELEC ?x WHERE { ?x ?y }");
        assert!(response.is_empty_sentinel());
        assert_eq!(serde_json::to_string(&response).unwrap(), "[]");
        assert!(matches!(
            exec.execute("SELEC ?x WHERE { ?x ?y }"),
            Err(QueryError::Syntax { .. })
        ));
    }

    #[test]
    fn undeclared_prefix_is_not_injected() {
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir, ROWS);
        assert!(matches!(
            exec.execute("SELECT ?p WHERE { ?p og:hasDiagnosis ?d }"),
            Err(QueryError::Syntax { .. })
        ));
    }

    #[test]
    fn success_serializes_in_tool_shape() {
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir, ROWS);
        let response = exec.execute_sparql_query(&format!(
            "{}SELECT ?site WHERE {{ og:AD1 og:hasDiseasePrimarySite ?site }}",
            prefix_header()
        ));
        let json: serde_json::Value = serde_json::to_value(&response).unwrap();
        assert_eq!(json["vars"], serde_json::json!(["site"]));
        assert_eq!(json["rows"], serde_json::json!([{"site": "Lung"}]));
        assert_eq!(json["row_count"], 1);
    }

    #[test]
    fn ask_and_construct_are_normalized() {
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir, ROWS);

        let ask = exec
            .execute(&format!("{}ASK {{ og:AD1 a schema:Patient }}", prefix_header()))
            .unwrap();
        assert_eq!(ask.variables, vec!["result".to_string()]);
        assert_eq!(ask.rows[0]["result"], "true");

        let construct = exec
            .execute(&format!(
                "{}CONSTRUCT {{ ?d rdfs:label ?l }} WHERE {{ og:AD2 og:hasDiagnosis ?d . ?d rdfs:label ?l }}",
                prefix_header()
            ))
            .unwrap();
        assert_eq!(construct.row_count, 1);
        assert_eq!(construct.rows[0]["subject"], "C2919");
        assert_eq!(construct.rows[0]["predicate"], "label");
        assert_eq!(construct.rows[0]["object"], "Prostate adenocarcinoma");
    }

    #[test]
    fn missing_graph_file_is_a_graph_error() {
        let dir = TempDir::new().unwrap();
        let exec = QueryExecutor::new(dir.path().join("nope.ttl"));
        assert!(matches!(
            exec.execute("SELECT * WHERE { ?s ?p ?o }"),
            Err(QueryError::Graph(GraphError::Io { .. }))
        ));
        assert!(exec.execute_sparql_query("SELECT * WHERE { ?s ?p ?o }").is_empty_sentinel());
    }

    #[cfg(unix)]
    #[test]
    fn same_size_rebuild_with_equal_mtime_is_reloaded() {
        let header = "cases.submitter_id\tdemographic.gender\tdiagnoses.age_at_diagnosis\tcases.primary_site\tdiagnoses.primary_diagnosis\tncit_code\n";
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir, &format!("{header}AD1\tfemale\t100\tLung\tAdenocarcinoma\tNCIT:C2852\n"));
        let site = format!(
            "{}SELECT ?site WHERE {{ ?p og:hasDiseasePrimarySite ?site }}",
            prefix_header()
        );
        assert_eq!(exec.execute(&site).unwrap().rows[0]["site"], "Lung");

        let path = dir.path().join("knowledge_graph.ttl");
        let before = std::fs::metadata(&path).unwrap();
        let table = Table::parse_tsv(
            &format!("{header}AD1\tfemale\t100\tSkin\tAdenocarcinoma\tNCIT:C2852\n"),
            "rows",
        )
        .unwrap();
        let (graph, _) =
            build_graph(&table, &ColumnConfig::default(), UnresolvedPolicy::default()).unwrap();
        persist::serialize(&graph, &path).unwrap();
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(before.modified().unwrap())
            .unwrap();
        let after = std::fs::metadata(&path).unwrap();
        assert_eq!(after.len(), before.len());
        assert_eq!(after.modified().unwrap(), before.modified().unwrap());

        assert_eq!(exec.execute(&site).unwrap().rows[0]["site"], "Skin");
    }

    #[test]
    fn executor_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<QueryExecutor>();
    }
}
