//! Enriched table → RDF triples.
//!
//! Each row becomes one patient node in the `og:` namespace carrying exactly
//! one type, gender, primary site and diagnosis statement, plus one age
//! statement when the row has a usable age. Diagnosis
//! codes become nodes in the `ncit:` namespace labelled with the free-text
//! diagnosis of the last row that named them.

use oxigraph::model::vocab::{rdf, rdfs, xsd};
use oxigraph::model::{Graph, Literal, NamedNode, Term, TermRef, Triple, TripleRef};
use serde::{Deserialize, Serialize};

use crate::config::ColumnConfig;
use crate::error::{GraphError, GraphResult};
use crate::ingest::Table;
use crate::ontology::NO_MATCH;

use super::{NCIT_NS, OG_NS, SCHEMA_NS, iri};

/// Label attached to the catch-all node for unresolved diagnoses.
pub const UNCLASSIFIED_LABEL: &str = "Unclassified diagnosis";

/// How rows whose diagnosis code is [`NO_MATCH`] enter the graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnresolvedPolicy {
    /// Link to `ncit:NO_MATCH`, as if the sentinel were a real code.
    Link,
    /// Link to `og:UnclassifiedDiagnosis`.
    #[default]
    Unclassified,
    /// Leave the row out of the graph.
    Skip,
}

/// Positions of the builder's input columns in a table.
#[derive(Debug, Clone, Copy)]
pub struct ColumnIndex {
    patient_id: usize,
    gender: usize,
    age_at_diagnosis: usize,
    primary_site: usize,
    primary_diagnosis: usize,
    ontology_code: usize,
}

impl ColumnIndex {
    pub fn resolve(table: &Table, columns: &ColumnConfig) -> GraphResult<Self> {
        let find = |name: &str| {
            table.column(name).ok_or_else(|| GraphError::MissingColumn {
                column: name.to_string(),
            })
        };
        Ok(Self {
            patient_id: find(&columns.patient_id)?,
            gender: find(&columns.gender)?,
            age_at_diagnosis: find(&columns.age_at_diagnosis)?,
            primary_site: find(&columns.primary_site)?,
            primary_diagnosis: find(&columns.primary_diagnosis)?,
            ontology_code: find(&columns.ontology_code)?,
        })
    }
}

/// One patient-diagnosis observation, validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClinicalRecord {
    pub patient_id: String,
    pub gender: String,
    /// `None` when the source value is missing or not a whole day count.
    pub age_days: Option<u64>,
    pub primary_site: String,
    pub diagnosis_label: String,
    /// `PREFIX:code` or [`NO_MATCH`].
    pub code: String,
}

impl ClinicalRecord {
    /// Extract and validate a row. `row_no` is 1-based and only used in errors.
    ///
    /// Only a missing patient identifier rejects the row.
    pub fn from_row(row: &[String], idx: &ColumnIndex, row_no: usize) -> GraphResult<Self> {
        let field = |i: usize| row.get(i).map(|v| v.trim()).unwrap_or_default();

        let patient_id = field(idx.patient_id);
        if patient_id.is_empty() {
            return Err(GraphError::BadRow {
                row: row_no,
                message: "missing patient identifier".into(),
            });
        }
        let age_days = parse_age(field(idx.age_at_diagnosis));
        let code = match field(idx.ontology_code) {
            "" => NO_MATCH,
            c => c,
        };

        Ok(Self {
            patient_id: patient_id.to_string(),
            gender: field(idx.gender).to_string(),
            age_days,
            primary_site: field(idx.primary_site).to_string(),
            diagnosis_label: field(idx.primary_diagnosis).to_string(),
            code: code.to_string(),
        })
    }

    pub fn is_unresolved(&self) -> bool {
        self.code == NO_MATCH
    }
}

/// Integral day count. Float text such as `25450.0` is accepted when whole.
fn parse_age(raw: &str) -> Option<u64> {
    if let Ok(days) = raw.parse::<u64>() {
        return Some(days);
    }
    let days: f64 = raw.parse().ok()?;
    (days.is_finite() && days >= 0.0 && days.fract() == 0.0 && days <= u64::MAX as f64)
        .then_some(days as u64)
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
fn encode_local(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for b in id.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

/// `og:<id>`, percent-encoding unsafe characters.
pub fn patient_iri(patient_id: &str) -> GraphResult<NamedNode> {
    iri(OG_NS, &encode_local(patient_id))
}

/// `ncit:<code>` with any `PREFIX:` stripped (`NCIT:C2929` → `ncit:C2929`).
pub fn diagnosis_iri(code: &str) -> GraphResult<NamedNode> {
    let local = code.split_once(':').map_or(code, |(_, local)| local);
    iri(NCIT_NS, local)
}

/// Counters from one build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Rows read from the table.
    pub rows: usize,
    /// Distinct patients in the graph.
    pub patients: usize,
    /// Rows left out (no patient id, or unresolved under [`UnresolvedPolicy::Skip`]).
    pub skipped: usize,
    /// Patients written without an age statement.
    pub missing_age: usize,
    /// Rows whose code was [`NO_MATCH`].
    pub unresolved: usize,
    /// Rows that replaced an earlier row for the same patient.
    pub duplicates: usize,
}

/// Accumulates patient statements into a [`Graph`].
pub struct GraphBuilder {
    graph: Graph,
    policy: UnresolvedPolicy,
    patient_class: NamedNode,
    gender: NamedNode,
    age: NamedNode,
    has_diagnosis: NamedNode,
    primary_site: NamedNode,
    unclassified: NamedNode,
}

impl GraphBuilder {
    pub fn new(policy: UnresolvedPolicy) -> GraphResult<Self> {
        Ok(Self {
            graph: Graph::new(),
            policy,
            patient_class: iri(SCHEMA_NS, "Patient")?,
            gender: iri(SCHEMA_NS, "Gender")?,
            age: iri(OG_NS, "ageAtDiagnosisDays")?,
            has_diagnosis: iri(OG_NS, "hasDiagnosis")?,
            primary_site: iri(OG_NS, "hasDiseasePrimarySite")?,
            unclassified: iri(OG_NS, "UnclassifiedDiagnosis")?,
        })
    }

    /// Add one record, replacing any earlier statements about the same patient.
    pub fn add(&mut self, record: &ClinicalRecord) -> GraphResult<AddOutcome> {
        let diagnosis = match (record.is_unresolved(), self.policy) {
            (true, UnresolvedPolicy::Skip) => return Ok(AddOutcome::Skipped),
            (true, UnresolvedPolicy::Unclassified) => {
                let node = self.unclassified.clone();
                self.set_label(&node, UNCLASSIFIED_LABEL);
                node
            }
            _ => {
                let node = diagnosis_iri(&record.code)?;
                self.set_label(&node, &record.diagnosis_label);
                node
            }
        };

        let patient = patient_iri(&record.patient_id)?;
        let replaced = self.clear_subject(&patient);

        let string = |v: &str| Literal::new_typed_literal(v, xsd::STRING);
        let mut statements = vec![
            (rdf::TYPE.into_owned(), Term::from(self.patient_class.clone())),
            (self.gender.clone(), string(&record.gender).into()),
            (self.has_diagnosis.clone(), diagnosis.into()),
            (self.primary_site.clone(), string(&record.primary_site).into()),
        ];
        if let Some(days) = record.age_days {
            statements.push((
                self.age.clone(),
                Literal::new_typed_literal(days.to_string(), xsd::INTEGER).into(),
            ));
        }
        for (predicate, object) in statements {
            self.graph
                .insert(&Triple::new(patient.clone(), predicate, object));
        }

        Ok(if replaced {
            AddOutcome::Replaced
        } else {
            AddOutcome::Added
        })
    }

    /// Replace any label on `node` with `label`; the last row wins.
    fn set_label(&mut self, node: &NamedNode, label: &str) {
        let stale: Vec<Term> = self
            .graph
            .objects_for_subject_predicate(node.as_ref(), rdfs::LABEL)
            .map(TermRef::into_owned)
            .collect();
        for old in stale {
            self.graph
                .remove(&Triple::new(node.clone(), rdfs::LABEL.into_owned(), old));
        }
        self.graph.insert(&Triple::new(
            node.clone(),
            rdfs::LABEL.into_owned(),
            Literal::new_typed_literal(label, xsd::STRING),
        ));
    }

    /// Drop every statement about `subject`. Returns whether any existed.
    fn clear_subject(&mut self, subject: &NamedNode) -> bool {
        let stale: Vec<Triple> = self
            .graph
            .triples_for_subject(subject.as_ref())
            .map(TripleRef::into_owned)
            .collect();
        for triple in &stale {
            self.graph.remove(triple);
        }
        !stale.is_empty()
    }

    pub fn finish(self) -> Graph {
        self.graph
    }
}

/// What [`GraphBuilder::add`] did with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    Replaced,
    Skipped,
}

/// Build the knowledge graph from an enriched table.
///
/// Invalid rows are logged and counted, never fatal. A row whose age is
/// missing or malformed still yields its patient, without the age statement.
/// A missing input column is fatal.
pub fn build_graph(
    table: &Table,
    columns: &ColumnConfig,
    policy: UnresolvedPolicy,
) -> GraphResult<(Graph, BuildReport)> {
    let idx = ColumnIndex::resolve(table, columns)?;
    let mut builder = GraphBuilder::new(policy)?;
    let mut report = BuildReport {
        rows: table.len(),
        ..Default::default()
    };

    for (i, row) in table.rows.iter().enumerate() {
        let record = match ClinicalRecord::from_row(row, &idx, i + 1) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(row = i + 1, error = %e, "skipping clinical row");
                report.skipped += 1;
                continue;
            }
        };
        if record.is_unresolved() {
            report.unresolved += 1;
        }
        let outcome = builder.add(&record);
        let written = matches!(outcome, Ok(AddOutcome::Added | AddOutcome::Replaced));
        if written && record.age_days.is_none() {
            tracing::warn!(
                row = i + 1,
                patient = %record.patient_id,
                age = row.get(idx.age_at_diagnosis).map(String::as_str).unwrap_or_default(),
                "age is not a non-negative whole number of days, omitting it"
            );
            report.missing_age += 1;
        }
        match outcome {
            Ok(AddOutcome::Added) => report.patients += 1,
            Ok(AddOutcome::Replaced) => {
                tracing::warn!(
                    row = i + 1,
                    patient = %record.patient_id,
                    "patient appears more than once, keeping the later row"
                );
                report.duplicates += 1;
            }
            Ok(AddOutcome::Skipped) => {
                tracing::debug!(row = i + 1, label = %record.diagnosis_label, "skipping unresolved row");
                report.skipped += 1;
            }
            Err(e) => {
                tracing::warn!(row = i + 1, error = %e, "skipping clinical row");
                report.skipped += 1;
            }
        }
    }

    let graph = builder.finish();
    tracing::info!(
        rows = report.rows,
        patients = report.patients,
        skipped = report.skipped,
        missing_age = report.missing_age,
        unresolved = report.unresolved,
        triples = graph.len(),
        "knowledge graph built"
    );
    Ok((graph, report))
}
