//! Processing pipeline: Ingest → Resolve → Build → Persist.
//!
//! Each stage writes a checkpoint under `processed/`, so a later run (or a
//! single CLI subcommand) picks up where the previous one stopped:
//!
//! - **Ingest** writes `merged_clinical.tsv`
//! - **Resolve** writes `ontology_mapping.json`, `review_queue.json` and
//!   `completed_clinical.tsv`
//! - **Build** + **Persist** write `knowledge_graph.ttl`

use std::fmt;

use oxigraph::model::Graph;

use crate::config::PipelineConfig;
use crate::error::OncoResult;
use crate::graph::{self, BuildReport};
use crate::ingest::{
    BulkDownloader, IngestError, Manifest, Table, extract_fresh, flatten_dir, merge_tables,
};
use crate::ontology::{
    MappingReport, OlsClient, OntologyLookup, OntologyMapping, ReviewQueue, ResolveOptions,
};
use crate::paths::DataPaths;

/// Built-in pipeline stage types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    /// Manifest → bundle download → flat extraction → merged table.
    Ingest,
    /// Diagnosis labels → ontology codes.
    Resolve,
    /// Enriched table → triples.
    Build,
    /// Triples → Turtle file.
    Persist,
}

impl StageKind {
    pub const ALL: [StageKind; 4] = [Self::Ingest, Self::Resolve, Self::Build, Self::Persist];

    pub fn name(self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Resolve => "resolve",
            Self::Build => "build",
            Self::Persist => "persist",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Flags for a full run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Never download; merge whatever is already in `raw/clinical/`.
    pub offline: bool,
    /// Ignore an existing merged checkpoint and ingest again.
    pub refresh: bool,
    /// Look up labels previously recorded as NO_MATCH again.
    pub retry_unresolved: bool,
}

/// What a full run did.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub rows: usize,
    pub mapping: MappingReport,
    pub build: BuildReport,
    pub triples: usize,
}

/// Stage runner bound to one data directory and configuration.
#[derive(Debug, Clone)]
pub struct Pipeline {
    paths: DataPaths,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(paths: DataPaths, config: PipelineConfig) -> Self {
        Self { paths, config }
    }

    pub fn paths(&self) -> &DataPaths {
        &self.paths
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// OLS client configured from the pipeline settings.
    pub fn lookup_client(&self) -> OlsClient {
        OlsClient::new(
            self.config.ontology_endpoint.clone(),
            self.config.ontology.clone(),
            self.config.lookup_timeout(),
        )
    }

    /// Download the manifest's primary files and merge them.
    pub fn download_stage(&self) -> OncoResult<Table> {
        self.paths.ensure_dirs()?;
        let manifest = Manifest::read(&self.paths.manifest)?;
        let ids = manifest.primary_ids(&self.config.excluded_kind);
        if ids.is_empty() {
            return Err(IngestError::EmptyManifest {
                excluded: self.config.excluded_kind.clone(),
            }
            .into());
        }
        tracing::info!(
            stage = %StageKind::Ingest,
            listed = manifest.entries.len(),
            selected = ids.len(),
            "manifest parsed"
        );

        let downloader =
            BulkDownloader::new(self.config.data_endpoint.clone(), self.config.download_timeout());
        let archive = downloader.download(&ids, &self.paths.raw_dir)?;
        extract_fresh(&archive, &self.paths.clinical_dir)?;

        self.merge_stage()
    }

    /// Merge the files already in `raw/clinical/` and write the checkpoint.
    pub fn merge_stage(&self) -> OncoResult<Table> {
        self.paths.ensure_dirs()?;
        let moved = flatten_dir(&self.paths.clinical_dir)?;
        if !moved.files.is_empty() {
            tracing::info!(
                stage = %StageKind::Ingest,
                files = moved.files.len(),
                renamed = moved.renamed.len(),
                "flattened nested clinical files"
            );
        }
        let table = merge_tables(&self.paths.clinical_dir, &self.config.file_pattern)?;
        table.write_tsv(&self.paths.merged_table)?;
        tracing::info!(
            stage = %StageKind::Ingest,
            rows = table.len(),
            path = %self.paths.merged_table.display(),
            "merged checkpoint written"
        );
        Ok(table)
    }

    /// Merged table from its checkpoint, ingesting first when there is none.
    pub fn merged_table(&self, opts: RunOptions) -> OncoResult<Table> {
        if !opts.refresh && self.paths.merged_table.exists() {
            tracing::info!(
                stage = %StageKind::Ingest,
                path = %self.paths.merged_table.display(),
                "resuming from merged checkpoint"
            );
            return Ok(Table::read_tsv(&self.paths.merged_table)?);
        }
        if opts.offline {
            self.merge_stage()
        } else {
            self.download_stage()
        }
    }

    /// Map every diagnosis label in `table`, then write the code column and
    /// the enriched checkpoint.
    pub fn resolve_stage(
        &self,
        table: &mut Table,
        lookup: &dyn OntologyLookup,
        retry_unresolved: bool,
    ) -> OncoResult<MappingReport> {
        self.paths.ensure_dirs()?;
        let columns = &self.config.columns;
        let label_col = table.require_column(
            &columns.primary_diagnosis,
            &self.paths.merged_table.display().to_string(),
        )?;

        let mut mapping = OntologyMapping::open(&self.paths.mapping_file)?;
        let mut review = ReviewQueue::open(&self.paths.review_queue)?;
        if retry_unresolved {
            let forgotten = mapping.forget_unresolved();
            tracing::info!(stage = %StageKind::Resolve, labels = forgotten, "retrying unresolved labels");
        }

        let opts = ResolveOptions {
            require_label_match: self.config.require_label_match,
        };
        let report = mapping.resolve_all(table.values(label_col), lookup, opts, &mut review);
        mapping.save(&self.paths.mapping_file)?;
        review.save(&self.paths.review_queue)?;

        mapping.annotate(table, &columns.primary_diagnosis, &columns.ontology_code)?;
        table.write_tsv(&self.paths.enriched_table)?;
        tracing::info!(
            stage = %StageKind::Resolve,
            review = review.len(),
            path = %self.paths.enriched_table.display(),
            "enriched checkpoint written"
        );
        Ok(report)
    }

    /// Enriched table for graph building.
    ///
    /// Codes are re-applied from the mapping cache, so hand edits to
    /// `ontology_mapping.json` take effect. A label without an entry is an
    /// error.
    pub fn enriched_table(&self) -> OncoResult<Table> {
        let source = if self.paths.enriched_table.exists() {
            &self.paths.enriched_table
        } else {
            &self.paths.merged_table
        };
        let mut table = Table::read_tsv(source)?;
        let mapping = OntologyMapping::open(&self.paths.mapping_file)?;
        let columns = &self.config.columns;
        mapping.annotate(&mut table, &columns.primary_diagnosis, &columns.ontology_code)?;
        Ok(table)
    }

    pub fn build_stage(&self, table: &Table) -> OncoResult<(Graph, BuildReport)> {
        let built = graph::build_graph(table, &self.config.columns, self.config.unresolved)?;
        Ok(built)
    }

    pub fn persist_stage(&self, graph: &Graph) -> OncoResult<()> {
        self.paths.ensure_dirs()?;
        graph::serialize(graph, &self.paths.graph_file)?;
        Ok(())
    }

    /// Run every stage, resuming from the merged checkpoint when present.
    pub fn run_all(&self, lookup: &dyn OntologyLookup, opts: RunOptions) -> OncoResult<RunSummary> {
        let mut table = self.merged_table(opts)?;
        let mapping = self.resolve_stage(&mut table, lookup, opts.retry_unresolved)?;
        let (graph, build) = self.build_stage(&table)?;
        self.persist_stage(&graph)?;

        let summary = RunSummary {
            rows: table.len(),
            mapping,
            build,
            triples: graph.len(),
        };
        tracing::info!(
            rows = summary.rows,
            patients = summary.build.patients,
            triples = summary.triples,
            graph = %self.paths.graph_file.display(),
            "pipeline complete"
        );
        Ok(summary)
    }
}
