//! oncograph CLI: clinical oncology records → ontology-coded knowledge graph.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use oncograph::config::PipelineConfig;
use oncograph::graph::{QueryExecutor, prefix_header};
use oncograph::ontology::{OntologyLookup, OntologyMapping, ReviewQueue, StaticLookup};
use oncograph::paths::DataPaths;
use oncograph::pipeline::{Pipeline, RunOptions};

#[derive(Parser)]
#[command(
    name = "oncograph",
    version,
    about = "Build and query an NCIt-coded oncology knowledge graph"
)]
struct Cli {
    /// Data directory holding the manifest, downloads and checkpoints.
    #[arg(long, global = true, default_value = "data")]
    data_dir: PathBuf,

    /// Config file (defaults to <data-dir>/oncograph.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory layout and a default config file.
    Init {
        /// Overwrite an existing config file.
        #[arg(long)]
        force: bool,
    },

    /// Download the manifest's clinical files and write the merged checkpoint.
    Download,

    /// Resolve diagnosis labels to ontology codes and write the enriched checkpoint.
    Map {
        /// Look up labels previously recorded as NO_MATCH again.
        #[arg(long)]
        retry_unresolved: bool,

        /// Do not contact the ontology service; unknown labels become NO_MATCH.
        #[arg(long)]
        offline: bool,
    },

    /// Build the knowledge graph from the enriched checkpoint and write it.
    Graph,

    /// Run every stage, resuming from existing checkpoints.
    Build {
        /// Never download; merge the files already in raw/clinical/.
        #[arg(long)]
        offline: bool,

        /// Ingest again even if a merged checkpoint exists.
        #[arg(long)]
        refresh: bool,

        /// Look up labels previously recorded as NO_MATCH again.
        #[arg(long)]
        retry_unresolved: bool,
    },

    /// Run a SPARQL query against the persisted graph and print JSON.
    Query {
        /// Query text. Reads --file when omitted.
        query: Option<String>,

        /// Read the query from a file.
        #[arg(long, short)]
        file: Option<PathBuf>,

        /// Prepend PREFIX declarations for og:, ncit:, schema:, rdf:, rdfs: and xsd:.
        #[arg(long)]
        prefixes: bool,

        /// Report query errors instead of printing an empty list.
        #[arg(long)]
        strict: bool,
    },

    /// Print the label → code dictionary as JSON.
    Mapping {
        /// Print the review queue instead.
        #[arg(long)]
        review: bool,
    },

    /// Show graph and mapping statistics.
    Info,
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let paths = DataPaths::new(&cli.data_dir);
    let config_path = cli.config.clone().unwrap_or_else(|| paths.config_file.clone());

    match cli.command {
        Commands::Init { force } => {
            paths.ensure_dirs()?;
            if force || !config_path.exists() {
                PipelineConfig::default().save(&config_path)?;
                println!("Wrote default config to {}", config_path.display());
            } else {
                println!("Keeping existing config {}", config_path.display());
            }
            println!("Data directory ready at {}", paths.root.display());
            println!("Place the manifest at {}", paths.manifest.display());
        }

        Commands::Download => {
            let table = open_pipeline(&paths, &config_path)?.download_stage()?;
            println!(
                "Merged {} rows into {}",
                table.len(),
                paths.merged_table.display()
            );
        }

        Commands::Map {
            retry_unresolved,
            offline,
        } => {
            let pipeline = open_pipeline(&paths, &config_path)?;
            let mut table = pipeline.merged_table(RunOptions {
                offline: true,
                ..Default::default()
            })?;
            let report = if offline {
                pipeline.resolve_stage(&mut table, &StaticLookup::default(), retry_unresolved)?
            } else {
                pipeline.resolve_stage(&mut table, &pipeline.lookup_client(), retry_unresolved)?
            };
            println!(
                "Labels: {} distinct, {} cached, {} resolved, {} unresolved, {} flagged for review",
                report.distinct, report.cached, report.resolved, report.unresolved, report.flagged
            );
            println!("Enriched table: {}", paths.enriched_table.display());
        }

        Commands::Graph => {
            let pipeline = open_pipeline(&paths, &config_path)?;
            let table = pipeline.enriched_table()?;
            let (graph, report) = pipeline.build_stage(&table)?;
            pipeline.persist_stage(&graph)?;
            println!(
                "Built {} triples for {} patients ({} rows skipped, {} without age, {} unresolved)",
                graph.len(),
                report.patients,
                report.skipped,
                report.missing_age,
                report.unresolved
            );
            println!("Graph: {}", paths.graph_file.display());
        }

        Commands::Build {
            offline,
            refresh,
            retry_unresolved,
        } => {
            let opts = RunOptions {
                offline,
                refresh,
                retry_unresolved,
            };
            let pipeline = open_pipeline(&paths, &config_path)?;
            let offline_lookup = StaticLookup::default();
            let online_lookup;
            let lookup: &dyn OntologyLookup = if offline {
                &offline_lookup
            } else {
                online_lookup = pipeline.lookup_client();
                &online_lookup
            };
            let summary = pipeline.run_all(lookup, opts)?;
            println!(
                "{} rows → {} patients, {} triples ({} labels resolved, {} unresolved)",
                summary.rows,
                summary.build.patients,
                summary.triples,
                summary.mapping.resolved,
                summary.mapping.unresolved
            );
            println!("Graph: {}", paths.graph_file.display());
        }

        Commands::Query {
            query,
            file,
            prefixes,
            strict,
        } => {
            let text = match (query, file) {
                (Some(q), _) => q,
                (None, Some(f)) => std::fs::read_to_string(&f).into_diagnostic()?,
                (None, None) => miette::bail!("provide a query argument or --file"),
            };
            let text = if prefixes {
                format!("{}{text}", prefix_header())
            } else {
                text
            };

            let executor = QueryExecutor::new(&paths.graph_file);
            let json = if strict {
                let outcome = executor.execute(&text)?;
                serde_json::to_string_pretty(&outcome).into_diagnostic()?
            } else {
                let response = executor.execute_sparql_query(&text);
                serde_json::to_string_pretty(&response).into_diagnostic()?
            };
            println!("{json}");
        }

        Commands::Mapping { review } => {
            let json = if review {
                let queue = ReviewQueue::open(&paths.review_queue)?;
                serde_json::to_string_pretty(&queue).into_diagnostic()?
            } else {
                let mapping = OntologyMapping::open(&paths.mapping_file)?;
                serde_json::to_string_pretty(&mapping).into_diagnostic()?
            };
            println!("{json}");
        }

        Commands::Info => {
            let mapping = OntologyMapping::open(&paths.mapping_file)?;
            let review = ReviewQueue::open(&paths.review_queue)?;
            println!("Data directory: {}", paths.root.display());
            println!(
                "Mapping: {} labels ({} unresolved), {} awaiting review",
                mapping.len(),
                mapping.unresolved().count(),
                review.len()
            );

            if !paths.graph_file.exists() {
                println!("Graph: not built yet (run `oncograph build`)");
                return Ok(());
            }
            let executor = QueryExecutor::new(&paths.graph_file);
            let count = |pattern: &str| -> Result<String> {
                let outcome = executor.execute(&format!(
                    "{}SELECT (COUNT(DISTINCT ?x) AS ?n) WHERE {{ {pattern} }}",
                    prefix_header()
                ))?;
                Ok(outcome
                    .rows
                    .first()
                    .and_then(|row| row.get("n").cloned())
                    .unwrap_or_else(|| "0".into()))
            };
            println!("Graph: {}", paths.graph_file.display());
            println!("  triples:    {}", executor.triple_count()?);
            println!("  patients:   {}", count("?x a schema:Patient")?);
            println!("  diagnoses:  {}", count("?p og:hasDiagnosis ?x")?);
        }
    }

    Ok(())
}

fn open_pipeline(paths: &DataPaths, config_path: &Path) -> Result<Pipeline> {
    let config = PipelineConfig::load_or_default(config_path)?;
    Ok(Pipeline::new(paths.clone(), config))
}
