//! PathoID: ClinVar clinical significance for variant tables.
//! Entry point for the `pathoid` binary.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use pathoid_ingestion::loader::load_variants;
use pathoid_ingestion::normalise::{AnnotationNormaliser, GeneFilter};
use pathoid_ingestion::pipeline::{RunOutcome, SearchOrchestrator};
use pathoid_ingestion::report::{output_path, write_report, OutputMode};
use pathoid_ingestion::sources::EutilsClient;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pathoid")]
#[command(author, version, about = "Annotate variant tables with ClinVar clinical significance")]
#[command(
    long_about = "Look up each variant of an ANNOVAR-style table in ClinVar and report its clinical significance and disease conditions.

Examples:
  pathoid run1.output
  pathoid variants.csv --gene BRCA1 --gene BRCA2
  pathoid run1.output --output-mode append --output-dir reports/"
)]
struct Cli {
    /// Variant table (.csv or tab-delimited .output)
    input: PathBuf,

    /// Config file (default: $PATHOID_CONFIG, then ./pathoid.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Report layout
    #[arg(short = 'm', long, value_parser = ["summary", "append"])]
    output_mode: Option<String>,

    /// Only search annotations mentioning this gene (repeatable)
    #[arg(short, long = "gene")]
    genes: Vec<String>,

    /// Directory for the report (default: next to the input)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
}

impl Cli {
    /// Command-line flags take precedence over the config file.
    fn apply(&self, config: &mut config::Config) {
        match self.output_mode.as_deref() {
            Some("summary") => config.output.mode = OutputMode::Summary,
            Some("append")  => config.output.mode = OutputMode::Append,
            _ => {}
        }
        if !self.genes.is_empty() {
            config.filter.genes = self.genes.clone();
        }
        if let Some(ref dir) = self.output_dir {
            config.output.dir = Some(dir.clone());
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pathoid=info,warn")),
        )
        .init();

    let cli = Cli::parse();
    info!("PathoID {}", env!("CARGO_PKG_VERSION"));

    let mut config = config::Config::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    info!(
        policy = ?config.clinvar.query_policy,
        mode = ?config.output.mode,
        genes = ?config.filter.genes,
        api_key = config.clinvar.api_key.is_some(),
        "Configuration loaded"
    );

    let table = load_variants(&cli.input, &config.input.columns)
        .with_context(|| format!("Could not load {}", cli.input.display()))?;

    let filter = GeneFilter::new(config.filter.genes.iter().cloned());
    let mut records = AnnotationNormaliser::new().prepare_all(table.variants.clone(), &filter);

    let client = EutilsClient::with_base_url(
        &config.clinvar.base_url,
        config.clinvar.api_key.clone(),
        config.clinvar.timeout(),
    )?;
    let orchestrator = SearchOrchestrator::new(Arc::new(client), &config.search_config());
    let report = orchestrator.run(&mut records).await;

    if report.outcome == RunOutcome::NoVariants {
        warn!(path = %cli.input.display(), "Input has no variant rows; nothing written");
        return Ok(ExitCode::SUCCESS);
    }

    let date = chrono::Local::now().date_naive();
    let path = output_path(&cli.input, config.output.mode, date, config.output.dir.as_deref());
    write_report(&path, config.output.mode, &table, &records)?;

    info!(
        total = report.total,
        searchable = report.searchable,
        with_identifiers = report.with_identifiers,
        summarised = report.summarised,
        degraded = report.degraded,
        path = %path.display(),
        "Done"
    );

    match report.outcome {
        RunOutcome::Aborted { phase, index, reason } => {
            tracing::error!(
                phase = phase.as_str(),
                row = index + 1,
                %reason,
                "Search stopped early; rows from this one on are unresolved"
            );
            Ok(ExitCode::FAILURE)
        }
        _ => Ok(ExitCode::SUCCESS),
    }
}
