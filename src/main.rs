use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use lattes_scorer::config::ScoringConfig;
use lattes_scorer::observability::{self, metrics};
use lattes_scorer::pipeline::ingestion::{discover_documents, CurriculumDocument, NameIndex};
use lattes_scorer::pipeline::{orchestrator, output, BatchRunner, DocumentOutcome, ReferenceData, ResearcherPipeline};

#[derive(Parser)]
#[command(name = "lattes_scorer")]
#[command(about = "Scores researchers from Lattes curriculum XML exports")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConfigArg {
    /// Run configuration (TOML); defaults to $LATTES_SCORER_CONFIG, then lattes_scorer.toml
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Score every document and write the output tables
    Score {
        #[command(flatten)]
        config: ConfigArg,
        /// Write the Prometheus metrics of the run to this file
        #[arg(long)]
        metrics_out: Option<PathBuf>,
    },
    /// Build the researcher name index
    Index {
        #[command(flatten)]
        config: ConfigArg,
        /// Index destination; defaults to references.name_index, then <output_dir>/name_index.csv
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Score one researcher and print the full report as JSON
    Report {
        #[command(flatten)]
        config: ConfigArg,
        /// Researcher name, resolved through the name index
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        name: Option<String>,
        /// Document path
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Extract and tidy one section of one document, printed as CSV
    Extract {
        #[command(flatten)]
        config: ConfigArg,
        #[arg(long)]
        file: PathBuf,
        /// Section tag, e.g. PRODUCAO-BIBLIOGRAFICA
        #[arg(long)]
        section: String,
    },
}

fn load_config(arg: &ConfigArg) -> anyhow::Result<ScoringConfig> {
    let path = ScoringConfig::locate(arg.config.as_deref());
    let config = ScoringConfig::load(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    info!(config = %path.display(), "Configuration loaded");
    Ok(config)
}

fn load_references(config: &ScoringConfig) -> anyhow::Result<Arc<ReferenceData>> {
    let references = ReferenceData::load(config).context("Failed to load reference tables")?;
    Ok(Arc::new(references))
}

async fn run_score(config: ScoringConfig, metrics_out: Option<PathBuf>) -> anyhow::Result<()> {
    let references = load_references(&config)?;
    let paths = discover_documents(&config.documents_dir, &config.document_extension)?;
    println!("📄 Found {} documents in {}", paths.len(), config.documents_dir.display());

    let runner = BatchRunner::new(&config, references);
    let report = runner.run(paths).await;
    let files = output::write_batch(&report, &config.output_dir)?;

    println!("\n📊 Batch Results (run {}):", report.run_id);
    println!("   Documents: {}", report.document_count());
    println!("   Scored: {}", report.reports.len());
    println!("   Problems: {}", report.problems.len());
    println!("   Scores: {}", files.scores.display());
    println!("   Summary: {}", files.summary.display());
    println!("   Breakdown: {}", files.breakdown.display());

    if !report.problems.is_empty() {
        warn!("{} problem documents in this run", report.problems.len());
        println!("\n⚠️  Problem documents ({}):", files.problems.display());
        for problem in &report.problems {
            println!("   - {}: {}", problem.path, problem.reason);
        }
    }

    if let Some(path) = metrics_out {
        match metrics::render() {
            Some(text) => {
                std::fs::write(&path, text)
                    .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
                println!("📈 Metrics written to {}", path.display());
            }
            None => warn!("Metrics recorder not installed, nothing to write"),
        }
    }
    Ok(())
}

fn run_index(config: &ScoringConfig, out: Option<PathBuf>) -> anyhow::Result<()> {
    let paths = discover_documents(&config.documents_dir, &config.document_extension)?;
    let index = NameIndex::build(&paths);

    let out = out
        .or_else(|| config.references.name_index.clone())
        .unwrap_or_else(|| config.output_dir.join("name_index.csv"));
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    index.write_csv(&out)?;

    println!("🗂️  Indexed {} researchers into {}", index.entries.len(), out.display());
    if !index.problems.is_empty() {
        println!("\n⚠️  Documents left out of the index:");
        for problem in &index.problems {
            println!("   - {}: {}", problem.path, problem.reason);
        }
    }
    Ok(())
}

fn resolve_name(config: &ScoringConfig, name: &str) -> anyhow::Result<PathBuf> {
    let index = match config.references.name_index.as_deref().filter(|p| p.is_file()) {
        Some(path) => NameIndex::load_csv(path)?,
        None => {
            info!("No name index on disk, building one");
            let paths = discover_documents(&config.documents_dir, &config.document_extension)?;
            NameIndex::build(&paths)
        }
    };
    Ok(index.lookup(name)?)
}

fn run_report(config: &ScoringConfig, name: Option<String>, file: Option<PathBuf>) -> anyhow::Result<()> {
    let path = match (file, name) {
        (Some(file), _) => file,
        (None, Some(name)) => resolve_name(config, &name)?,
        (None, None) => anyhow::bail!("either --name or --file is required"),
    };
    let references = load_references(config)?;
    let pipeline = ResearcherPipeline::new(config, references);

    match pipeline.process_path(&path) {
        DocumentOutcome::Scored(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        DocumentOutcome::Problem(problem) => {
            println!("{}", serde_json::to_string_pretty(&problem)?);
            anyhow::bail!("{} could not be scored: {}", problem.path, problem.reason)
        }
    }
}

fn run_extract(config: &ScoringConfig, file: &Path, section: &str) -> anyhow::Result<()> {
    let doc = CurriculumDocument::load(file)?;
    doc.require_valid()?;
    let pipeline = ResearcherPipeline::new(config, Arc::new(ReferenceData::default()));

    match pipeline.section_table(&doc, section) {
        Some(table) => output::write_table(&table, std::io::stdout().lock())?,
        None => eprintln!("⚠️  No records for section {}", section),
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Score { config, metrics_out } => {
            println!("🔄 Running scoring batch...");
            let config = load_config(&config)?;
            run_score(config, metrics_out).await
        }
        Commands::Index { config, out } => {
            println!("🔎 Building name index...");
            let config = load_config(&config)?;
            run_index(&config, out)
        }
        Commands::Report { config, name, file } => {
            let config = load_config(&config)?;
            run_report(&config, name, file)
        }
        Commands::Extract { config, file, section } => {
            let config = load_config(&config)?;
            run_extract(&config, &file, &section)
        }
    }
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    observability::init_logging();
    if let Err(e) = metrics::init() {
        warn!(error = %e, "Metrics disabled");
    }

    let cli = Cli::parse();

    // workers stuck on timed-out documents must not keep the process alive
    let result = orchestrator::run_on_runtime(run(cli)).context("Failed to start the async runtime")?;

    if let Err(e) = &result {
        error!("Command failed: {:#}", e);
    }
    result
}
