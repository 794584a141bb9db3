use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use hcs_pipeline::analyzers::{BackendRegistry, ExpasyLookup, TokioProcessRunner};
use hcs_pipeline::domain::JobSubmission;
use hcs_pipeline::http::ReqwestTransport;
use hcs_pipeline::normalize::{layout_by_name, parse_table};
use hcs_pipeline::supertypes::SupertypeTable;
use hcs_pipeline::{logging, metrics, AppConfig, InMemoryStore, Orchestrator};

#[derive(Parser)]
#[command(name = "hcs-pipeline")]
#[command(about = "Motif, similarity and MHC epitope analyses for highly conserved sequences")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a job and run it to completion against the local backends
    Run {
        /// Path to a job submission JSON file
        #[arg(long)]
        job: PathBuf,
    },
    /// Parse a prediction tool's output table and print the rows as JSON
    ParseTable {
        /// Prediction method whose column layout applies (e.g. netmhcpan, NetMHCIIpan)
        #[arg(long)]
        method: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// Print the supertype/allele table in use
    Supertypes,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let _guard = logging::init_logging()?;

    let cli = Cli::parse();
    let config = AppConfig::load().context("failed to load configuration")?;
    if let Some(port) = config.metrics_port {
        metrics::init_metrics(port);
    }

    match cli.command {
        Commands::Run { job } => run_job(&config, &job).await?,
        Commands::ParseTable { method, file } => {
            let layout = layout_by_name(&method).ok_or_else(|| anyhow!("unknown prediction method '{}'", method))?;
            let raw = fs::read_to_string(&file).with_context(|| format!("failed to read {}", file.display()))?;
            let rows = parse_table(&raw, layout)?;
            info!("Parsed {} rows with layout {}", rows.len(), layout.name);
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        Commands::Supertypes => {
            let table = SupertypeTable::load_or_bundled(config.pipeline.supertypes_path.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&table)?);
        }
    }

    Ok(())
}

async fn run_job(config: &AppConfig, path: &Path) -> anyhow::Result<()> {
    let content = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let submission: JobSubmission = serde_json::from_str(&content).context("invalid job submission")?;

    let supertypes = Arc::new(SupertypeTable::load_or_bundled(config.pipeline.supertypes_path.as_deref())?);
    let http = Arc::new(ReqwestTransport::new(Duration::from_secs(config.similarity.request_timeout_secs))?);
    let lookup = Arc::new(ExpasyLookup::new(http.clone(), &config.motif));
    let registry = BackendRegistry::with_defaults(config, supertypes, Arc::new(TokioProcessRunner), http, lookup);

    let store = Arc::new(InMemoryStore::new());
    let orchestrator = Orchestrator::new(store, Arc::new(registry), &config.pipeline);

    let job_id = orchestrator.submit(&submission).await?;
    match orchestrator.process(&job_id).await {
        Ok(status) => info!("Job {} finished as {}", job_id, status),
        Err(e) => error!("Job {} stopped: {}", job_id, e),
    }

    let report = orchestrator.report(&job_id).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
