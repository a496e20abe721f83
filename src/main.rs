//! One-shot runner: enrich a document from a file, or refresh a facet of a stored document,
//! and print the run report as JSON.
//!
//! Storage and providers come from the environment (`FACETFLOW_STORE_DIR`, `OLLAMA_URL`, ...),
//! so `trigger` is only meaningful with a persistent store.
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facetflow::pipeline::{CancelHandle, PipelineApi, PipelineService, ProcessRequest};
use facetflow::{config, logging};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "facetflow", about = "Run the document enrichment pipeline once")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest or re-process a document.
    Process {
        #[arg(long)]
        id: String,
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        title: Option<String>,
        /// Facets to request explicitly; summary or sentiment selects Full mode.
        #[arg(long = "facet")]
        facets: Vec<String>,
    },
    /// Recompute one facet of a stored document.
    Trigger {
        #[arg(long)]
        id: String,
        #[arg(long)]
        facet: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    config::init_config().context("failed to load configuration")?;
    logging::init_tracing();

    let service = PipelineService::from_env().context("failed to build pipeline service")?;
    let report = match cli.command {
        Command::Process {
            id,
            input,
            title,
            facets,
        } => {
            let raw_text = tokio::fs::read_to_string(&input)
                .await
                .with_context(|| format!("failed to read {}", input.display()))?;
            let mut request = ProcessRequest::new(id, raw_text).with_facets(facets);
            request.title = title;
            service.process(request, &CancelHandle::new()).await?
        }
        Command::Trigger { id, facet } => service.trigger_facet(&id, &facet).await?,
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("failed to encode report")?
    );
    Ok(())
}
