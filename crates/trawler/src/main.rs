use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use trawler_core::{ComponentRegistry, Pipeline, PipelineAssembler, PipelineSpec};

#[derive(Parser)]
#[command(
    name = "trawl",
    about = "Run declaratively configured document annotation pipelines",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble a pipeline from a YAML file and process every document
    Run {
        /// Pipeline configuration file
        config: PathBuf,
        /// Pipeline name (defaults to the file stem)
        #[arg(long)]
        name: Option<String>,
    },
    /// Assemble a pipeline and report the resolved stage order without running it
    Check {
        /// Pipeline configuration file
        config: PathBuf,
        /// Pipeline name (defaults to the file stem)
        #[arg(long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config, name } => run(&config, name).await,
        Commands::Check { config, name } => check(&config, name),
    }
}

fn assemble(path: &Path, name: Option<String>) -> Result<Pipeline> {
    let yaml = std::fs::read_to_string(path)
        .with_context(|| format!("could not read {}", path.display()))?;

    let name = name.unwrap_or_else(|| {
        path.file_stem()
            .map_or_else(|| "pipeline".to_string(), |s| s.to_string_lossy().into_owned())
    });

    let spec = PipelineSpec::from_yaml(&name, &yaml)
        .with_context(|| format!("could not parse {}", path.display()))?;

    let registry = Arc::new(ComponentRegistry::with_builtins());
    PipelineAssembler::new(registry)
        .assemble(spec)
        .with_context(|| format!("could not assemble pipeline '{name}'"))
}

async fn run(path: &Path, name: Option<String>) -> Result<()> {
    let mut pipeline = assemble(path, name)?;

    tracing::info!(pipeline = %pipeline.name(), "starting run");
    let summary = pipeline.run().await?;

    println!(
        "{}: {} document(s), {} stage failure(s), {} ms",
        pipeline.name(),
        summary.documents,
        summary.stage_failures(),
        summary.duration_ms
    );
    Ok(())
}

fn check(path: &Path, name: Option<String>) -> Result<()> {
    let pipeline = assemble(path, name)?;

    println!("pipeline: {}", pipeline.name());
    println!("reader: {}", pipeline.reader().class());
    println!("annotators ({}):", pipeline.annotators().len());
    for class in pipeline.annotator_order() {
        println!("  {class}");
    }
    println!("consumers ({}):", pipeline.consumers().len());
    for stage in pipeline.consumers() {
        println!("  {}", stage.class());
    }
    println!("resources: {}", pipeline.resource_count());
    Ok(())
}
