//! scaffold-pipeline: generate a project and publish it to git
//!
//! Usage:
//!   scaffold-pipeline create <request.json> [--config <file>]
//!   scaffold-pipeline sync <owner> <repository> [branch] [--config <file>]

use anyhow::{bail, Context, Result};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use scaffold_pipeline::domain::GenerationRequest;
use scaffold_pipeline::{Pipeline, PipelineConfig};

/// Initialize logging with RUST_LOG environment variable support
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

/// Split `--config <file>` out of the positional arguments
fn parse_args(args: Vec<String>) -> Result<(Vec<String>, Option<PathBuf>)> {
    let mut positional = Vec::new();
    let mut config = None;
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            let path = iter.next().context("--config needs a file argument")?;
            config = Some(PathBuf::from(path));
        } else {
            positional.push(arg);
        }
    }
    Ok((positional, config))
}

async fn create(pipeline: &Pipeline, request_path: &str) -> Result<bool> {
    let raw = tokio::fs::read_to_string(request_path)
        .await
        .with_context(|| format!("reading {}", request_path))?;
    let request: GenerationRequest =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", request_path))?;

    let result = tokio::select! {
        result = pipeline.create_project(&request) => result,
        _ = tokio::signal::ctrl_c() => {
            // Dropping the run releases its workspace.
            tracing::info!("Received Ctrl+C, abandoning run");
            return Ok(false);
        }
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(result.success)
}

async fn sync(pipeline: &Pipeline, owner: &str, repository: &str, branch: &str) -> Result<bool> {
    match pipeline.sync_back(owner, repository, branch).await? {
        Some(snapshot) => {
            let out = serde_json::json!({ "sha": snapshot.sha, "document": snapshot.document });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        None => println!("null"),
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let (args, config_path) = parse_args(std::env::args().skip(1).collect())?;
    let config = PipelineConfig::load(config_path.as_deref())?;
    let pipeline = Pipeline::from_config(&config)?;

    let ok = match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["create", request] => create(&pipeline, request).await?,
        ["sync", owner, repository] => sync(&pipeline, owner, repository, "main").await?,
        ["sync", owner, repository, branch] => sync(&pipeline, owner, repository, branch).await?,
        _ => bail!(
            "usage: scaffold-pipeline create <request.json> | sync <owner> <repository> [branch] [--config <file>]"
        ),
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
