#![warn(missing_docs)]

//! blobsync one-shot replicator: handles a single trigger event against
//! local directory-backed source and destination stores.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use blobsync_repl::fs::{LocalFsProvider, LocalFsStore};
use blobsync_repl::{Orchestrator, ReplConfig};
use clap::Parser;
use tokio::io::AsyncReadExt;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "blobsync-repl")]
#[command(about = "Replicate one object-created event to the destination store", long_about = None)]
struct Cli {
    /// Event JSON file, or `-` for stdin.
    #[arg(short, long, default_value = "-")]
    event: String,

    /// Directory holding source containers.
    #[arg(long, env = "BLOBSYNC_SOURCE_ROOT")]
    source_root: PathBuf,

    /// Directory holding destination containers.
    #[arg(long, env = "BLOBSYNC_DEST_ROOT")]
    dest_root: PathBuf,

    /// Emit logs as JSON.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let registry = tracing_subscriber::registry().with(EnvFilter::from_default_env());
    if cli.json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }

    let config = ReplConfig::from_env()?;
    let principal = config.credentials.resolve()?;
    tracing::info!(
        destination = %config.destination_container,
        max_attempts = config.retry.max_attempts,
        backoff_secs = config.retry.backoff_unit.as_secs(),
        "blobsync replicator starting"
    );

    let provider = LocalFsProvider::new(LocalFsStore::new(&cli.dest_root), principal);
    let orchestrator = Orchestrator::new(
        Arc::new(config),
        Arc::new(LocalFsStore::new(&cli.source_root)),
        Arc::new(provider),
    );

    let raw = read_event(&cli.event).await?;
    let outcome = orchestrator.handle_payload(&raw).await;
    let response = outcome.to_response();
    println!("{}", serde_json::to_string(&response)?);

    Ok(if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn read_event(path: &str) -> Result<String> {
    if path == "-" {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .context("failed to read event from stdin")?;
        Ok(buf)
    } else {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read event file {}", path))
    }
}
