use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use blobsync_gateway::Gateway;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "blobsync-gateway")]
#[command(about = "HTTP front door for direct replication requests", long_about = None)]
struct Cli {
    /// Address to listen on.
    #[arg(long, env = "GATEWAY_BIND", default_value = "0.0.0.0:8080")]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    Arc::new(Gateway::new()).serve(cli.bind).await
}
