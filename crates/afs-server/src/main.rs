use std::net::SocketAddr;
use std::path::PathBuf;

use afs_server::{default_registry, AfsServer, ServerConfig};
use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Serve AppFS storages over HTTP and WebSocket.
#[derive(Parser, Debug)]
#[command(name = "afs-server", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured bind address.
    #[arg(short, long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }

    let server = AfsServer::new(config, &default_registry()).context("opening file systems")?;
    server
        .serve(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
