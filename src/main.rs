//! Argus - live observation server for agent conversations
//!
//! CLI entry point for the Argus server.

#![forbid(unsafe_code)]

use anyhow::Result;
use argus::server::{self, AppConfig};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Argus server command line
#[derive(Debug, Parser)]
#[command(name = "argus", version, about)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "config/argus.toml")]
    config: String,

    /// Bind host (overrides configuration)
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides configuration)
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "argus=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    info!("Starting Argus v{}", env!("CARGO_PKG_VERSION"));

    let mut config = AppConfig::load(&cli.config)?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    server::run(config).await
}
