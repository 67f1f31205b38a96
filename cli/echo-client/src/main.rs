//! echo-client
//!
//! Drives an echo server with configurable delays and gaps, and reports how
//! long each call sat idle and in flight.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use netfault_action::HttpActionClient;
use netfault_echo_client::{error, ClientConfig, Runner};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "echo-client")]
#[command(about = "Client that exercises the echo server", long_about = None)]
#[command(version)]
struct Args {
    /// Path to the client configuration YAML file.
    #[arg(long, default_value = "config/client.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Err(e) = run(&args.config).await {
        error::print_error(&e);
        std::process::exit(1);
    }

    Ok(())
}

async fn run(config_path: &Path) -> Result<()> {
    let config = ClientConfig::load(config_path)?;

    // Prefer RUST_LOG, fall back to client.log_level
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.to_lowercase().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let transport = HttpActionClient::for_host(&config.host, config.port)
        .with_context(|| format!("Invalid server address {}:{}", config.host, config.port))?;

    let mut runner = Runner::new(transport, config)?;
    runner.run().await?;
    Ok(())
}
