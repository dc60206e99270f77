//! keend - Keen queue daemon
//!
//! Runs the coordinator with:
//! - A persistent violation ledger
//! - The idle expiry monitor
//! - A command driver reading `<id>:<handle> <command>` lines from stdin

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use keen_daemon::config::StorageConfig;
use keen_daemon::{DaemonConfig, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// keend CLI
#[derive(Parser)]
#[command(name = "keend")]
#[command(about = "Keen daemon - queue, ready checks and spanner tracking", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "KEEN_CONFIG")]
    config: Option<String>,

    /// Log level
    #[arg(long, env = "KEEN_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "KEEN_LOG_JSON")]
    json: bool,

    /// Violation ledger file, overriding the configured storage
    #[arg(long, env = "KEEN_LEDGER_PATH")]
    ledger_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config =
        DaemonConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    // Override with CLI args
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.json {
        config.logging.json = true;
    }
    if let Some(path) = cli.ledger_path {
        config.storage = StorageConfig::File { path };
    }

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting keend");

    let server = Server::new(config).await.context("failed to start coordinator")?;
    server.run().await?;
    Ok(())
}
