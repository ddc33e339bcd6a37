//! dbsearch CLI
//!
//! Administration and ad-hoc querying of dbsearch indexes.

#![warn(clippy::all)]
#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use dbsearch_cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
    tracing::debug!("Using configuration {}", cli.config.display());

    let mut stdout = std::io::stdout();
    dbsearch_cli::commands::run(&cli.config, cli.command, &mut stdout).await?;
    Ok(())
}
