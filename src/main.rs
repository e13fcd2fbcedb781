//! Binary entry point for the `mirix` CLI.

use clap::Parser as _;
use tracing_subscriber::EnvFilter;

use mirix::cli::{Cli, execute};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    execute(cli).await
}
