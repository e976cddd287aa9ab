//! bankpay-gate server entry point.

mod cli;

use bankpay_gate::ServerBuilder;
use clap::Parser;
use cli::{Cli, CliLogFormat};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    match cli.log_format {
        CliLogFormat::Text => registry.with(fmt::layer()).init(),
        CliLogFormat::Json => registry.with(fmt::layer().json()).init(),
    }

    info!("bankpay-gate v{}", env!("CARGO_PKG_VERSION"));

    // Build configuration
    let config = cli.into_config()?;

    // Build and run the server
    let mut server = ServerBuilder::new(config).build().await?;

    // Run until shutdown
    server.run().await?;

    info!("Goodbye!");
    Ok(())
}
